//! Replay command implementation.

use super::{read_batches, read_json};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tabula_core::{
    Base, BatchReport, CoreResult, DetachedHost, Notification, NotifyArgs, Watcher,
};
use tracing::info;

const BASE_KEYS: &[&str] = &["name", "color", "tables", "collaborators", "schema"];
const TABLE_KEYS: &[&str] = &["name", "description", "primaryField", "fields", "views"];
const FIELD_KEYS: &[&str] = &["name", "type", "options", "description"];
const VIEW_KEYS: &[&str] = &["name", "type"];

/// A fired notification.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationInfo {
    /// The notifying model, e.g. `[Table tbl1]`.
    pub model: String,
    /// The key that fired.
    pub key: String,
    /// Key-specific payload.
    #[serde(skip_serializing_if = "Value::is_null")]
    pub args: Value,
}

impl NotificationInfo {
    fn capture(notification: &Notification<'_>) -> Self {
        Self {
            model: notification.model.to_string(),
            key: notification.key.to_string(),
            args: args_to_value(notification.args),
        }
    }
}

/// Outcome of one batch.
#[derive(Debug, Serialize)]
pub struct BatchOutcome {
    /// One-based batch number.
    pub batch: usize,
    /// Counters reported by the base.
    pub report: BatchReport,
    /// Notifications in delivery order.
    pub notifications: Vec<NotificationInfo>,
}

/// A parsed `--watch` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchSpec {
    /// Entity kind, e.g. `table`.
    pub kind: String,
    /// Entity id.
    pub id: String,
    /// Watch key.
    pub key: String,
}

impl WatchSpec {
    /// Parses `<kind>:<id>:<key>`. The key may itself contain colons.
    pub fn parse(spec: &str) -> Result<Self, String> {
        let mut parts = spec.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(kind), Some(id), Some(key))
                if !kind.is_empty() && !id.is_empty() && !key.is_empty() =>
            {
                Ok(Self {
                    kind: kind.to_ascii_lowercase(),
                    id: id.to_owned(),
                    key: key.to_owned(),
                })
            }
            _ => Err(format!("invalid watch '{}': expected <kind>:<id>:<key>", spec)),
        }
    }
}

/// Runs the replay command.
pub fn run(
    document: &Path,
    batches: &Path,
    watches: &[String],
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let base = Base::new(read_json::<Value>(document)?, Arc::new(DetachedHost))?;
    let batches = read_batches(batches)?;

    let specs = watches
        .iter()
        .map(|spec| WatchSpec::parse(spec))
        .collect::<Result<Vec<_>, _>>()?;
    let outcomes = replay(&base, &batches, &specs)?;
    info!(batches = outcomes.len(), "replay finished");

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&outcomes)?);
        }
        _ => {
            print_text_output(&outcomes);
        }
    }

    Ok(())
}

/// Applies `batches` to `base`, recording notifications for `specs` or for
/// every key when `specs` is empty.
pub fn replay(
    base: &Base,
    batches: &[Vec<tabula_core::Change>],
    specs: &[WatchSpec],
) -> Result<Vec<BatchOutcome>, Box<dyn std::error::Error>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    let watcher = Watcher::new(move |notification| {
        sink.lock().push(NotificationInfo::capture(notification));
    });

    if specs.is_empty() {
        watch_everything(base, &watcher)?;
    } else {
        for spec in specs {
            watch_spec(base, spec, &watcher)?;
        }
    }

    let outcomes = batches
        .iter()
        .enumerate()
        .map(|(index, batch)| {
            let report = base.apply_changes(batch);
            BatchOutcome {
                batch: index + 1,
                report,
                notifications: std::mem::take(&mut *log.lock()),
            }
        })
        .collect();
    Ok(outcomes)
}

fn watch_everything(base: &Base, watcher: &Watcher) -> CoreResult<()> {
    base.watch(BASE_KEYS, watcher)?;
    for table in base.tables() {
        table.watch(TABLE_KEYS, watcher)?;
        for field in table.fields()? {
            field.watch(FIELD_KEYS, watcher)?;
        }
        for view in table.views()? {
            view.watch(VIEW_KEYS, watcher)?;
        }
    }
    Ok(())
}

fn watch_spec(
    base: &Base,
    spec: &WatchSpec,
    watcher: &Watcher,
) -> Result<(), Box<dyn std::error::Error>> {
    let keys = [spec.key.as_str()];
    let missing = || format!("no {} with id '{}'", spec.kind, spec.id);
    match spec.kind.as_str() {
        "base" if spec.id == base.id() => {
            base.watch(&keys, watcher)?;
        }
        "table" => {
            let table = base.table_by_id(&spec.id).ok_or_else(missing)?;
            table.watch(&keys, watcher)?;
        }
        "recordstore" => {
            let table = base.table_by_id(&spec.id).ok_or_else(missing)?;
            table.record_store().watch(&keys, watcher)?;
        }
        "field" => {
            let field = base
                .tables()
                .into_iter()
                .find_map(|table| table.field_by_id(&spec.id).ok().flatten())
                .ok_or_else(missing)?;
            field.watch(&keys, watcher)?;
        }
        "view" => {
            let view = base
                .tables()
                .into_iter()
                .find_map(|table| table.view_by_id(&spec.id).ok().flatten())
                .ok_or_else(missing)?;
            view.watch(&keys, watcher)?;
        }
        "cursor" => {
            base.cursor().watch(&keys, watcher)?;
        }
        _ => return Err(missing().into()),
    }
    Ok(())
}

fn args_to_value(args: &NotifyArgs) -> Value {
    match args {
        NotifyArgs::None => Value::Null,
        NotifyArgs::RecordIds { added, removed } => json!({"added": added, "removed": removed}),
        NotifyArgs::CellValues {
            record_ids,
            field_ids,
        } => json!({"recordIds": record_ids, "fieldIds": field_ids}),
        NotifyArgs::CellValuesInField { record_ids } => json!({"recordIds": record_ids}),
    }
}

fn print_text_output(outcomes: &[BatchOutcome]) {
    for outcome in outcomes {
        println!(
            "batch {}: {} changes, {} dirty paths, {} notifications",
            outcome.batch,
            outcome.report.changes,
            outcome.report.dirty_paths,
            outcome.report.notifications
        );
        for notification in &outcome.notifications {
            if notification.args.is_null() {
                println!("  {} {}", notification.model, notification.key);
            } else {
                println!(
                    "  {} {} {}",
                    notification.model, notification.key, notification.args
                );
            }
        }
    }
}
