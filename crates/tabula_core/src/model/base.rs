//! The root model and the batch entry point.

use super::cursor::Cursor;
use super::model_handle;
use super::node::{ModelContext, ModelNode};
use super::table::Table;
use crate::config::Config;
use crate::document::{keys_at, string_list, Change, DirtyNode, Document};
use crate::error::{CoreError, CoreResult};
use crate::host::HostBridge;
use crate::warnings::WarningLog;
use crate::watch::{BaseKey, EntityKind, NotifyArgs};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// A collaborator of the base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collaborator {
    /// User id.
    pub id: String,
    /// Email address.
    #[serde(default)]
    pub email: Option<String>,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Avatar URL.
    #[serde(default)]
    pub profile_pic_url: Option<String>,
}

/// Outcome of applying one change batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BatchReport {
    /// Number of changes in the batch.
    pub changes: usize,
    /// Number of terminal markers in the batch's dirty tree.
    pub dirty_paths: usize,
    /// Number of watch callbacks invoked while delivering this batch.
    pub notifications: u64,
    /// Whether the batch was queued behind the batch being delivered.
    ///
    /// A deferred batch is applied and propagated after the current one
    /// finishes, so its dirty paths and notifications are not known yet.
    pub deferred: bool,
}

/// Builder for [`Base`].
pub struct BaseBuilder {
    document: Document,
    host: Arc<dyn HostBridge>,
    config: Config,
    warnings: Option<Arc<WarningLog>>,
}

impl BaseBuilder {
    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Shares an existing warning log, e.g. one per process.
    #[must_use]
    pub fn warning_log(mut self, warnings: Arc<WarningLog>) -> Self {
        self.warnings = Some(warnings);
        self
    }

    /// Builds the base.
    ///
    /// # Errors
    ///
    /// Fails if the document root is not an object with a string `id`.
    pub fn build(self) -> CoreResult<Base> {
        let BaseBuilder {
            mut document,
            host,
            config,
            warnings,
        } = self;

        let id = match document.get(&["id"]).and_then(Value::as_str) {
            Some(id) if !id.is_empty() => id.to_owned(),
            _ => {
                return Err(CoreError::invariant(
                    "document root must be an object with a non-empty string id",
                ))
            }
        };
        if let Some(root) = document.root_mut().as_object_mut() {
            root.entry("cursorData")
                .or_insert_with(|| Value::Object(Map::new()));
        }

        let warnings =
            warnings.unwrap_or_else(|| Arc::new(WarningLog::with_dedupe(config.dedupe_warnings)));
        let ctx = Arc::new(ModelContext::new(document, host, config, warnings));
        debug!(base = %id, "base created");

        Ok(Base {
            inner: Arc::new(BaseInner {
                node: ModelNode::new(Arc::clone(&ctx), EntityKind::Base, id, Vec::new()),
                tables: RwLock::new(HashMap::new()),
                cursor: Cursor::new(ctx),
            }),
        })
    }
}

/// The root model: tables, collaborators and the cursor.
#[derive(Clone)]
pub struct Base {
    inner: Arc<BaseInner>,
}

struct BaseInner {
    node: ModelNode,
    tables: RwLock<HashMap<String, Table>>,
    cursor: Cursor,
}

model_handle!(Base);

impl Base {
    /// Starts building a base over `document`.
    pub fn builder(document: impl Into<Document>, host: Arc<dyn HostBridge>) -> BaseBuilder {
        BaseBuilder {
            document: document.into(),
            host,
            config: Config::default(),
            warnings: None,
        }
    }

    /// Creates a base with the default configuration.
    ///
    /// # Errors
    ///
    /// See [`BaseBuilder::build`].
    pub fn new(document: impl Into<Document>, host: Arc<dyn HostBridge>) -> CoreResult<Self> {
        Self::builder(document, host).build()
    }

    fn ctx(&self) -> &Arc<ModelContext> {
        self.inner.node.ctx()
    }

    /// The base name.
    pub fn name(&self) -> String {
        self.inner.node.string("name").ok().flatten().unwrap_or_default()
    }

    /// The base color.
    pub fn color(&self) -> Option<String> {
        self.inner.node.string("color").ok().flatten()
    }

    /// Tables in display order.
    pub fn tables(&self) -> Vec<Table> {
        self.table_ids()
            .iter()
            .filter_map(|id| self.table_by_id(id))
            .collect()
    }

    fn table_ids(&self) -> Vec<String> {
        self.ctx().read(|doc| {
            let order = string_list(doc.get(&["tableOrder"]));
            if order.is_empty() {
                keys_at(doc.root(), &["tablesById"])
            } else {
                order
            }
        })
    }

    /// Looks up a table by id.
    pub fn table_by_id(&self, table_id: &str) -> Option<Table> {
        if table_id.is_empty() || !self.ctx().read(|doc| doc.contains(&["tablesById", table_id])) {
            return None;
        }
        if let Some(table) = self.inner.tables.read().get(table_id) {
            return Some(table.clone());
        }
        let mut tables = self.inner.tables.write();
        let table = tables
            .entry(table_id.to_owned())
            .or_insert_with(|| Table::new(Arc::clone(self.ctx()), table_id));
        Some(table.clone())
    }

    /// Looks up a table by name.
    pub fn table_by_name(&self, name: &str) -> Option<Table> {
        self.tables()
            .into_iter()
            .find(|table| table.name().is_ok_and(|n| n == name))
    }

    /// Collaborators in document order.
    pub fn collaborators(&self) -> Vec<Collaborator> {
        self.ctx().read(|doc| {
            doc.get(&["collaboratorsById"])
                .and_then(Value::as_object)
                .map(|map| map.values().filter_map(parse_collaborator).collect())
                .unwrap_or_default()
        })
    }

    /// Looks up a collaborator by user id.
    pub fn collaborator_by_id(&self, user_id: &str) -> Option<Collaborator> {
        self.ctx()
            .read(|doc| doc.get(&["collaboratorsById", user_id]).and_then(parse_collaborator))
    }

    /// The user's cursor.
    pub fn cursor(&self) -> Cursor {
        self.inner.cursor.clone()
    }

    /// Returns a copy of the current document.
    pub fn document(&self) -> Document {
        self.ctx().snapshot()
    }

    /// The configuration the base was built with.
    pub fn config(&self) -> &Config {
        self.ctx().config()
    }

    /// The warning log shared by this base's models.
    pub fn warnings(&self) -> &WarningLog {
        self.ctx().warnings()
    }

    /// Total number of watch callbacks invoked by this base's models.
    pub fn notification_count(&self) -> u64 {
        self.ctx().notification_count()
    }

    /// Applies a change batch and notifies watchers of what changed.
    ///
    /// Batches are applied strictly one at a time and in arrival order.
    /// Callbacks run synchronously before this returns. A batch applied
    /// from inside a callback is queued and runs once the batch being
    /// delivered has notified every watcher; its report is marked
    /// [`deferred`](BatchReport::deferred).
    pub fn apply_changes(&self, changes: &[Change]) -> BatchReport {
        let ctx = Arc::clone(self.ctx());
        let _batch = ctx.batch();
        if ctx.is_dispatching() {
            ctx.defer(changes);
            debug!(changes = changes.len(), "deferred change batch");
            return BatchReport {
                changes: changes.len(),
                deferred: true,
                ..BatchReport::default()
            };
        }

        let report = self.run_batch(changes);
        while let Some(next) = ctx.next_deferred() {
            let deferred = self.run_batch(&next);
            debug!(
                changes = deferred.changes,
                dirty_paths = deferred.dirty_paths,
                notifications = deferred.notifications,
                "delivered deferred change batch"
            );
        }
        report
    }

    fn run_batch(&self, changes: &[Change]) -> BatchReport {
        let ctx = self.ctx();
        let dirty = ctx.apply(changes);
        let dirty_paths = dirty.changed_count();
        debug!(changes = changes.len(), dirty_paths, "applied change batch");

        let before = ctx.notification_count();
        if !dirty.is_empty() {
            ctx.dispatch(|| self.propagate(&dirty));
        }

        BatchReport {
            changes: changes.len(),
            dirty_paths,
            notifications: ctx.notification_count() - before,
            deferred: false,
        }
    }

    fn propagate(&self, dirty: &DirtyNode) {
        let model = self.to_model_ref();
        let node = self.node();

        if dirty.has("name") {
            node.notify(&model, BaseKey::Name, NotifyArgs::None);
        }
        if dirty.has("color") {
            node.notify(&model, BaseKey::Color, NotifyArgs::None);
        }
        if dirty.has("collaboratorsById") {
            node.notify(&model, BaseKey::Collaborators, NotifyArgs::None);
        }

        let order_changed = dirty.has("tableOrder");
        let tables_dirty = dirty.child("tablesById");
        if order_changed || tables_dirty.is_some_and(membership_changed) {
            node.notify(&model, BaseKey::Tables, NotifyArgs::None);
        }

        let mut schema_changed = order_changed;
        if let Some(tables_dirty) = tables_dirty {
            schema_changed |= self.propagate_tables(tables_dirty);
        }

        if let Some(cursor_dirty) = dirty.child("cursorData") {
            self.inner.cursor.propagate(cursor_dirty);
        }

        if schema_changed {
            node.notify(&model, BaseKey::Schema, NotifyArgs::None);
        }
    }

    /// Delivers per-table changes and returns whether any table's schema changed.
    fn propagate_tables(&self, dirty: &DirtyNode) -> bool {
        let schema_changed = match dirty.children() {
            None => true,
            Some(children) => {
                let mut changed = false;
                for (table_id, table_dirty) in children {
                    changed |= Table::is_schema_change(table_dirty);
                    let table = self.inner.tables.read().get(table_id).cloned();
                    if let Some(table) = table {
                        table.propagate(table_dirty);
                    }
                }
                changed
            }
        };

        let mut tables = self.inner.tables.write();
        tables.retain(|_, table| !table.is_deleted());
        schema_changed
    }
}

/// True if a `*ById` dirty node adds, removes or replaces a child.
pub(crate) fn membership_changed(dirty: &DirtyNode) -> bool {
    match dirty.children() {
        None => true,
        Some(children) => children.values().any(DirtyNode::is_changed),
    }
}

fn parse_collaborator(value: &Value) -> Option<Collaborator> {
    match serde_json::from_value(value.clone()) {
        Ok(collaborator) => Some(collaborator),
        Err(err) => {
            warn!(error = %err, "skipping malformed collaborator");
            None
        }
    }
}
