//! Records of a loaded table.

use super::model_handle;
use super::node::{ModelContext, ModelNode};
use crate::document::{path, DirtyNode};
use crate::error::{CoreError, CoreResult};
use crate::watch::{EntityKind, NotifyArgs, RecordKey};
use serde_json::Value;
use std::sync::Arc;

/// A record (row) of a table.
#[derive(Clone)]
pub struct Record {
    inner: Arc<RecordInner>,
}

struct RecordInner {
    node: ModelNode,
    table_id: String,
}

model_handle!(Record);

impl Record {
    pub(crate) fn new(ctx: Arc<ModelContext>, table_id: &str, record_id: &str) -> Self {
        Self {
            inner: Arc::new(RecordInner {
                node: ModelNode::new(
                    ctx,
                    EntityKind::Record,
                    record_id,
                    path(["tablesById", table_id, "recordsById", record_id]),
                ),
                table_id: table_id.to_owned(),
            }),
        }
    }

    /// A copy of the cell value in `field_id`, or `None` for an empty cell.
    ///
    /// # Errors
    ///
    /// Fails with `FieldNotFound` if the table has no such field.
    pub fn cell_value(&self, field_id: &str) -> CoreResult<Option<Value>> {
        let value = self.inner.node.with_data(|data| {
            data.get("cellValuesByFieldId")
                .and_then(|cells| cells.get(field_id))
                .filter(|value| !value.is_null())
                .cloned()
        })?;
        let table_id = self.inner.table_id.as_str();
        let field_exists = self
            .inner
            .node
            .ctx()
            .read(|doc| doc.contains(&["tablesById", table_id, "fieldsById", field_id]));
        if !field_exists {
            return Err(CoreError::field_not_found(table_id, field_id));
        }
        Ok(value)
    }

    /// A copy of the primary field's cell value.
    pub fn primary_cell_value(&self) -> CoreResult<Option<Value>> {
        self.inner.node.with_data(|_| ())?;
        let table_id = self.inner.table_id.as_str();
        let primary = self.inner.node.ctx().read(|doc| {
            doc.get(&["tablesById", table_id, "primaryFieldId"])
                .and_then(Value::as_str)
                .map(str::to_owned)
        });
        match primary {
            Some(field_id) => self.cell_value(&field_id),
            None => Err(CoreError::invariant(format!(
                "table {} has no primary field",
                table_id
            ))),
        }
    }

    /// Number of comments on the record.
    pub fn comment_count(&self) -> CoreResult<u64> {
        self.inner
            .node
            .with_data(|data| data.get("commentCount").and_then(Value::as_u64).unwrap_or(0))
    }

    /// Creation timestamp as supplied by the host.
    pub fn created_time(&self) -> CoreResult<Option<String>> {
        self.inner.node.string("createdTime")
    }

    /// Delivers a record's dirty subtree. A terminal marker reaches every
    /// cell of `table_field_ids`.
    pub(crate) fn propagate(
        &self,
        dirty: &DirtyNode,
        primary_field_id: Option<&str>,
        table_field_ids: &[String],
    ) {
        let model = self.to_model_ref();
        let node = self.node();
        let changed_fields: Vec<String> = match dirty.child("cellValuesByFieldId") {
            None => Vec::new(),
            Some(cells) => match cells.children() {
                Some(by_field) => by_field.keys().cloned().collect(),
                None => table_field_ids.to_vec(),
            },
        };

        if !changed_fields.is_empty() {
            node.notify(&model, RecordKey::CellValues, NotifyArgs::None);
            for field_id in &changed_fields {
                node.notify(
                    &model,
                    RecordKey::CellValueInField(field_id.clone()),
                    NotifyArgs::None,
                );
            }
            if primary_field_id.is_some_and(|primary| changed_fields.iter().any(|f| f == primary)) {
                node.notify(&model, RecordKey::PrimaryCellValue, NotifyArgs::None);
            }
        }
        if dirty.has("commentCount") {
            node.notify(&model, RecordKey::CommentCount, NotifyArgs::None);
        }
    }
}
