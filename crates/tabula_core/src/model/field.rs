//! Table fields.

use super::model_handle;
use super::node::{ModelContext, ModelNode};
use crate::document::{path, DirtyNode};
use crate::error::CoreResult;
use crate::watch::{EntityKind, FieldKey, NotifyArgs};
use serde_json::Value;
use std::sync::Arc;

/// A field (column) of a table.
#[derive(Clone)]
pub struct Field {
    inner: Arc<FieldInner>,
}

struct FieldInner {
    node: ModelNode,
    table_id: String,
}

model_handle!(Field);

impl Field {
    pub(crate) fn new(ctx: Arc<ModelContext>, table_id: &str, field_id: &str) -> Self {
        Self {
            inner: Arc::new(FieldInner {
                node: ModelNode::new(
                    ctx,
                    EntityKind::Field,
                    field_id,
                    path(["tablesById", table_id, "fieldsById", field_id]),
                ),
                table_id: table_id.to_owned(),
            }),
        }
    }

    /// The field name.
    pub fn name(&self) -> CoreResult<String> {
        Ok(self.inner.node.string("name")?.unwrap_or_default())
    }

    /// The field type, e.g. `singleLineText`.
    pub fn field_type(&self) -> CoreResult<String> {
        Ok(self.inner.node.string("type")?.unwrap_or_default())
    }

    /// A copy of the type-specific options.
    pub fn options(&self) -> CoreResult<Option<Value>> {
        Ok(self
            .inner
            .node
            .value("typeOptions")?
            .filter(|options| !options.is_null()))
    }

    /// The field description.
    pub fn description(&self) -> CoreResult<Option<String>> {
        self.inner.node.string("description")
    }

    /// True if this is its table's primary field.
    pub fn is_primary_field(&self) -> CoreResult<bool> {
        self.inner.node.with_data(|_| ())?;
        let primary = self.inner.node.ctx().read(|doc| {
            doc.get(&["tablesById", self.inner.table_id.as_str(), "primaryFieldId"])
                .and_then(Value::as_str)
                .map(str::to_owned)
        });
        Ok(primary.as_deref() == Some(self.id()))
    }

    /// True if `dirty` changes the field's structure. The description is not structural.
    pub(crate) fn is_schema_change(dirty: &DirtyNode) -> bool {
        dirty.is_changed() || dirty.has("name") || dirty.has("type") || dirty.has("typeOptions")
    }

    pub(crate) fn propagate(&self, dirty: &DirtyNode) {
        let model = self.to_model_ref();
        let node = self.node();
        if dirty.has("name") {
            node.notify(&model, FieldKey::Name, NotifyArgs::None);
        }
        if dirty.has("type") {
            node.notify(&model, FieldKey::Type, NotifyArgs::None);
        }
        if dirty.has("typeOptions") {
            node.notify(&model, FieldKey::Options, NotifyArgs::None);
        }
        if dirty.has("description") {
            node.notify(&model, FieldKey::Description, NotifyArgs::None);
        }
    }
}
