//! Table views.

use super::model_handle;
use super::node::{ModelContext, ModelNode};
use crate::document::{path, DirtyNode};
use crate::error::CoreResult;
use crate::watch::{EntityKind, NotifyArgs, ViewKey};
use std::sync::Arc;

/// A view of a table.
#[derive(Clone)]
pub struct View {
    inner: Arc<ViewInner>,
}

struct ViewInner {
    node: ModelNode,
}

model_handle!(View);

impl View {
    pub(crate) fn new(ctx: Arc<ModelContext>, table_id: &str, view_id: &str) -> Self {
        Self {
            inner: Arc::new(ViewInner {
                node: ModelNode::new(
                    ctx,
                    EntityKind::View,
                    view_id,
                    path(["tablesById", table_id, "viewsById", view_id]),
                ),
            }),
        }
    }

    /// The view name.
    pub fn name(&self) -> CoreResult<String> {
        Ok(self.inner.node.string("name")?.unwrap_or_default())
    }

    /// The view type, e.g. `grid`.
    pub fn view_type(&self) -> CoreResult<String> {
        Ok(self.inner.node.string("type")?.unwrap_or_default())
    }

    pub(crate) fn is_schema_change(dirty: &DirtyNode) -> bool {
        dirty.is_changed() || dirty.has("name") || dirty.has("type")
    }

    pub(crate) fn propagate(&self, dirty: &DirtyNode) {
        let model = self.to_model_ref();
        if dirty.has("name") {
            self.node().notify(&model, ViewKey::Name, NotifyArgs::None);
        }
        if dirty.has("type") {
            self.node().notify(&model, ViewKey::Type, NotifyArgs::None);
        }
    }
}
