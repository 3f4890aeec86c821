//! The user's cursor and selection.

use super::loader::{LoadController, Loadable};
use super::model_handle;
use super::node::{ModelContext, ModelNode};
use super::ModelRef;
use crate::document::{path, Change, DirtyNode};
use crate::error::{CoreError, CoreResult};
use crate::host::ResourceDescriptor;
use crate::watch::{CursorKey, EntityKind, NotifyArgs, WatchKey};
use serde_json::Value;
use std::sync::Arc;

const SELECTED_RECORDS: &str = "selectedRecordIdSet";
const SELECTED_FIELDS: &str = "selectedFieldIdSet";

/// The active table and view, plus the selection once loaded.
#[derive(Clone)]
pub struct Cursor {
    inner: Arc<CursorInner>,
}

struct CursorInner {
    node: ModelNode,
    loader: LoadController,
}

model_handle!(Cursor);

impl Cursor {
    pub(crate) fn new(ctx: Arc<ModelContext>) -> Self {
        Self {
            inner: Arc::new(CursorInner {
                node: ModelNode::new(ctx, EntityKind::Cursor, "cursor", path(["cursorData"])),
                loader: LoadController::new(),
            }),
        }
    }

    /// The active table id.
    pub fn active_table_id(&self) -> CoreResult<Option<String>> {
        self.inner.node.string("activeTableId")
    }

    /// The active view id.
    pub fn active_view_id(&self) -> CoreResult<Option<String>> {
        self.inner.node.string("activeViewId")
    }

    /// True while the selection is resident.
    pub fn is_data_loaded(&self) -> bool {
        self.inner.loader.is_loaded()
    }

    /// Number of outstanding `load_data` calls.
    pub fn retain_count(&self) -> usize {
        self.inner.loader.retain_count()
    }

    /// Retains the selection data and waits until it is loaded.
    ///
    /// # Errors
    ///
    /// Returns the host's fetch error. A failed call holds no retain.
    pub async fn load_data(&self) -> CoreResult<()> {
        LoadController::acquire(self).await
    }

    /// Releases one retain taken by [`load_data`](Self::load_data).
    pub fn unload_data(&self) {
        LoadController::release(self);
    }

    fn id_set(&self, key: &str) -> CoreResult<Vec<String>> {
        if !self.is_data_loaded() {
            return Err(CoreError::not_loaded(self.inner.node.describe()));
        }
        self.inner.node.with_data(|data| {
            data.get(key)
                .and_then(Value::as_object)
                .map(|set| {
                    set.iter()
                        .filter(|(_, selected)| selected.as_bool() == Some(true))
                        .map(|(id, _)| id.clone())
                        .collect()
                })
                .unwrap_or_default()
        })
    }

    /// Selected record ids.
    pub fn selected_record_ids(&self) -> CoreResult<Vec<String>> {
        self.id_set(SELECTED_RECORDS)
    }

    /// Selected field ids.
    pub fn selected_field_ids(&self) -> CoreResult<Vec<String>> {
        self.id_set(SELECTED_FIELDS)
    }

    /// True if `record_id` is selected.
    pub fn is_record_selected(&self, record_id: &str) -> CoreResult<bool> {
        Ok(self
            .selected_record_ids()?
            .iter()
            .any(|id| id == record_id))
    }

    pub(crate) fn propagate(&self, dirty: &DirtyNode) {
        let model = self.to_model_ref();
        let node = self.node();
        if dirty.has("activeTableId") {
            node.notify(&model, CursorKey::ActiveTableId, NotifyArgs::None);
        }
        if dirty.has("activeViewId") {
            node.notify(&model, CursorKey::ActiveViewId, NotifyArgs::None);
        }
        if dirty.has(SELECTED_RECORDS) {
            node.notify(&model, CursorKey::SelectedRecordIds, NotifyArgs::None);
        }
        if dirty.has(SELECTED_FIELDS) {
            node.notify(&model, CursorKey::SelectedFieldIds, NotifyArgs::None);
        }
    }
}

impl Loadable for Cursor {
    fn node(&self) -> &ModelNode {
        &self.inner.node
    }

    fn loader(&self) -> &LoadController {
        &self.inner.loader
    }

    fn descriptor(&self) -> ResourceDescriptor {
        ResourceDescriptor::CursorData
    }

    fn load_changes(&self, data: Value) -> Vec<Change> {
        match data {
            Value::Object(members) => members
                .into_iter()
                .map(|(key, value)| Change::set(self.inner.node.child_path([key]), value))
                .collect(),
            other => {
                self.inner.node.ctx().warnings().warn_once(format!(
                    "ignoring cursor data that is not an object: {}",
                    other
                ));
                Vec::new()
            }
        }
    }

    fn evict_changes(&self) -> Vec<Change> {
        vec![
            Change::remove(self.inner.node.child_path([SELECTED_RECORDS])),
            Change::remove(self.inner.node.child_path([SELECTED_FIELDS])),
        ]
    }

    fn loaded_key(&self) -> WatchKey {
        CursorKey::IsDataLoaded.into()
    }

    fn to_model_ref(&self) -> ModelRef {
        Cursor::to_model_ref(self)
    }
}
