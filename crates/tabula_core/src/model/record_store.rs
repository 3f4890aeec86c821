//! The lazily loaded records of a table.

use super::loader::{LoadController, Loadable};
use super::model_handle;
use super::node::{ModelContext, ModelNode};
use super::record::Record;
use super::ModelRef;
use crate::document::{keys_at, path, Change, DirtyNode};
use crate::error::{CoreError, CoreResult};
use crate::host::ResourceDescriptor;
use crate::watch::{EntityKind, NotifyArgs, RecordStoreKey, WatchKey};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// The records of one table.
///
/// Records are not resident until [`load_data`](RecordStore::load_data)
/// completes. Each successful `load_data` must be balanced by one
/// [`unload_data`](RecordStore::unload_data); the data is evicted a grace
/// period after the last release.
#[derive(Clone)]
pub struct RecordStore {
    inner: Arc<RecordStoreInner>,
}

struct RecordStoreInner {
    node: ModelNode,
    records: RwLock<HashMap<String, Record>>,
    loader: LoadController,
}

model_handle!(RecordStore);

impl RecordStore {
    pub(crate) fn new(ctx: Arc<ModelContext>, table_id: &str) -> Self {
        Self {
            inner: Arc::new(RecordStoreInner {
                node: ModelNode::new(
                    ctx,
                    EntityKind::RecordStore,
                    table_id,
                    path(["tablesById", table_id]),
                ),
                records: RwLock::new(HashMap::new()),
                loader: LoadController::new(),
            }),
        }
    }

    fn records_path(&self) -> Vec<String> {
        self.inner.node.child_path(["recordsById"])
    }

    /// True while the records are resident.
    pub fn is_data_loaded(&self) -> bool {
        self.inner.loader.is_loaded()
    }

    /// Number of outstanding `load_data` calls.
    pub fn retain_count(&self) -> usize {
        self.inner.loader.retain_count()
    }

    /// True while an eviction is scheduled but has not run.
    pub fn is_unload_pending(&self) -> bool {
        self.inner.loader.is_unload_pending()
    }

    /// Retains the records and waits until they are loaded.
    ///
    /// # Errors
    ///
    /// Returns the host's fetch error. A failed call holds no retain and must
    /// not be balanced by `unload_data`.
    pub async fn load_data(&self) -> CoreResult<()> {
        LoadController::acquire(self).await
    }

    /// Releases one retain taken by [`load_data`](Self::load_data).
    pub fn unload_data(&self) {
        LoadController::release(self);
    }

    fn ensure_loaded(&self) -> CoreResult<()> {
        self.inner.node.with_data(|_| ())?;
        if self.is_data_loaded() {
            Ok(())
        } else {
            Err(CoreError::not_loaded(self.inner.node.describe()))
        }
    }

    /// Record ids in document order.
    pub fn record_ids(&self) -> CoreResult<Vec<String>> {
        self.ensure_loaded()?;
        let mut ids = self
            .inner
            .node
            .with_data(|table| keys_at(table, &["recordsById"]))?;
        ids.retain(|id| !id.is_empty());
        Ok(ids)
    }

    /// Records in document order.
    pub fn records(&self) -> CoreResult<Vec<Record>> {
        Ok(self
            .record_ids()?
            .iter()
            .map(|id| self.record_handle(id))
            .collect())
    }

    /// Looks up a record by id.
    pub fn record_by_id(&self, record_id: &str) -> CoreResult<Option<Record>> {
        self.ensure_loaded()?;
        let present = self.inner.node.with_data(|table| {
            table
                .get("recordsById")
                .and_then(|records| records.get(record_id))
                .is_some()
        })?;
        Ok((present && !record_id.is_empty()).then(|| self.record_handle(record_id)))
    }

    fn record_handle(&self, record_id: &str) -> Record {
        if let Some(record) = self.inner.records.read().get(record_id) {
            return record.clone();
        }
        self.inner
            .records
            .write()
            .entry(record_id.to_owned())
            .or_insert_with(|| {
                Record::new(Arc::clone(self.inner.node.ctx()), self.id(), record_id)
            })
            .clone()
    }

    /// Delivers a `recordsById` dirty subtree.
    pub(crate) fn propagate(&self, dirty: &DirtyNode, primary_field_id: Option<&str>) {
        if !self.is_data_loaded() {
            return;
        }
        let model = self.to_model_ref();
        let node = self.node();
        let (record_ids, field_ids) = node
            .with_data(|table| {
                (
                    keys_at(table, &["recordsById"]),
                    keys_at(table, &["fieldsById"]),
                )
            })
            .unwrap_or_default();
        let present: BTreeSet<&str> = record_ids.iter().map(String::as_str).collect();

        let mut added = Vec::new();
        let mut removed = Vec::new();
        let mut cells: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut cell_records: BTreeSet<String> = BTreeSet::new();

        match dirty.children() {
            None => {
                added = record_ids.clone();
                let mut gone: Vec<String> = self
                    .inner
                    .records
                    .read()
                    .keys()
                    .filter(|id| !present.contains(id.as_str()))
                    .cloned()
                    .collect();
                gone.sort();
                removed = gone;
                for field_id in &field_ids {
                    cells
                        .entry(field_id.clone())
                        .or_default()
                        .extend(record_ids.iter().cloned());
                }
                cell_records.extend(record_ids.iter().cloned());
            }
            Some(children) => {
                for (record_id, record_dirty) in children {
                    let changed_fields = if record_dirty.is_changed() {
                        if present.contains(record_id.as_str()) {
                            added.push(record_id.clone());
                            node.with_data(|table| {
                                keys_at(
                                    table,
                                    &["recordsById", record_id.as_str(), "cellValuesByFieldId"],
                                )
                            })
                            .unwrap_or_default()
                        } else {
                            removed.push(record_id.clone());
                            Vec::new()
                        }
                    } else {
                        match record_dirty.child("cellValuesByFieldId") {
                            None => Vec::new(),
                            Some(cell_dirty) => match cell_dirty.children() {
                                Some(by_field) => by_field.keys().cloned().collect(),
                                None => field_ids.clone(),
                            },
                        }
                    };
                    for field_id in changed_fields {
                        cells.entry(field_id).or_default().insert(record_id.clone());
                        cell_records.insert(record_id.clone());
                    }

                    let record = self.inner.records.read().get(record_id).cloned();
                    if let Some(record) = record {
                        record.propagate(record_dirty, primary_field_id, &field_ids);
                    }
                }
            }
        }

        let membership = NotifyArgs::RecordIds {
            added: added.clone(),
            removed: removed.clone(),
        };
        node.notify(&model, RecordStoreKey::Records, membership.clone());
        if !added.is_empty() || !removed.is_empty() {
            node.notify(&model, RecordStoreKey::RecordIds, membership);
        }
        if !cell_records.is_empty() {
            node.notify(
                &model,
                RecordStoreKey::CellValues,
                NotifyArgs::CellValues {
                    record_ids: cell_records.into_iter().collect(),
                    field_ids: cells.keys().cloned().collect(),
                },
            );
            for (field_id, record_ids) in cells {
                node.notify(
                    &model,
                    RecordStoreKey::CellValuesInField(field_id),
                    NotifyArgs::CellValuesInField {
                        record_ids: record_ids.into_iter().collect(),
                    },
                );
            }
        }

        self.inner
            .records
            .write()
            .retain(|_, record| !record.is_deleted());
    }
}

impl Loadable for RecordStore {
    fn node(&self) -> &ModelNode {
        &self.inner.node
    }

    fn loader(&self) -> &LoadController {
        &self.inner.loader
    }

    fn descriptor(&self) -> ResourceDescriptor {
        ResourceDescriptor::TableData {
            table_id: self.id().to_owned(),
        }
    }

    fn load_changes(&self, data: Value) -> Vec<Change> {
        vec![Change::set(self.records_path(), data)]
    }

    fn evict_changes(&self) -> Vec<Change> {
        vec![Change::remove(self.records_path())]
    }

    fn clear_children(&self) {
        self.inner.records.write().clear();
    }

    fn loaded_key(&self) -> WatchKey {
        RecordStoreKey::IsDataLoaded.into()
    }

    fn to_model_ref(&self) -> ModelRef {
        RecordStore::to_model_ref(self)
    }
}
