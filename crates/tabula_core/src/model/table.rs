//! Tables: fields, views and the record store.

use super::base::membership_changed;
use super::field::Field;
use super::model_handle;
use super::node::{ModelContext, ModelNode};
use super::record_store::RecordStore;
use super::view::View;
use crate::document::{keys_at, path, string_list, value_at, DirtyNode};
use crate::error::{CoreError, CoreResult};
use crate::watch::{EntityKind, NotifyArgs, TableKey};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// A table of a base.
#[derive(Clone)]
pub struct Table {
    inner: Arc<TableInner>,
}

struct TableInner {
    node: ModelNode,
    fields: RwLock<HashMap<String, Field>>,
    views: RwLock<HashMap<String, View>>,
    record_store: RecordStore,
}

model_handle!(Table);

impl Table {
    pub(crate) fn new(ctx: Arc<ModelContext>, table_id: &str) -> Self {
        Self {
            inner: Arc::new(TableInner {
                node: ModelNode::new(
                    Arc::clone(&ctx),
                    EntityKind::Table,
                    table_id,
                    path(["tablesById", table_id]),
                ),
                fields: RwLock::new(HashMap::new()),
                views: RwLock::new(HashMap::new()),
                record_store: RecordStore::new(ctx, table_id),
            }),
        }
    }

    /// The table name.
    pub fn name(&self) -> CoreResult<String> {
        Ok(self.inner.node.string("name")?.unwrap_or_default())
    }

    /// The table description.
    pub fn description(&self) -> CoreResult<Option<String>> {
        self.inner.node.string("description")
    }

    /// The primary field.
    ///
    /// # Errors
    ///
    /// Fails with `DeletedEntity` if the table is gone, and with
    /// `InvariantViolation` if the primary field is missing from the table.
    pub fn primary_field(&self) -> CoreResult<Field> {
        let field_id = self.inner.node.string("primaryFieldId")?.unwrap_or_default();
        self.field_by_id(&field_id)?.ok_or_else(|| {
            CoreError::invariant(format!(
                "primary field {:?} of {} is missing",
                field_id, self
            ))
        })
    }

    /// Fields in document order.
    pub fn fields(&self) -> CoreResult<Vec<Field>> {
        let ids = self
            .inner
            .node
            .with_data(|data| keys_at(data, &["fieldsById"]))?;
        Ok(ids
            .iter()
            .filter(|id| !id.is_empty())
            .map(|id| self.field_handle(id))
            .collect())
    }

    /// Looks up a field by id.
    pub fn field_by_id(&self, field_id: &str) -> CoreResult<Option<Field>> {
        let present = self
            .inner
            .node
            .with_data(|data| value_at(data, &["fieldsById", field_id]).is_some())?;
        Ok((present && !field_id.is_empty()).then(|| self.field_handle(field_id)))
    }

    /// Looks up a field by name.
    pub fn field_by_name(&self, name: &str) -> CoreResult<Option<Field>> {
        Ok(self
            .fields()?
            .into_iter()
            .find(|field| field.name().is_ok_and(|n| n == name)))
    }

    /// Views in display order.
    pub fn views(&self) -> CoreResult<Vec<View>> {
        let ids = self.inner.node.with_data(|data| {
            let order = string_list(data.get("viewOrder"));
            if order.is_empty() {
                keys_at(data, &["viewsById"])
            } else {
                order
                    .into_iter()
                    .filter(|id| value_at(data, &["viewsById", id.as_str()]).is_some())
                    .collect()
            }
        })?;
        Ok(ids
            .iter()
            .filter(|id| !id.is_empty())
            .map(|id| self.view_handle(id))
            .collect())
    }

    /// Looks up a view by id.
    pub fn view_by_id(&self, view_id: &str) -> CoreResult<Option<View>> {
        let present = self
            .inner
            .node
            .with_data(|data| value_at(data, &["viewsById", view_id]).is_some())?;
        Ok((present && !view_id.is_empty()).then(|| self.view_handle(view_id)))
    }

    /// Looks up a view by name.
    pub fn view_by_name(&self, name: &str) -> CoreResult<Option<View>> {
        Ok(self
            .views()?
            .into_iter()
            .find(|view| view.name().is_ok_and(|n| n == name)))
    }

    /// The table's records.
    pub fn record_store(&self) -> RecordStore {
        self.inner.record_store.clone()
    }

    fn field_handle(&self, field_id: &str) -> Field {
        if let Some(field) = self.inner.fields.read().get(field_id) {
            return field.clone();
        }
        self.inner
            .fields
            .write()
            .entry(field_id.to_owned())
            .or_insert_with(|| Field::new(Arc::clone(self.inner.node.ctx()), self.id(), field_id))
            .clone()
    }

    fn view_handle(&self, view_id: &str) -> View {
        if let Some(view) = self.inner.views.read().get(view_id) {
            return view.clone();
        }
        self.inner
            .views
            .write()
            .entry(view_id.to_owned())
            .or_insert_with(|| View::new(Arc::clone(self.inner.node.ctx()), self.id(), view_id))
            .clone()
    }

    /// True if `dirty` changes the table's structure.
    ///
    /// The description is not structural.
    pub(crate) fn is_schema_change(dirty: &DirtyNode) -> bool {
        if dirty.is_changed()
            || dirty.has("name")
            || dirty.has("primaryFieldId")
            || dirty.has("viewOrder")
        {
            return true;
        }
        let fields = dirty.child("fieldsById").is_some_and(|fields| {
            fields
                .children()
                .map_or(true, |children| children.values().any(Field::is_schema_change))
        });
        let views = dirty.child("viewsById").is_some_and(|views| {
            views
                .children()
                .map_or(true, |children| children.values().any(View::is_schema_change))
        });
        fields || views
    }

    pub(crate) fn propagate(&self, dirty: &DirtyNode) {
        let model = self.to_model_ref();
        let node = self.node();

        if dirty.has("name") {
            node.notify(&model, TableKey::Name, NotifyArgs::None);
        }
        if dirty.has("description") {
            node.notify(&model, TableKey::Description, NotifyArgs::None);
        }
        if dirty.has("primaryFieldId") {
            node.notify(&model, TableKey::PrimaryField, NotifyArgs::None);
        }

        if let Some(fields_dirty) = dirty.child("fieldsById") {
            if let Some(children) = fields_dirty.children() {
                for (field_id, field_dirty) in children {
                    let field = self.inner.fields.read().get(field_id).cloned();
                    if let Some(field) = field {
                        field.propagate(field_dirty);
                    }
                }
            }
            if membership_changed(fields_dirty) {
                node.notify(&model, TableKey::Fields, NotifyArgs::None);
            }
            self.inner.fields.write().retain(|_, field| !field.is_deleted());
        }

        let order_changed = dirty.has("viewOrder");
        let views_dirty = dirty.child("viewsById");
        if let Some(children) = views_dirty.and_then(DirtyNode::children) {
            for (view_id, view_dirty) in children {
                let view = self.inner.views.read().get(view_id).cloned();
                if let Some(view) = view {
                    view.propagate(view_dirty);
                }
            }
        }
        if order_changed || views_dirty.is_some_and(membership_changed) {
            node.notify(&model, TableKey::Views, NotifyArgs::None);
        }
        if order_changed || views_dirty.is_some() {
            self.inner.views.write().retain(|_, view| !view.is_deleted());
        }

        if let Some(records_dirty) = dirty.child("recordsById") {
            let primary_field_id = self.inner.node.string("primaryFieldId").ok().flatten();
            self.inner
                .record_store
                .propagate(records_dirty, primary_field_id.as_deref());
        }
    }
}
