//! Document fixtures and notification recording.
//!
//! Provides builders for base-shaped documents, a ready-made sample base
//! backed by a [`MockHost`], and a [`Recorder`] watcher.

use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tabula_core::{
    Base, BatchReport, Change, FetchResult, MockHost, NotifyArgs, ResourceDescriptor, Watcher,
};

/// Plain keys watchable on a base.
pub const BASE_KEYS: &[&str] = &["name", "color", "tables", "collaborators", "schema"];
/// Plain keys watchable on a table.
pub const TABLE_KEYS: &[&str] = &["name", "description", "primaryField", "fields", "views"];
/// Plain keys watchable on a field.
pub const FIELD_KEYS: &[&str] = &["name", "type", "options", "description"];
/// Plain keys watchable on a view.
pub const VIEW_KEYS: &[&str] = &["name", "type"];
/// Plain keys watchable on a record store.
pub const RECORD_STORE_KEYS: &[&str] = &["records", "recordIds", "cellValues", "isDataLoaded"];
/// Plain keys watchable on the cursor.
pub const CURSOR_KEYS: &[&str] = &[
    "activeTableId",
    "activeViewId",
    "selectedRecordIds",
    "selectedFieldIds",
    "isDataLoaded",
];

/// Builder for one table of a [`DocumentBuilder`].
#[derive(Debug, Clone)]
pub struct TableFixture {
    id: String,
    name: String,
    description: Option<String>,
    primary_field_id: Option<String>,
    fields: Map<String, Value>,
    views: Map<String, Value>,
}

impl TableFixture {
    /// Creates a table with no fields or views.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            primary_field_id: None,
            fields: Map::new(),
            views: Map::new(),
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Adds a field. The first field added is the primary field unless
    /// [`primary_field`](Self::primary_field) says otherwise.
    #[must_use]
    pub fn field(self, id: &str, name: &str, field_type: &str) -> Self {
        self.field_with_options(id, name, field_type, Value::Null)
    }

    /// Adds a field with type options.
    #[must_use]
    pub fn field_with_options(
        mut self,
        id: &str,
        name: &str,
        field_type: &str,
        options: Value,
    ) -> Self {
        let mut field = json!({"id": id, "name": name, "type": field_type});
        if !options.is_null() {
            field["typeOptions"] = options;
        }
        self.fields.insert(id.to_owned(), field);
        if self.primary_field_id.is_none() {
            self.primary_field_id = Some(id.to_owned());
        }
        self
    }

    /// Sets the primary field.
    #[must_use]
    pub fn primary_field(mut self, id: impl Into<String>) -> Self {
        self.primary_field_id = Some(id.into());
        self
    }

    /// Adds a view.
    #[must_use]
    pub fn view(mut self, id: &str, name: &str, view_type: &str) -> Self {
        self.views.insert(
            id.to_owned(),
            json!({"id": id, "name": name, "type": view_type}),
        );
        self
    }

    fn into_value(self) -> Value {
        let view_order: Vec<Value> = self.views.keys().cloned().map(Value::String).collect();
        let mut table = json!({
            "id": self.id,
            "name": self.name,
            "primaryFieldId": self.primary_field_id,
            "fieldsById": self.fields,
            "viewOrder": view_order,
            "viewsById": self.views,
        });
        if let Some(description) = self.description {
            table["description"] = Value::String(description);
        }
        table
    }
}

/// Builder for base-shaped documents.
#[derive(Debug, Clone)]
pub struct DocumentBuilder {
    id: String,
    name: String,
    color: Option<String>,
    tables: Vec<TableFixture>,
    collaborators: Map<String, Value>,
    cursor: Map<String, Value>,
}

impl DocumentBuilder {
    /// Starts a document for base `id`.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: "Untitled Base".to_owned(),
            color: None,
            tables: Vec::new(),
            collaborators: Map::new(),
            cursor: Map::new(),
        }
    }

    /// Sets the base name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the base color.
    #[must_use]
    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    /// Adds a table.
    #[must_use]
    pub fn table(mut self, table: TableFixture) -> Self {
        self.tables.push(table);
        self
    }

    /// Adds a collaborator.
    #[must_use]
    pub fn collaborator(mut self, id: &str, name: &str, email: &str) -> Self {
        self.collaborators.insert(
            id.to_owned(),
            json!({"id": id, "name": name, "email": email}),
        );
        self
    }

    /// Sets the active table and view of the cursor.
    #[must_use]
    pub fn active(mut self, table_id: &str, view_id: &str) -> Self {
        self.cursor
            .insert("activeTableId".to_owned(), Value::String(table_id.to_owned()));
        self.cursor
            .insert("activeViewId".to_owned(), Value::String(view_id.to_owned()));
        self
    }

    /// Builds the document tree.
    pub fn build(self) -> Value {
        let table_order: Vec<Value> = self
            .tables
            .iter()
            .map(|table| Value::String(table.id.clone()))
            .collect();
        let tables: Map<String, Value> = self
            .tables
            .into_iter()
            .map(|table| (table.id.clone(), table.into_value()))
            .collect();
        let mut root = json!({
            "id": self.id,
            "name": self.name,
            "tableOrder": table_order,
            "tablesById": tables,
            "collaboratorsById": self.collaborators,
            "cursorData": self.cursor,
        });
        if let Some(color) = self.color {
            root["color"] = Value::String(color);
        }
        root
    }
}

/// Builds a record value.
pub fn record(id: &str, cells: Value) -> Value {
    json!({
        "id": id,
        "createdTime": "2024-01-01T00:00:00.000Z",
        "commentCount": 0,
        "cellValuesByFieldId": cells,
    })
}

/// A two-table project-tracking document.
pub fn sample_document() -> Value {
    DocumentBuilder::new("appSample")
        .name("Product Roadmap")
        .color("blue")
        .table(
            TableFixture::new("tblFeatures", "Features")
                .description("Everything we plan to ship")
                .field("fldName", "Name", "singleLineText")
                .field_with_options(
                    "fldStatus",
                    "Status",
                    "singleSelect",
                    json!({"choices": [{"id": "selTodo", "name": "Todo"}, {"id": "selDone", "name": "Done"}]}),
                )
                .field("fldEstimate", "Estimate", "number")
                .view("viwGrid", "All features", "grid")
                .view("viwBoard", "By status", "kanban"),
        )
        .table(
            TableFixture::new("tblReleases", "Releases")
                .field("fldVersion", "Version", "singleLineText")
                .field("fldDate", "Ship date", "date")
                .view("viwReleases", "Grid", "grid"),
        )
        .collaborator("usrAda", "Ada", "ada@example.com")
        .active("tblFeatures", "viwGrid")
        .build()
}

/// Records of `tblFeatures` in [`sample_document`].
pub fn sample_records() -> Value {
    json!({
        "recSearch": record("recSearch", json!({"fldName": "Search", "fldStatus": {"id": "selTodo", "name": "Todo"}, "fldEstimate": 5})),
        "recExport": record("recExport", json!({"fldName": "Export", "fldEstimate": 3})),
        "recSharing": record("recSharing", json!({"fldName": "Sharing", "fldStatus": {"id": "selDone", "name": "Done"}})),
    })
}

/// A base plus the mock host serving its async data.
pub struct TestBase {
    /// The base under test.
    pub base: Base,
    /// The host serving fetches.
    pub host: Arc<MockHost>,
}

impl TestBase {
    /// Creates a base over `document` with an empty mock host.
    pub fn new(document: Value) -> Self {
        let host = Arc::new(MockHost::new());
        let base = Base::new(document, Arc::clone(&host) as Arc<dyn tabula_core::HostBridge>)
            .expect("Failed to build test base");
        Self { base, host }
    }

    /// Creates a base over [`sample_document`] whose host serves
    /// [`sample_records`] and a one-record cursor selection.
    pub fn sample() -> Self {
        let fixture = Self::new(sample_document());
        fixture.host.set_response(
            ResourceDescriptor::TableData {
                table_id: "tblFeatures".to_owned(),
            },
            FetchResult::new(sample_records(), Vec::<String>::new()),
        );
        fixture.host.set_response(
            ResourceDescriptor::CursorData,
            FetchResult::new(
                json!({"selectedRecordIdSet": {"recSearch": true}, "selectedFieldIdSet": {}}),
                ["selectedRecordIds"],
            ),
        );
        fixture
    }

    /// Applies a batch to the base.
    pub fn apply(&self, changes: &[Change]) -> BatchReport {
        self.base.apply_changes(changes)
    }
}

impl std::ops::Deref for TestBase {
    type Target = Base;

    fn deref(&self) -> &Self::Target {
        &self.base
    }
}

/// One captured notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    /// Debug string of the notifying model, e.g. `[Table tbl1]`.
    pub model: String,
    /// The key that fired.
    pub key: String,
    /// The notification payload.
    pub args: NotifyArgs,
}

/// A watcher that records every notification it receives.
#[derive(Clone)]
pub struct Recorder {
    watcher: Watcher,
    events: Arc<Mutex<Vec<RecordedEvent>>>,
}

impl Recorder {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let watcher = Watcher::new(move |notification| {
            sink.lock().push(RecordedEvent {
                model: notification.model.to_string(),
                key: notification.key.to_string(),
                args: notification.args.clone(),
            });
        });
        Self { watcher, events }
    }

    /// The watcher to register.
    pub fn watcher(&self) -> &Watcher {
        &self.watcher
    }

    /// All recorded events, in delivery order.
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().clone()
    }

    /// Recorded events rendered as `"<model> <key>"`.
    pub fn keys(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .map(|event| format!("{} {}", event.model, event.key))
            .collect()
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Forgets recorded events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}

/// Watches every plain key of the base, its cursor, and each table, field,
/// view and record store currently in the document.
pub fn watch_all(base: &Base, watcher: &Watcher) {
    base.watch(BASE_KEYS, watcher).expect("base keys are valid");
    base.cursor()
        .watch(CURSOR_KEYS, watcher)
        .expect("cursor keys are valid");
    for table in base.tables() {
        table.watch(TABLE_KEYS, watcher).expect("table keys are valid");
        table
            .record_store()
            .watch(RECORD_STORE_KEYS, watcher)
            .expect("record store keys are valid");
        for field in table.fields().expect("table is present") {
            field.watch(FIELD_KEYS, watcher).expect("field keys are valid");
        }
        for view in table.views().expect("table is present") {
            view.watch(VIEW_KEYS, watcher).expect("view keys are valid");
        }
    }
}
