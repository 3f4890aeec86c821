//! Integration tests for batch application and notification propagation.

use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tabula_core::{
    Base, Change, CoreError, FetchResult, MockHost, NotifyArgs, ResourceDescriptor, Watcher,
};

type Log = Arc<Mutex<Vec<(String, String, NotifyArgs)>>>;

fn recorder() -> (Watcher, Log) {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    let watcher = Watcher::new(move |n| {
        sink.lock()
            .unwrap()
            .push((n.model.to_string(), n.key.to_string(), n.args.clone()));
    });
    (watcher, log)
}

fn fired(log: &Log) -> Vec<String> {
    log.lock()
        .unwrap()
        .iter()
        .map(|(model, key, _)| format!("{} {}", model, key))
        .collect()
}

fn document() -> Value {
    json!({
        "id": "app1",
        "name": "Roadmap",
        "color": "purple",
        "tableOrder": ["tblA", "tblB"],
        "tablesById": {
            "tblA": {
                "id": "tblA", "name": "Features", "description": "", "primaryFieldId": "fld1",
                "fieldsById": {
                    "fld1": {"id": "fld1", "name": "Name", "type": "singleLineText"},
                    "fld2": {"id": "fld2", "name": "Estimate", "type": "number",
                             "typeOptions": {"precision": 0}}
                },
                "viewOrder": ["viw1"],
                "viewsById": {"viw1": {"id": "viw1", "name": "Grid", "type": "grid"}}
            },
            "tblB": {
                "id": "tblB", "name": "Releases", "primaryFieldId": "fld3",
                "fieldsById": {"fld3": {"id": "fld3", "name": "Version", "type": "singleLineText"}},
                "viewOrder": [],
                "viewsById": {}
            }
        },
        "collaboratorsById": {"usr1": {"id": "usr1", "name": "Grace"}},
        "cursorData": {"activeTableId": "tblA", "activeViewId": "viw1"}
    })
}

fn records() -> Value {
    json!({
        "rec1": {"id": "rec1", "createdTime": "2024-01-02T03:04:05.000Z", "commentCount": 0,
                 "cellValuesByFieldId": {"fld1": "Search", "fld2": 3}},
        "rec2": {"id": "rec2", "createdTime": "2024-01-03T03:04:05.000Z", "commentCount": 2,
                 "cellValuesByFieldId": {"fld1": "Export"}}
    })
}

fn base_with(host: Arc<MockHost>) -> Base {
    Base::new(document(), host).unwrap()
}

fn base() -> Base {
    base_with(Arc::new(MockHost::new()))
}

/// Watches every plain key of the base, both tables and all of their fields and views.
fn watch_everything(base: &Base, watcher: &Watcher) {
    base.watch(&["name", "color", "tables", "collaborators", "schema"], watcher)
        .unwrap();
    for table in base.tables() {
        table
            .watch(
                &["name", "description", "primaryField", "fields", "views"],
                watcher,
            )
            .unwrap();
        for field in table.fields().unwrap() {
            field
                .watch(&["name", "type", "options", "description"], watcher)
                .unwrap();
        }
        for view in table.views().unwrap() {
            view.watch(&["name", "type"], watcher).unwrap();
        }
        table
            .record_store()
            .watch(&["records", "recordIds", "cellValues"], watcher)
            .unwrap();
    }
    base.cursor()
        .watch(&["activeTableId", "activeViewId"], watcher)
        .unwrap();
}

#[test]
fn reapplying_current_state_is_silent() {
    let base = base();
    let (watcher, log) = recorder();
    watch_everything(&base, &watcher);

    let report = base.apply_changes(&[
        Change::set(["name"], "Roadmap"),
        Change::set(["tablesById", "tblA", "fieldsById", "fld2", "typeOptions"], json!({"precision": 0})),
        Change::set(["tableOrder"], json!(["tblA", "tblB"])),
        Change::remove(["tablesById", "tblA", "nonexistent"]),
    ]);

    assert_eq!(report.changes, 4);
    assert_eq!(report.dirty_paths, 0);
    assert_eq!(report.notifications, 0);
    assert!(log.lock().unwrap().is_empty());
}

#[test]
fn table_rename_notifies_only_that_table_and_schema() {
    let base = base();
    let (watcher, log) = recorder();
    watch_everything(&base, &watcher);

    let report = base.apply_changes(&[Change::set(["tablesById", "tblA", "name"], "Epics")]);

    assert_eq!(fired(&log), vec!["[Table tblA] name", "[Base app1] schema"]);
    assert_eq!(report.dirty_paths, 1);
    assert_eq!(report.notifications, 2);
    assert_eq!(base.table_by_id("tblA").unwrap().name().unwrap(), "Epics");
}

#[test]
fn field_rename_notifies_the_field_once() {
    let base = base();
    let field = base
        .table_by_id("tblA")
        .unwrap()
        .field_by_id("fld1")
        .unwrap()
        .unwrap();
    let (watcher, log) = recorder();
    field.watch(&["name"], &watcher).unwrap();
    let (other, other_log) = recorder();
    field.watch(&["type", "options"], &other).unwrap();

    base.apply_changes(&[Change::set(
        ["tablesById", "tblA", "fieldsById", "fld1", "name"],
        "Renamed",
    )]);

    let entries = log.lock().unwrap().clone();
    assert_eq!(
        entries,
        vec![("[Field fld1]".to_string(), "name".to_string(), NotifyArgs::None)]
    );
    assert!(other_log.lock().unwrap().is_empty());
    assert_eq!(field.name().unwrap(), "Renamed");
}

#[test]
fn description_changes_are_not_schema_changes() {
    let base = base();
    let (watcher, log) = recorder();
    watch_everything(&base, &watcher);

    base.apply_changes(&[
        Change::set(["tablesById", "tblA", "description"], "What we are building"),
        Change::set(["tablesById", "tblA", "fieldsById", "fld2", "description"], "Days"),
    ]);

    assert_eq!(
        fired(&log),
        vec!["[Table tblA] description", "[Field fld2] description"]
    );
}

#[test]
fn notification_order_is_base_then_tables_then_cursor_then_schema() {
    let base = base();
    let (watcher, log) = recorder();
    watch_everything(&base, &watcher);

    base.apply_changes(&[
        Change::set(["cursorData", "activeViewId"], "viw2"),
        Change::set(["tablesById", "tblA", "viewsById", "viw2"], json!({"id": "viw2", "name": "Board", "type": "kanban"})),
        Change::set(["tablesById", "tblA", "viewOrder"], json!(["viw1", "viw2"])),
        Change::set(["tablesById", "tblB", "name"], "Versions"),
        Change::set(["color"], "teal"),
        Change::set(["collaboratorsById", "usr2"], json!({"id": "usr2", "name": "Linus"})),
    ]);

    assert_eq!(
        fired(&log),
        vec![
            "[Base app1] color",
            "[Base app1] collaborators",
            "[Table tblA] views",
            "[Table tblB] name",
            "[Cursor cursor] activeViewId",
            "[Base app1] schema",
        ]
    );
    assert_eq!(base.collaborators().len(), 2);
}

#[test]
fn net_effect_hides_intermediate_states() {
    let base = base();
    let (watcher, log) = recorder();
    watch_everything(&base, &watcher);

    let report = base.apply_changes(&[
        Change::set(["name"], "Scratch"),
        Change::set(["name"], "Roadmap"),
        Change::set(["tablesById", "tblC"], json!({"id": "tblC", "name": "Temp"})),
        Change::remove(["tablesById", "tblC"]),
    ]);

    assert_eq!(report.dirty_paths, 0);
    assert!(log.lock().unwrap().is_empty());
}

#[test]
fn new_table_fires_tables_and_becomes_reachable() {
    let base = base();
    let (watcher, log) = recorder();
    base.watch(&["tables", "schema"], &watcher).unwrap();

    base.apply_changes(&[
        Change::set(
            ["tablesById", "tblC"],
            json!({"id": "tblC", "name": "Bugs", "primaryFieldId": "fld9",
                   "fieldsById": {"fld9": {"id": "fld9", "name": "Title", "type": "singleLineText"}}}),
        ),
        Change::set(["tableOrder"], json!(["tblA", "tblB", "tblC"])),
    ]);

    assert_eq!(fired(&log), vec!["[Base app1] tables", "[Base app1] schema"]);
    let table = base.table_by_name("Bugs").unwrap();
    assert_eq!(table.primary_field().unwrap().name().unwrap(), "Title");
}

#[test]
fn deleted_entities_keep_their_id_and_reject_access() {
    let base = base();
    let table = base.table_by_id("tblB").unwrap();
    let field = table.field_by_id("fld3").unwrap().unwrap();

    base.apply_changes(&[
        Change::remove(["tablesById", "tblB"]),
        Change::set(["tableOrder"], json!(["tblA"])),
    ]);

    assert!(table.is_deleted());
    assert!(field.is_deleted());
    assert_eq!(table.id(), "tblB");
    assert_eq!(field.to_string(), "[Field fld3]");
    assert_eq!(
        table.name(),
        Err(CoreError::DeletedEntity {
            entity: "[Table tblB]".into()
        })
    );
    assert!(matches!(field.field_type(), Err(CoreError::DeletedEntity { .. })));
    assert!(base.table_by_id("tblB").is_none());
    assert_eq!(base.tables().len(), 1);
}

#[test]
fn recreated_entity_gets_a_fresh_handle() {
    let base = base();
    let old = base.table_by_id("tblB").unwrap();
    let (watcher, log) = recorder();
    old.watch(&["name"], &watcher).unwrap();

    base.apply_changes(&[Change::remove(["tablesById", "tblB"])]);
    base.apply_changes(&[Change::set(["tablesById", "tblB"], json!({"id": "tblB", "name": "Again"}))]);
    base.apply_changes(&[Change::set(["tablesById", "tblB", "name"], "Later")]);

    // The old handle saw the deletion, then was dropped from the memo.
    assert_eq!(fired(&log), vec!["[Table tblB] name"]);
    let new = base.table_by_id("tblB").unwrap();
    assert_eq!(old, new);
    assert_eq!(new.watcher_count(&tabula_core::TableKey::Name.into()), 0);
    assert_eq!(new.name().unwrap(), "Later");
}

#[tokio::test]
async fn record_changes_aggregate_cell_values() {
    let host = Arc::new(MockHost::new());
    host.set_response(
        ResourceDescriptor::TableData {
            table_id: "tblA".into(),
        },
        FetchResult::new(records(), Vec::<String>::new()),
    );
    let base = base_with(Arc::clone(&host));
    let store = base.table_by_id("tblA").unwrap().record_store();
    store.load_data().await.unwrap();

    let (store_watcher, store_log) = recorder();
    store
        .watch(
            &[
                "records",
                "recordIds",
                "cellValues",
                "cellValuesInField:fld1",
                "cellValuesInField:fld2",
            ],
            &store_watcher,
        )
        .unwrap();
    let rec1 = store.record_by_id("rec1").unwrap().unwrap();
    let (record_watcher, record_log) = recorder();
    rec1.watch(
        &[
            "cellValues",
            "cellValueInField:fld1",
            "cellValueInField:fld2",
            "primaryCellValue",
            "commentCount",
        ],
        &record_watcher,
    )
    .unwrap();

    base.apply_changes(&[
        Change::set(
            ["tablesById", "tblA", "recordsById", "rec1", "cellValuesByFieldId", "fld2"],
            5,
        ),
        Change::set(["tablesById", "tblA", "recordsById", "rec2", "commentCount"], 3),
        Change::set(
            ["tablesById", "tblA", "recordsById", "rec3"],
            json!({"id": "rec3", "commentCount": 0, "cellValuesByFieldId": {"fld1": "Import"}}),
        ),
    ]);

    assert_eq!(
        *record_log.lock().unwrap(),
        vec![
            ("[Record rec1]".to_string(), "cellValues".to_string(), NotifyArgs::None),
            ("[Record rec1]".to_string(), "cellValueInField:fld2".to_string(), NotifyArgs::None),
        ]
    );

    let membership = NotifyArgs::RecordIds {
        added: vec!["rec3".into()],
        removed: vec![],
    };
    let store_entries: Vec<(String, NotifyArgs)> = store_log
        .lock()
        .unwrap()
        .iter()
        .map(|(_, key, args)| (key.clone(), args.clone()))
        .collect();
    assert_eq!(
        store_entries,
        vec![
            ("records".to_string(), membership.clone()),
            ("recordIds".to_string(), membership),
            (
                "cellValues".to_string(),
                NotifyArgs::CellValues {
                    record_ids: vec!["rec1".into(), "rec3".into()],
                    field_ids: vec!["fld1".into(), "fld2".into()],
                }
            ),
            (
                "cellValuesInField:fld1".to_string(),
                NotifyArgs::CellValuesInField {
                    record_ids: vec!["rec3".into()]
                }
            ),
            (
                "cellValuesInField:fld2".to_string(),
                NotifyArgs::CellValuesInField {
                    record_ids: vec!["rec1".into()]
                }
            ),
        ]
    );
    assert_eq!(rec1.cell_value("fld2").unwrap(), Some(json!(5)));
    assert_eq!(store.record_ids().unwrap(), vec!["rec1", "rec2", "rec3"]);
}

#[tokio::test]
async fn primary_cell_and_record_removal() {
    let host = Arc::new(MockHost::new());
    host.set_response(
        ResourceDescriptor::TableData {
            table_id: "tblA".into(),
        },
        FetchResult::new(records(), Vec::<String>::new()),
    );
    let base = base_with(host);
    let store = base.table_by_id("tblA").unwrap().record_store();
    store.load_data().await.unwrap();

    let rec1 = store.record_by_id("rec1").unwrap().unwrap();
    let rec2 = store.record_by_id("rec2").unwrap().unwrap();
    assert_eq!(rec1.primary_cell_value().unwrap(), Some(json!("Search")));
    assert_eq!(rec2.comment_count().unwrap(), 2);
    assert_eq!(
        rec1.created_time().unwrap().as_deref(),
        Some("2024-01-02T03:04:05.000Z")
    );
    assert_eq!(rec2.cell_value("fld2").unwrap(), None);
    assert_eq!(
        rec1.cell_value("fldX"),
        Err(CoreError::FieldNotFound {
            table_id: "tblA".into(),
            field_id: "fldX".into()
        })
    );

    let (watcher, log) = recorder();
    rec1.watch(&["primaryCellValue"], &watcher).unwrap();
    store.watch(&["recordIds"], &watcher).unwrap();

    base.apply_changes(&[
        Change::set(
            ["tablesById", "tblA", "recordsById", "rec1", "cellValuesByFieldId", "fld1"],
            "Full-text search",
        ),
        Change::remove(["tablesById", "tblA", "recordsById", "rec2"]),
    ]);

    let entries = log.lock().unwrap().clone();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].1, "primaryCellValue");
    assert_eq!(
        entries[1].2,
        NotifyArgs::RecordIds {
            added: vec![],
            removed: vec!["rec2".into()]
        }
    );
    assert!(rec2.is_deleted());
    assert!(matches!(rec2.comment_count(), Err(CoreError::DeletedEntity { .. })));
    assert_eq!(store.records().unwrap().len(), 1);
}

#[test]
fn unloaded_store_rejects_record_access() {
    let base = base();
    let store = base.table_by_id("tblA").unwrap().record_store();
    assert!(!store.is_data_loaded());
    assert_eq!(
        store.record_ids(),
        Err(CoreError::DataNotLoaded {
            entity: "[RecordStore tblA]".into()
        })
    );
    assert!(store.record_by_id("rec1").is_err());
}

#[test]
fn invalid_single_key_fails_but_lists_are_filtered() {
    let base = base();
    let table = base.table_by_id("tblA").unwrap();
    let (watcher, _) = recorder();

    assert!(matches!(
        table.watch(&["schema"], &watcher),
        Err(CoreError::InvalidWatchKey { .. })
    ));
    assert_eq!(table.watch(&["schema", "name"], &watcher).unwrap().len(), 1);
    assert!(table.watch::<&str>(&[], &watcher).unwrap().is_empty());
    assert!(matches!(
        table.unwatch(&["schema"], &watcher),
        Err(CoreError::InvalidWatchKey { .. })
    ));
}

#[test]
fn change_count_tracks_notifications() {
    let base = base();
    let table = base.table_by_id("tblA").unwrap();
    assert_eq!(table.change_count(), 0);

    base.apply_changes(&[Change::set(["tablesById", "tblA", "name"], "One")]);
    base.apply_changes(&[Change::set(["tablesById", "tblA", "name"], "Two")]);
    assert_eq!(table.change_count(), 2);
}
