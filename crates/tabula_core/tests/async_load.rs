//! Integration tests for retain-counted loading, coalescing and eviction.

use futures::future::BoxFuture;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tabula_core::{
    Base, Change, Config, CoreError, CoreResult, FetchResult, HostBridge, MockHost, RecordStore,
    ResourceDescriptor, Watcher,
};

fn table_data() -> ResourceDescriptor {
    ResourceDescriptor::TableData {
        table_id: "tbl1".into(),
    }
}

fn host_with_records() -> Arc<MockHost> {
    let host = Arc::new(MockHost::new());
    host.set_response(
        table_data(),
        FetchResult::new(
            json!({"rec1": {"id": "rec1", "cellValuesByFieldId": {"fld1": "Alpha"}}}),
            Vec::<String>::new(),
        ),
    );
    host.set_response(
        ResourceDescriptor::CursorData,
        FetchResult::new(
            json!({"selectedRecordIdSet": {"rec1": true}, "selectedFieldIdSet": {"fld1": true}}),
            ["selectedRecordIds"],
        ),
    );
    host
}

fn base(host: Arc<MockHost>) -> Base {
    base_on(host)
}

fn base_on(host: Arc<dyn HostBridge>) -> Base {
    Base::builder(
        json!({
            "id": "app1",
            "tablesById": {
                "tbl1": {"id": "tbl1", "name": "Tasks", "primaryFieldId": "fld1",
                         "fieldsById": {"fld1": {"id": "fld1", "name": "Name", "type": "text"}}}
            },
            "cursorData": {"activeTableId": "tbl1"}
        }),
        host,
    )
    .config(Config::new().unload_grace_period(Duration::from_millis(1000)))
    .build()
    .unwrap()
}

fn store(base: &Base) -> RecordStore {
    base.table_by_id("tbl1").unwrap().record_store()
}

fn key_log(watcher_keys: &[&str], store: &RecordStore) -> Arc<Mutex<Vec<String>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    store
        .watch(
            watcher_keys,
            &Watcher::new(move |n| sink.lock().unwrap().push(n.key.to_string())),
        )
        .unwrap();
    log
}

async fn wait_for_retains(store: &RecordStore, count: usize) {
    while store.retain_count() < count {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn concurrent_loads_share_one_fetch() {
    let host = host_with_records();
    let base = base(Arc::clone(&host));
    let store = store(&base);
    let loaded = key_log(&["isDataLoaded"], &store);

    host.hold();
    let loads: Vec<_> = (0..5)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.load_data().await })
        })
        .collect();
    wait_for_retains(&store, 5).await;

    assert_eq!(host.fetch_count(&table_data()), 1);
    assert!(!store.is_data_loaded());

    host.release();
    for load in loads {
        load.await.unwrap().unwrap();
    }

    assert!(store.is_data_loaded());
    assert_eq!(store.retain_count(), 5);
    assert_eq!(host.fetch_count(&table_data()), 1);
    assert_eq!(*loaded.lock().unwrap(), vec!["isDataLoaded"]);
    assert_eq!(store.record_ids().unwrap(), vec!["rec1"]);
}

#[tokio::test]
async fn loaded_resource_does_not_refetch() {
    let host = host_with_records();
    let base = base(Arc::clone(&host));
    let store = store(&base);

    store.load_data().await.unwrap();
    store.load_data().await.unwrap();

    assert_eq!(store.retain_count(), 2);
    assert_eq!(host.fetch_count(&table_data()), 1);
}

#[tokio::test]
async fn loading_is_silent_apart_from_hints() {
    let host = host_with_records();
    let base = base(Arc::clone(&host));
    let store = store(&base);
    let log = key_log(&["records", "recordIds", "cellValues", "isDataLoaded"], &store);

    store.load_data().await.unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["isDataLoaded"]);
}

#[tokio::test]
async fn cursor_hint_fires_before_is_data_loaded() {
    let host = host_with_records();
    let base = base(Arc::clone(&host));
    let cursor = base.cursor();
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    cursor
        .watch(
            &["selectedRecordIds", "selectedFieldIds", "isDataLoaded"],
            &Watcher::new(move |n| sink.lock().unwrap().push(n.key.to_string())),
        )
        .unwrap();

    assert!(matches!(
        cursor.selected_record_ids(),
        Err(CoreError::DataNotLoaded { .. })
    ));
    cursor.load_data().await.unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["selectedRecordIds", "isDataLoaded"]);
    assert_eq!(cursor.selected_record_ids().unwrap(), vec!["rec1"]);
    assert_eq!(cursor.selected_field_ids().unwrap(), vec!["fld1"]);
    assert!(cursor.is_record_selected("rec1").unwrap());
    assert_eq!(cursor.active_table_id().unwrap().as_deref(), Some("tbl1"));
}

#[tokio::test]
async fn invalid_hints_are_skipped_with_a_warning() {
    let host = host_with_records();
    host.set_response(
        ResourceDescriptor::CursorData,
        FetchResult::new(json!({}), ["bogus", "activeViewId"]),
    );
    let base = base(Arc::clone(&host));
    let cursor = base.cursor();
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    cursor
        .watch(
            &["activeViewId", "isDataLoaded"],
            &Watcher::new(move |n| sink.lock().unwrap().push(n.key.to_string())),
        )
        .unwrap();

    cursor.load_data().await.unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["activeViewId", "isDataLoaded"]);
    assert!(base
        .warnings()
        .has_emitted("ignoring invalid changed key hint for Cursor: bogus"));
}

#[test]
fn over_release_warns_and_clamps() {
    let base = base(host_with_records());
    let store = store(&base);

    store.unload_data();
    store.unload_data();

    assert_eq!(store.retain_count(), 0);
    assert_eq!(base.warnings().len(), 1);
    assert_eq!(base.warnings().occurrences(OVER_RELEASED), 2);
}

const OVER_RELEASED: &str =
    "[RecordStore tbl1] was over-released: unload_data() called more often than load_data()";

#[tokio::test(start_paused = true)]
async fn over_release_warns_again_in_a_later_cycle() {
    let base = base(host_with_records());
    let store = store(&base);

    store.load_data().await.unwrap();
    store.unload_data();
    store.unload_data();
    assert_eq!(base.warnings().occurrences(OVER_RELEASED), 1);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!store.is_data_loaded());

    store.load_data().await.unwrap();
    store.unload_data();
    store.unload_data();
    assert_eq!(store.retain_count(), 0);
    assert_eq!(base.warnings().occurrences(OVER_RELEASED), 2);
}

/// A host whose fetch reads and writes the models it is loading for.
#[derive(Default)]
struct ReentrantHost {
    base: Mutex<Option<Base>>,
    observed: Mutex<Vec<(bool, usize)>>,
}

impl HostBridge for ReentrantHost {
    fn fetch(&self, _resource: &ResourceDescriptor) -> BoxFuture<'static, CoreResult<FetchResult>> {
        let base = self.base.lock().unwrap().clone();
        if let Some(base) = base {
            let store = store(&base);
            self.observed
                .lock()
                .unwrap()
                .push((store.is_data_loaded(), store.retain_count()));
            base.apply_changes(&[Change::set(["name"], "Fetching")]);
        }
        Box::pin(async {
            Ok(FetchResult::new(
                json!({"rec1": {"id": "rec1", "cellValuesByFieldId": {"fld1": "Alpha"}}}),
                Vec::<String>::new(),
            ))
        })
    }

    fn unsubscribe(&self, _resource: &ResourceDescriptor) {}
}

#[tokio::test]
async fn fetch_may_call_back_into_the_models() {
    let host = Arc::new(ReentrantHost::default());
    let base = base_on(Arc::clone(&host) as Arc<dyn HostBridge>);
    *host.base.lock().unwrap() = Some(base.clone());
    let store = store(&base);

    tokio::time::timeout(Duration::from_secs(5), store.load_data())
        .await
        .expect("load finished")
        .unwrap();

    assert!(store.is_data_loaded());
    assert_eq!(*host.observed.lock().unwrap(), vec![(false, 1)]);
    assert_eq!(base.name(), "Fetching");
    assert_eq!(store.record_ids().unwrap(), vec!["rec1"]);
    *host.base.lock().unwrap() = None;
}

#[tokio::test(start_paused = true)]
async fn eviction_waits_for_the_grace_period() {
    let host = host_with_records();
    let base = base(Arc::clone(&host));
    let store = store(&base);
    let loaded = key_log(&["isDataLoaded"], &store);

    store.load_data().await.unwrap();
    let record = store.record_by_id("rec1").unwrap().unwrap();
    store.unload_data();
    assert!(store.is_unload_pending());

    tokio::time::sleep(Duration::from_millis(999)).await;
    assert!(store.is_data_loaded());
    assert_eq!(host.unsubscribe_count(&table_data()), 0);

    tokio::time::sleep(Duration::from_millis(2)).await;
    assert!(!store.is_data_loaded());
    assert!(!store.is_unload_pending());
    assert_eq!(host.unsubscribe_count(&table_data()), 1);
    assert!(record.is_deleted());
    assert!(!base
        .document()
        .contains(&["tablesById", "tbl1", "recordsById"]));
    assert_eq!(*loaded.lock().unwrap(), vec!["isDataLoaded", "isDataLoaded"]);
    assert!(matches!(
        store.records(),
        Err(CoreError::DataNotLoaded { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn reacquire_within_grace_period_cancels_eviction() {
    let host = host_with_records();
    let base = base(Arc::clone(&host));
    let store = store(&base);

    store.load_data().await.unwrap();
    store.unload_data();
    tokio::time::sleep(Duration::from_millis(500)).await;
    store.load_data().await.unwrap();
    assert!(!store.is_unload_pending());

    tokio::time::sleep(Duration::from_millis(5000)).await;
    assert!(store.is_data_loaded());
    assert_eq!(store.retain_count(), 1);
    assert_eq!(host.fetch_count(&table_data()), 1);
    assert_eq!(host.unsubscribe_count(&table_data()), 0);
}

#[tokio::test(start_paused = true)]
async fn reload_after_eviction_fetches_again() {
    let host = host_with_records();
    let base = base(Arc::clone(&host));
    let store = store(&base);

    store.load_data().await.unwrap();
    store.unload_data();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!store.is_data_loaded());

    store.load_data().await.unwrap();
    assert!(store.is_data_loaded());
    assert_eq!(host.fetch_count(&table_data()), 2);
}

#[tokio::test(start_paused = true)]
async fn release_during_load_evicts_after_completion() {
    let host = host_with_records();
    let base = base(Arc::clone(&host));
    let store = store(&base);

    host.hold();
    let load = {
        let store = store.clone();
        tokio::spawn(async move { store.load_data().await })
    };
    wait_for_retains(&store, 1).await;
    store.unload_data();
    assert_eq!(store.retain_count(), 0);
    assert!(!store.is_unload_pending());

    host.release();
    load.await.unwrap().unwrap();
    assert!(store.is_data_loaded());
    assert!(store.is_unload_pending());

    tokio::time::sleep(Duration::from_millis(1001)).await;
    assert!(!store.is_data_loaded());
}

#[tokio::test]
async fn fetch_error_reaches_every_waiter() {
    let host = Arc::new(MockHost::new());
    host.set_error(table_data(), "host offline");
    let base = base(Arc::clone(&host));
    let store = store(&base);

    host.hold();
    let loads: Vec<_> = (0..3)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.load_data().await })
        })
        .collect();
    wait_for_retains(&store, 3).await;
    host.release();

    for load in loads {
        assert_eq!(
            load.await.unwrap(),
            Err(CoreError::Fetch {
                message: "host offline".into()
            })
        );
    }
    assert!(!store.is_data_loaded());
    assert_eq!(store.retain_count(), 0);
    assert_eq!(host.fetch_count(&table_data()), 1);

    host.set_response(
        table_data(),
        FetchResult::new(json!({}), Vec::<String>::new()),
    );
    store.load_data().await.unwrap();
    assert!(store.is_data_loaded());
    assert_eq!(host.fetch_count(&table_data()), 2);
}

#[tokio::test]
async fn empty_record_ids_are_skipped() {
    let host = Arc::new(MockHost::new());
    host.set_response(
        table_data(),
        FetchResult::new(
            json!({
                "": {"cellValuesByFieldId": {"fld1": "Orphan"}},
                "rec1": {"id": "rec1", "cellValuesByFieldId": {"fld1": "Alpha"}}
            }),
            Vec::<String>::new(),
        ),
    );
    let base = base(host);
    let store = store(&base);
    store.load_data().await.unwrap();

    assert_eq!(store.record_ids().unwrap(), vec!["rec1"]);
    let records: Vec<_> = store.records().unwrap().iter().map(|r| r.id().to_owned()).collect();
    assert_eq!(records, vec!["rec1"]);
    assert!(store.record_by_id("").unwrap().is_none());
}
