//! The abstract model node and the context shared by a base's models.

use crate::config::Config;
use crate::document::{apply_changes, Change, DirtyNode, Document};
use crate::error::{CoreError, CoreResult};
use crate::host::HostBridge;
use crate::model::ModelRef;
use crate::warnings::WarningLog;
use crate::watch::{EntityKind, NotifyArgs, WatchKey, WatchRegistry, Watcher};
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard, RwLock};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// State shared by every model of one base.
pub(crate) struct ModelContext {
    document: RwLock<Document>,
    host: Arc<dyn HostBridge>,
    config: Config,
    warnings: Arc<WarningLog>,
    /// Serialises batch application, load completion and eviction.
    batch_lock: ReentrantMutex<()>,
    /// Set while a batch's notifications are being delivered.
    dispatching: AtomicBool,
    /// Batches applied by callbacks during delivery, in arrival order.
    deferred: Mutex<VecDeque<Vec<Change>>>,
    notifications: AtomicU64,
}

impl ModelContext {
    pub(crate) fn new(
        document: Document,
        host: Arc<dyn HostBridge>,
        config: Config,
        warnings: Arc<WarningLog>,
    ) -> Self {
        Self {
            document: RwLock::new(document),
            host,
            config,
            warnings,
            batch_lock: ReentrantMutex::new(()),
            dispatching: AtomicBool::new(false),
            deferred: Mutex::new(VecDeque::new()),
            notifications: AtomicU64::new(0),
        }
    }

    pub(crate) fn host(&self) -> &Arc<dyn HostBridge> {
        &self.host
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn warnings(&self) -> &WarningLog {
        &self.warnings
    }

    /// Runs `f` against the current document.
    pub(crate) fn read<R>(&self, f: impl FnOnce(&Document) -> R) -> R {
        f(&self.document.read())
    }

    pub(crate) fn snapshot(&self) -> Document {
        self.document.read().clone()
    }

    pub(crate) fn batch(&self) -> ReentrantMutexGuard<'_, ()> {
        self.batch_lock.lock()
    }

    /// Applies `changes` and returns the dirty tree. The caller holds the batch lock.
    pub(crate) fn apply(&self, changes: &[Change]) -> DirtyNode {
        let mut document = self.document.write();
        apply_changes(&mut document, changes)
    }

    /// Applies `changes` without propagating them to watchers.
    pub(crate) fn apply_silently(&self, changes: &[Change]) {
        let _batch = self.batch();
        let dirty = self.apply(changes);
        tracing::debug!(
            changes = changes.len(),
            dirty_paths = dirty.changed_count(),
            "applied unpropagated changes"
        );
    }

    pub(crate) fn notification_count(&self) -> u64 {
        self.notifications.load(Ordering::SeqCst)
    }

    /// Whether a batch is delivering notifications. The caller holds the batch lock.
    pub(crate) fn is_dispatching(&self) -> bool {
        self.dispatching.load(Ordering::SeqCst)
    }

    /// Runs `f` with the dispatching flag set.
    pub(crate) fn dispatch<R>(&self, f: impl FnOnce() -> R) -> R {
        let _dispatching = DispatchGuard::enter(&self.dispatching);
        f()
    }

    /// Queues a batch until the one being delivered completes.
    pub(crate) fn defer(&self, changes: &[Change]) {
        self.deferred.lock().push_back(changes.to_vec());
    }

    pub(crate) fn next_deferred(&self) -> Option<Vec<Change>> {
        self.deferred.lock().pop_front()
    }
}

/// Clears the dispatching flag on drop, including when a callback panics.
struct DispatchGuard<'a> {
    flag: &'a AtomicBool,
    previous: bool,
}

impl<'a> DispatchGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        let previous = flag.swap(true, Ordering::SeqCst);
        Self { flag, previous }
    }
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(self.previous, Ordering::SeqCst);
    }
}

/// Identity, document binding and subscriptions of one entity.
pub(crate) struct ModelNode {
    id: String,
    kind: EntityKind,
    path: Vec<String>,
    ctx: Arc<ModelContext>,
    watches: WatchRegistry,
}

impl ModelNode {
    /// Creates a node bound to `path`.
    ///
    /// # Panics
    ///
    /// Panics if `id` is empty.
    pub(crate) fn new(
        ctx: Arc<ModelContext>,
        kind: EntityKind,
        id: impl Into<String>,
        path: Vec<String>,
    ) -> Self {
        let id = id.into();
        assert!(!id.is_empty(), "{} id must be a non-empty string", kind);
        Self {
            id,
            kind,
            path,
            ctx,
            watches: WatchRegistry::new(kind),
        }
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn kind(&self) -> EntityKind {
        self.kind
    }

    pub(crate) fn path(&self) -> &[String] {
        &self.path
    }

    pub(crate) fn ctx(&self) -> &Arc<ModelContext> {
        &self.ctx
    }

    /// Debug representation, safe to call after deletion.
    pub(crate) fn describe(&self) -> String {
        format!("[{} {}]", self.kind, self.id)
    }

    /// Returns path segments below this node.
    pub(crate) fn child_path<I, S>(&self, segments: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut path = self.path.clone();
        path.extend(segments.into_iter().map(Into::into));
        path
    }

    pub(crate) fn is_deleted(&self) -> bool {
        !self.ctx.read(|doc| doc.contains(&self.path))
    }

    /// Runs `f` against the backing subtree, failing if it is gone.
    pub(crate) fn with_data<R>(&self, f: impl FnOnce(&Value) -> R) -> CoreResult<R> {
        self.ctx.read(|doc| match doc.get(&self.path) {
            Some(data) => Ok(f(data)),
            None => Err(CoreError::deleted(self.describe())),
        })
    }

    /// Returns a string member of the backing subtree.
    pub(crate) fn string(&self, key: &str) -> CoreResult<Option<String>> {
        self.with_data(|data| data.get(key).and_then(Value::as_str).map(str::to_owned))
    }

    /// Returns a copy of a member of the backing subtree.
    pub(crate) fn value(&self, key: &str) -> CoreResult<Option<Value>> {
        self.with_data(|data| data.get(key).cloned())
    }

    pub(crate) fn watch<K: AsRef<str>>(
        &self,
        keys: &[K],
        watcher: &Watcher,
    ) -> CoreResult<Vec<WatchKey>> {
        let valid = self.watches.watch(keys, watcher);
        match keys {
            [single] if valid.is_empty() => {
                Err(CoreError::invalid_watch_key(self.kind, single.as_ref()))
            }
            _ => Ok(valid),
        }
    }

    pub(crate) fn unwatch<K: AsRef<str>>(
        &self,
        keys: &[K],
        watcher: &Watcher,
    ) -> CoreResult<Vec<WatchKey>> {
        let valid = self.watches.unwatch(keys, watcher, self.ctx.warnings());
        match keys {
            [single] if valid.is_empty() => {
                Err(CoreError::invalid_watch_key(self.kind, single.as_ref()))
            }
            _ => Ok(valid),
        }
    }

    pub(crate) fn notify(&self, model: &ModelRef, key: impl Into<WatchKey>, args: NotifyArgs) {
        let key = key.into();
        tracing::trace!(entity = %self.describe(), key = %key, "notify");
        let fired = self.watches.notify(model, &key, &args);
        self.ctx
            .notifications
            .fetch_add(fired as u64, Ordering::SeqCst);
    }

    pub(crate) fn change_count(&self) -> u64 {
        self.watches.change_count()
    }

    pub(crate) fn watcher_count(&self, key: &WatchKey) -> usize {
        self.watches.watcher_count(key)
    }
}
