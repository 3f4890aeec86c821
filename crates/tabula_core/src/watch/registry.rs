//! Per-entity subscription registry.

use super::keys::{EntityKind, WatchKey};
use crate::model::ModelRef;
use crate::warnings::WarningLog;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Opaque value handed back to a watcher's callback.
///
/// Two registrations are the same registration only if both the callback and
/// the context are the same allocations.
pub type WatchContext = Arc<dyn Any + Send + Sync>;

type Callback = Arc<dyn Fn(&Notification<'_>) + Send + Sync>;

/// Extra payload delivered with a notification.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NotifyArgs {
    /// No payload.
    #[default]
    None,
    /// Record membership change, delivered with `records` and `recordIds`.
    RecordIds {
        /// Records that appeared.
        added: Vec<String>,
        /// Records that disappeared.
        removed: Vec<String>,
    },
    /// Consolidated cell value change, delivered with `cellValues`.
    CellValues {
        /// Records with at least one changed cell.
        record_ids: Vec<String>,
        /// Fields with at least one changed cell.
        field_ids: Vec<String>,
    },
    /// Cell value change scoped to one field, delivered with `cellValuesInField:<id>`.
    CellValuesInField {
        /// Records whose cell in the field changed.
        record_ids: Vec<String>,
    },
}

/// What a watcher's callback receives.
pub struct Notification<'a> {
    /// The entity that changed.
    pub model: &'a ModelRef,
    /// The key that fired.
    pub key: &'a WatchKey,
    /// Key-specific payload.
    pub args: &'a NotifyArgs,
    /// The context the watcher was registered with.
    pub context: Option<&'a WatchContext>,
}

impl Notification<'_> {
    /// Downcasts the registration context.
    pub fn context_as<T: Any>(&self) -> Option<&T> {
        self.context.and_then(|context| context.downcast_ref::<T>())
    }
}

/// A callback plus optional context, registered with `watch()`.
///
/// Cloning a watcher keeps its identity, so the clone can be passed to
/// `unwatch()`.
#[derive(Clone)]
pub struct Watcher {
    callback: Callback,
    context: Option<WatchContext>,
}

impl Watcher {
    /// Creates a watcher from a callback.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&Notification<'_>) + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(callback),
            context: None,
        }
    }

    /// Returns a watcher sharing this callback but bound to `context`.
    #[must_use]
    pub fn with_context(&self, context: WatchContext) -> Self {
        Self {
            callback: Arc::clone(&self.callback),
            context: Some(context),
        }
    }

    /// Returns the registration context.
    pub fn context(&self) -> Option<&WatchContext> {
        self.context.as_ref()
    }

    fn matches(&self, other: &Watcher) -> bool {
        let same_callback = std::ptr::eq(
            Arc::as_ptr(&self.callback) as *const (),
            Arc::as_ptr(&other.callback) as *const (),
        );
        let same_context = match (&self.context, &other.context) {
            (None, None) => true,
            (Some(a), Some(b)) => std::ptr::eq(
                Arc::as_ptr(a) as *const (),
                Arc::as_ptr(b) as *const (),
            ),
            _ => false,
        };
        same_callback && same_context
    }

    fn call(&self, model: &ModelRef, key: &WatchKey, args: &NotifyArgs) {
        (self.callback)(&Notification {
            model,
            key,
            args,
            context: self.context.as_ref(),
        });
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("callback", &Arc::as_ptr(&self.callback))
            .field("has_context", &self.context.is_some())
            .finish()
    }
}

/// Keyed watcher lists for one entity.
///
/// Watchers for a key fire in registration order. The same watcher may be
/// registered several times; each registration fires and each `unwatch`
/// removes one.
pub(crate) struct WatchRegistry {
    kind: EntityKind,
    watchers: RwLock<HashMap<WatchKey, Vec<Watcher>>>,
    change_count: AtomicU64,
}

impl WatchRegistry {
    pub(crate) fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            watchers: RwLock::new(HashMap::new()),
            change_count: AtomicU64::new(0),
        }
    }

    /// Registers `watcher` for every valid key and returns those keys.
    pub(crate) fn watch<K: AsRef<str>>(&self, keys: &[K], watcher: &Watcher) -> Vec<WatchKey> {
        let valid: Vec<WatchKey> = keys
            .iter()
            .filter_map(|key| self.kind.parse_key(key.as_ref()))
            .collect();

        let mut watchers = self.watchers.write();
        for key in &valid {
            watchers.entry(key.clone()).or_default().push(watcher.clone());
        }
        valid
    }

    /// Removes one registration of `watcher` per valid key and returns those keys.
    pub(crate) fn unwatch<K: AsRef<str>>(
        &self,
        keys: &[K],
        watcher: &Watcher,
        warnings: &WarningLog,
    ) -> Vec<WatchKey> {
        let mut valid = Vec::with_capacity(keys.len());
        let mut watchers = self.watchers.write();
        for key in keys {
            let Some(parsed) = self.kind.parse_key(key.as_ref()) else {
                warnings.warn_once(format!(
                    "invalid key to unwatch for {}: {}",
                    self.kind,
                    key.as_ref()
                ));
                continue;
            };
            if let Some(list) = watchers.get_mut(&parsed) {
                if let Some(pos) = list.iter().position(|w| w.matches(watcher)) {
                    list.remove(pos);
                }
                if list.is_empty() {
                    watchers.remove(&parsed);
                }
            }
            valid.push(parsed);
        }
        valid
    }

    /// Invokes every watcher of `key` and returns how many ran.
    ///
    /// The watcher list is snapshotted first, so callbacks may watch or
    /// unwatch freely.
    pub(crate) fn notify(&self, model: &ModelRef, key: &WatchKey, args: &NotifyArgs) -> usize {
        self.change_count.fetch_add(1, Ordering::SeqCst);
        let snapshot = self.watchers.read().get(key).cloned().unwrap_or_default();
        for watcher in &snapshot {
            watcher.call(model, key, args);
        }
        snapshot.len()
    }

    /// Monotonic count of notify calls, usable as a version stamp.
    pub(crate) fn change_count(&self) -> u64 {
        self.change_count.load(Ordering::SeqCst)
    }

    /// Number of registrations for `key`.
    pub(crate) fn watcher_count(&self, key: &WatchKey) -> usize {
        self.watchers.read().get(key).map_or(0, Vec::len)
    }
}

impl fmt::Debug for WatchRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchRegistry")
            .field("kind", &self.kind)
            .field("keys", &self.watchers.read().len())
            .field("change_count", &self.change_count())
            .finish()
    }
}
