//! Watch keys and subscriptions.

mod keys;
mod registry;

pub use keys::{
    BaseKey, CursorKey, EntityKind, FieldKey, RecordKey, RecordStoreKey, TableKey, ViewKey,
    WatchKey,
};
pub use registry::{Notification, NotifyArgs, WatchContext, Watcher};

pub(crate) use registry::WatchRegistry;
