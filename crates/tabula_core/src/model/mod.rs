//! Typed model handles over the shared document.
//!
//! Every handle is a cheap `Arc` clone. Child handles are created on first
//! access and memoized by id in their parent, so repeated lookups return the
//! same handle and its registered watchers.

mod base;
mod cursor;
mod field;
mod loader;
mod node;
mod record;
mod record_store;
mod table;
mod view;

pub use base::{Base, BaseBuilder, BatchReport, Collaborator};
pub use cursor::Cursor;
pub use field::Field;
pub use record::Record;
pub use record_store::RecordStore;
pub use table::Table;
pub use view::View;

use crate::watch::EntityKind;
use std::fmt;

/// Implements the surface every model handle shares: identity, deletion
/// state, subscriptions, `Display` and equality.
macro_rules! model_handle {
    ($handle:ident) => {
        impl $handle {
            pub(crate) fn node(&self) -> &$crate::model::node::ModelNode {
                &self.inner.node
            }

            /// The entity id. Always available, even after deletion.
            pub fn id(&self) -> &str {
                self.inner.node.id()
            }

            /// Returns true once the backing data has left the document.
            pub fn is_deleted(&self) -> bool {
                self.inner.node.is_deleted()
            }

            /// Number of notifications delivered so far, usable as a version stamp.
            pub fn change_count(&self) -> u64 {
                self.inner.node.change_count()
            }

            /// Registers `watcher` for `keys` and returns the keys that were valid.
            ///
            /// Invalid keys are dropped, except that a call with a single
            /// invalid key fails with
            /// [`InvalidWatchKey`](crate::CoreError::InvalidWatchKey).
            pub fn watch<K: AsRef<str>>(
                &self,
                keys: &[K],
                watcher: &$crate::watch::Watcher,
            ) -> $crate::error::CoreResult<Vec<$crate::watch::WatchKey>> {
                self.inner.node.watch(keys, watcher)
            }

            /// Removes one registration of `watcher` per key and returns the
            /// keys that were valid.
            pub fn unwatch<K: AsRef<str>>(
                &self,
                keys: &[K],
                watcher: &$crate::watch::Watcher,
            ) -> $crate::error::CoreResult<Vec<$crate::watch::WatchKey>> {
                self.inner.node.unwatch(keys, watcher)
            }

            /// Number of watchers registered for `key`.
            pub fn watcher_count(&self, key: &$crate::watch::WatchKey) -> usize {
                self.inner.node.watcher_count(key)
            }

            /// Wraps this handle in a [`ModelRef`](crate::ModelRef).
            pub fn to_model_ref(&self) -> $crate::model::ModelRef {
                $crate::model::ModelRef::$handle(self.clone())
            }
        }

        impl ::std::fmt::Display for $handle {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(&self.inner.node.describe())
            }
        }

        impl ::std::fmt::Debug for $handle {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.debug_struct(stringify!($handle))
                    .field("id", &self.id())
                    .field("path", &self.inner.node.path())
                    .finish()
            }
        }

        impl PartialEq for $handle {
            fn eq(&self, other: &Self) -> bool {
                self.inner.node.path() == other.inner.node.path()
            }
        }

        impl Eq for $handle {}

        impl ::std::hash::Hash for $handle {
            fn hash<H: ::std::hash::Hasher>(&self, state: &mut H) {
                self.inner.node.kind().hash(state);
                self.inner.node.path().hash(state);
            }
        }

        impl From<$handle> for $crate::model::ModelRef {
            fn from(handle: $handle) -> Self {
                $crate::model::ModelRef::$handle(handle)
            }
        }
    };
}

pub(crate) use model_handle;

/// Any model handle, as delivered to watch callbacks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ModelRef {
    /// A base.
    Base(Base),
    /// A table.
    Table(Table),
    /// A field.
    Field(Field),
    /// A view.
    View(View),
    /// A record store.
    RecordStore(RecordStore),
    /// A record.
    Record(Record),
    /// The cursor.
    Cursor(Cursor),
}

macro_rules! dispatch {
    ($model:expr, $handle:ident => $body:expr) => {
        match $model {
            ModelRef::Base($handle) => $body,
            ModelRef::Table($handle) => $body,
            ModelRef::Field($handle) => $body,
            ModelRef::View($handle) => $body,
            ModelRef::RecordStore($handle) => $body,
            ModelRef::Record($handle) => $body,
            ModelRef::Cursor($handle) => $body,
        }
    };
}

impl ModelRef {
    /// The entity kind.
    pub fn kind(&self) -> EntityKind {
        dispatch!(self, model => model.node().kind())
    }

    /// The entity id.
    pub fn id(&self) -> &str {
        dispatch!(self, model => model.id())
    }

    /// Returns true once the backing data has left the document.
    pub fn is_deleted(&self) -> bool {
        dispatch!(self, model => model.is_deleted())
    }

    /// Returns the table, if this is one.
    pub fn as_table(&self) -> Option<&Table> {
        match self {
            ModelRef::Table(table) => Some(table),
            _ => None,
        }
    }

    /// Returns the field, if this is one.
    pub fn as_field(&self) -> Option<&Field> {
        match self {
            ModelRef::Field(field) => Some(field),
            _ => None,
        }
    }

    /// Returns the record store, if this is one.
    pub fn as_record_store(&self) -> Option<&RecordStore> {
        match self {
            ModelRef::RecordStore(store) => Some(store),
            _ => None,
        }
    }

    /// Returns the record, if this is one.
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            ModelRef::Record(record) => Some(record),
            _ => None,
        }
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        dispatch!(self, model => fmt::Display::fmt(model, f))
    }
}
