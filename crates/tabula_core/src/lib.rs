//! # Tabula Core
//!
//! Reactive document and model layer for Tabula.
//!
//! This crate provides:
//! - A shared JSON [`Document`] updated by host-supplied change batches
//! - A change applier producing a [`DirtyNode`] tree of net changes per batch
//! - Typed model handles ([`Base`], [`Table`], [`Field`], [`View`],
//!   [`RecordStore`], [`Record`], [`Cursor`]) with per-key watch subscriptions
//! - A propagator turning dirty trees into minimal notifications, including
//!   the aggregate `schema` and cell-value events
//! - Retain-counted async loading with request coalescing and delayed eviction
//!
//! ## Architecture
//!
//! Data flows one way per batch:
//! 1. The host calls [`Base::apply_changes`] with a batch of [`Change`]s
//! 2. The applier mutates the document and builds the dirty tree
//! 3. The propagator walks live models and fires their watchers
//! 4. Watchers re-read state through model accessors
//!
//! ## Key Invariants
//!
//! - A model's id never changes; only its presence does
//! - Accessors on a deleted model fail with [`CoreError::DeletedEntity`]
//! - Re-applying the current state produces no notifications
//! - Concurrent loads of one resource issue a single fetch
//! - A retain count never drops below zero

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod document;
mod error;
mod host;
mod model;
mod warnings;
mod watch;

pub use config::{Config, DEFAULT_UNLOAD_GRACE_PERIOD};
pub use document::{apply_changes, path, value_at, Change, DirtyNode, Document};
pub use error::{CoreError, CoreResult};
pub use host::{DetachedHost, FetchResult, HostBridge, MockHost, ResourceDescriptor};
pub use model::{
    Base, BaseBuilder, BatchReport, Collaborator, Cursor, Field, ModelRef, Record, RecordStore,
    Table, View,
};
pub use warnings::WarningLog;
pub use watch::{
    BaseKey, CursorKey, EntityKind, FieldKey, Notification, NotifyArgs, RecordKey,
    RecordStoreKey, TableKey, ViewKey, WatchContext, WatchKey, Watcher,
};
