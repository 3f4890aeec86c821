//! # Tabula Testkit
//!
//! Test utilities for Tabula.
//!
//! This crate provides:
//! - Document fixtures and a builder for base-shaped documents
//! - A recording watcher that captures notifications for assertions
//! - Property-based test generators for documents and change batches
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tabula_testkit::prelude::*;
//!
//! #[test]
//! fn rename_is_observed() {
//!     let fixture = TestBase::sample();
//!     let recorder = Recorder::new();
//!     fixture.base.watch(&["schema"], recorder.watcher()).unwrap();
//!     // ... apply changes, then inspect recorder.keys()
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
