//! De-duplicating warning sink.
//!
//! Warnings are emitted through `tracing`. A [`WarningLog`] remembers which
//! messages it has already emitted so that hot paths (an invalid key hint
//! repeated on every load, say) can use [`WarningLog::warn_once`] and not
//! flood the log. Misuse that must be reported every time goes through
//! [`WarningLog::warn`]. The log is an explicit
//! value injected through [`BaseBuilder::warning_log`](crate::BaseBuilder::warning_log)
//! rather than a global; share one `Arc<WarningLog>` between bases to get
//! process-wide de-duplication.

use parking_lot::Mutex;
use std::collections::HashMap;

/// Records emitted warnings and suppresses repeats.
#[derive(Debug)]
pub struct WarningLog {
    dedupe: bool,
    /// Occurrences per message, counting suppressed repeats.
    emitted: Mutex<HashMap<String, usize>>,
}

impl WarningLog {
    /// Creates a warning log that suppresses repeated messages.
    pub fn new() -> Self {
        Self::with_dedupe(true)
    }

    /// Creates a warning log with explicit de-duplication behavior.
    pub fn with_dedupe(dedupe: bool) -> Self {
        Self {
            dedupe,
            emitted: Mutex::new(HashMap::new()),
        }
    }

    /// Emits `message` as a warning unless it was already emitted.
    ///
    /// Returns true if the warning was emitted.
    pub fn warn_once(&self, message: impl Into<String>) -> bool {
        let message = message.into();
        let first = self.record(&message) == 1;
        if self.dedupe && !first {
            return false;
        }
        tracing::warn!("{}", message);
        true
    }

    /// Emits `message` as a warning regardless of de-duplication.
    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        self.record(&message);
        tracing::warn!("{}", message);
    }

    fn record(&self, message: &str) -> usize {
        let mut emitted = self.emitted.lock();
        let count = emitted.entry(message.to_owned()).or_insert(0);
        *count += 1;
        *count
    }

    /// Returns true if `message` has been emitted.
    pub fn has_emitted(&self, message: &str) -> bool {
        self.emitted.lock().contains_key(message)
    }

    /// Number of times `message` was raised, including suppressed repeats.
    pub fn occurrences(&self, message: &str) -> usize {
        self.emitted.lock().get(message).copied().unwrap_or(0)
    }

    /// Number of distinct messages emitted so far.
    pub fn len(&self) -> usize {
        self.emitted.lock().len()
    }

    /// Returns true if nothing has been emitted.
    pub fn is_empty(&self) -> bool {
        self.emitted.lock().is_empty()
    }
}

impl Default for WarningLog {
    fn default() -> Self {
        Self::new()
    }
}
