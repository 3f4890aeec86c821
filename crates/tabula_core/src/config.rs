//! Model layer configuration.

use std::time::Duration;

/// Default delay between the last `unload_data()` and eviction.
pub const DEFAULT_UNLOAD_GRACE_PERIOD: Duration = Duration::from_millis(1000);

/// Configuration shared by every model of a [`Base`](crate::Base).
#[derive(Debug, Clone)]
pub struct Config {
    /// How long loaded data is kept after its retain count drops to zero.
    ///
    /// A re-acquire inside this window cancels the eviction.
    pub unload_grace_period: Duration,

    /// Whether repeated identical warnings are only emitted once.
    pub dedupe_warnings: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            unload_grace_period: DEFAULT_UNLOAD_GRACE_PERIOD,
            dedupe_warnings: true,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the grace period before unloading data.
    #[must_use]
    pub const fn unload_grace_period(mut self, period: Duration) -> Self {
        self.unload_grace_period = period;
        self
    }

    /// Sets whether identical warnings are de-duplicated.
    #[must_use]
    pub const fn dedupe_warnings(mut self, value: bool) -> Self {
        self.dedupe_warnings = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.unload_grace_period, Duration::from_millis(1000));
        assert!(config.dedupe_warnings);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .unload_grace_period(Duration::from_millis(250))
            .dedupe_warnings(false);

        assert_eq!(config.unload_grace_period, Duration::from_millis(250));
        assert!(!config.dedupe_warnings);
    }
}
