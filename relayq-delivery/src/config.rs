use std::time::Duration;

use serde::Deserialize;

/// How often and how much the run loop delivers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeliveryConfig {
    /// Maximum messages claimed per run. Unbounded when `None`.
    #[serde(default)]
    pub batch_size: Option<usize>,

    /// Target interval between the starts of two runs.
    ///
    /// Default: 60 seconds
    #[serde(default = "default_poll_delay")]
    pub poll_delay_secs: u64,

    /// Pending messages older than this are expired. `0` disables expiry.
    ///
    /// Default: 7 days
    #[serde(default = "default_max_age")]
    pub max_age_secs: u64,

    /// Stop after one run instead of looping.
    #[serde(default)]
    pub once: bool,
}

const fn default_poll_delay() -> u64 {
    60
}

const fn default_max_age() -> u64 {
    7 * 24 * 60 * 60
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            batch_size: None,
            poll_delay_secs: default_poll_delay(),
            max_age_secs: default_max_age(),
            once: false,
        }
    }
}

impl DeliveryConfig {
    #[must_use]
    pub const fn poll_delay(&self) -> Duration {
        Duration::from_secs(self.poll_delay_secs)
    }

    #[must_use]
    pub const fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}
