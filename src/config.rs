//! Manager configuration.

use std::time::Duration;

use crate::scan::recovery::DEFAULT_POLL_INTERVAL;

/// Default capacity of the scan event broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 100;

/// Options for building a [`BleManager`](crate::BleManager).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ManagerConfig {
    /// Use the legacy controller even if the radio supports native filtering.
    pub force_legacy: bool,
    /// Delay between adapter state polls while recovering from a scan failure.
    pub recovery_poll_interval: Duration,
    /// Capacity of the scan event broadcast channel.
    pub event_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            force_legacy: false,
            recovery_poll_interval: DEFAULT_POLL_INTERVAL,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl ManagerConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Force the legacy controller.
    pub fn force_legacy(mut self, force: bool) -> Self {
        self.force_legacy = force;
        self
    }

    /// Set the recovery poll interval.
    pub fn recovery_poll_interval(mut self, interval: Duration) -> Self {
        self.recovery_poll_interval = interval;
        self
    }

    /// Set the event channel capacity. Zero is raised to one.
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}
