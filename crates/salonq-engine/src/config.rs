//! Engine configuration.

use std::time::Duration;

use crate::reminders::ReminderConfig;

/// Configuration for the scheduling engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Reminder sweep settings.
    pub reminders: ReminderConfig,
    /// Per-channel broadcast buffer; slow subscribers past this lag drop
    /// events and re-sync with a fresh snapshot.
    pub broadcast_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reminders: ReminderConfig::default(),
            broadcast_capacity: 64,
        }
    }
}

impl EngineConfig {
    /// Creates a config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set the reminder configuration.
    pub fn with_reminders(mut self, reminders: ReminderConfig) -> Self {
        self.reminders = reminders;
        self
    }

    /// Builder: set the reminder sweep interval.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.reminders.sweep_interval = interval;
        self
    }

    /// Builder: set the broadcast buffer capacity.
    pub fn with_broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity;
        self
    }
}
