//! Appointment scheduling and live queue engine.
//!
//! The [`SchedulingEngine`] facade takes booking requests, assigns staff,
//! reserves time windows race-free, projects per-staff live queues and
//! fans events out over scoped broadcast channels. Persistence sits behind
//! the [`Ledger`] trait and push delivery behind [`Notifier`], so the core
//! stays storage- and transport-agnostic.

pub mod balancer;
pub mod broadcast;
pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod notifier;
pub mod projector;
pub mod reminders;
pub mod reservation;

pub use broadcast::{BroadcastHub, ChannelKey, QueueEvent};
pub use config::EngineConfig;
pub use engine::SchedulingEngine;
pub use error::{EngineError, EngineResult};
pub use ledger::{InsertOutcome, Ledger, LedgerError, LedgerResult, MemoryLedger, UpdateOutcome};
pub use notifier::{LogNotifier, Notifier};
pub use reminders::{ReminderConfig, ReminderHandle, ReminderScheduler};
pub use reservation::SlotAuthority;
