//! Reminder scheduler.
//!
//! A periodic sweep that finds bookings starting within a lookahead band
//! and fires a one-shot reminder for each. Idempotency rests on the
//! recorded fact, not the sweep arithmetic: the reminder is claimed in the
//! ledger *before* anything is emitted, so overlapping bands, short sweep
//! periods or several engine instances can never double-remind a booking.
//! One booking's failure is logged and isolated; the sweep continues.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use salonq_core::{ActorRole, Booking};

use crate::broadcast::{BroadcastHub, ChannelKey, QueueEvent};
use crate::ledger::Ledger;
use crate::notifier::Notifier;

/// Reminder sweep configuration.
#[derive(Debug, Clone)]
pub struct ReminderConfig {
    /// Period between sweeps.
    pub sweep_interval: Duration,
    /// Lower edge of the lookahead band, relative to now.
    pub lookahead_low: chrono::Duration,
    /// Upper edge of the lookahead band, relative to now (exclusive).
    pub lookahead_high: chrono::Duration,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(60),
            lookahead_low: chrono::Duration::minutes(10),
            lookahead_high: chrono::Duration::minutes(15),
        }
    }
}

impl ReminderConfig {
    /// Builder: set the sweep interval.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Builder: set the lookahead band `[now + low, now + high)`.
    ///
    /// # Panics
    ///
    /// Panics if `low` is not before `high`.
    pub fn with_lookahead(mut self, low: chrono::Duration, high: chrono::Duration) -> Self {
        assert!(low < high, "lookahead band must be non-empty");
        self.lookahead_low = low;
        self.lookahead_high = high;
        self
    }
}

/// Commands accepted by a running scheduler.
#[derive(Debug, Clone)]
pub enum ReminderCommand {
    /// Run a sweep immediately.
    SweepNow,
    /// Stop the scheduler loop.
    Stop,
}

/// Handle for controlling a running [`ReminderScheduler`].
#[derive(Debug, Clone)]
pub struct ReminderHandle {
    command_tx: mpsc::Sender<ReminderCommand>,
}

impl ReminderHandle {
    /// Triggers an immediate sweep.
    pub async fn sweep_now(&self) -> Result<(), mpsc::error::SendError<ReminderCommand>> {
        self.command_tx.send(ReminderCommand::SweepNow).await
    }

    /// Stops the scheduler.
    pub async fn stop(&self) -> Result<(), mpsc::error::SendError<ReminderCommand>> {
        self.command_tx.send(ReminderCommand::Stop).await
    }
}

/// Periodic reminder sweep over the ledger.
pub struct ReminderScheduler {
    config: ReminderConfig,
    command_tx: mpsc::Sender<ReminderCommand>,
    command_rx: Option<mpsc::Receiver<ReminderCommand>>,
}

impl ReminderScheduler {
    /// Creates a scheduler with the given configuration.
    pub fn new(config: ReminderConfig) -> Self {
        let (command_tx, command_rx) = mpsc::channel(16);
        Self {
            config,
            command_tx,
            command_rx: Some(command_rx),
        }
    }

    /// Returns a handle for controlling the scheduler once running.
    pub fn handle(&self) -> ReminderHandle {
        ReminderHandle {
            command_tx: self.command_tx.clone(),
        }
    }

    /// Runs the sweep loop until stopped.
    pub async fn run(
        mut self,
        ledger: Arc<dyn Ledger>,
        hub: Arc<BroadcastHub>,
        notifier: Arc<dyn Notifier>,
    ) {
        let mut command_rx = self.command_rx.take().expect("run called twice");
        let mut ticker = tokio::time::interval(self.config.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = self.config.sweep_interval.as_secs(),
            "Reminder scheduler started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    sweep_once(&self.config, ledger.as_ref(), &hub, notifier.as_ref()).await;
                }
                cmd = command_rx.recv() => {
                    match cmd {
                        Some(ReminderCommand::SweepNow) => {
                            debug!("Received SweepNow command");
                            sweep_once(&self.config, ledger.as_ref(), &hub, notifier.as_ref())
                                .await;
                        }
                        Some(ReminderCommand::Stop) | None => {
                            info!("Reminder scheduler stopping");
                            break;
                        }
                    }
                }
            }
        }
    }
}

/// Runs one sweep and returns how many reminders were fired.
pub async fn sweep_once<L, N>(
    config: &ReminderConfig,
    ledger: &L,
    hub: &BroadcastHub,
    notifier: &N,
) -> usize
where
    L: Ledger + ?Sized,
    N: Notifier + ?Sized,
{
    let now = Utc::now();
    let lo = now + config.lookahead_low;
    let hi = now + config.lookahead_high;

    let due = match ledger.find_starting_between(lo, hi).await {
        Ok(due) => due,
        Err(e) => {
            warn!(error = %e, "Reminder sweep query failed");
            return 0;
        }
    };

    let mut fired = 0;
    for booking in due {
        // Claim before emitting: whoever wins the mark is the only
        // emitter this booking will ever have.
        match ledger.mark_reminder_sent(&booking.id, now).await {
            Ok(true) => {
                emit_reminder(hub, notifier, &booking).await;
                fired += 1;
            }
            Ok(false) => {
                trace!(id = %booking.id, "Reminder already claimed");
            }
            Err(e) => {
                warn!(id = %booking.id, error = %e, "Failed to claim reminder, skipping");
            }
        }
    }

    if fired > 0 {
        debug!(fired, "Reminder sweep complete");
    }
    fired
}

async fn emit_reminder<N: Notifier + ?Sized>(
    hub: &BroadcastHub,
    notifier: &N,
    booking: &Booking,
) {
    let event = QueueEvent::Reminder {
        booking_id: booking.id.clone(),
        starts_at: booking.window.start,
    };

    if let Some(customer_id) = booking.customer_id.as_deref() {
        hub.publish(&ChannelKey::customer(customer_id), event.clone());
        notifier
            .notify(
                customer_id,
                ActorRole::Customer,
                "Upcoming appointment",
                &format!(
                    "{} at {}",
                    booking.service,
                    booking.window.start.format("%H:%M")
                ),
                Some(&format!("/bookings/{}", booking.id)),
            )
            .await;
    }

    // Front-desk displays track guest reminders through the shop scope.
    hub.publish(&ChannelKey::shop(booking.shop_id.as_str()), event);

    info!(id = %booking.id, starts_at = %booking.window.start, "Reminder fired");
}
