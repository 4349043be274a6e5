//! Slot reservation authority.
//!
//! Serializes reservation decisions per `(staff, date)` key so no two
//! concurrent requests can both win overlapping windows. Each key owns its
//! own async mutex, created lazily and retired when idle; there is no
//! global lock, and unrelated keys proceed fully in parallel.
//!
//! The authority caches nothing but the mutexes themselves. Overlap
//! evaluation always runs against a fresh ledger scan inside the critical
//! section, and the ledger's write-time constraint remains the final word
//! against writers outside this process. The map can therefore be rebuilt
//! from nothing after a restart.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};

use salonq_core::{Booking, StaffId};

use crate::error::{EngineError, EngineResult};
use crate::ledger::{InsertOutcome, Ledger};

type SlotKey = (StaffId, NaiveDate);

/// Per-key critical sections for reservation decisions.
#[derive(Debug, Default)]
pub struct SlotAuthority {
    locks: StdMutex<HashMap<SlotKey, Arc<AsyncMutex<()>>>>,
}

impl SlotAuthority {
    /// Creates an authority with no keys.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the key's mutex, creating it on first use.
    fn key_lock(&self, staff_id: &str, date: NaiveDate) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().expect("slot lock registry poisoned");
        locks
            .entry((staff_id.to_string(), date))
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Drops the key's mutex if nothing holds it.
    ///
    /// Idempotent: releasing an unknown or busy key is a no-op. The ledger
    /// status transition is what actually frees a window; this only keeps
    /// the registry from growing without bound.
    pub fn release(&self, staff_id: &str, date: NaiveDate) {
        let mut locks = self.locks.lock().expect("slot lock registry poisoned");
        let key = (staff_id.to_string(), date);
        if let Some(entry) = locks.get(&key)
            && Arc::strong_count(entry) == 1
        {
            locks.remove(&key);
            debug!(staff = %staff_id, %date, "Retired idle slot key");
        }
    }

    /// Number of live keys. Exposed for tests and metrics.
    pub fn key_count(&self) -> usize {
        self.locks.lock().expect("slot lock registry poisoned").len()
    }

    /// Attempts to reserve the booking's window and persist it.
    ///
    /// The critical section runs in a spawned task so a caller that
    /// disconnects mid-flight cannot leave a reservation half-applied.
    /// Returns the persisted booking, `PastWindow` for windows that have
    /// already started at `now`, `Conflict` when the window is taken, or
    /// `Stale` carrying the prior booking on an idempotency-key replay.
    pub async fn reserve(
        &self,
        ledger: Arc<dyn Ledger>,
        booking: Booking,
        now: DateTime<Utc>,
    ) -> EngineResult<Booking> {
        let staff_id = booking
            .staff_id
            .clone()
            .ok_or_else(|| EngineError::ledger("reserve requires an assigned staff member"))?;
        let date = booking.date;

        // Past windows lose regardless of conflict status.
        if booking.window.starts_in_past(now) {
            return Err(EngineError::PastWindow);
        }

        let lock = self.key_lock(&staff_id, date);
        let section_staff = staff_id.clone();

        let section = tokio::spawn(async move {
            let _guard = lock.lock().await;

            // Replay check first, so a retry of an already-won request is
            // reported as Stale rather than as a self-conflict.
            if let Some(prior) = ledger
                .find_by_client_booking_id(&booking.client_booking_id)
                .await?
            {
                return Err(EngineError::Stale(Box::new(prior)));
            }

            let active = ledger
                .find_active_by_staff_date(&section_staff, date)
                .await?;
            if let Some(holder) = active.iter().find(|b| b.window.overlaps(&booking.window)) {
                debug!(
                    staff = %section_staff,
                    %date,
                    holder = %holder.id,
                    "Window conflict"
                );
                return Err(EngineError::conflict(&section_staff, date));
            }

            match ledger.insert_if_absent(booking).await? {
                InsertOutcome::Inserted(stored) => {
                    info!(id = %stored.id, staff = %section_staff, %date, "Window reserved");
                    Ok(*stored)
                }
                InsertOutcome::Duplicate(prior) => Err(EngineError::Stale(prior)),
                // The ledger's own constraint saw a row we did not; the
                // ledger wins.
                InsertOutcome::Overlap => Err(EngineError::conflict(&section_staff, date)),
            }
        });

        let result = section
            .await
            .map_err(|e| EngineError::ledger(format!("reservation section failed: {e}")))?;
        self.release(&staff_id, date);
        result
    }

    /// Moves a booking to another staff member, all-or-nothing.
    ///
    /// The new key's critical section re-runs the overlap check before the
    /// staff switch is written; on conflict the booking keeps its old
    /// staff untouched. The single write that flips `staff_id` is what
    /// frees the old key's window, so no half-migrated state can exist.
    pub async fn reassign(
        &self,
        ledger: Arc<dyn Ledger>,
        booking: Booking,
        new_staff: StaffId,
    ) -> EngineResult<Booking> {
        let old_staff = booking.staff_id.clone();
        if old_staff.as_deref() == Some(new_staff.as_str()) {
            return Ok(booking);
        }
        let date = booking.date;

        let lock = self.key_lock(&new_staff, date);
        let section_staff = new_staff.clone();

        let section = tokio::spawn(async move {
            let _guard = lock.lock().await;

            let active = ledger
                .find_active_by_staff_date(&section_staff, date)
                .await?;
            if active
                .iter()
                .any(|b| b.id != booking.id && b.window.overlaps(&booking.window))
            {
                return Err(EngineError::conflict(&section_staff, date));
            }

            match ledger.set_staff(&booking.id, section_staff.clone()).await? {
                Some(updated) => {
                    info!(id = %updated.id, staff = %section_staff, %date, "Booking reassigned");
                    Ok(updated)
                }
                None => Err(EngineError::NotFound(booking.id)),
            }
        });

        let result = section
            .await
            .map_err(|e| EngineError::ledger(format!("reassign section failed: {e}")))?;
        self.release(&new_staff, date);
        if let Some(staff) = old_staff.as_deref() {
            self.release(staff, date);
        }
        result
    }
}
