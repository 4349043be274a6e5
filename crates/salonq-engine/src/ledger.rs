//! Booking Ledger client.
//!
//! The [`Ledger`] trait defines the exact query contracts this core
//! requires from its persistence collaborator. Each method is assumed to
//! be individually atomic at the storage layer; in particular
//! [`Ledger::insert_if_absent`] is the write-time authority against both
//! idempotency-key replays and conflicting rows created by writers outside
//! this process. The ledger is ground truth: any in-process state is a
//! derived optimization and always loses on conflict.
//!
//! [`MemoryLedger`] is the in-process reference implementation used by
//! tests and demos.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use salonq_core::{Booking, BookingStatus, ShopId, StaffId, StaffMember};

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// A storage-layer failure.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct LedgerError {
    message: String,
}

impl LedgerError {
    /// Creates a ledger error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Outcome of an [`Ledger::insert_if_absent`] write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The booking was persisted; the stored record is returned.
    Inserted(Box<Booking>),
    /// A booking with the same idempotency key already exists; the prior
    /// record is returned and nothing was written.
    Duplicate(Box<Booking>),
    /// The storage layer's own constraint found an overlapping active
    /// booking for the same staff/date; nothing was written.
    Overlap,
}

/// Outcome of an [`Ledger::update_status`] compare-and-set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The expected prior status matched and the new status was written.
    Updated(Box<Booking>),
    /// The booking's status changed underneath the caller; the current
    /// record is returned and nothing was written.
    Mismatch(Box<Booking>),
    /// Unknown booking id.
    NotFound,
}

/// The persistence interface this core consumes.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Active-status bookings for one staff member on one date.
    async fn find_active_by_staff_date(
        &self,
        staff_id: &str,
        date: NaiveDate,
    ) -> LedgerResult<Vec<Booking>>;

    /// Active-status bookings for a whole shop on one date.
    async fn find_active_by_shop_date(
        &self,
        shop_id: &str,
        date: NaiveDate,
    ) -> LedgerResult<Vec<Booking>>;

    /// Looks up a booking by its server-assigned id.
    async fn find_by_id(&self, id: &str) -> LedgerResult<Option<Booking>>;

    /// Looks up a booking by its client-supplied idempotency key.
    async fn find_by_client_booking_id(&self, key: &str) -> LedgerResult<Option<Booking>>;

    /// Persists a booking unless its idempotency key already exists or an
    /// active overlap would be created. Atomic at the storage layer.
    async fn insert_if_absent(&self, booking: Booking) -> LedgerResult<InsertOutcome>;

    /// Writes `to` only if the booking's status is still `from`, atomic
    /// at the storage layer. Two racing writers can never both succeed on
    /// the same prior state, which is what keeps terminal statuses final.
    /// Does not enforce the transition table; callers do.
    async fn update_status(
        &self,
        id: &str,
        from: BookingStatus,
        to: BookingStatus,
    ) -> LedgerResult<UpdateOutcome>;

    /// Moves a booking to another staff member. Returns the updated
    /// record, or `None` if the id is unknown.
    async fn set_staff(&self, id: &str, staff_id: StaffId) -> LedgerResult<Option<Booking>>;

    /// Active bookings whose window start falls in `[lo, hi)` and whose
    /// reminder has not yet been claimed.
    async fn find_starting_between(
        &self,
        lo: DateTime<Utc>,
        hi: DateTime<Utc>,
    ) -> LedgerResult<Vec<Booking>>;

    /// Claims the one-shot reminder for a booking. Returns `true` exactly
    /// once per booking; later calls (and unknown ids) return `false`.
    async fn mark_reminder_sent(&self, id: &str, at: DateTime<Utc>) -> LedgerResult<bool>;

    /// The shop's staff roster, in stable roster order.
    async fn active_staff(&self, shop_id: &str) -> LedgerResult<Vec<StaffMember>>;
}

#[derive(Debug, Default)]
struct MemoryState {
    bookings: Vec<Booking>,
    rosters: HashMap<ShopId, Vec<StaffMember>>,
}

/// In-process ledger over a `tokio::sync::RwLock`.
///
/// Each trait method takes the lock once, which makes it individually
/// atomic the way a real storage backend's statements would be.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    inner: RwLock<MemoryState>,
}

impl MemoryLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a shop's roster, replacing any previous roster.
    pub async fn seed_roster(&self, shop_id: impl Into<ShopId>, roster: Vec<StaffMember>) {
        self.inner.write().await.rosters.insert(shop_id.into(), roster);
    }

    /// Returns every booking, in insertion order. Test helper.
    pub async fn all_bookings(&self) -> Vec<Booking> {
        self.inner.read().await.bookings.clone()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn find_active_by_staff_date(
        &self,
        staff_id: &str,
        date: NaiveDate,
    ) -> LedgerResult<Vec<Booking>> {
        let state = self.inner.read().await;
        Ok(state
            .bookings
            .iter()
            .filter(|b| {
                b.status.is_active() && b.date == date && b.staff_id.as_deref() == Some(staff_id)
            })
            .cloned()
            .collect())
    }

    async fn find_active_by_shop_date(
        &self,
        shop_id: &str,
        date: NaiveDate,
    ) -> LedgerResult<Vec<Booking>> {
        let state = self.inner.read().await;
        Ok(state
            .bookings
            .iter()
            .filter(|b| b.status.is_active() && b.date == date && b.shop_id == shop_id)
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, id: &str) -> LedgerResult<Option<Booking>> {
        let state = self.inner.read().await;
        Ok(state.bookings.iter().find(|b| b.id == id).cloned())
    }

    async fn find_by_client_booking_id(&self, key: &str) -> LedgerResult<Option<Booking>> {
        let state = self.inner.read().await;
        Ok(state
            .bookings
            .iter()
            .find(|b| b.client_booking_id == key)
            .cloned())
    }

    async fn insert_if_absent(&self, booking: Booking) -> LedgerResult<InsertOutcome> {
        let mut state = self.inner.write().await;

        if let Some(existing) = state
            .bookings
            .iter()
            .find(|b| b.client_booking_id == booking.client_booking_id)
        {
            debug!(
                client_booking_id = %booking.client_booking_id,
                existing_id = %existing.id,
                "Duplicate idempotency key"
            );
            return Ok(InsertOutcome::Duplicate(Box::new(existing.clone())));
        }

        let conflicting = state.bookings.iter().any(|b| {
            b.status.is_active()
                && b.date == booking.date
                && b.staff_id == booking.staff_id
                && b.window.overlaps(&booking.window)
        });
        if conflicting {
            debug!(id = %booking.id, "Write-time overlap constraint hit");
            return Ok(InsertOutcome::Overlap);
        }

        state.bookings.push(booking.clone());
        Ok(InsertOutcome::Inserted(Box::new(booking)))
    }

    async fn update_status(
        &self,
        id: &str,
        from: BookingStatus,
        to: BookingStatus,
    ) -> LedgerResult<UpdateOutcome> {
        let mut state = self.inner.write().await;
        match state.bookings.iter_mut().find(|b| b.id == id) {
            Some(booking) if booking.status == from => {
                booking.status = to;
                Ok(UpdateOutcome::Updated(Box::new(booking.clone())))
            }
            Some(booking) => {
                debug!(id = %id, current = %booking.status, expected = %from, "Stale status write");
                Ok(UpdateOutcome::Mismatch(Box::new(booking.clone())))
            }
            None => Ok(UpdateOutcome::NotFound),
        }
    }

    async fn set_staff(&self, id: &str, staff_id: StaffId) -> LedgerResult<Option<Booking>> {
        let mut state = self.inner.write().await;
        match state.bookings.iter_mut().find(|b| b.id == id) {
            Some(booking) => {
                booking.staff_id = Some(staff_id);
                Ok(Some(booking.clone()))
            }
            None => Ok(None),
        }
    }

    async fn find_starting_between(
        &self,
        lo: DateTime<Utc>,
        hi: DateTime<Utc>,
    ) -> LedgerResult<Vec<Booking>> {
        let state = self.inner.read().await;
        Ok(state
            .bookings
            .iter()
            .filter(|b| {
                b.status.is_active()
                    && b.reminder_sent_at.is_none()
                    && lo <= b.window.start
                    && b.window.start < hi
            })
            .cloned()
            .collect())
    }

    async fn mark_reminder_sent(&self, id: &str, at: DateTime<Utc>) -> LedgerResult<bool> {
        let mut state = self.inner.write().await;
        match state.bookings.iter_mut().find(|b| b.id == id) {
            Some(booking) if booking.reminder_sent_at.is_none() => {
                booking.reminder_sent_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn active_staff(&self, shop_id: &str) -> LedgerResult<Vec<StaffMember>> {
        let state = self.inner.read().await;
        Ok(state.rosters.get(shop_id).cloned().unwrap_or_default())
    }
}
