//! Engine error taxonomy.
//!
//! Every public operation returns these as typed values; nothing is thrown
//! across the reservation critical section without the hold released first.

use chrono::NaiveDate;
use thiserror::Error;

use salonq_core::{Booking, BookingId, BookingStatus, ShopId, StaffId, WindowError};

use crate::ledger::LedgerError;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors returned by the scheduling engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad date/time input; user-correctable.
    #[error(transparent)]
    Window(#[from] WindowError),

    /// The requested window starts in the past; user-correctable.
    #[error("requested window has already started")]
    PastWindow,

    /// The window is taken for this staff/date; suggest another slot.
    #[error("window unavailable for staff {staff} on {date}")]
    Conflict { staff: StaffId, date: NaiveDate },

    /// The shop has no active staff; surfaced to the shop owner.
    #[error("no staff available in shop {shop}")]
    NoStaffAvailable { shop: ShopId },

    /// Rejected status transition; a server-side anomaly with a correct
    /// caller, logged as such.
    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },

    /// Idempotent replay: a booking with this key already exists.
    ///
    /// Not a true error; callers treat it as success and use the carried
    /// prior result.
    #[error("booking already exists for idempotency key {}", .0.client_booking_id)]
    Stale(Box<Booking>),

    /// Unknown booking id.
    #[error("booking {0} not found")]
    NotFound(BookingId),

    /// The acting staff member does not own the booking.
    #[error("staff {staff} does not own booking {booking}")]
    StaffMismatch { staff: StaffId, booking: BookingId },

    /// Storage-layer failure.
    #[error("ledger error: {0}")]
    Ledger(String),
}

impl EngineError {
    /// Creates a conflict error.
    pub fn conflict(staff: impl Into<StaffId>, date: NaiveDate) -> Self {
        Self::Conflict {
            staff: staff.into(),
            date,
        }
    }

    /// Creates a no-staff-available error.
    pub fn no_staff(shop: impl Into<ShopId>) -> Self {
        Self::NoStaffAvailable { shop: shop.into() }
    }

    /// Creates an invalid-transition error.
    pub fn invalid_transition(from: BookingStatus, to: BookingStatus) -> Self {
        Self::InvalidTransition { from, to }
    }

    /// Creates a ledger error.
    pub fn ledger(message: impl Into<String>) -> Self {
        Self::Ledger(message.into())
    }
}

impl From<LedgerError> for EngineError {
    fn from(err: LedgerError) -> Self {
        Self::Ledger(err.to_string())
    }
}
