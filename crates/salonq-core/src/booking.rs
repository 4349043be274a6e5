//! Booking model and status state machine.
//!
//! This module provides the durable [`Booking`] record, the [`NewBooking`]
//! request it is created from, and [`BookingStatus`], a closed variant with
//! an explicit transition table. Bookings are never physically deleted:
//! cancelled and archived bookings stay in the ledger with a terminal
//! status for audit, which is also what frees their reserved window.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::window::Window;

/// Identifier of a shop.
pub type ShopId = String;
/// Identifier of a staff member.
pub type StaffId = String;
/// Identifier of a registered customer.
pub type CustomerId = String;
/// Server-assigned booking identifier.
pub type BookingId = String;

/// Who is performing an operation on a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    /// The customer who owns the booking (or a guest).
    Customer,
    /// The staff member the booking is assigned to.
    Staff,
    /// The shop owner or front desk.
    Shop,
}

/// Lifecycle status of a booking.
///
/// Transitions follow a fixed table enforced by [`can_transition_to`]:
/// `Pending` moves to `Confirmed` or `Accepted`, those move to `Ongoing` or
/// `InService`, which complete. Any non-terminal status may be cancelled,
/// or archived by the owning staff (a soft-delete that hides the booking
/// from that staff's views without dropping it from audit history).
///
/// [`can_transition_to`]: BookingStatus::can_transition_to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Accepted,
    Ongoing,
    InService,
    Completed,
    Cancelled,
    Archived,
}

impl BookingStatus {
    /// Returns true for statuses that hold a reserved window.
    ///
    /// This is the single canonical active set, shared by the load
    /// balancer, the overlap scan and the queue projector.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::Pending | Self::Confirmed | Self::Accepted | Self::Ongoing | Self::InService
        )
    }

    /// Returns true for terminal statuses; no further transitions exist.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Archived)
    }

    /// Checks whether the transition `self -> next` is permitted.
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        use BookingStatus::*;

        if self == next {
            return false;
        }
        match (self, next) {
            (_, Cancelled) | (_, Archived) => !self.is_terminal(),
            (Pending, Confirmed | Accepted) => true,
            (Confirmed | Accepted, Ongoing | InService) => true,
            (Ongoing | InService, Completed) => true,
            _ => false,
        }
    }

    /// Returns the wire name of this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Accepted => "accepted",
            Self::Ongoing => "ongoing",
            Self::InService => "in-service",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Archived => "archived",
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A staff member on a shop's roster.
///
/// Roster order is significant: the load balancer breaks load ties by
/// roster position, which keeps assignment deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffMember {
    pub id: StaffId,
    pub name: String,
    /// Inactive members are skipped by assignment and projection.
    pub active: bool,
}

impl StaffMember {
    /// Creates an active staff member.
    pub fn new(id: impl Into<StaffId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            active: true,
        }
    }
}

/// An incoming booking request, as supplied by the caller.
///
/// `client_booking_id` is the caller's idempotency key: retrying the same
/// request can never create a second booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBooking {
    /// Client-supplied idempotency key.
    pub client_booking_id: String,
    pub shop_id: ShopId,
    /// Explicit staff choice; `None` lets the load balancer pick.
    pub staff_id: Option<StaffId>,
    /// `None` for guest bookings.
    pub customer_id: Option<CustomerId>,
    pub customer_name: String,
    pub customer_phone: String,
    pub service: String,
    /// Price in minor currency units.
    pub price: u32,
    pub duration_minutes: i64,
    /// Calendar date, `YYYY-MM-DD`.
    pub date: String,
    /// Human start time, parsed by the window layer.
    pub time_text: String,
}

impl NewBooking {
    /// Creates a request with the required fields.
    pub fn new(
        client_booking_id: impl Into<String>,
        shop_id: impl Into<ShopId>,
        service: impl Into<String>,
        date: impl Into<String>,
        time_text: impl Into<String>,
        duration_minutes: i64,
    ) -> Self {
        Self {
            client_booking_id: client_booking_id.into(),
            shop_id: shop_id.into(),
            staff_id: None,
            customer_id: None,
            customer_name: String::new(),
            customer_phone: String::new(),
            service: service.into(),
            price: 0,
            duration_minutes,
            date: date.into(),
            time_text: time_text.into(),
        }
    }

    /// Builder: request a specific staff member.
    pub fn with_staff(mut self, staff_id: impl Into<StaffId>) -> Self {
        self.staff_id = Some(staff_id.into());
        self
    }

    /// Builder: attach a registered customer id.
    pub fn with_customer(mut self, customer_id: impl Into<CustomerId>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    /// Builder: set contact details.
    pub fn with_contact(mut self, name: impl Into<String>, phone: impl Into<String>) -> Self {
        self.customer_name = name.into();
        self.customer_phone = phone.into();
        self
    }

    /// Builder: set the price in minor units.
    pub fn with_price(mut self, price: u32) -> Self {
        self.price = price;
        self
    }
}

/// A durable booking record.
///
/// The window is derived from the parsed date/time and the duration at
/// creation, so `window.end - window.start` always equals the duration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    /// Server-assigned id.
    pub id: BookingId,
    /// Client-supplied idempotency key.
    pub client_booking_id: String,
    pub shop_id: ShopId,
    /// Assigned staff member; set by the time the booking is persisted.
    pub staff_id: Option<StaffId>,
    /// `None` for guest bookings.
    pub customer_id: Option<CustomerId>,
    pub customer_name: String,
    pub customer_phone: String,
    pub service: String,
    /// Price in minor currency units.
    pub price: u32,
    pub duration_minutes: i64,
    pub date: NaiveDate,
    /// The original human time text, kept for display.
    pub time_text: String,
    pub window: Window,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    /// Set once the one-shot reminder has been claimed for this booking.
    pub reminder_sent_at: Option<DateTime<Utc>>,
}

impl Booking {
    /// Materializes a booking from a request, an assigned staff member and
    /// an already-parsed window.
    pub fn from_request(
        request: &NewBooking,
        id: impl Into<BookingId>,
        staff_id: StaffId,
        window: Window,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            client_booking_id: request.client_booking_id.clone(),
            shop_id: request.shop_id.clone(),
            staff_id: Some(staff_id),
            customer_id: request.customer_id.clone(),
            customer_name: request.customer_name.clone(),
            customer_phone: request.customer_phone.clone(),
            service: request.service.clone(),
            price: request.price,
            duration_minutes: request.duration_minutes,
            date: window.date(),
            time_text: request.time_text.clone(),
            window,
            status: BookingStatus::Pending,
            created_at: now,
            reminder_sent_at: None,
        }
    }

    /// Returns true if this booking currently holds its window.
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Returns true if this is a guest booking (no registered customer).
    pub fn is_guest(&self) -> bool {
        self.customer_id.is_none()
    }
}
