//! Core types: time windows, bookings, status machine, queue snapshots

pub mod booking;
pub mod snapshot;
pub mod tracing;
pub mod window;

pub use booking::{
    ActorRole, Booking, BookingId, BookingStatus, CustomerId, NewBooking, ShopId, StaffId,
    StaffMember,
};
pub use snapshot::{ShopQueueSnapshot, StaffQueue};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
pub use window::{Window, WindowError, parse_window};
