//! Derived queue projections.
//!
//! [`ShopQueueSnapshot`] is the read model consumed by live displays: for
//! one shop and date, the per-staff ordered list of active bookings split
//! into the one currently in the chair and the waiting queue. Snapshots
//! are regenerated on demand and never persisted.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::booking::{Booking, ShopId, StaffId};

/// One staff member's projected queue for a day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffQueue {
    pub staff_name: String,
    /// The booking currently being served, if any.
    pub current: Option<Booking>,
    /// Remaining bookings, ordered by window start ascending.
    pub queue: Vec<Booking>,
}

impl StaffQueue {
    /// Creates an empty queue for a staff member with no bookings.
    pub fn empty(staff_name: impl Into<String>) -> Self {
        Self {
            staff_name: staff_name.into(),
            current: None,
            queue: Vec::new(),
        }
    }

    /// Splits a list of bookings, already sorted by window start, into
    /// `current` (head) and `queue` (tail).
    pub fn from_sorted(staff_name: impl Into<String>, mut bookings: Vec<Booking>) -> Self {
        debug_assert!(
            bookings.windows(2).all(|w| w[0].window.start <= w[1].window.start),
            "bookings must be sorted by window start"
        );
        if bookings.is_empty() {
            return Self::empty(staff_name);
        }
        let current = bookings.remove(0);
        Self {
            staff_name: staff_name.into(),
            current: Some(current),
            queue: bookings,
        }
    }

    /// Total number of active bookings in this queue.
    pub fn len(&self) -> usize {
        self.queue.len() + usize::from(self.current.is_some())
    }

    /// Returns true if the staff member has no active bookings.
    pub fn is_empty(&self) -> bool {
        self.current.is_none() && self.queue.is_empty()
    }
}

/// Point-in-time view of a shop's per-staff queues for one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopQueueSnapshot {
    pub shop_id: ShopId,
    pub date: NaiveDate,
    /// Keyed by staff id; BTreeMap keeps iteration and serialization
    /// order deterministic.
    pub staff: BTreeMap<StaffId, StaffQueue>,
}

impl ShopQueueSnapshot {
    /// Creates an empty snapshot for a shop and date.
    pub fn new(shop_id: impl Into<ShopId>, date: NaiveDate) -> Self {
        Self {
            shop_id: shop_id.into(),
            date,
            staff: BTreeMap::new(),
        }
    }

    /// Returns a staff member's queue, if they appear in the snapshot.
    pub fn staff_queue(&self, staff_id: &str) -> Option<&StaffQueue> {
        self.staff.get(staff_id)
    }

    /// Total number of active bookings across all staff.
    pub fn total_bookings(&self) -> usize {
        self.staff.values().map(StaffQueue::len).sum()
    }
}
