//! Broadcast fan-out.
//!
//! Publishes booking lifecycle events and queue snapshots over scoped
//! channels so a subscriber only sees its shop, staff member or customer.
//! Delivery is best-effort and at-most-once per connected subscriber:
//! nothing is queued or replayed for the disconnected, who re-synchronize
//! by requesting a fresh snapshot on reconnect. Within one channel key,
//! events arrive in the order they were published; no ordering is promised
//! across keys.

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, trace};

use salonq_core::{
    Booking, BookingId, BookingStatus, CustomerId, ShopId, ShopQueueSnapshot, StaffId,
};

/// Scope of one broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "id", rename_all = "snake_case")]
pub enum ChannelKey {
    /// All activity in one shop (live queue displays, front desk).
    Shop(ShopId),
    /// One staff member's own bookings.
    Staff(StaffId),
    /// One customer's own bookings.
    Customer(CustomerId),
}

impl ChannelKey {
    /// Shop-scoped key.
    pub fn shop(id: impl Into<ShopId>) -> Self {
        Self::Shop(id.into())
    }

    /// Staff-scoped key.
    pub fn staff(id: impl Into<StaffId>) -> Self {
        Self::Staff(id.into())
    }

    /// Customer-scoped key.
    pub fn customer(id: impl Into<CustomerId>) -> Self {
        Self::Customer(id.into())
    }
}

/// Events published over the fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEvent {
    /// A booking was created and its window reserved.
    BookingCreated { booking: Booking },
    /// A booking moved through its lifecycle.
    BookingStatusChanged {
        booking: Booking,
        previous: BookingStatus,
    },
    /// A booking was cancelled or archived.
    BookingCancelled { booking: Booking },
    /// A booking moved to a different staff member.
    StaffReassigned {
        booking: Booking,
        previous_staff: Option<StaffId>,
    },
    /// A fresh queue snapshot after a mutation.
    QueueUpdated { snapshot: ShopQueueSnapshot },
    /// One-shot reminder that a booking starts soon.
    Reminder {
        booking_id: BookingId,
        starts_at: DateTime<Utc>,
    },
}

/// Fan-out hub mapping channel keys to broadcast channels.
///
/// Channels are created on first subscription and dropped once their last
/// receiver goes away, so the map only ever holds live scopes.
#[derive(Debug)]
pub struct BroadcastHub {
    capacity: usize,
    channels: StdMutex<HashMap<ChannelKey, broadcast::Sender<QueueEvent>>>,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(64)
    }
}

impl BroadcastHub {
    /// Creates a hub with the given per-channel buffer capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            channels: StdMutex::new(HashMap::new()),
        }
    }

    /// Subscribes to a channel, creating it on first use.
    pub fn subscribe(&self, key: ChannelKey) -> broadcast::Receiver<QueueEvent> {
        let mut channels = self.channels.lock().expect("channel registry poisoned");
        channels
            .entry(key)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Publishes an event to one channel. Returns the number of connected
    /// subscribers it reached; an unsubscribed channel swallows the event.
    pub fn publish(&self, key: &ChannelKey, event: QueueEvent) -> usize {
        let mut channels = self.channels.lock().expect("channel registry poisoned");
        let Some(sender) = channels.get(key) else {
            trace!(?key, "No channel for key, dropping event");
            return 0;
        };
        match sender.send(event) {
            Ok(delivered) => delivered,
            Err(_) => {
                // Last receiver is gone; drop the channel with the event.
                channels.remove(key);
                debug!(?key, "Dropped channel with no subscribers");
                0
            }
        }
    }

    /// Publishes the same event to several channels, in key order.
    pub fn publish_all(&self, keys: &[ChannelKey], event: &QueueEvent) -> usize {
        keys.iter()
            .map(|key| self.publish(key, event.clone()))
            .sum()
    }

    /// Number of live channels. Exposed for tests and metrics.
    pub fn channel_count(&self) -> usize {
        self.channels.lock().expect("channel registry poisoned").len()
    }
}
