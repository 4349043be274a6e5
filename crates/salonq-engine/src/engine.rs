//! Scheduling engine facade.
//!
//! Ties the pieces together: window parsing, staff assignment, slot
//! reservation, status transitions, queue projection and event fan-out.
//! Every mutation goes through the ledger first; events and notifications
//! are emitted only after the write has landed, so a subscriber can never
//! see a state the ledger does not hold.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{NaiveDate, Utc};
use tokio::sync::broadcast;
use tracing::{info, warn};

use salonq_core::{
    ActorRole, Booking, BookingId, BookingStatus, NewBooking, ShopQueueSnapshot, parse_window,
};

use crate::balancer::pick_staff;
use crate::broadcast::{BroadcastHub, ChannelKey, QueueEvent};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::ledger::{Ledger, UpdateOutcome};
use crate::notifier::Notifier;
use crate::projector::project;
use crate::reminders::{ReminderHandle, ReminderScheduler};
use crate::reservation::SlotAuthority;

/// The appointment scheduling and live queue engine.
pub struct SchedulingEngine {
    ledger: Arc<dyn Ledger>,
    notifier: Arc<dyn Notifier>,
    authority: SlotAuthority,
    hub: Arc<BroadcastHub>,
    config: EngineConfig,
    booking_seq: AtomicU64,
}

impl SchedulingEngine {
    /// Creates an engine over the given ledger and notifier.
    pub fn new(
        ledger: Arc<dyn Ledger>,
        notifier: Arc<dyn Notifier>,
        config: EngineConfig,
    ) -> Self {
        let hub = Arc::new(BroadcastHub::new(config.broadcast_capacity));
        Self {
            ledger,
            notifier,
            authority: SlotAuthority::new(),
            hub,
            config,
            booking_seq: AtomicU64::new(1),
        }
    }

    /// Subscribes to a scoped event channel.
    pub fn subscribe(&self, key: ChannelKey) -> broadcast::Receiver<QueueEvent> {
        self.hub.subscribe(key)
    }

    /// Starts the reminder scheduler on the runtime and returns its handle.
    pub fn spawn_reminders(&self) -> ReminderHandle {
        let scheduler = ReminderScheduler::new(self.config.reminders.clone());
        let handle = scheduler.handle();
        tokio::spawn(scheduler.run(
            self.ledger.clone(),
            self.hub.clone(),
            self.notifier.clone(),
        ));
        handle
    }

    fn next_booking_id(&self) -> BookingId {
        let seq = self.booking_seq.fetch_add(1, Ordering::Relaxed);
        format!("bk-{seq}")
    }

    /// Creates a booking: parses the window, assigns staff, reserves the
    /// slot and fans out the result.
    ///
    /// Retrying with the same `client_booking_id` returns the original
    /// booking instead of creating a second one, with no further events.
    pub async fn create_booking(&self, request: NewBooking) -> EngineResult<Booking> {
        let window = parse_window(&request.date, &request.time_text, request.duration_minutes)?;
        let date = window.date();
        let staff_id = pick_staff(
            self.ledger.as_ref(),
            &request.shop_id,
            date,
            request.staff_id.as_deref(),
        )
        .await?;

        let booking = Booking::from_request(
            &request,
            self.next_booking_id(),
            staff_id,
            window,
            Utc::now(),
        );

        let booking = match self
            .authority
            .reserve(self.ledger.clone(), booking, Utc::now())
            .await
        {
            Ok(booking) => booking,
            // Idempotent replay: hand back the prior result as success.
            Err(EngineError::Stale(prior)) => {
                info!(id = %prior.id, "Replayed booking request");
                return Ok(*prior);
            }
            Err(err) => return Err(err),
        };

        info!(id = %booking.id, shop = %booking.shop_id, "Booking created");
        self.fan_out(
            &booking,
            QueueEvent::BookingCreated {
                booking: booking.clone(),
            },
        );
        self.publish_queue(&booking.shop_id, booking.date).await;

        if let Some(staff) = booking.staff_id.as_deref() {
            self.notifier
                .notify(
                    staff,
                    ActorRole::Staff,
                    "New booking",
                    &format!("{} at {}", booking.service, booking.time_text),
                    Some(&format!("/bookings/{}", booking.id)),
                )
                .await;
        }

        Ok(booking)
    }

    /// Cancels a booking on behalf of an actor.
    ///
    /// A staff actor archives (soft-deletes from their own views); anyone
    /// else cancels. Both are terminal and free the reserved window.
    pub async fn cancel_booking(&self, id: &str, actor: ActorRole) -> EngineResult<Booking> {
        let booking = self
            .ledger
            .find_by_id(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;

        let target = match actor {
            ActorRole::Staff => BookingStatus::Archived,
            ActorRole::Customer | ActorRole::Shop => BookingStatus::Cancelled,
        };
        let cancelled = self.transition(booking, target).await?;

        self.fan_out(
            &cancelled,
            QueueEvent::BookingCancelled {
                booking: cancelled.clone(),
            },
        );
        self.publish_queue(&cancelled.shop_id, cancelled.date).await;

        // Tell the other side the slot is gone.
        match actor {
            ActorRole::Customer => {
                if let Some(staff) = cancelled.staff_id.as_deref() {
                    self.notifier
                        .notify(
                            staff,
                            ActorRole::Staff,
                            "Booking cancelled",
                            &format!("{} at {}", cancelled.service, cancelled.time_text),
                            None,
                        )
                        .await;
                }
            }
            ActorRole::Staff | ActorRole::Shop => {
                if let Some(customer) = cancelled.customer_id.as_deref() {
                    self.notifier
                        .notify(
                            customer,
                            ActorRole::Customer,
                            "Booking cancelled",
                            &format!("{} at {}", cancelled.service, cancelled.time_text),
                            None,
                        )
                        .await;
                }
            }
        }

        Ok(cancelled)
    }

    /// Advances a booking through its lifecycle.
    ///
    /// When `acting_staff` is given, the booking must be assigned to that
    /// staff member. Terminal transitions free the reserved window.
    pub async fn update_status(
        &self,
        id: &str,
        next: BookingStatus,
        acting_staff: Option<&str>,
    ) -> EngineResult<Booking> {
        let booking = self
            .ledger
            .find_by_id(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;

        if let Some(staff) = acting_staff
            && booking.staff_id.as_deref() != Some(staff)
        {
            return Err(EngineError::StaffMismatch {
                staff: staff.to_string(),
                booking: booking.id,
            });
        }

        let previous = booking.status;
        let updated = self.transition(booking, next).await?;

        self.fan_out(
            &updated,
            QueueEvent::BookingStatusChanged {
                booking: updated.clone(),
                previous,
            },
        );
        self.publish_queue(&updated.shop_id, updated.date).await;

        Ok(updated)
    }

    /// Moves a booking to another staff member, or fails with `Conflict`
    /// and leaves it untouched.
    pub async fn reassign_staff(&self, id: &str, new_staff: &str) -> EngineResult<Booking> {
        let booking = self
            .ledger
            .find_by_id(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        let previous_staff = booking.staff_id.clone();

        let moved = self
            .authority
            .reassign(self.ledger.clone(), booking, new_staff.to_string())
            .await?;

        if moved.staff_id != previous_staff {
            self.fan_out(
                &moved,
                QueueEvent::StaffReassigned {
                    booking: moved.clone(),
                    previous_staff,
                },
            );
            self.publish_queue(&moved.shop_id, moved.date).await;

            self.notifier
                .notify(
                    new_staff,
                    ActorRole::Staff,
                    "Booking assigned to you",
                    &format!("{} at {}", moved.service, moved.time_text),
                    Some(&format!("/bookings/{}", moved.id)),
                )
                .await;
        }

        Ok(moved)
    }

    /// Returns the live queue snapshot for a shop and date.
    pub async fn get_queue(
        &self,
        shop_id: &str,
        date: NaiveDate,
    ) -> EngineResult<ShopQueueSnapshot> {
        project(self.ledger.as_ref(), shop_id, date).await
    }

    /// Validates and writes a status transition, releasing the slot key on
    /// terminal statuses.
    ///
    /// The write is a compare-and-set on the status read during
    /// validation; if a concurrent operation got there first, the guard is
    /// re-run against the fresh record. Two racers can therefore never
    /// both move the same booking, and a terminal status is never
    /// overwritten.
    async fn transition(
        &self,
        booking: Booking,
        next: BookingStatus,
    ) -> EngineResult<Booking> {
        let mut current = booking;
        loop {
            if !current.status.can_transition_to(next) {
                // A correct caller never sends these; log as an anomaly.
                warn!(
                    id = %current.id,
                    from = %current.status,
                    to = %next,
                    "Rejected status transition"
                );
                return Err(EngineError::invalid_transition(current.status, next));
            }

            match self
                .ledger
                .update_status(&current.id, current.status, next)
                .await?
            {
                UpdateOutcome::Updated(updated) => {
                    info!(id = %updated.id, from = %current.status, to = %next, "Status changed");

                    if next.is_terminal()
                        && let Some(staff) = updated.staff_id.as_deref()
                    {
                        self.authority.release(staff, updated.date);
                    }

                    return Ok(*updated);
                }
                // Lost the race; validate again from what actually won.
                UpdateOutcome::Mismatch(latest) => current = *latest,
                UpdateOutcome::NotFound => return Err(EngineError::NotFound(current.id)),
            }
        }
    }

    /// Publishes one event to every scope the booking belongs to.
    fn fan_out(&self, booking: &Booking, event: QueueEvent) {
        let mut keys = vec![ChannelKey::shop(booking.shop_id.clone())];
        if let Some(staff) = booking.staff_id.clone() {
            keys.push(ChannelKey::staff(staff));
        }
        if let Some(customer) = booking.customer_id.clone() {
            keys.push(ChannelKey::customer(customer));
        }
        self.hub.publish_all(&keys, &event);
    }

    /// Recomputes and broadcasts the shop's queue snapshot.
    ///
    /// The mutation that triggered this has already landed, so a failed
    /// projection is logged rather than surfaced; subscribers catch up on
    /// the next event.
    async fn publish_queue(&self, shop_id: &str, date: NaiveDate) {
        match project(self.ledger.as_ref(), shop_id, date).await {
            Ok(snapshot) => {
                self.hub.publish(
                    &ChannelKey::shop(shop_id),
                    QueueEvent::QueueUpdated { snapshot },
                );
            }
            Err(err) => {
                warn!(shop = %shop_id, %date, error = %err, "Queue projection failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;
    use crate::notifier::LogNotifier;
    use salonq_core::StaffMember;

    async fn engine_with_roster() -> (SchedulingEngine, Arc<MemoryLedger>) {
        let memory = Arc::new(MemoryLedger::new());
        memory
            .seed_roster(
                "shop-1",
                vec![
                    StaffMember::new("staff-a", "Ada"),
                    StaffMember::new("staff-b", "Bea"),
                ],
            )
            .await;
        let engine = SchedulingEngine::new(
            memory.clone(),
            Arc::new(LogNotifier),
            EngineConfig::default(),
        );
        (engine, memory)
    }

    fn request(key: &str, time: &str) -> NewBooking {
        NewBooking::new(key, "shop-1", "Haircut", "2099-06-01", time, 30)
            .with_customer("cust-1")
            .with_contact("Ada", "+1555")
    }

    #[tokio::test]
    async fn create_assigns_id_and_staff() {
        let (engine, _) = engine_with_roster().await;
        let booking = engine.create_booking(request("cb-1", "2:30 PM")).await.unwrap();

        assert_eq!(booking.id, "bk-1");
        assert_eq!(booking.staff_id.as_deref(), Some("staff-a"));
        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.time_text, "2:30 PM");
    }

    #[tokio::test]
    async fn replayed_request_returns_original() {
        let (engine, memory) = engine_with_roster().await;
        let first = engine.create_booking(request("cb-1", "2:30 PM")).await.unwrap();
        let replay = engine.create_booking(request("cb-1", "2:30 PM")).await.unwrap();

        assert_eq!(replay.id, first.id);
        assert_eq!(memory.all_bookings().await.len(), 1);
    }

    #[tokio::test]
    async fn unparsable_time_is_a_window_error() {
        let (engine, _) = engine_with_roster().await;
        let err = engine
            .create_booking(request("cb-1", "half past never"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Window(_)));
    }

    #[tokio::test]
    async fn cancel_unknown_booking() {
        let (engine, _) = engine_with_roster().await;
        let err = engine
            .cancel_booking("missing", ActorRole::Customer)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn staff_cancel_archives_customer_cancel_cancels() {
        let (engine, _) = engine_with_roster().await;

        let booking = engine.create_booking(request("cb-1", "10:00")).await.unwrap();
        let archived = engine
            .cancel_booking(&booking.id, ActorRole::Staff)
            .await
            .unwrap();
        assert_eq!(archived.status, BookingStatus::Archived);

        let booking = engine.create_booking(request("cb-2", "11:00")).await.unwrap();
        let cancelled = engine
            .cancel_booking(&booking.id, ActorRole::Customer)
            .await
            .unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
    }

    #[tokio::test]
    async fn staff_mismatch_rejected() {
        let (engine, _) = engine_with_roster().await;
        let booking = engine.create_booking(request("cb-1", "10:00")).await.unwrap();

        let err = engine
            .update_status(&booking.id, BookingStatus::Confirmed, Some("staff-b"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::StaffMismatch { .. }));
    }

    #[tokio::test]
    async fn lifecycle_walks_the_transition_table() {
        let (engine, _) = engine_with_roster().await;
        let booking = engine.create_booking(request("cb-1", "10:00")).await.unwrap();

        for next in [
            BookingStatus::Confirmed,
            BookingStatus::InService,
            BookingStatus::Completed,
        ] {
            let updated = engine
                .update_status(&booking.id, next, Some("staff-a"))
                .await
                .unwrap();
            assert_eq!(updated.status, next);
        }
    }
}
