//! End-to-end scenarios through the engine facade.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tokio::sync::broadcast::error::TryRecvError;

use salonq_core::{ActorRole, Booking, BookingStatus, NewBooking, StaffMember, Window};
use salonq_engine::{
    ChannelKey, EngineConfig, EngineError, Ledger, LogNotifier, MemoryLedger, QueueEvent,
    ReminderConfig, SchedulingEngine,
};

async fn engine_with_roster() -> (Arc<SchedulingEngine>, Arc<MemoryLedger>) {
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
    (Arc::new(engine), memory)
}

fn request(key: &str, time: &str, minutes: i64) -> NewBooking {
    NewBooking::new(key, "shop-1", "Haircut", "2099-06-01", time, minutes)
        .with_customer("cust-1")
        .with_contact("Ada Lovelace", "+15550100")
        .with_price(2500)
}

#[tokio::test]
async fn concurrent_overlapping_requests_one_wins() {
    let (engine, memory) = engine_with_roster().await;

    // 14:00-14:30 and 14:15-14:45 for the same staff member overlap.
    let mut handles = Vec::new();
    for (key, time) in [("cb-1", "2:00 PM"), ("cb-2", "2:15 PM")] {
        let engine = engine.clone();
        let req = request(key, time, 30).with_staff("staff-a");
        handles.push(tokio::spawn(async move { engine.create_booking(req).await }));
    }

    let mut wins = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => wins += 1,
            Err(EngineError::Conflict { .. }) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(wins, 1);
    assert_eq!(conflicts, 1);
    assert_eq!(memory.all_bookings().await.len(), 1);
}

#[tokio::test]
async fn concurrent_replays_persist_exactly_one_booking() {
    let (engine, memory) = engine_with_roster().await;

    let mut handles = Vec::new();
    for _ in 0..4 {
        let engine = engine.clone();
        let req = request("cb-same", "10:00", 30).with_staff("staff-a");
        handles.push(tokio::spawn(async move { engine.create_booking(req).await }));
    }

    // Every caller gets the same booking back, as a success.
    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap().id);
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);
    assert_eq!(memory.all_bookings().await.len(), 1);
}

#[tokio::test]
async fn cancelled_window_can_be_rebooked() {
    let (engine, _) = engine_with_roster().await;

    let first = engine
        .create_booking(request("cb-1", "2:00 PM", 30).with_staff("staff-a"))
        .await
        .unwrap();
    engine
        .cancel_booking(&first.id, ActorRole::Customer)
        .await
        .unwrap();

    // Identical window, same staff member: free again.
    let second = engine
        .create_booking(request("cb-2", "2:00 PM", 30).with_staff("staff-a"))
        .await
        .unwrap();
    assert_eq!(second.window, first.window);
    assert_eq!(second.status, BookingStatus::Pending);
}

#[tokio::test]
async fn load_balancer_spreads_and_tie_breaks_by_roster_order() {
    let (engine, _) = engine_with_roster().await;

    let first = engine.create_booking(request("cb-1", "9:00", 30)).await.unwrap();
    assert_eq!(first.staff_id.as_deref(), Some("staff-a"));

    let second = engine.create_booking(request("cb-2", "9:00", 30)).await.unwrap();
    assert_eq!(second.staff_id.as_deref(), Some("staff-b"));

    // Even load again: back to the first roster member.
    let third = engine.create_booking(request("cb-3", "10:00", 30)).await.unwrap();
    assert_eq!(third.staff_id.as_deref(), Some("staff-a"));
}

#[tokio::test]
async fn past_window_rejected() {
    let (engine, memory) = engine_with_roster().await;

    let req = NewBooking::new("cb-1", "shop-1", "Haircut", "2000-01-01", "10:00", 30)
        .with_staff("staff-a");
    let err = engine.create_booking(req).await.unwrap_err();
    assert!(matches!(err, EngineError::PastWindow));
    assert!(memory.all_bookings().await.is_empty());
}

#[tokio::test]
async fn cancelling_a_completed_booking_is_rejected_and_state_unchanged() {
    let (engine, memory) = engine_with_roster().await;

    let booking = engine
        .create_booking(request("cb-1", "10:00", 30).with_staff("staff-a"))
        .await
        .unwrap();
    for next in [
        BookingStatus::Confirmed,
        BookingStatus::InService,
        BookingStatus::Completed,
    ] {
        engine
            .update_status(&booking.id, next, Some("staff-a"))
            .await
            .unwrap();
    }

    let err = engine
        .cancel_booking(&booking.id, ActorRole::Customer)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { .. }));

    let stored = memory.find_by_id(&booking.id).await.unwrap().unwrap();
    assert_eq!(stored.status, BookingStatus::Completed);
}

#[tokio::test]
async fn shop_channel_sees_lifecycle_and_queue_events_in_order() {
    let (engine, _) = engine_with_roster().await;
    let mut rx = engine.subscribe(ChannelKey::shop("shop-1"));

    let booking = engine
        .create_booking(request("cb-1", "10:00", 30).with_staff("staff-a"))
        .await
        .unwrap();

    match rx.recv().await.unwrap() {
        QueueEvent::BookingCreated { booking: created } => assert_eq!(created.id, booking.id),
        other => panic!("unexpected event: {other:?}"),
    }
    match rx.recv().await.unwrap() {
        QueueEvent::QueueUpdated { snapshot } => {
            assert_eq!(snapshot.total_bookings(), 1);
            let queue = snapshot.staff_queue("staff-a").unwrap();
            assert_eq!(queue.current.as_ref().map(|b| b.id.as_str()), Some(booking.id.as_str()));
        }
        other => panic!("unexpected event: {other:?}"),
    }

    engine
        .update_status(&booking.id, BookingStatus::Confirmed, Some("staff-a"))
        .await
        .unwrap();
    match rx.recv().await.unwrap() {
        QueueEvent::BookingStatusChanged { booking, previous } => {
            assert_eq!(booking.status, BookingStatus::Confirmed);
            assert_eq!(previous, BookingStatus::Pending);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn customer_channel_only_sees_own_bookings() {
    let (engine, _) = engine_with_roster().await;
    let mut rx = engine.subscribe(ChannelKey::customer("cust-1"));

    engine
        .create_booking(request("cb-1", "10:00", 30))
        .await
        .unwrap();
    let other = NewBooking::new("cb-2", "shop-1", "Shave", "2099-06-01", "11:00", 15)
        .with_customer("cust-2");
    engine.create_booking(other).await.unwrap();

    match rx.recv().await.unwrap() {
        QueueEvent::BookingCreated { booking } => {
            assert_eq!(booking.customer_id.as_deref(), Some("cust-1"));
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn reassign_conflict_leaves_booking_with_original_staff() {
    let (engine, memory) = engine_with_roster().await;

    let booking = engine
        .create_booking(request("cb-1", "2:00 PM", 30).with_staff("staff-a"))
        .await
        .unwrap();
    engine
        .create_booking(request("cb-2", "2:15 PM", 30).with_staff("staff-b"))
        .await
        .unwrap();

    let err = engine.reassign_staff(&booking.id, "staff-b").await.unwrap_err();
    assert!(matches!(err, EngineError::Conflict { .. }));

    let stored = memory.find_by_id(&booking.id).await.unwrap().unwrap();
    assert_eq!(stored.staff_id.as_deref(), Some("staff-a"));
}

#[tokio::test]
async fn reassign_publishes_and_frees_the_old_slot() {
    let (engine, _) = engine_with_roster().await;
    let mut rx = engine.subscribe(ChannelKey::staff("staff-b"));

    let booking = engine
        .create_booking(request("cb-1", "2:00 PM", 30).with_staff("staff-a"))
        .await
        .unwrap();
    let moved = engine.reassign_staff(&booking.id, "staff-b").await.unwrap();
    assert_eq!(moved.staff_id.as_deref(), Some("staff-b"));

    match rx.recv().await.unwrap() {
        QueueEvent::StaffReassigned { previous_staff, .. } => {
            assert_eq!(previous_staff.as_deref(), Some("staff-a"));
        }
        other => panic!("unexpected event: {other:?}"),
    }

    // The original staff member's window is free again.
    engine
        .create_booking(request("cb-2", "2:00 PM", 30).with_staff("staff-a"))
        .await
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn reminder_fires_at_most_once_across_repeated_sweeps() {
    let memory = Arc::new(MemoryLedger::new());
    memory
        .seed_roster("shop-1", vec![StaffMember::new("staff-a", "Ada")])
        .await;

    // Starts inside the default 10-15 minute lookahead band.
    let start = Utc::now() + chrono::Duration::minutes(12);
    let req = NewBooking::new("cb-1", "shop-1", "Haircut", "2099-06-01", "x", 30)
        .with_customer("cust-1");
    let booking = Booking::from_request(
        &req,
        "bk-1",
        "staff-a".to_string(),
        Window::from_start(start, 30),
        Utc::now(),
    );
    memory.insert_if_absent(booking).await.unwrap();

    let config = EngineConfig::default()
        .with_reminders(ReminderConfig::default().with_sweep_interval(Duration::from_secs(3600)));
    let engine = SchedulingEngine::new(memory.clone(), Arc::new(LogNotifier), config);
    let mut rx = engine.subscribe(ChannelKey::customer("cust-1"));

    let handle = engine.spawn_reminders();
    for _ in 0..3 {
        handle.sweep_now().await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    match rx.recv().await.unwrap() {
        QueueEvent::Reminder { booking_id, starts_at } => {
            assert_eq!(booking_id, "bk-1");
            assert_eq!(starts_at, start);
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn racing_terminal_transitions_exactly_one_wins() {
    let (engine, memory) = engine_with_roster().await;

    let booking = engine
        .create_booking(request("cb-1", "10:00", 30).with_staff("staff-a"))
        .await
        .unwrap();
    for next in [BookingStatus::Confirmed, BookingStatus::InService] {
        engine
            .update_status(&booking.id, next, Some("staff-a"))
            .await
            .unwrap();
    }

    // Complete and cancel race from the same pre-state; whichever lands
    // first makes the booking terminal and the other must be rejected.
    let complete = {
        let engine = engine.clone();
        let id = booking.id.clone();
        tokio::spawn(async move {
            engine
                .update_status(&id, BookingStatus::Completed, Some("staff-a"))
                .await
        })
    };
    let cancel = {
        let engine = engine.clone();
        let id = booking.id.clone();
        tokio::spawn(async move { engine.cancel_booking(&id, ActorRole::Customer).await })
    };

    let mut wins = Vec::new();
    let mut rejections = 0;
    for result in [complete.await.unwrap(), cancel.await.unwrap()] {
        match result {
            Ok(updated) => wins.push(updated.status),
            Err(EngineError::InvalidTransition { from, .. }) => {
                assert!(from.is_terminal());
                rejections += 1;
            }
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(wins.len(), 1);
    assert_eq!(rejections, 1);

    // The loser did not overwrite the winner's terminal status.
    let stored = memory.find_by_id(&booking.id).await.unwrap().unwrap();
    assert_eq!(stored.status, wins[0]);
}

#[tokio::test]
async fn queue_snapshot_reflects_terminal_transitions() {
    let (engine, _) = engine_with_roster().await;
    let date = NaiveDate::from_ymd_opt(2099, 6, 1).unwrap();

    let first = engine
        .create_booking(request("cb-1", "9:00", 30).with_staff("staff-a"))
        .await
        .unwrap();
    engine
        .create_booking(request("cb-2", "10:00", 30).with_staff("staff-a"))
        .await
        .unwrap();

    let snapshot = engine.get_queue("shop-1", date).await.unwrap();
    assert_eq!(snapshot.total_bookings(), 2);
    assert_eq!(
        snapshot
            .staff_queue("staff-a")
            .unwrap()
            .current
            .as_ref()
            .map(|b| b.id.as_str()),
        Some(first.id.as_str())
    );

    engine
        .cancel_booking(&first.id, ActorRole::Shop)
        .await
        .unwrap();

    let snapshot = engine.get_queue("shop-1", date).await.unwrap();
    let queue = snapshot.staff_queue("staff-a").unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.current.as_ref().map(|b| b.id.as_str()), Some("bk-2"));
}
