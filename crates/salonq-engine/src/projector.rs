//! Queue projector.
//!
//! Recomputes the per-staff ordered queue view for a shop and date from
//! ledger state. Pure function of the ledger at call time: no memoization,
//! so a snapshot can never be staler than the read that produced it.

use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::debug;

use salonq_core::{Booking, ShopQueueSnapshot, StaffId, StaffQueue};

use crate::error::EngineResult;
use crate::ledger::Ledger;

/// Projects the live queue snapshot for a shop and date.
///
/// Each active roster member appears, with or without bookings. Bookings
/// whose staff member is no longer on the active roster are excluded, not
/// errored. Archived bookings are terminal and never reach the snapshot.
pub async fn project<L: Ledger + ?Sized>(
    ledger: &L,
    shop_id: &str,
    date: NaiveDate,
) -> EngineResult<ShopQueueSnapshot> {
    let roster = ledger.active_staff(shop_id).await?;
    let bookings = ledger.find_active_by_shop_date(shop_id, date).await?;

    let mut by_staff: HashMap<StaffId, Vec<Booking>> = HashMap::new();
    for booking in bookings {
        if let Some(staff_id) = booking.staff_id.clone() {
            by_staff.entry(staff_id).or_default().push(booking);
        }
    }

    let mut snapshot = ShopQueueSnapshot::new(shop_id, date);
    for member in roster.iter().filter(|m| m.active) {
        let mut list = by_staff.remove(&member.id).unwrap_or_default();
        list.sort_by_key(|b| b.window.start);
        snapshot
            .staff
            .insert(member.id.clone(), StaffQueue::from_sorted(member.name.as_str(), list));
    }

    if !by_staff.is_empty() {
        debug!(
            shop = %shop_id,
            %date,
            orphaned = by_staff.values().map(Vec::len).sum::<usize>(),
            "Excluding bookings assigned to off-roster staff"
        );
    }

    Ok(snapshot)
}
