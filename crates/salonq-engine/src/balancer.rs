//! Staff load balancer.
//!
//! Picks the staff member with the fewest active bookings on a date. The
//! tie-break is roster order, which keeps assignment deterministic and
//! reproducible. An explicit staff choice passes through unchecked;
//! availability is the reservation authority's call, not ours.

use chrono::NaiveDate;
use tracing::debug;

use salonq_core::StaffId;

use crate::error::{EngineError, EngineResult};
use crate::ledger::Ledger;

/// Picks a staff member for a booking on `date`.
///
/// Returns `NoStaffAvailable` when no explicit choice was made and the
/// shop's active roster is empty.
pub async fn pick_staff<L: Ledger + ?Sized>(
    ledger: &L,
    shop_id: &str,
    date: NaiveDate,
    explicit: Option<&str>,
) -> EngineResult<StaffId> {
    if let Some(staff_id) = explicit {
        debug!(shop = %shop_id, staff = %staff_id, "Explicit staff requested");
        return Ok(staff_id.to_string());
    }

    let roster = ledger.active_staff(shop_id).await?;
    let mut best: Option<(usize, StaffId)> = None;

    for member in roster.iter().filter(|m| m.active) {
        let count = ledger
            .find_active_by_staff_date(&member.id, date)
            .await?
            .len();
        // Strict comparison keeps the earliest roster member on ties.
        if best.as_ref().is_none_or(|(min, _)| count < *min) {
            best = Some((count, member.id.clone()));
        }
    }

    match best {
        Some((count, staff_id)) => {
            debug!(
                shop = %shop_id,
                staff = %staff_id,
                load = count,
                %date,
                "Assigned least-loaded staff"
            );
            Ok(staff_id)
        }
        None => Err(EngineError::no_staff(shop_id)),
    }
}
