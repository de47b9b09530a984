//! Picks which banners may be shown in a slot and in what order.

use chrono::{DateTime, Utc};

use crate::database::Database;
use crate::error::Error;

use super::{manager, Banner, Placement};

/// Returns the banners of `placement` that are active and scheduled at `now`,
/// ordered by display order and then by id so repeated calls agree.
pub fn select(banners: Vec<Banner>, placement: Placement, now: DateTime<Utc>) -> Vec<Banner> {
    let mut eligible: Vec<Banner> = banners
        .into_iter()
        .filter(|banner| banner.placement == placement)
        .filter(|banner| banner.is_eligible_at(now))
        .collect();

    eligible.sort_by(|a, b| {
        a.display_order
            .cmp(&b.display_order)
            .then_with(|| a.id.cmp(&b.id))
    });

    eligible
}

#[tracing::instrument(skip(db))]
pub async fn get_eligible_banners(
    db: &dyn Database,
    placement: Placement,
) -> Result<Vec<Banner>, Error> {
    let banners = manager::get_banners_by_placement(db, placement).await?;

    Ok(select(banners, placement, Utc::now()))
}
