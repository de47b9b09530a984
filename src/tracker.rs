use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::banner::{manager, Banner, BannerId};
use crate::database::Database;
use crate::error::Error;

/// Records banner impressions and clicks.
#[async_trait]
pub trait Tracker: Send + Sync {
    async fn record_impression(&self, banner_id: BannerId) -> Result<(), Error>;

    async fn record_click(&self, banner_id: BannerId) -> Result<(), Error>;
}

pub struct StoreTracker {
    db: Arc<dyn Database>,
}

impl StoreTracker {
    pub fn new(db: Arc<dyn Database>) -> StoreTracker {
        StoreTracker { db }
    }
}

#[async_trait]
impl Tracker for StoreTracker {
    async fn record_impression(&self, banner_id: BannerId) -> Result<(), Error> {
        manager::record_impression(&*self.db, banner_id).await
    }

    async fn record_click(&self, banner_id: BannerId) -> Result<(), Error> {
        manager::record_click(&*self.db, banner_id).await
    }
}

/// Records an impression for a banner that just became the displayed one.
/// Failures are logged and dropped.
pub fn on_became_current(tracker: Arc<dyn Tracker>, banner: &Banner) -> JoinHandle<()> {
    let banner_id = banner.id;
    tokio::spawn(async move {
        if let Err(err) = tracker.record_impression(banner_id).await {
            warn!("failed to record impression for {}: {}", banner_id, err);
        }
    })
}

/// Records a click without waiting for it and hands back where the viewer
/// should be sent.
pub fn on_activated(tracker: Arc<dyn Tracker>, banner: &Banner) -> String {
    let banner_id = banner.id;
    tokio::spawn(async move {
        if let Err(err) = tracker.record_click(banner_id).await {
            warn!("failed to record click for {}: {}", banner_id, err);
        }
    });

    banner.target_url.clone()
}
