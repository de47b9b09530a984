use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::{bson, Database};
use tokio::sync::Mutex;

use crate::database::MongoBannerStore;
use crate::error::Error;

use super::{Banner, BannerId, Placement};

pub const BANNERS: &str = "banners";

pub async fn initialize(db: &Database) -> Result<(), Error> {
    db.run_command(
        bson::doc! {
            "createIndexes": BANNERS,
            "indexes": [
                {
                    "key": { "placement": 1, "active": 1, "display_order": 1 },
                    "name": "by_placement"
                },
            ]
        },
        None,
    )
    .await?;

    Ok(())
}

#[async_trait]
pub trait BannerStore: Send + Sync {
    async fn insert_banner(&self, banner: &Banner) -> Result<(), Error>;

    async fn fetch_banners(&self) -> Result<Vec<Banner>, Error>;

    async fn fetch_banners_by_placement(
        &self,
        placement: Placement,
    ) -> Result<Vec<Banner>, Error>;

    async fn fetch_banner_by_id(&self, banner_id: BannerId) -> Result<Option<Banner>, Error>;

    /// Writes the editable fields of `banner`. The stored document must still
    /// carry `banner.modified_at`, otherwise someone else edited it first.
    /// Counters are never written here.
    async fn update_banner(&self, banner: Banner) -> Result<Banner, Error>;

    async fn update_banner_active(&self, banner: Banner, active: bool) -> Result<Banner, Error>;

    async fn delete_banner(&self, banner_id: BannerId) -> Result<bool, Error>;

    async fn increment_impressions(&self, banner_id: BannerId) -> Result<bool, Error>;

    async fn increment_clicks(&self, banner_id: BannerId) -> Result<bool, Error>;
}

/// Explains why a guarded update matched nothing: either the banner is gone
/// or someone else modified it first.
async fn missed_update(store: &MongoBannerStore, banner_id: BannerId) -> Error {
    match store.find_one(bson::doc! { "_id": banner_id }, None).await {
        Ok(Some(_)) => Error::ConcurrentModificationDetected,
        Ok(None) => Error::BannerNotFound { banner_id },
        Err(err) => err.into(),
    }
}

#[async_trait]
impl BannerStore for MongoBannerStore {
    #[tracing::instrument(skip(self))]
    async fn insert_banner(&self, banner: &Banner) -> Result<(), Error> {
        self.insert_one(banner, None).await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_banners(&self) -> Result<Vec<Banner>, Error> {
        let banners: Vec<Banner> = self.find(bson::doc! {}, None).await?.try_collect().await?;

        Ok(banners)
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_banners_by_placement(
        &self,
        placement: Placement,
    ) -> Result<Vec<Banner>, Error> {
        let banners: Vec<Banner> = self
            .find(bson::doc! { "placement": placement }, None)
            .await?
            .try_collect()
            .await?;

        Ok(banners)
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_banner_by_id(&self, banner_id: BannerId) -> Result<Option<Banner>, Error> {
        let banner: Option<Banner> = self.find_one(bson::doc! { "_id": banner_id }, None).await?;

        Ok(banner)
    }

    #[tracing::instrument(skip(self))]
    async fn update_banner(&self, mut banner: Banner) -> Result<Banner, Error> {
        let now = Utc::now();
        let old_modified_at = bson::DateTime::from_chrono(banner.modified_at);
        let new_modified_at = bson::DateTime::from_chrono(now);
        let new_kind = bson::to_bson(&banner.kind)?;

        let result = self
            .update_one(
                bson::doc! { "_id": banner.id, "modified_at": old_modified_at },
                bson::doc! { "$set": {
                    "title": banner.title.clone(),
                    "description": banner.description.clone(),
                    "image_url": banner.image_url.clone(),
                    "target_url": banner.target_url.clone(),
                    "placement": banner.placement,
                    "kind": new_kind,
                    "display_order": banner.display_order,
                    "start_date": banner.start_date.map(bson::DateTime::from_chrono),
                    "end_date": banner.end_date.map(bson::DateTime::from_chrono),
                    "tags": banner.tags.clone(),
                    "modified_at": new_modified_at,
                } },
                None,
            )
            .await?;

        if result.matched_count == 0 {
            return Err(missed_update(self, banner.id).await);
        }

        banner.modified_at = now;

        Ok(banner)
    }

    #[tracing::instrument(skip(self))]
    async fn update_banner_active(
        &self,
        mut banner: Banner,
        active: bool,
    ) -> Result<Banner, Error> {
        let now = Utc::now();
        let old_modified_at = bson::DateTime::from_chrono(banner.modified_at);
        let new_modified_at = bson::DateTime::from_chrono(now);

        let result = self
            .update_one(
                bson::doc! { "_id": banner.id, "modified_at": old_modified_at },
                bson::doc! { "$set": { "active": active, "modified_at": new_modified_at } },
                None,
            )
            .await?;

        if result.matched_count == 0 {
            return Err(missed_update(self, banner.id).await);
        }

        banner.modified_at = now;
        banner.active = active;

        Ok(banner)
    }

    #[tracing::instrument(skip(self))]
    async fn delete_banner(&self, banner_id: BannerId) -> Result<bool, Error> {
        let result = self.delete_one(bson::doc! { "_id": banner_id }, None).await?;

        Ok(result.deleted_count > 0)
    }

    #[tracing::instrument(skip(self))]
    async fn increment_impressions(&self, banner_id: BannerId) -> Result<bool, Error> {
        let result = self
            .update_one(
                bson::doc! { "_id": banner_id },
                bson::doc! { "$inc": { "impressions": 1i64 } },
                None,
            )
            .await?;

        Ok(result.matched_count > 0)
    }

    #[tracing::instrument(skip(self))]
    async fn increment_clicks(&self, banner_id: BannerId) -> Result<bool, Error> {
        let result = self
            .update_one(
                bson::doc! { "_id": banner_id },
                bson::doc! { "$inc": { "clicks": 1i64 } },
                None,
            )
            .await?;

        Ok(result.matched_count > 0)
    }
}

/// Keeps banners in process memory. Every operation holds the lock for its
/// whole read-modify-write, so counter increments are never lost.
#[derive(Debug, Clone, Default)]
pub struct MemoryBannerStore {
    banners: Arc<Mutex<BTreeMap<BannerId, Banner>>>,
}

impl MemoryBannerStore {
    pub fn new() -> MemoryBannerStore {
        MemoryBannerStore::default()
    }

    pub async fn clear(&self) {
        self.banners.lock().await.clear();
    }
}

#[async_trait]
impl BannerStore for MemoryBannerStore {
    #[tracing::instrument(skip(self))]
    async fn insert_banner(&self, banner: &Banner) -> Result<(), Error> {
        let mut banners = self.banners.lock().await;
        if banners.contains_key(&banner.id) {
            return Err(Error::ExistentialState(format!(
                "banner {} already exists",
                banner.id
            )));
        }

        banners.insert(banner.id, banner.clone());

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_banners(&self) -> Result<Vec<Banner>, Error> {
        let banners = self.banners.lock().await;

        Ok(banners.values().cloned().collect())
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_banners_by_placement(
        &self,
        placement: Placement,
    ) -> Result<Vec<Banner>, Error> {
        let banners = self.banners.lock().await;

        Ok(banners
            .values()
            .filter(|banner| banner.placement == placement)
            .cloned()
            .collect())
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_banner_by_id(&self, banner_id: BannerId) -> Result<Option<Banner>, Error> {
        let banners = self.banners.lock().await;

        Ok(banners.get(&banner_id).cloned())
    }

    #[tracing::instrument(skip(self))]
    async fn update_banner(&self, mut banner: Banner) -> Result<Banner, Error> {
        let mut banners = self.banners.lock().await;
        let stored = match banners.get_mut(&banner.id) {
            Some(stored) if stored.modified_at == banner.modified_at => stored,
            Some(_) => return Err(Error::ConcurrentModificationDetected),
            None => {
                return Err(Error::BannerNotFound {
                    banner_id: banner.id,
                })
            }
        };

        let now = Utc::now();
        stored.title = banner.title.clone();
        stored.description = banner.description.clone();
        stored.image_url = banner.image_url.clone();
        stored.target_url = banner.target_url.clone();
        stored.placement = banner.placement;
        stored.kind = banner.kind;
        stored.display_order = banner.display_order;
        stored.start_date = banner.start_date;
        stored.end_date = banner.end_date;
        stored.tags = banner.tags.clone();
        stored.modified_at = now;

        banner.modified_at = now;

        Ok(banner)
    }

    #[tracing::instrument(skip(self))]
    async fn update_banner_active(
        &self,
        mut banner: Banner,
        active: bool,
    ) -> Result<Banner, Error> {
        let mut banners = self.banners.lock().await;
        let stored = match banners.get_mut(&banner.id) {
            Some(stored) if stored.modified_at == banner.modified_at => stored,
            Some(_) => return Err(Error::ConcurrentModificationDetected),
            None => {
                return Err(Error::BannerNotFound {
                    banner_id: banner.id,
                })
            }
        };

        let now = Utc::now();
        stored.active = active;
        stored.modified_at = now;

        banner.active = active;
        banner.modified_at = now;

        Ok(banner)
    }

    #[tracing::instrument(skip(self))]
    async fn delete_banner(&self, banner_id: BannerId) -> Result<bool, Error> {
        let mut banners = self.banners.lock().await;

        Ok(banners.remove(&banner_id).is_some())
    }

    #[tracing::instrument(skip(self))]
    async fn increment_impressions(&self, banner_id: BannerId) -> Result<bool, Error> {
        let mut banners = self.banners.lock().await;
        match banners.get_mut(&banner_id) {
            Some(banner) => {
                banner.impressions += 1;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn increment_clicks(&self, banner_id: BannerId) -> Result<bool, Error> {
        let mut banners = self.banners.lock().await;
        match banners.get_mut(&banner_id) {
            Some(banner) => {
                banner.clicks += 1;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
