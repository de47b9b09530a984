use async_trait::async_trait;
use mongodb::{bson, Collection};

use crate::banner::db::{self as banner_db, BannerStore, MemoryBannerStore, BANNERS};
use crate::banner::Banner;
use crate::error::Error;

pub type MongoBannerStore = Collection<Banner>;

#[async_trait]
pub trait Database: Send + Sync {
    fn banners(&self) -> &dyn BannerStore;

    /// Removes every stored banner. Collections and their indexes stay.
    async fn clear(&self) -> Result<(), Error>;
}

#[derive(Debug, Clone)]
pub struct MongoDatabase {
    banners: MongoBannerStore,
}

impl MongoDatabase {
    /// Checks the connection is alive and makes sure the indexes exist.
    pub async fn initialize(db: mongodb::Database) -> Result<MongoDatabase, Error> {
        db.run_command(bson::doc! { "ping": 1 }, None).await?;
        banner_db::initialize(&db).await?;

        Ok(MongoDatabase {
            banners: db.collection(BANNERS),
        })
    }
}

#[async_trait]
impl Database for MongoDatabase {
    fn banners(&self) -> &dyn BannerStore {
        &self.banners
    }

    async fn clear(&self) -> Result<(), Error> {
        self.banners.delete_many(bson::doc! {}, None).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    banners: MemoryBannerStore,
}

impl MemoryDatabase {
    pub fn new() -> MemoryDatabase {
        MemoryDatabase::default()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    fn banners(&self) -> &dyn BannerStore {
        &self.banners
    }

    async fn clear(&self) -> Result<(), Error> {
        self.banners.clear().await;
        Ok(())
    }
}
