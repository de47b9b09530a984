use std::sync::Arc;

use actix_web::web::{self, Data, JsonConfig, PathConfig, QueryConfig, ServiceConfig};
use actix_web::{App, HttpResponse, HttpServer, ResponseError};
use mongodb::Client;
use tracing::info;
use tracing_actix_web::TracingLogger;

pub mod banner;
pub mod config;
pub mod database;
pub mod display;
pub mod error;
pub mod rotator;
pub mod seed;
pub mod tracker;
pub mod utils;

use crate::config::{Config, DatabaseBackend};
use crate::database::{Database, MemoryDatabase, MongoDatabase};
use crate::error::Error;

/// Registers the extractor error formats and every banner route.
pub fn configure(cfg: &mut ServiceConfig) {
    cfg.app_data(JsonConfig::default().error_handler(|err, _req| {
        // format json errors with custom format
        Error::InvalidJson(err).into()
    }))
    .app_data(PathConfig::default().error_handler(|err, _req| {
        // format path errors with custom format
        Error::InvalidPath(err).into()
    }))
    .app_data(QueryConfig::default().error_handler(|err, _req| {
        // format query errors with custom format
        Error::InvalidQuery(err).into()
    }))
    .service(banner::endpoints::create_banner)
    .service(banner::endpoints::get_banners)
    .service(banner::endpoints::get_banner_stats)
    .service(banner::endpoints::get_banner_by_id)
    .service(banner::endpoints::update_banner)
    .service(banner::endpoints::delete_banner)
    .service(banner::endpoints::set_banner_active)
    .service(banner::endpoints::record_banner_impression)
    .service(banner::endpoints::click_banner)
    .service(banner::endpoints::get_eligible_banners);
}

pub async fn not_found() -> HttpResponse {
    Error::PathNotFound.error_response()
}

pub async fn connect(config: &Config) -> Result<Arc<dyn Database>, Error> {
    let db: Arc<dyn Database> = match config.database.backend {
        DatabaseBackend::Mongo => {
            info!("connecting to db: {}", config.database.uri);
            let client = Client::with_uri_str(&config.database.uri).await?;
            let db = MongoDatabase::initialize(client.database(&config.database.name)).await?;
            Arc::new(db)
        }
        DatabaseBackend::Memory => {
            info!("using in-memory db");
            Arc::new(MemoryDatabase::new())
        }
    };

    Ok(db)
}

pub async fn run(config: Config) -> Result<(), Error> {
    let db = connect(&config).await?;

    if config.seed {
        seed::seed(&*db).await?;
    }

    let db: Data<dyn Database> = Data::from(db);

    info!("listening on {}", config.server.bind_address);
    HttpServer::new(move || {
        App::new()
            .app_data(db.clone())
            .wrap(TracingLogger::default())
            .configure(configure)
            .default_service(web::to(not_found))
    })
    .bind(&config.server.bind_address)?
    .run()
    .await?;

    Ok(())
}
