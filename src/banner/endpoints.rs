use std::sync::Arc;

use actix_web::http::header::LOCATION;
use actix_web::web::{Data, Json, Path, Query};
use actix_web::{delete, get, patch, post, put, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::database::Database;
use crate::error::Error;
use crate::tracker::{self, StoreTracker, Tracker};
use crate::utils::{deserialize_some, SuccessBody};

use super::manager::{self, BannerChanges, NewBanner, PlacementStats};
use super::{selector, Banner, BannerId, BannerKind, BannerStyle, Placement};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CreateBannerBody {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub target_url: Option<String>,
    pub placement: Option<String>,
    pub kind: Option<BannerKind>,
    pub active: Option<bool>,
    pub display_order: Option<i32>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl From<CreateBannerBody> for NewBanner {
    fn from(body: CreateBannerBody) -> NewBanner {
        NewBanner {
            title: body.title,
            description: body.description,
            image_url: body.image_url,
            target_url: body.target_url,
            placement: body.placement,
            kind: body.kind,
            active: body.active,
            display_order: body.display_order,
            start_date: body.start_date,
            end_date: body.end_date,
            created_by: body.created_by,
            tags: body.tags,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct UpdateBannerBody {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub image_url: Option<Option<String>>,
    pub target_url: Option<String>,
    pub placement: Option<String>,
    pub kind: Option<BannerKind>,
    pub display_order: Option<i32>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub start_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub end_date: Option<Option<DateTime<Utc>>>,
    pub tags: Option<Vec<String>>,
}

impl From<UpdateBannerBody> for BannerChanges {
    fn from(body: UpdateBannerBody) -> BannerChanges {
        BannerChanges {
            title: body.title,
            description: body.description,
            image_url: body.image_url,
            target_url: body.target_url,
            placement: body.placement,
            kind: body.kind,
            display_order: body.display_order,
            start_date: body.start_date,
            end_date: body.end_date,
            tags: body.tags,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SetActiveBody {
    pub active: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct BannerListQuery {
    pub placement: Option<Placement>,
}

#[derive(Clone, Debug, Serialize)]
pub struct BannerBody {
    pub id: BannerId,
    pub title: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub target_url: String,
    pub placement: Placement,
    pub kind: BannerKind,
    pub style: BannerStyle,
    pub active: bool,
    pub display_order: i32,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub clicks: i64,
    pub impressions: i64,
    pub created_by: Option<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl BannerBody {
    pub fn render(banner: Banner) -> BannerBody {
        BannerBody {
            id: banner.id,
            title: banner.title,
            description: banner.description,
            image_url: banner.image_url,
            target_url: banner.target_url,
            placement: banner.placement,
            kind: banner.kind,
            style: banner.kind.style(),
            active: banner.active,
            display_order: banner.display_order,
            start_date: banner.start_date,
            end_date: banner.end_date,
            clicks: banner.clicks,
            impressions: banner.impressions,
            created_by: banner.created_by,
            tags: banner.tags,
            created_at: banner.created_at,
            modified_at: banner.modified_at,
        }
    }
}

#[post("/banners")]
#[tracing::instrument(skip(db))]
pub async fn create_banner(
    db: Data<dyn Database>,
    body: Json<CreateBannerBody>,
) -> Result<Json<BannerBody>, Error> {
    let body = body.into_inner();

    let banner = manager::create_banner(&**db, body.into()).await?;

    Ok(Json(BannerBody::render(banner)))
}

#[get("/banners")]
#[tracing::instrument(skip(db))]
pub async fn get_banners(
    db: Data<dyn Database>,
    query: Query<BannerListQuery>,
) -> Result<Json<Vec<BannerBody>>, Error> {
    let banners = match query.into_inner().placement {
        Some(placement) => manager::get_banners_by_placement(&**db, placement).await?,
        None => manager::get_banners(&**db).await?,
    };

    let body = banners.into_iter().map(BannerBody::render).collect();

    Ok(Json(body))
}

#[get("/banners/stats")]
#[tracing::instrument(skip(db))]
pub async fn get_banner_stats(db: Data<dyn Database>) -> Result<Json<Vec<PlacementStats>>, Error> {
    let stats = manager::get_banner_stats(&**db).await?;

    Ok(Json(stats))
}

#[get("/banners/{banner_id}")]
#[tracing::instrument(skip(db))]
pub async fn get_banner_by_id(
    db: Data<dyn Database>,
    params: Path<BannerId>,
) -> Result<Json<BannerBody>, Error> {
    let banner_id = params.into_inner();

    let banner = manager::expect_banner_by_id(&**db, banner_id).await?;

    Ok(Json(BannerBody::render(banner)))
}

#[patch("/banners/{banner_id}")]
#[tracing::instrument(skip(db))]
pub async fn update_banner(
    db: Data<dyn Database>,
    params: Path<BannerId>,
    body: Json<UpdateBannerBody>,
) -> Result<Json<BannerBody>, Error> {
    let banner_id = params.into_inner();
    let body = body.into_inner();

    let banner = manager::update_banner(&**db, banner_id, body.into()).await?;

    Ok(Json(BannerBody::render(banner)))
}

#[delete("/banners/{banner_id}")]
#[tracing::instrument(skip(db))]
pub async fn delete_banner(
    db: Data<dyn Database>,
    params: Path<BannerId>,
) -> Result<Json<SuccessBody>, Error> {
    let banner_id = params.into_inner();

    manager::delete_banner(&**db, banner_id).await?;

    Ok(Json(SuccessBody {}))
}

#[put("/banners/{banner_id}/active")]
#[tracing::instrument(skip(db))]
pub async fn set_banner_active(
    db: Data<dyn Database>,
    params: Path<BannerId>,
    body: Json<SetActiveBody>,
) -> Result<Json<BannerBody>, Error> {
    let banner_id = params.into_inner();
    let body = body.into_inner();

    let banner = manager::set_banner_active(&**db, banner_id, body.active).await?;

    Ok(Json(BannerBody::render(banner)))
}

#[post("/banners/{banner_id}/impressions")]
#[tracing::instrument(skip(db))]
pub async fn record_banner_impression(
    db: Data<dyn Database>,
    params: Path<BannerId>,
) -> Result<Json<SuccessBody>, Error> {
    let banner_id = params.into_inner();

    match manager::record_impression(&**db, banner_id).await {
        Ok(()) => {}
        Err(err @ Error::BannerNotFound { .. }) => return Err(err),
        Err(err) => warn!("failed to record impression for {}: {}", banner_id, err),
    }

    Ok(Json(SuccessBody {}))
}

#[get("/banners/{banner_id}/click")]
#[tracing::instrument(skip(db))]
pub async fn click_banner(
    db: Data<dyn Database>,
    params: Path<BannerId>,
) -> Result<HttpResponse, Error> {
    let banner_id = params.into_inner();

    let banner = manager::expect_banner_by_id(&**db, banner_id).await?;

    let tracker: Arc<dyn Tracker> = Arc::new(StoreTracker::new(db.into_inner()));
    let target_url = tracker::on_activated(tracker, &banner);

    Ok(HttpResponse::Found()
        .insert_header((LOCATION, target_url))
        .finish())
}

#[get("/placements/{placement}/banners")]
#[tracing::instrument(skip(db))]
pub async fn get_eligible_banners(
    db: Data<dyn Database>,
    params: Path<Placement>,
) -> Result<Json<Vec<BannerBody>>, Error> {
    let placement = params.into_inner();

    let banners = selector::get_eligible_banners(&**db, placement).await?;

    let body = banners.into_iter().map(BannerBody::render).collect();

    Ok(Json(body))
}

#[cfg(test)]
mod tests {
    use std::io::ErrorKind;
    use std::sync::atomic::{AtomicBool, Ordering};

    use actix_web::http::StatusCode;
    use actix_web::{test, App};

    use super::*;
    use crate::banner::test::banner;
    use crate::database::test::MockDatabase;
    use crate::tracker::test::settle;

    #[actix_web::test]
    async fn click_redirects_even_if_recording_fails() {
        let mut db = MockDatabase::new();
        let existing = banner(Placement::Top, true, 0);
        let existing_clone = existing.clone();
        db.banners.on_fetch_banner_by_id = Box::new(move |_| Ok(Some(existing_clone.clone())));
        let called_increment = Arc::new(AtomicBool::new(false));
        let called_increment_clone = Arc::clone(&called_increment);
        db.banners.on_increment_clicks = Box::new(move |_| {
            called_increment_clone.store(true, Ordering::SeqCst);
            Err(std::io::Error::from(ErrorKind::ConnectionReset).into())
        });
        let db: Arc<dyn Database> = Arc::new(db);
        let app =
            test::init_service(App::new().app_data(Data::from(db)).service(click_banner)).await;

        let req = test::TestRequest::get()
            .uri(&format!("/banners/{}/click", existing.id))
            .to_request();
        let resp = test::call_service(&app, req).await;
        settle().await;

        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(
            resp.headers().get(LOCATION).unwrap(),
            existing.target_url.as_str()
        );
        assert!(
            called_increment.load(Ordering::SeqCst),
            "db.increment_clicks was not called"
        );
    }
}
