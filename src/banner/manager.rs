use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use url::Url;

use crate::database::Database;
use crate::error::Error;

use super::{Banner, BannerId, BannerKind, Placement};

/// Fields supplied when creating a banner. Required fields are optional here
/// so that a missing one is reported as a validation failure.
#[derive(Clone, Debug, Default)]
pub struct NewBanner {
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
    pub tags: Vec<String>,
}

/// A partial edit. For nullable fields the outer `Option` says whether the
/// field is being changed and the inner one carries the new value.
#[derive(Clone, Debug, Default)]
pub struct BannerChanges {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub image_url: Option<Option<String>>,
    pub target_url: Option<String>,
    pub placement: Option<String>,
    pub kind: Option<BannerKind>,
    pub display_order: Option<i32>,
    pub start_date: Option<Option<DateTime<Utc>>>,
    pub end_date: Option<Option<DateTime<Utc>>>,
    pub tags: Option<Vec<String>>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlacementStats {
    pub placement: Placement,
    pub banners: u32,
    pub active_banners: u32,
    pub impressions: i64,
    pub clicks: i64,
    pub click_through_rate: f64,
}

fn invalid(field: &'static str, reason: &'static str) -> Error {
    Error::InvalidBanner { field, reason }
}

fn parse_placement(placement: &str) -> Result<Placement, Error> {
    placement
        .parse()
        .map_err(|_| invalid("placement", "must be one of left, right, top, bottom, inline"))
}

fn validate_url(field: &'static str, value: &str) -> Result<(), Error> {
    let url = Url::parse(value.trim()).map_err(|_| invalid(field, "must be an absolute url"))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        _ => Err(invalid(field, "must use http or https")),
    }
}

fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut tags: Vec<String> = tags
        .into_iter()
        .map(|tag| tag.trim().to_string())
        .filter(|tag| !tag.is_empty())
        .collect();
    tags.sort();
    tags.dedup();
    tags
}

/// Checks the invariants every stored banner must hold.
fn validate(banner: &Banner) -> Result<(), Error> {
    if banner.title.trim().is_empty() {
        return Err(invalid("title", "must not be empty"));
    }
    validate_url("target_url", &banner.target_url)?;
    if let Some(image_url) = &banner.image_url {
        validate_url("image_url", image_url)?;
    }
    if banner.display_order < 0 {
        return Err(invalid("display_order", "must not be negative"));
    }
    if let (Some(start), Some(end)) = (banner.start_date, banner.end_date) {
        if start > end {
            return Err(invalid("start_date", "must not be after end_date"));
        }
    }

    Ok(())
}

#[tracing::instrument(skip(db))]
pub async fn create_banner(db: &dyn Database, fields: NewBanner) -> Result<Banner, Error> {
    let title = fields.title.ok_or_else(|| invalid("title", "is required"))?;
    let target_url = fields
        .target_url
        .ok_or_else(|| invalid("target_url", "is required"))?;
    let placement = fields
        .placement
        .ok_or_else(|| invalid("placement", "is required"))?;
    let placement = parse_placement(&placement)?;

    let now = Utc::now();
    let banner = Banner {
        id: BannerId::new(),
        title: title.trim().to_string(),
        description: fields.description,
        image_url: fields.image_url,
        target_url: target_url.trim().to_string(),
        placement,
        kind: fields.kind.unwrap_or_default(),
        active: fields.active.unwrap_or(true),
        display_order: fields.display_order.unwrap_or(0),
        start_date: fields.start_date,
        end_date: fields.end_date,
        clicks: 0,
        impressions: 0,
        created_by: fields.created_by,
        tags: normalize_tags(fields.tags),
        created_at: now,
        modified_at: now,
    };
    validate(&banner)?;

    db.banners().insert_banner(&banner).await?;

    Ok(banner)
}

#[tracing::instrument(skip(db))]
pub async fn get_banners(db: &dyn Database) -> Result<Vec<Banner>, Error> {
    let banners = db.banners().fetch_banners().await?;

    Ok(banners)
}

#[tracing::instrument(skip(db))]
pub async fn get_banners_by_placement(
    db: &dyn Database,
    placement: Placement,
) -> Result<Vec<Banner>, Error> {
    let banners = db.banners().fetch_banners_by_placement(placement).await?;

    Ok(banners)
}

#[tracing::instrument(skip(db))]
pub async fn get_banner_by_id(
    db: &dyn Database,
    banner_id: BannerId,
) -> Result<Option<Banner>, Error> {
    let banner = db.banners().fetch_banner_by_id(banner_id).await?;

    Ok(banner)
}

#[tracing::instrument(skip(db))]
pub async fn expect_banner_by_id(db: &dyn Database, banner_id: BannerId) -> Result<Banner, Error> {
    get_banner_by_id(db, banner_id)
        .await?
        .ok_or(Error::BannerNotFound { banner_id })
}

#[tracing::instrument(skip(db))]
pub async fn update_banner(
    db: &dyn Database,
    banner_id: BannerId,
    changes: BannerChanges,
) -> Result<Banner, Error> {
    let mut banner = expect_banner_by_id(db, banner_id).await?;

    if let Some(title) = changes.title {
        banner.title = title.trim().to_string();
    }
    if let Some(description) = changes.description {
        banner.description = description;
    }
    if let Some(image_url) = changes.image_url {
        banner.image_url = image_url;
    }
    if let Some(target_url) = changes.target_url {
        banner.target_url = target_url.trim().to_string();
    }
    if let Some(placement) = changes.placement {
        banner.placement = parse_placement(&placement)?;
    }
    if let Some(kind) = changes.kind {
        banner.kind = kind;
    }
    if let Some(display_order) = changes.display_order {
        banner.display_order = display_order;
    }
    if let Some(start_date) = changes.start_date {
        banner.start_date = start_date;
    }
    if let Some(end_date) = changes.end_date {
        banner.end_date = end_date;
    }
    if let Some(tags) = changes.tags {
        banner.tags = normalize_tags(tags);
    }
    validate(&banner)?;

    let banner = db.banners().update_banner(banner).await?;

    Ok(banner)
}

#[tracing::instrument(skip(db))]
pub async fn set_banner_active(
    db: &dyn Database,
    banner_id: BannerId,
    active: bool,
) -> Result<Banner, Error> {
    let banner = expect_banner_by_id(db, banner_id).await?;
    if banner.active == active {
        return Ok(banner);
    }

    let banner = db.banners().update_banner_active(banner, active).await?;

    Ok(banner)
}

#[tracing::instrument(skip(db))]
pub async fn delete_banner(db: &dyn Database, banner_id: BannerId) -> Result<(), Error> {
    if !db.banners().delete_banner(banner_id).await? {
        return Err(Error::BannerNotFound { banner_id });
    }

    Ok(())
}

#[tracing::instrument(skip(db))]
pub async fn record_impression(db: &dyn Database, banner_id: BannerId) -> Result<(), Error> {
    if !db.banners().increment_impressions(banner_id).await? {
        return Err(Error::BannerNotFound { banner_id });
    }

    Ok(())
}

#[tracing::instrument(skip(db))]
pub async fn record_click(db: &dyn Database, banner_id: BannerId) -> Result<(), Error> {
    if !db.banners().increment_clicks(banner_id).await? {
        return Err(Error::BannerNotFound { banner_id });
    }

    Ok(())
}

#[tracing::instrument(skip(db))]
pub async fn get_banner_stats(db: &dyn Database) -> Result<Vec<PlacementStats>, Error> {
    let banners = db.banners().fetch_banners().await?;

    let mut stats: BTreeMap<Placement, PlacementStats> = BTreeMap::new();
    for banner in &banners {
        let entry = stats
            .entry(banner.placement)
            .or_insert_with(|| PlacementStats {
                placement: banner.placement,
                banners: 0,
                active_banners: 0,
                impressions: 0,
                clicks: 0,
                click_through_rate: 0.0,
            });
        entry.banners += 1;
        if banner.active {
            entry.active_banners += 1;
        }
        entry.impressions += banner.impressions;
        entry.clicks += banner.clicks;
    }

    let stats = stats
        .into_iter()
        .map(|(_, mut entry)| {
            if entry.impressions > 0 {
                entry.click_through_rate = entry.clicks as f64 / entry.impressions as f64;
            }
            entry
        })
        .collect();

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::banner::test::banner;
    use crate::database::test::MockDatabase;
    use std::sync::{Arc, Mutex};

    fn new_banner() -> NewBanner {
        NewBanner {
            title: Some("Hiring Rust engineers".to_string()),
            target_url: Some("https://acme.example.com/careers".to_string()),
            placement: Some("left".to_string()),
            tags: vec![" rust ".to_string(), "remote".to_string(), "rust".to_string()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn can_create_banner() {
        let mut db = MockDatabase::new();
        let called_insert = Arc::new(Mutex::new(false));
        let called_insert_clone = Arc::clone(&called_insert);
        db.banners.on_insert_banner = Box::new(move |banner| {
            *called_insert_clone.lock().unwrap() = true;
            assert_eq!(banner.title, "Hiring Rust engineers".to_string());
            assert_eq!(banner.created_at, banner.modified_at);
            Ok(())
        });

        let banner = create_banner(&db, new_banner()).await.unwrap();

        assert_eq!(banner.placement, Placement::Left);
        assert_eq!(banner.clicks, 0);
        assert_eq!(banner.impressions, 0);
        assert!(banner.active);
        assert_eq!(banner.tags, vec!["remote".to_string(), "rust".to_string()]);
        assert!(
            *called_insert.lock().unwrap(),
            "db.insert_banner was not called"
        );
    }

    #[tokio::test]
    async fn create_banner_requires_title_target_and_placement() {
        let db = MockDatabase::new();

        let missing_title = NewBanner {
            title: None,
            ..new_banner()
        };
        let missing_target = NewBanner {
            target_url: None,
            ..new_banner()
        };
        let missing_placement = NewBanner {
            placement: None,
            ..new_banner()
        };

        assert_eq!(
            create_banner(&db, missing_title).await.unwrap_err(),
            invalid("title", "is required")
        );
        assert_eq!(
            create_banner(&db, missing_target).await.unwrap_err(),
            invalid("target_url", "is required")
        );
        assert_eq!(
            create_banner(&db, missing_placement).await.unwrap_err(),
            invalid("placement", "is required")
        );
    }

    #[tokio::test]
    async fn create_banner_rejects_invalid_fields() {
        let db = MockDatabase::new();
        let now = Utc::now();

        let bad_placement = NewBanner {
            placement: Some("sidebar".to_string()),
            ..new_banner()
        };
        let relative_target = NewBanner {
            target_url: Some("/jobs/42".to_string()),
            ..new_banner()
        };
        let negative_order = NewBanner {
            display_order: Some(-1),
            ..new_banner()
        };
        let inverted_window = NewBanner {
            start_date: Some(now),
            end_date: Some(now - chrono::Duration::days(1)),
            ..new_banner()
        };

        for fields in vec![bad_placement, relative_target, negative_order, inverted_window] {
            let error = create_banner(&db, fields).await.unwrap_err();
            assert!(
                matches!(error, Error::InvalidBanner { .. }),
                "expected validation error, got {:?}",
                error
            );
        }
    }

    #[tokio::test]
    async fn update_banner_merges_changes() {
        let mut db = MockDatabase::new();
        let existing = banner(Placement::Left, true, 3);
        let existing_clone = existing.clone();
        db.banners.on_fetch_banner_by_id = Box::new(move |_| Ok(Some(existing_clone.clone())));
        db.banners.on_update_banner = Box::new(|banner| Ok(banner));

        let changes = BannerChanges {
            title: Some("  New title ".to_string()),
            placement: Some("top".to_string()),
            description: Some(Some("details".to_string())),
            ..Default::default()
        };
        let banner = update_banner(&db, existing.id, changes).await.unwrap();

        assert_eq!(banner.title, "New title");
        assert_eq!(banner.placement, Placement::Top);
        assert_eq!(banner.description, Some("details".to_string()));
        assert_eq!(banner.display_order, 3);
    }

    #[tokio::test]
    async fn update_banner_validates_merged_result() {
        let mut db = MockDatabase::new();
        let existing = banner(Placement::Left, true, 3);
        let existing_clone = existing.clone();
        db.banners.on_fetch_banner_by_id = Box::new(move |_| Ok(Some(existing_clone.clone())));
        let now = Utc::now();

        let inverted_window = BannerChanges {
            start_date: Some(Some(now)),
            end_date: Some(Some(now - chrono::Duration::days(1))),
            ..Default::default()
        };
        let negative_order = BannerChanges {
            display_order: Some(-1),
            ..Default::default()
        };
        let blank_title = BannerChanges {
            title: Some("   ".to_string()),
            ..Default::default()
        };

        assert_eq!(
            update_banner(&db, existing.id, inverted_window).await.unwrap_err(),
            invalid("start_date", "must not be after end_date")
        );
        assert_eq!(
            update_banner(&db, existing.id, negative_order).await.unwrap_err(),
            invalid("display_order", "must not be negative")
        );
        assert_eq!(
            update_banner(&db, existing.id, blank_title).await.unwrap_err(),
            invalid("title", "must not be empty")
        );
    }

    #[tokio::test]
    async fn update_banner_returns_error_if_doesnt_exist() {
        let mut db = MockDatabase::new();
        let banner_id = BannerId::new();
        db.banners.on_fetch_banner_by_id = Box::new(|_| Ok(None));

        let result = update_banner(&db, banner_id, BannerChanges::default()).await;

        assert_eq!(result.unwrap_err(), Error::BannerNotFound { banner_id });
    }

    #[tokio::test]
    async fn set_banner_active_skips_write_when_unchanged() {
        let mut db = MockDatabase::new();
        let existing = banner(Placement::Right, true, 0);
        let existing_clone = existing.clone();
        db.banners.on_fetch_banner_by_id = Box::new(move |_| Ok(Some(existing_clone.clone())));

        let banner = set_banner_active(&db, existing.id, true).await.unwrap();

        assert!(banner.active);
    }

    #[tokio::test]
    async fn delete_and_track_report_missing_banners() {
        let mut db = MockDatabase::new();
        let banner_id = BannerId::new();
        db.banners.on_delete_banner = Box::new(|_| Ok(false));
        db.banners.on_increment_impressions = Box::new(|_| Ok(false));
        db.banners.on_increment_clicks = Box::new(|_| Ok(false));

        assert_eq!(
            delete_banner(&db, banner_id).await.unwrap_err(),
            Error::BannerNotFound { banner_id }
        );
        assert_eq!(
            record_impression(&db, banner_id).await.unwrap_err(),
            Error::BannerNotFound { banner_id }
        );
        assert_eq!(
            record_click(&db, banner_id).await.unwrap_err(),
            Error::BannerNotFound { banner_id }
        );
    }

    #[tokio::test]
    async fn banner_stats_aggregate_per_placement() {
        let mut db = MockDatabase::new();
        let mut first = banner(Placement::Left, true, 0);
        first.impressions = 30;
        first.clicks = 3;
        let mut second = banner(Placement::Left, false, 1);
        second.impressions = 10;
        second.clicks = 1;
        let top = banner(Placement::Top, true, 0);
        let banners = vec![first, second, top];
        db.banners.on_fetch_banners = Box::new(move |_| Ok(banners.clone()));

        let stats = get_banner_stats(&db).await.unwrap();

        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].placement, Placement::Left);
        assert_eq!(stats[0].banners, 2);
        assert_eq!(stats[0].active_banners, 1);
        assert_eq!(stats[0].impressions, 40);
        assert_eq!(stats[0].clicks, 4);
        assert!((stats[0].click_through_rate - 0.1).abs() < f64::EPSILON);
        assert_eq!(stats[1].placement, Placement::Top);
        assert_eq!(stats[1].click_through_rate, 0.0);
    }
}
