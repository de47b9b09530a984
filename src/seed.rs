use chrono::{Duration, Utc};
use tracing::info;

use crate::banner::manager::{self, NewBanner};
use crate::banner::BannerKind;
use crate::database::Database;
use crate::error::Error;

fn sample(title: &str, target_url: &str, placement: &str, display_order: i32) -> NewBanner {
    NewBanner {
        title: Some(title.to_string()),
        target_url: Some(target_url.to_string()),
        placement: Some(placement.to_string()),
        display_order: Some(display_order),
        created_by: Some("seed".to_string()),
        ..Default::default()
    }
}

/// Replaces whatever is stored with a handful of demo banners.
pub async fn seed(db: &dyn Database) -> Result<(), Error> {
    db.clear().await?;

    let now = Utc::now();
    let banners = vec![
        NewBanner {
            description: Some("Remote-friendly roles across the stack".to_string()),
            image_url: Some("https://cdn.example.com/banners/acme.png".to_string()),
            tags: vec!["remote".to_string(), "engineering".to_string()],
            ..sample("Acme is hiring", "https://acme.example.com/careers", "left", 1)
        },
        NewBanner {
            kind: Some(BannerKind::Promotion),
            tags: vec!["featured".to_string()],
            ..sample(
                "Feature your job post",
                "https://jobs.example.com/pricing",
                "left",
                2,
            )
        },
        NewBanner {
            active: Some(false),
            ..sample("Paused campaign", "https://paused.example.com/", "left", 0)
        },
        NewBanner {
            start_date: Some(now - Duration::days(1)),
            end_date: Some(now + Duration::days(30)),
            ..sample(
                "Spring hiring fair",
                "https://fair.example.com/",
                "top",
                0,
            )
        },
        sample("Globex data team", "https://globex.example.com/jobs", "right", 0),
        sample("Initech internships", "https://initech.example.com/", "inline", 0),
    ];

    let count = banners.len();
    for fields in banners {
        manager::create_banner(db, fields).await?;
    }

    info!("seeded {} banners", count);

    Ok(())
}
