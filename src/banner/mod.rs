use std::fmt::{Debug, Display};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use mongodb::bson::Bson;
use serde::{de::Error as _, Deserialize, Serialize};
use uuid::Uuid;

pub mod db;
pub mod endpoints;
pub mod manager;
pub mod selector;
pub use endpoints::{BannerBody, CreateBannerBody, SetActiveBody, UpdateBannerBody};

const BANNER_ID_TAG: &str = "BNR";

/// Identifies a banner. Rendered as `BNR-<UUID>` everywhere outside the
/// process, including the database.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BannerId(Uuid);

impl BannerId {
    pub fn new() -> BannerId {
        BannerId(Uuid::new_v4())
    }
}

impl Default for BannerId {
    fn default() -> BannerId {
        BannerId::new()
    }
}

impl Display for BannerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "{}-{:X}", BANNER_ID_TAG, self.0)
    }
}

impl Debug for BannerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        Display::fmt(self, f)
    }
}

impl FromStr for BannerId {
    type Err = BannerIdParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let index = s.find('-').ok_or(BannerIdParseError::InvalidFormat)?;
        let (tag, id) = s.split_at(index);

        if tag != BANNER_ID_TAG {
            return Err(BannerIdParseError::InvalidTag);
        }

        let uuid = Uuid::from_str(&id[1..]).map_err(|_| BannerIdParseError::InvalidUuid)?;

        Ok(BannerId(uuid))
    }
}

impl Serialize for BannerId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BannerId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        BannerId::from_str(&s).map_err(D::Error::custom)
    }
}

impl From<BannerId> for Bson {
    fn from(id: BannerId) -> Bson {
        id.to_string().into()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BannerIdParseError {
    InvalidFormat,
    InvalidTag,
    InvalidUuid,
}

impl Display for BannerIdParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        Debug::fmt(self, f)
    }
}

/// The fixed slots on a page where a banner may appear. Parsed the same way
/// from bodies, paths and queries: trimmed and case-insensitive.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    Left,
    Right,
    Top,
    Bottom,
    Inline,
}

impl Placement {
    pub const ALL: [Placement; 5] = [
        Placement::Left,
        Placement::Right,
        Placement::Top,
        Placement::Bottom,
        Placement::Inline,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Placement::Left => "left",
            Placement::Right => "right",
            Placement::Top => "top",
            Placement::Bottom => "bottom",
            Placement::Inline => "inline",
        }
    }
}

impl Display for Placement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        f.write_str(self.as_str())
    }
}

impl FromStr for Placement {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Placement::ALL
            .iter()
            .copied()
            .find(|placement| placement.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or(())
    }
}

impl<'de> Deserialize<'de> for Placement {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Placement::from_str(&s)
            .map_err(|_| D::Error::custom(format!("unknown placement `{}`", s)))
    }
}

impl From<Placement> for Bson {
    fn from(placement: Placement) -> Bson {
        placement.as_str().into()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BannerKind {
    Promotion,
    Advertisement,
}

impl Default for BannerKind {
    fn default() -> BannerKind {
        BannerKind::Advertisement
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BannerStyle {
    pub label: &'static str,
    pub background: &'static str,
    pub accent: &'static str,
}

impl BannerKind {
    pub fn style(&self) -> BannerStyle {
        match self {
            BannerKind::Promotion => BannerStyle {
                label: "Featured",
                background: "#eef6ff",
                accent: "#1d4ed8",
            },
            BannerKind::Advertisement => BannerStyle {
                label: "Sponsored",
                background: "#f8f8f8",
                accent: "#6b7280",
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Banner {
    #[serde(rename = "_id")]
    pub id: BannerId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    pub target_url: String,
    pub placement: Placement,
    #[serde(default)]
    pub kind: BannerKind,
    pub active: bool,
    pub display_order: i32,
    #[serde(default, with = "optional_bson_datetime")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, with = "optional_bson_datetime")]
    pub end_date: Option<DateTime<Utc>>,
    pub clicks: i64,
    pub impressions: i64,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub modified_at: DateTime<Utc>,
}

impl Banner {
    /// Whether `now` falls inside the banner's start/end window. Open ends
    /// are unbounded.
    pub fn is_scheduled_at(&self, now: DateTime<Utc>) -> bool {
        let started = self.start_date.map_or(true, |start| start <= now);
        let not_ended = self.end_date.map_or(true, |end| now <= end);
        started && not_ended
    }

    pub fn is_eligible_at(&self, now: DateTime<Utc>) -> bool {
        self.active && self.is_scheduled_at(now)
    }
}

mod optional_bson_datetime {
    use chrono::{DateTime, Utc};
    use mongodb::bson;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (*value)
            .map(bson::DateTime::from_chrono)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<bson::DateTime>::deserialize(deserializer)?;
        Ok(value.map(|datetime| datetime.to_chrono()))
    }
}

#[cfg(test)]
pub(crate) mod test {
    use chrono::{DateTime, Utc};

    use super::{Banner, BannerId, BannerKind, Placement};

    pub fn banner(placement: Placement, active: bool, display_order: i32) -> Banner {
        let now: DateTime<Utc> = Utc::now();
        Banner {
            id: BannerId::new(),
            title: format!("{} #{}", placement, display_order),
            description: None,
            image_url: Some("https://cdn.example.com/banner.png".to_string()),
            target_url: "https://sponsor.example.com/".to_string(),
            placement,
            kind: BannerKind::Advertisement,
            active,
            display_order,
            start_date: None,
            end_date: None,
            clicks: 0,
            impressions: 0,
            created_by: None,
            tags: vec![],
            created_at: now,
            modified_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn banner_id_round_trips_through_display() {
        let banner_id = BannerId::new();

        let parsed: BannerId = banner_id.to_string().parse().unwrap();

        assert_eq!(parsed, banner_id);
        assert!(banner_id.to_string().starts_with("BNR-"));
    }

    #[test]
    fn banner_id_rejects_other_tags() {
        let result = "CPN-16E77539-8873-4C8A-BCA3-2036010474AD".parse::<BannerId>();

        assert_eq!(result, Err(BannerIdParseError::InvalidTag));
        assert_eq!(
            "16E77539".parse::<BannerId>(),
            Err(BannerIdParseError::InvalidFormat)
        );
    }

    #[test]
    fn placement_parses_case_insensitively() {
        assert_eq!("Left".parse::<Placement>(), Ok(Placement::Left));
        assert_eq!(" inline ".parse::<Placement>(), Ok(Placement::Inline));
        assert_eq!("sidebar".parse::<Placement>(), Err(()));
    }

    #[test]
    fn placement_deserializes_like_it_parses() {
        let placement: Placement = serde_json::from_str(r#"" Left ""#).unwrap();
        assert_eq!(placement, Placement::Left);

        let unknown = serde_json::from_str::<Placement>(r#""sidebar""#);
        assert!(unknown.is_err());

        assert_eq!(serde_json::to_string(&Placement::Left).unwrap(), r#""left""#);
    }

    #[test]
    fn kinds_have_distinct_styles() {
        assert_ne!(BannerKind::Promotion.style(), BannerKind::Advertisement.style());
        assert_eq!(BannerKind::default(), BannerKind::Advertisement);
    }

    #[test]
    fn schedule_window_is_inclusive_and_open_ended() {
        let now = Utc::now();
        let mut banner = test::banner(Placement::Top, true, 0);
        assert!(banner.is_eligible_at(now));

        banner.start_date = Some(now);
        banner.end_date = Some(now);
        assert!(banner.is_scheduled_at(now));

        banner.start_date = Some(now + Duration::hours(1));
        banner.end_date = None;
        assert!(!banner.is_scheduled_at(now));

        banner.start_date = None;
        banner.end_date = Some(now - Duration::seconds(1));
        assert!(!banner.is_scheduled_at(now));

        banner.end_date = None;
        banner.active = false;
        assert!(!banner.is_eligible_at(now));
    }
}
