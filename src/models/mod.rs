use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// A single user action on a listing, with a fixed scalar weight per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionKind {
    View,
    Click,
    Apply,
    Save,
    Share,
    Dismiss,
}

impl InteractionKind {
    pub fn weight(&self) -> f64 {
        match self {
            InteractionKind::Apply => 10.0,
            InteractionKind::Save => 5.0,
            InteractionKind::Share => 3.0,
            InteractionKind::Click => 2.0,
            InteractionKind::View => 1.0,
            InteractionKind::Dismiss => -5.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionKind::View => "view",
            InteractionKind::Click => "click",
            InteractionKind::Apply => "apply",
            InteractionKind::Save => "save",
            InteractionKind::Share => "share",
            InteractionKind::Dismiss => "dismiss",
        }
    }
}

impl FromStr for InteractionKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "view" => Ok(InteractionKind::View),
            "click" => Ok(InteractionKind::Click),
            "apply" => Ok(InteractionKind::Apply),
            "save" => Ok(InteractionKind::Save),
            "share" => Ok(InteractionKind::Share),
            "dismiss" => Ok(InteractionKind::Dismiss),
            other => Err(format!("unknown interaction kind: {other}")),
        }
    }
}

/// Weight for a raw interaction label. Labels outside the known set weigh 1.0.
pub fn interaction_weight(label: &str) -> f64 {
    label
        .parse::<InteractionKind>()
        .map(|kind| kind.weight())
        .unwrap_or(1.0)
}

/// Append-only interaction event. Never mutated after the fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub user_id: Uuid,
    pub listing_id: Uuid,
    pub kind: InteractionKind,
    pub occurred_at: DateTime<Utc>,
    pub dwell_seconds: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    Active,
    Completed,
    Cancelled,
}

/// Raw engagement counters (owned by the event path) plus the derived
/// scores owned exclusively by the training pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngagementMetrics {
    pub view_count: u64,
    pub click_count: u64,
    pub apply_count: u64,
    pub save_count: u64,
    pub share_count: u64,
    pub dismiss_count: u64,
    pub engagement_score: f64,
    pub trending_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub id: Uuid,
    pub title: String,
    pub tags: Vec<i64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub compensation: Option<f64>,
    pub status: ListingStatus,
    pub created_at: DateTime<Utc>,
    pub poster_id: Uuid,
    pub poster_rating: Option<f64>,
    pub poster_listings_posted: u64,
    pub poster_listings_completed: u64,
    pub metrics: EngagementMetrics,
}

impl Listing {
    pub fn location(&self) -> Option<GeoPoint> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some(GeoPoint { lat, lon }),
            _ => None,
        }
    }
}

/// Per-request view of the requesting user: profile plus feed preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: Uuid,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub preferred_tags: Vec<i64>,
    pub max_distance_km: f64,
    pub min_compensation: Option<f64>,
    pub max_compensation: Option<f64>,
    pub blocked_tags: Vec<i64>,
    pub blocked_users: Vec<Uuid>,
    pub personalization_enabled: bool,
}

impl UserContext {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            latitude: None,
            longitude: None,
            preferred_tags: Vec::new(),
            max_distance_km: 50.0,
            min_compensation: None,
            max_compensation: None,
            blocked_tags: Vec::new(),
            blocked_users: Vec::new(),
            personalization_enabled: true,
        }
    }

    pub fn location(&self) -> Option<GeoPoint> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some(GeoPoint { lat, lon }),
            _ => None,
        }
    }
}

/// Per-signal breakdown kept alongside the final score for debuggability.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ScoreComponents {
    pub location: f64,
    pub tags: f64,
    pub engagement: f64,
    pub recency: f64,
    pub poster_quality: f64,
    pub collaborative: f64,
    pub content: f64,
}

/// Blend weights for the hybrid score. The default vector sums to 1.0.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HybridWeights {
    pub location: f64,
    pub tags: f64,
    pub engagement: f64,
    pub recency: f64,
    pub poster_quality: f64,
    pub collaborative: f64,
    pub content: f64,
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self {
            location: 0.25,
            tags: 0.20,
            engagement: 0.15,
            recency: 0.10,
            poster_quality: 0.10,
            collaborative: 0.10,
            content: 0.10,
        }
    }
}

impl HybridWeights {
    pub fn sum(&self) -> f64 {
        self.location
            + self.tags
            + self.engagement
            + self.recency
            + self.poster_quality
            + self.collaborative
            + self.content
    }

    pub fn blend(&self, c: &ScoreComponents) -> f64 {
        self.location * c.location
            + self.tags * c.tags
            + self.engagement * c.engagement
            + self.recency * c.recency
            + self.poster_quality * c.poster_quality
            + self.collaborative * c.collaborative
            + self.content * c.content
    }
}

/// Request-scoped join of a listing with its recommendation score.
/// Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedListing {
    pub listing: Listing,
    pub recommendation_score: f64,
    pub score_components: ScoreComponents,
}

/// One persisted user-pair similarity, canonically ordered `user_a < user_b`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityRow {
    pub user_a: Uuid,
    pub user_b: Uuid,
    pub score: f64,
    pub shared_item_count: usize,
    pub computed_at: DateTime<Utc>,
}

/// Per-user preference aggregate, overwritten wholesale each training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserFeatureRow {
    pub user_id: Uuid,
    pub tag_vector: Vec<f64>,
    pub compensation_mean: f64,
    pub compensation_std: f64,
    pub activity_level: f64,
    pub computed_at: DateTime<Utc>,
}

/// One row per listing returned to a user, recorded as future training input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpressionRecord {
    pub user_id: Uuid,
    pub listing_id: Uuid,
    pub position: usize,
    pub score: f64,
    pub shown_at: DateTime<Utc>,
}
