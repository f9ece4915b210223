//! Pure signal calculators for listing relevance.
//!
//! Every function here is deterministic in its arguments. Components that
//! feed the hybrid blend stay in [0, 1]; where a signal's inputs are missing
//! the documented neutral 0.5 is returned rather than a penalty.

use crate::models::GeoPoint;
use crate::utils::clamp_unit;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Fallback score when a signal's inputs are unavailable.
pub const NEUTRAL_SCORE: f64 = 0.5;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two points (haversine), in kilometers.
pub fn geo_distance_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lon = (b.lon - a.lon).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat_a.cos() * lat_b.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}

/// Proximity score with exponential decay so nearby listings dominate
/// without a hard cutoff. Neutral when either point is unknown.
pub fn location_score(
    user: Option<GeoPoint>,
    listing: Option<GeoPoint>,
    max_distance_km: f64,
) -> f64 {
    let (user, listing) = match (user, listing) {
        (Some(u), Some(l)) => (u, l),
        _ => return NEUTRAL_SCORE,
    };

    let distance = geo_distance_km(user, listing);
    clamp_unit((-distance / (max_distance_km / 3.0)).exp())
}

/// Jaccard index over tag sets. Absence of tag data on either side must not
/// penalize, so empty sets score neutral rather than zero.
pub fn tag_similarity(a: &[i64], b: &[i64]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return NEUTRAL_SCORE;
    }

    let set_a: HashSet<i64> = a.iter().copied().collect();
    let set_b: HashSet<i64> = b.iter().copied().collect();

    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();

    if union == 0 {
        return 0.0;
    }

    intersection as f64 / union as f64
}

/// Weighted engagement total with logarithmic compression so viral listings
/// do not dominate. Floored at zero; dismissals subtract.
pub fn engagement_score(
    views: u64,
    clicks: u64,
    applies: u64,
    saves: u64,
    shares: u64,
    dismisses: u64,
) -> f64 {
    let raw = applies as f64 * 10.0
        + saves as f64 * 5.0
        + shares as f64 * 3.0
        + clicks as f64 * 2.0
        + views as f64
        - dismisses as f64 * 5.0;

    let score = if raw > 0.0 { raw.ln_1p() * 10.0 } else { raw };
    score.max(0.0)
}

/// Freshness score: near 1.0 at creation, decaying over roughly a
/// 10-30 day horizon.
pub fn recency_score(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age_days = (now - created_at).num_seconds() as f64 / 86_400.0;
    clamp_unit((-age_days / 10.0).exp())
}

/// Poster reputation from rating, completion rate, and posting experience.
/// Unrated posters default to a middling 3/5; posters with no history get a
/// neutral completion rate.
pub fn poster_quality_score(rating: Option<f64>, posted: u64, completed: u64) -> f64 {
    let rating_score = rating.unwrap_or(3.0) / 5.0;

    let completion_rate = if posted > 0 {
        completed as f64 / posted.max(1) as f64
    } else {
        0.5
    };

    let experience_factor = ((posted as f64).ln_1p() / 5.0).min(1.0);

    clamp_unit(rating_score * 0.5 + completion_rate * 0.3 + experience_factor * 0.2)
}
