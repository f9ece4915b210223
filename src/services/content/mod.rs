//! Content-based filtering over numeric feature vectors.
//!
//! Vector layout: tag one-hot over the configured tag universe, then
//! normalized compensation, normalized lat/lon (zeros when absent), and
//! log-scaled view/apply counters. User preference vectors are the
//! interaction-weighted average of interacted listings' vectors.

use crate::error::{RankingError, Result};
use crate::models::{InteractionKind, Listing};
use crate::services::signals::NEUTRAL_SCORE;
use ndarray::Array1;
use std::collections::HashMap;
use tracing::warn;
use uuid::Uuid;

/// Scalar features appended after the tag one-hot block.
pub const EXTRA_FEATURES: usize = 5;

/// Compensation above this normalizes to 1.0.
const COMPENSATION_CAP: f64 = 1000.0;

/// Feature vector for a single listing against a fixed tag universe.
pub fn listing_feature_vector(listing: &Listing, tag_universe: &[i64]) -> Array1<f64> {
    let mut features = Vec::with_capacity(tag_universe.len() + EXTRA_FEATURES);

    for tag in tag_universe {
        features.push(if listing.tags.contains(tag) { 1.0 } else { 0.0 });
    }

    let compensation = listing.compensation.unwrap_or(0.0);
    features.push((compensation / COMPENSATION_CAP).min(1.0));

    match (listing.latitude, listing.longitude) {
        (Some(lat), Some(lon)) => {
            features.push(lat / 90.0);
            features.push(lon / 180.0);
        }
        _ => {
            features.push(0.0);
            features.push(0.0);
        }
    }

    features.push((listing.metrics.view_count as f64).ln_1p() / 10.0);
    features.push((listing.metrics.apply_count as f64).ln_1p() / 5.0);

    Array1::from_vec(features)
}

/// Interaction-weighted average of the listings a user touched. No history
/// yields the zero vector (a cold start, not an error).
pub fn user_preference_vector(
    history: &[(InteractionKind, &Listing)],
    tag_universe: &[i64],
) -> Array1<f64> {
    let dim = tag_universe.len() + EXTRA_FEATURES;
    if history.is_empty() {
        return Array1::zeros(dim);
    }

    let mut accumulated = Array1::<f64>::zeros(dim);
    let mut weight_total = 0.0;

    for (kind, listing) in history {
        let weight = kind.weight();
        accumulated = accumulated + listing_feature_vector(listing, tag_universe) * weight;
        weight_total += weight;
    }

    // Dismiss-heavy histories can cancel the weights out entirely; there is
    // no meaningful average to take then.
    if weight_total.abs() < f64::EPSILON {
        return Array1::zeros(dim);
    }

    accumulated / weight_total
}

/// Cosine similarity remapped from [-1, 1] to [0, 1]. A zero-norm vector on
/// either side scores neutral; mismatched dimensions are a caller bug.
pub fn content_similarity(user: &Array1<f64>, listing: &Array1<f64>) -> Result<f64> {
    if user.len() != listing.len() {
        return Err(RankingError::DimensionMismatch {
            expected: user.len(),
            actual: listing.len(),
        });
    }

    let user_norm = user.dot(user).sqrt();
    let listing_norm = listing.dot(listing).sqrt();
    if user_norm == 0.0 || listing_norm == 0.0 {
        return Ok(NEUTRAL_SCORE);
    }

    let cosine = user.dot(listing) / (user_norm * listing_norm);
    Ok((cosine + 1.0) / 2.0)
}

/// Trained content structure for serving: one preference vector per user,
/// scored against listing vectors on demand. Absence of a user is a cold
/// start (`None`), which the hybrid layer maps to the neutral score.
#[derive(Debug, Clone)]
pub struct ContentModel {
    tag_universe: Vec<i64>,
    user_vectors: HashMap<Uuid, Array1<f64>>,
}

impl ContentModel {
    pub fn new(tag_universe: Vec<i64>) -> Self {
        Self {
            tag_universe,
            user_vectors: HashMap::new(),
        }
    }

    pub fn tag_universe(&self) -> &[i64] {
        &self.tag_universe
    }

    pub fn set_user_history(&mut self, user_id: Uuid, history: &[(InteractionKind, &Listing)]) {
        let vector = user_preference_vector(history, &self.tag_universe);
        self.user_vectors.insert(user_id, vector);
    }

    pub fn user_count(&self) -> usize {
        self.user_vectors.len()
    }

    pub fn score(&self, user_id: &Uuid, listing: &Listing) -> Option<f64> {
        let user_vector = self.user_vectors.get(user_id)?;
        let listing_vector = listing_feature_vector(listing, &self.tag_universe);
        match content_similarity(user_vector, &listing_vector) {
            Ok(score) => Some(score),
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "content similarity failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EngagementMetrics, ListingStatus};
    use chrono::Utc;

    fn listing(tags: Vec<i64>, compensation: Option<f64>) -> Listing {
        Listing {
            id: Uuid::new_v4(),
            title: "test".into(),
            tags,
            latitude: Some(45.0),
            longitude: Some(90.0),
            compensation,
            status: ListingStatus::Active,
            created_at: Utc::now(),
            poster_id: Uuid::new_v4(),
            poster_rating: None,
            poster_listings_posted: 0,
            poster_listings_completed: 0,
            metrics: EngagementMetrics::default(),
        }
    }

    #[test]
    fn test_feature_vector_layout() {
        let universe = [1, 2, 3];
        let l = listing(vec![2], Some(500.0));
        let v = listing_feature_vector(&l, &universe);

        assert_eq!(v.len(), universe.len() + EXTRA_FEATURES);
        assert_eq!(v[0], 0.0);
        assert_eq!(v[1], 1.0);
        assert_eq!(v[2], 0.0);
        assert!((v[3] - 0.5).abs() < 1e-12); // compensation / 1000
        assert!((v[4] - 0.5).abs() < 1e-12); // lat / 90
        assert!((v[5] - 0.5).abs() < 1e-12); // lon / 180
    }

    #[test]
    fn test_compensation_is_capped() {
        let l = listing(vec![], Some(250_000.0));
        let v = listing_feature_vector(&l, &[1]);
        assert_eq!(v[1], 1.0);
    }

    #[test]
    fn test_empty_history_is_zero_vector() {
        let v = user_preference_vector(&[], &[1, 2, 3]);
        assert_eq!(v.len(), 8);
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_preference_vector_weighted_average() {
        let universe = [1, 2];
        let a = listing(vec![1], Some(1000.0));
        let b = listing(vec![2], Some(1000.0));

        // Apply (10) on a, view (1) on b: tag 1 dominates.
        let v = user_preference_vector(
            &[(InteractionKind::Apply, &a), (InteractionKind::View, &b)],
            &universe,
        );
        assert!(v[0] > v[1]);
        assert!((v[0] - 10.0 / 11.0).abs() < 1e-9);
        assert!((v[1] - 1.0 / 11.0).abs() < 1e-9);
    }

    #[test]
    fn test_content_similarity_identical_vectors() {
        let l = listing(vec![1, 2], Some(800.0));
        let v = listing_feature_vector(&l, &[1, 2, 3]);
        let sim = content_similarity(&v, &v).unwrap();
        assert!((sim - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_content_similarity_zero_norm_is_neutral() {
        let zero = Array1::zeros(4);
        let other = Array1::from_vec(vec![1.0, 0.0, 0.0, 0.0]);
        assert_eq!(content_similarity(&zero, &other).unwrap(), NEUTRAL_SCORE);
    }

    #[test]
    fn test_content_similarity_dimension_mismatch() {
        let a = Array1::zeros(3);
        let b = Array1::zeros(4);
        assert!(matches!(
            content_similarity(&a, &b),
            Err(RankingError::DimensionMismatch {
                expected: 3,
                actual: 4
            })
        ));
    }

    #[test]
    fn test_model_cold_start() {
        let model = ContentModel::new(vec![1, 2, 3]);
        let l = listing(vec![1], None);
        assert!(model.score(&Uuid::new_v4(), &l).is_none());
    }

    #[test]
    fn test_model_scores_known_user() {
        let mut model = ContentModel::new(vec![1, 2, 3]);
        let user = Uuid::new_v4();
        let liked = listing(vec![1], Some(900.0));
        model.set_user_history(user, &[(InteractionKind::Apply, &liked)]);

        let similar = listing(vec![1], Some(850.0));
        let unrelated = listing(vec![3], Some(50.0));

        let s_similar = model.score(&user, &similar).unwrap();
        let s_unrelated = model.score(&user, &unrelated).unwrap();
        assert!(s_similar > s_unrelated);
    }
}
