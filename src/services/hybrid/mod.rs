//! Hybrid recommender: blends the pure signals with the optional trained
//! collaborative and content structures into one weighted score per
//! candidate, and serves ranked, paginated feeds.

use crate::error::StoreError;
use crate::models::{
    HybridWeights, ImpressionRecord, Listing, RankedListing, ScoreComponents, UserContext,
};
use crate::services::collaborative::CollaborativeFilter;
use crate::services::content::ContentModel;
use crate::services::signals::{self, NEUTRAL_SCORE};
use crate::store::{ImpressionSink, RecommendationStore};
use crate::utils::clamp_unit;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Similar users consulted per request when collaborative data is available.
pub const DEFAULT_COLLABORATIVE_TOP_K: usize = 10;

/// Raw engagement is log-compressed; dividing by 100 brings realistic values
/// into [0, 1] before clamping.
const ENGAGEMENT_NORMALIZER: f64 = 100.0;

/// The collaborative and content structures are optional capabilities: until
/// a training run publishes them (one atomic swap each), every candidate
/// receives the documented neutral 0.5 for those components.
pub struct HybridRecommender {
    weights: HybridWeights,
    collaborative_top_k: usize,
    collaborative: RwLock<Option<Arc<CollaborativeFilter>>>,
    content: RwLock<Option<Arc<ContentModel>>>,
}

impl Default for HybridRecommender {
    fn default() -> Self {
        Self::new(HybridWeights::default(), DEFAULT_COLLABORATIVE_TOP_K)
    }
}

impl HybridRecommender {
    pub fn new(weights: HybridWeights, collaborative_top_k: usize) -> Self {
        Self {
            weights,
            collaborative_top_k,
            collaborative: RwLock::new(None),
            content: RwLock::new(None),
        }
    }

    pub fn weights(&self) -> HybridWeights {
        self.weights
    }

    /// Swap in a freshly trained collaborative structure. Readers mid-request
    /// keep the generation they already cloned.
    pub fn publish_collaborative(&self, filter: Arc<CollaborativeFilter>) {
        *self
            .collaborative
            .write()
            .expect("collaborative slot poisoned") = Some(filter);
    }

    pub fn publish_content(&self, model: Arc<ContentModel>) {
        *self.content.write().expect("content slot poisoned") = Some(model);
    }

    pub fn collaborative_available(&self) -> bool {
        self.collaborative
            .read()
            .expect("collaborative slot poisoned")
            .is_some()
    }

    pub fn content_available(&self) -> bool {
        self.content.read().expect("content slot poisoned").is_some()
    }

    fn collaborative_snapshot(&self) -> Option<Arc<CollaborativeFilter>> {
        self.collaborative
            .read()
            .expect("collaborative slot poisoned")
            .clone()
    }

    fn content_snapshot(&self) -> Option<Arc<ContentModel>> {
        self.content.read().expect("content slot poisoned").clone()
    }

    /// Per-request collaborative scores for the candidate set, min-max
    /// normalized to [0, 1]. Candidates without neighbor evidence are left
    /// out and fall back to neutral.
    fn collaborative_scores(
        &self,
        user: &UserContext,
        candidates: &[Listing],
    ) -> HashMap<Uuid, f64> {
        let Some(filter) = self.collaborative_snapshot() else {
            return HashMap::new();
        };
        let candidate_ids: Vec<Uuid> = candidates.iter().map(|l| l.id).collect();
        let raw = filter.recommend(&user.user_id, &candidate_ids, self.collaborative_top_k);
        if raw.is_empty() {
            return HashMap::new();
        }

        let max = raw.iter().map(|(_, s)| *s).fold(f64::MIN, f64::max);
        let min = raw.iter().map(|(_, s)| *s).fold(f64::MAX, f64::min);
        let span = max - min;

        raw.into_iter()
            .map(|(id, score)| {
                let normalized = if span > f64::EPSILON {
                    (score - min) / span
                } else {
                    NEUTRAL_SCORE
                };
                (id, normalized)
            })
            .collect()
    }

    /// Score one candidate. Every component is clamped to [0, 1] before the
    /// weighted blend; the full breakdown is returned for observability.
    pub fn hybrid_score(
        &self,
        user: &UserContext,
        listing: &Listing,
        collaborative: Option<f64>,
        content: Option<f64>,
        now: DateTime<Utc>,
    ) -> (f64, ScoreComponents) {
        let m = &listing.metrics;
        let components = ScoreComponents {
            location: signals::location_score(
                user.location(),
                listing.location(),
                user.max_distance_km,
            ),
            tags: signals::tag_similarity(&user.preferred_tags, &listing.tags),
            engagement: clamp_unit(
                signals::engagement_score(
                    m.view_count,
                    m.click_count,
                    m.apply_count,
                    m.save_count,
                    m.share_count,
                    m.dismiss_count,
                ) / ENGAGEMENT_NORMALIZER,
            ),
            recency: signals::recency_score(listing.created_at, now),
            poster_quality: signals::poster_quality_score(
                listing.poster_rating,
                listing.poster_listings_posted,
                listing.poster_listings_completed,
            ),
            collaborative: clamp_unit(collaborative.unwrap_or(NEUTRAL_SCORE)),
            content: clamp_unit(content.unwrap_or(NEUTRAL_SCORE)),
        };

        (self.weights.blend(&components), components)
    }

    /// Rank candidates for a user. Pure in its inputs: the trained structure
    /// snapshots are taken once, the sort is stable (equal scores keep input
    /// order), and `top_n` truncates after ranking.
    pub fn rank_listings(
        &self,
        user: &UserContext,
        candidates: Vec<Listing>,
        top_n: Option<usize>,
        now: DateTime<Utc>,
    ) -> Vec<RankedListing> {
        let personalized = user.personalization_enabled;
        let collaborative_scores = if personalized {
            self.collaborative_scores(user, &candidates)
        } else {
            HashMap::new()
        };
        let content_model = if personalized {
            self.content_snapshot()
        } else {
            None
        };

        let mut ranked: Vec<RankedListing> = candidates
            .into_iter()
            .map(|listing| {
                let collaborative = collaborative_scores.get(&listing.id).copied();
                let content = content_model
                    .as_deref()
                    .and_then(|model| model.score(&user.user_id, &listing));
                let (score, components) =
                    self.hybrid_score(user, &listing, collaborative, content, now);
                RankedListing {
                    listing,
                    recommendation_score: score,
                    score_components: components,
                }
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.recommendation_score
                .partial_cmp(&a.recommendation_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        if let Some(n) = top_n {
            ranked.truncate(n);
        }
        ranked
    }
}

/// Serving entry point: loads candidates from the store, applies the user's
/// feed preferences, ranks, paginates, and emits one impression per returned
/// listing through the injected sink.
pub struct FeedRanker {
    store: Arc<dyn RecommendationStore>,
    recommender: Arc<HybridRecommender>,
    impressions: Arc<dyn ImpressionSink>,
}

impl FeedRanker {
    pub fn new(
        store: Arc<dyn RecommendationStore>,
        recommender: Arc<HybridRecommender>,
        impressions: Arc<dyn ImpressionSink>,
    ) -> Self {
        Self {
            store,
            recommender,
            impressions,
        }
    }

    fn passes_preferences(user: &UserContext, listing: &Listing) -> bool {
        if user.blocked_users.contains(&listing.poster_id) {
            return false;
        }
        if listing.tags.iter().any(|t| user.blocked_tags.contains(t)) {
            return false;
        }
        if let Some(compensation) = listing.compensation {
            if let Some(min) = user.min_compensation {
                if compensation < min {
                    return false;
                }
            }
            if let Some(max) = user.max_compensation {
                if compensation > max {
                    return false;
                }
            }
        }
        true
    }

    /// A ranking request always returns a page; missing signal inputs score
    /// neutral and a failing impression write is logged, not surfaced.
    pub async fn ranked_feed(
        &self,
        user: &UserContext,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<RankedListing>, StoreError> {
        let candidates: Vec<Listing> = self
            .store
            .active_listings()
            .await?
            .into_iter()
            .filter(|listing| Self::passes_preferences(user, listing))
            .collect();

        debug!(
            user_id = %user.user_id,
            candidate_count = candidates.len(),
            "ranking feed candidates"
        );

        let ranked = self
            .recommender
            .rank_listings(user, candidates, None, Utc::now());

        let page: Vec<RankedListing> = ranked.into_iter().skip(offset).take(limit).collect();

        let shown_at = Utc::now();
        let impressions: Vec<ImpressionRecord> = page
            .iter()
            .enumerate()
            .map(|(i, r)| ImpressionRecord {
                user_id: user.user_id,
                listing_id: r.listing.id,
                position: offset + i,
                score: r.recommendation_score,
                shown_at,
            })
            .collect();

        if let Err(e) = self.impressions.record(impressions).await {
            warn!(user_id = %user.user_id, error = %e, "failed to record impressions");
        }

        info!(
            user_id = %user.user_id,
            returned = page.len(),
            offset,
            "feed ranked"
        );

        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EngagementMetrics, InteractionKind, InteractionRecord, ListingStatus};
    use crate::store::{InMemoryStore, NullImpressionSink, StoreImpressionSink};

    fn listing_with(tags: Vec<i64>, created_at: DateTime<Utc>) -> Listing {
        Listing {
            id: Uuid::new_v4(),
            title: "test".into(),
            tags,
            latitude: None,
            longitude: None,
            compensation: Some(200.0),
            status: ListingStatus::Active,
            created_at,
            poster_id: Uuid::new_v4(),
            poster_rating: None,
            poster_listings_posted: 0,
            poster_listings_completed: 0,
            metrics: EngagementMetrics::default(),
        }
    }

    #[test]
    fn test_unavailable_structures_score_neutral() {
        let recommender = HybridRecommender::default();
        let user = UserContext::new(Uuid::new_v4());
        let listing = listing_with(vec![], Utc::now());

        let (_, components) = recommender.hybrid_score(&user, &listing, None, None, Utc::now());
        assert_eq!(components.collaborative, NEUTRAL_SCORE);
        assert_eq!(components.content, NEUTRAL_SCORE);
    }

    #[test]
    fn test_higher_component_raises_score_by_weight() {
        let recommender = HybridRecommender::default();
        let user = UserContext::new(Uuid::new_v4());
        let listing = listing_with(vec![], Utc::now());
        let now = Utc::now();

        let (low, _) = recommender.hybrid_score(&user, &listing, Some(0.0), None, now);
        let (high, _) = recommender.hybrid_score(&user, &listing, Some(1.0), None, now);
        let weights = recommender.weights();
        assert!((high - low - weights.collaborative).abs() < 1e-9);
    }

    #[test]
    fn test_rank_is_stable_for_equal_scores() {
        let recommender = HybridRecommender::default();
        let user = UserContext::new(Uuid::new_v4());
        let now = Utc::now();

        // Identical feature-wise, so identical scores; input order must hold.
        let a = listing_with(vec![], now);
        let b = listing_with(vec![], now);
        let c = listing_with(vec![], now);
        let ids = [a.id, b.id, c.id];

        let ranked = recommender.rank_listings(&user, vec![a, b, c], None, now);
        let out: Vec<Uuid> = ranked.iter().map(|r| r.listing.id).collect();
        assert_eq!(out, ids);
    }

    #[test]
    fn test_fresher_listing_ranks_higher() {
        let recommender = HybridRecommender::default();
        let user = UserContext::new(Uuid::new_v4());
        let now = Utc::now();

        let stale = listing_with(vec![], now - chrono::Duration::days(45));
        let fresh = listing_with(vec![], now);
        let fresh_id = fresh.id;

        let ranked = recommender.rank_listings(&user, vec![stale, fresh], Some(1), now);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].listing.id, fresh_id);
    }

    #[test]
    fn test_personalization_toggle_bypasses_trained_structures() {
        let recommender = HybridRecommender::default();

        let mut filter = CollaborativeFilter::new();
        let (u1, u2) = (Uuid::new_v4(), Uuid::new_v4());
        let shared = Uuid::new_v4();
        let records: Vec<InteractionRecord> = [u1, u2]
            .iter()
            .map(|u| InteractionRecord {
                user_id: *u,
                listing_id: shared,
                kind: InteractionKind::Apply,
                occurred_at: Utc::now(),
                dwell_seconds: None,
            })
            .collect();
        filter.build_user_item_matrix(&records);
        filter.compute_user_similarity().unwrap();
        recommender.publish_collaborative(Arc::new(filter));

        let mut user = UserContext::new(u1);
        user.personalization_enabled = false;

        let listing = listing_with(vec![], Utc::now());
        let ranked = recommender.rank_listings(&user, vec![listing], None, Utc::now());
        assert_eq!(ranked[0].score_components.collaborative, NEUTRAL_SCORE);
    }

    #[tokio::test]
    async fn test_feed_emits_one_impression_per_returned_listing() {
        let store = Arc::new(InMemoryStore::new());
        for _ in 0..5 {
            store.insert_listing(listing_with(vec![1], Utc::now()));
        }

        let recommender = Arc::new(HybridRecommender::default());
        let sink = Arc::new(StoreImpressionSink::new(store.clone()));
        let ranker = FeedRanker::new(store.clone(), recommender, sink);

        let user = UserContext::new(Uuid::new_v4());
        let page = ranker.ranked_feed(&user, 3, 1).await.unwrap();
        assert_eq!(page.len(), 3);

        let impressions = store.impressions();
        assert_eq!(impressions.len(), 3);
        assert_eq!(impressions[0].position, 1);
        assert_eq!(impressions[2].position, 3);
    }

    #[tokio::test]
    async fn test_null_sink_disables_impressions() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_listing(listing_with(vec![], Utc::now()));

        let ranker = FeedRanker::new(
            store.clone(),
            Arc::new(HybridRecommender::default()),
            Arc::new(NullImpressionSink),
        );

        let user = UserContext::new(Uuid::new_v4());
        let page = ranker.ranked_feed(&user, 10, 0).await.unwrap();
        assert_eq!(page.len(), 1);
        assert!(store.impressions().is_empty());
    }

    #[tokio::test]
    async fn test_blocked_poster_and_tags_are_filtered() {
        let store = Arc::new(InMemoryStore::new());
        let blocked_poster = Uuid::new_v4();

        let mut from_blocked = listing_with(vec![], Utc::now());
        from_blocked.poster_id = blocked_poster;
        store.insert_listing(from_blocked);

        store.insert_listing(listing_with(vec![99], Utc::now()));
        let kept = listing_with(vec![1], Utc::now());
        let kept_id = kept.id;
        store.insert_listing(kept);

        let ranker = FeedRanker::new(
            store.clone(),
            Arc::new(HybridRecommender::default()),
            Arc::new(NullImpressionSink),
        );

        let mut user = UserContext::new(Uuid::new_v4());
        user.blocked_users.push(blocked_poster);
        user.blocked_tags.push(99);

        let page = ranker.ranked_feed(&user, 10, 0).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].listing.id, kept_id);
    }
}
