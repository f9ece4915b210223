//! Batch jobs that rebuild the derived statistical structures from raw
//! interaction history. Each job reads from the store, recomputes wholesale,
//! and writes back per entity: a single failing user or listing is logged
//! and skipped, never aborting the run.

use crate::config::TrainingConfig;
use crate::models::{InteractionKind, Listing, SimilarityRow, UserFeatureRow};
use crate::services::collaborative::CollaborativeFilter;
use crate::services::content::ContentModel;
use crate::services::hybrid::HybridRecommender;
use crate::services::signals;
use crate::store::RecommendationStore;
use crate::utils::{mean, std_dev};
use chrono::{Duration, Utc};
use futures::future::join_all;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Default)]
pub struct SimilarityJobStats {
    pub interactions: usize,
    pub users: usize,
    pub rows_written: usize,
    pub rows_failed: usize,
    pub skipped: bool,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Default)]
pub struct EngagementJobStats {
    pub listings_processed: usize,
    pub listings_updated: usize,
    pub listings_failed: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Default)]
pub struct FeatureJobStats {
    pub users_processed: usize,
    pub users_updated: usize,
    pub users_failed: usize,
    pub duration_ms: u64,
}

/// Owns the three training jobs. Serving is only coupled to a run through
/// the store rows it upserts and the collaborative structure it publishes on
/// the recommender at the end of a successful similarity pass.
pub struct TrainingService {
    store: Arc<dyn RecommendationStore>,
    recommender: Arc<HybridRecommender>,
    config: TrainingConfig,
}

impl TrainingService {
    pub fn new(
        store: Arc<dyn RecommendationStore>,
        recommender: Arc<HybridRecommender>,
        config: TrainingConfig,
    ) -> Self {
        Self {
            store,
            recommender,
            config,
        }
    }

    fn tag_universe(&self) -> Vec<i64> {
        (1..=self.config.tag_universe_size).collect()
    }

    /// Rebuild the user-similarity structure from the training window.
    /// Fewer than `min_interactions` events is insufficient signal: warn and
    /// leave the existing structure untouched.
    pub async fn recompute_similarity(&self) -> anyhow::Result<SimilarityJobStats> {
        let started = Instant::now();
        let mut stats = SimilarityJobStats::default();

        let since = Utc::now() - Duration::days(self.config.window_days);
        let interactions = self.store.interactions_since(since).await?;
        stats.interactions = interactions.len();

        if interactions.len() < self.config.min_interactions {
            warn!(
                interactions = interactions.len(),
                required = self.config.min_interactions,
                "not enough interactions to build similarity structure"
            );
            stats.skipped = true;
            stats.duration_ms = started.elapsed().as_millis() as u64;
            return Ok(stats);
        }

        info!(
            interactions = interactions.len(),
            "building user-item matrix"
        );
        let mut filter = CollaborativeFilter::new();
        filter.build_user_item_matrix(&interactions);
        filter.compute_user_similarity()?;

        let user_ids: Vec<_> = filter
            .matrix()
            .map(|m| m.users().ids().to_vec())
            .unwrap_or_default();
        stats.users = user_ids.len();
        let computed_at = Utc::now();

        for user_id in &user_ids {
            let neighbors = filter.top_neighbors(
                user_id,
                self.config.neighbor_limit,
                self.config.min_similarity,
            );
            for neighbor in neighbors {
                let (user_a, user_b) = if *user_id < neighbor.neighbor_id {
                    (*user_id, neighbor.neighbor_id)
                } else {
                    (neighbor.neighbor_id, *user_id)
                };
                let row = SimilarityRow {
                    user_a,
                    user_b,
                    score: neighbor.similarity,
                    shared_item_count: neighbor.shared_item_count,
                    computed_at,
                };
                match self.store.upsert_similarity(row).await {
                    Ok(()) => stats.rows_written += 1,
                    Err(e) => {
                        error!(user_a = %user_a, user_b = %user_b, error = %e, "failed to store similarity row");
                        stats.rows_failed += 1;
                    }
                }
            }
        }

        // Publish the trained structure for serving in one swap; in-flight
        // requests keep the previous generation.
        self.recommender.publish_collaborative(Arc::new(filter));

        stats.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            users = stats.users,
            rows_written = stats.rows_written,
            rows_failed = stats.rows_failed,
            duration_ms = stats.duration_ms,
            "similarity recomputation complete"
        );
        Ok(stats)
    }

    /// Recompute engagement and trending scores for every listing that has a
    /// metrics record.
    pub async fn refresh_engagement_scores(&self) -> anyhow::Result<EngagementJobStats> {
        let started = Instant::now();
        let mut stats = EngagementJobStats::default();

        let metrics = self.store.engagement_metrics().await?;
        stats.listings_processed = metrics.len();

        let since_recent = Utc::now() - Duration::hours(self.config.trending_window_hours);

        // Listings are independent, so the refreshes run concurrently; a
        // failure still only costs that one listing.
        let tasks = metrics.into_iter().map(|(listing_id, m)| {
            let store = self.store.clone();
            async move {
                let engagement = signals::engagement_score(
                    m.view_count,
                    m.click_count,
                    m.apply_count,
                    m.save_count,
                    m.share_count,
                    m.dismiss_count,
                );
                let result = async {
                    let recent_count = store
                        .interaction_count_for_listing_since(listing_id, since_recent)
                        .await?;
                    let trending = engagement * 0.3 + recent_count as f64 * 10.0;
                    store
                        .update_engagement_scores(listing_id, engagement, trending)
                        .await
                }
                .await;
                (listing_id, result)
            }
        });

        for (listing_id, result) in join_all(tasks).await {
            match result {
                Ok(()) => stats.listings_updated += 1,
                Err(e) => {
                    error!(listing_id = %listing_id, error = %e, "failed to refresh listing scores");
                    stats.listings_failed += 1;
                }
            }
        }

        stats.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            processed = stats.listings_processed,
            updated = stats.listings_updated,
            failed = stats.listings_failed,
            duration_ms = stats.duration_ms,
            "engagement score refresh complete"
        );
        Ok(stats)
    }

    /// Rebuild the preference feature vector for every user active in the
    /// training window. Rows are overwritten wholesale, never merged. The
    /// same pass rebuilds the content structure and publishes it for serving.
    pub async fn refresh_feature_vectors(&self) -> anyhow::Result<FeatureJobStats> {
        let started = Instant::now();
        let mut stats = FeatureJobStats::default();

        let since = Utc::now() - Duration::days(self.config.window_days);
        let window = self.store.interactions_since(since).await?;

        let active_users: BTreeSet<_> = window.iter().map(|r| r.user_id).collect();
        stats.users_processed = active_users.len();

        if active_users.is_empty() {
            warn!("no active users in training window");
            stats.duration_ms = started.elapsed().as_millis() as u64;
            return Ok(stats);
        }

        let tag_universe = self.tag_universe();
        let computed_at = Utc::now();
        let mut model = ContentModel::new(tag_universe.clone());

        for user_id in active_users {
            match self
                .build_feature_row(user_id, since, &tag_universe, computed_at, &mut model)
                .await
            {
                Ok(()) => stats.users_updated += 1,
                Err(e) => {
                    error!(user_id = %user_id, error = %e, "failed to refresh feature vector");
                    stats.users_failed += 1;
                }
            }
        }

        self.recommender.publish_content(Arc::new(model));

        stats.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            processed = stats.users_processed,
            updated = stats.users_updated,
            failed = stats.users_failed,
            duration_ms = stats.duration_ms,
            "feature vector refresh complete"
        );
        Ok(stats)
    }

    async fn build_feature_row(
        &self,
        user_id: uuid::Uuid,
        since: chrono::DateTime<Utc>,
        tag_universe: &[i64],
        computed_at: chrono::DateTime<Utc>,
        model: &mut ContentModel,
    ) -> anyhow::Result<()> {
        let interactions = self
            .store
            .interactions_for_user_since(user_id, since)
            .await?;
        if interactions.is_empty() {
            return Ok(());
        }
        let interaction_count = interactions.len();

        let mut tag_counts: HashMap<i64, usize> = HashMap::new();
        let mut compensation_values = Vec::new();
        let mut history: Vec<(InteractionKind, Listing)> = Vec::new();

        for record in &interactions {
            let Some(listing) = self.store.listing(record.listing_id).await? else {
                continue;
            };
            for tag in &listing.tags {
                *tag_counts.entry(*tag).or_insert(0) += 1;
            }
            if let Some(compensation) = listing.compensation {
                compensation_values.push(compensation);
            }
            history.push((record.kind, listing));
        }

        let history_refs: Vec<(InteractionKind, &Listing)> =
            history.iter().map(|(kind, l)| (*kind, l)).collect();
        model.set_user_history(user_id, &history_refs);

        let tag_vector: Vec<f64> = tag_universe
            .iter()
            .map(|tag| {
                tag_counts.get(tag).copied().unwrap_or(0) as f64 / interaction_count as f64
            })
            .collect();

        let row = UserFeatureRow {
            user_id,
            tag_vector,
            compensation_mean: mean(&compensation_values),
            compensation_std: std_dev(&compensation_values),
            activity_level: (interaction_count as f64 / 100.0).min(1.0),
            computed_at,
        };

        self.store.upsert_feature_vector(row).await?;
        Ok(())
    }

    /// Daily cadence: rebuild the similarity structure.
    pub async fn run_daily(&self) -> anyhow::Result<()> {
        info!("starting daily similarity training");
        self.recompute_similarity().await?;
        Ok(())
    }

    /// Hourly cadence: refresh engagement and trending scores.
    pub async fn run_hourly(&self) -> anyhow::Result<()> {
        info!("starting hourly engagement refresh");
        self.refresh_engagement_scores().await?;
        Ok(())
    }

    /// Frequent (15-minute) cadence: refresh user feature vectors.
    pub async fn run_frequent(&self) -> anyhow::Result<()> {
        info!("starting feature vector refresh");
        self.refresh_feature_vectors().await?;
        Ok(())
    }
}
