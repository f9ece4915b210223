//! Persistence seam. The real storage backend lives outside this crate;
//! everything the ranking and training paths need from it is expressed here
//! as one async trait, with an in-memory implementation for tests and
//! process bootstrap.

pub mod memory;

pub use memory::InMemoryStore;

use crate::error::StoreError;
use crate::models::{
    EngagementMetrics, ImpressionRecord, InteractionRecord, Listing, SimilarityRow,
    UserFeatureRow,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Everything the serving and training paths consume from or produce to the
/// persistence layer. Training jobs call the interaction reads windowed;
/// upserts are per-entity with no wrapping transaction.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecommendationStore: Send + Sync {
    async fn interactions_since(
        &self,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<InteractionRecord>>;

    async fn interactions_for_user_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<InteractionRecord>>;

    async fn interaction_count_for_listing_since(
        &self,
        listing_id: Uuid,
        since: DateTime<Utc>,
    ) -> StoreResult<u64>;

    async fn listing(&self, listing_id: Uuid) -> StoreResult<Option<Listing>>;

    async fn active_listings(&self) -> StoreResult<Vec<Listing>>;

    /// Every listing that has an engagement-metrics record.
    async fn engagement_metrics(&self) -> StoreResult<Vec<(Uuid, EngagementMetrics)>>;

    async fn update_engagement_scores(
        &self,
        listing_id: Uuid,
        engagement_score: f64,
        trending_score: f64,
    ) -> StoreResult<()>;

    async fn upsert_similarity(&self, row: SimilarityRow) -> StoreResult<()>;

    async fn similarity_rows_for_user(&self, user_id: Uuid) -> StoreResult<Vec<SimilarityRow>>;

    async fn upsert_feature_vector(&self, row: UserFeatureRow) -> StoreResult<()>;

    async fn feature_vector(&self, user_id: Uuid) -> StoreResult<Option<UserFeatureRow>>;

    async fn record_impressions(&self, impressions: Vec<ImpressionRecord>) -> StoreResult<()>;
}

/// Destination for the impression rows emitted by the serving path. Kept as
/// its own injectable trait so the write-during-read coupling can be
/// disabled in tests.
#[async_trait]
pub trait ImpressionSink: Send + Sync {
    async fn record(&self, impressions: Vec<ImpressionRecord>) -> StoreResult<()>;
}

/// Default sink: append impressions through the store.
pub struct StoreImpressionSink {
    store: Arc<dyn RecommendationStore>,
}

impl StoreImpressionSink {
    pub fn new(store: Arc<dyn RecommendationStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ImpressionSink for StoreImpressionSink {
    async fn record(&self, impressions: Vec<ImpressionRecord>) -> StoreResult<()> {
        self.store.record_impressions(impressions).await
    }
}

/// Sink that drops impressions; used where the side effect is unwanted.
pub struct NullImpressionSink;

#[async_trait]
impl ImpressionSink for NullImpressionSink {
    async fn record(&self, impressions: Vec<ImpressionRecord>) -> StoreResult<()> {
        if !impressions.is_empty() {
            warn!(count = impressions.len(), "dropping impressions (null sink)");
        }
        Ok(())
    }
}
