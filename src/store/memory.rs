//! In-memory store used by tests and process bootstrap. Keyed state lives in
//! `DashMap`s; the append-only interaction and impression logs sit behind a
//! plain `RwLock` since they are only pushed and scanned.

use super::{RecommendationStore, StoreResult};
use crate::error::StoreError;
use crate::models::{
    EngagementMetrics, ImpressionRecord, InteractionRecord, Listing, ListingStatus,
    SimilarityRow, UserFeatureRow,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryStore {
    interactions: RwLock<Vec<InteractionRecord>>,
    listings: DashMap<Uuid, Listing>,
    similarities: DashMap<(Uuid, Uuid), SimilarityRow>,
    features: DashMap<Uuid, UserFeatureRow>,
    impressions: RwLock<Vec<ImpressionRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_listing(&self, listing: Listing) {
        self.listings.insert(listing.id, listing);
    }

    pub fn record_interaction(&self, record: InteractionRecord) {
        self.interactions
            .write()
            .expect("interaction log poisoned")
            .push(record);
    }

    pub fn record_interactions(&self, records: impl IntoIterator<Item = InteractionRecord>) {
        let mut log = self.interactions.write().expect("interaction log poisoned");
        log.extend(records);
    }

    pub fn impressions(&self) -> Vec<ImpressionRecord> {
        self.impressions
            .read()
            .expect("impression log poisoned")
            .clone()
    }

    pub fn similarity_row_count(&self) -> usize {
        self.similarities.len()
    }

    pub fn feature_row_count(&self) -> usize {
        self.features.len()
    }
}

#[async_trait]
impl RecommendationStore for InMemoryStore {
    async fn interactions_since(
        &self,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<InteractionRecord>> {
        let log = self.interactions.read().expect("interaction log poisoned");
        Ok(log
            .iter()
            .filter(|r| r.occurred_at >= since)
            .cloned()
            .collect())
    }

    async fn interactions_for_user_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<InteractionRecord>> {
        let log = self.interactions.read().expect("interaction log poisoned");
        Ok(log
            .iter()
            .filter(|r| r.user_id == user_id && r.occurred_at >= since)
            .cloned()
            .collect())
    }

    async fn interaction_count_for_listing_since(
        &self,
        listing_id: Uuid,
        since: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let log = self.interactions.read().expect("interaction log poisoned");
        Ok(log
            .iter()
            .filter(|r| r.listing_id == listing_id && r.occurred_at >= since)
            .count() as u64)
    }

    async fn listing(&self, listing_id: Uuid) -> StoreResult<Option<Listing>> {
        Ok(self.listings.get(&listing_id).map(|l| l.clone()))
    }

    async fn active_listings(&self) -> StoreResult<Vec<Listing>> {
        Ok(self
            .listings
            .iter()
            .filter(|entry| entry.status == ListingStatus::Active)
            .map(|entry| entry.clone())
            .collect())
    }

    async fn engagement_metrics(&self) -> StoreResult<Vec<(Uuid, EngagementMetrics)>> {
        Ok(self
            .listings
            .iter()
            .map(|entry| (entry.id, entry.metrics.clone()))
            .collect())
    }

    async fn update_engagement_scores(
        &self,
        listing_id: Uuid,
        engagement_score: f64,
        trending_score: f64,
    ) -> StoreResult<()> {
        let mut listing = self
            .listings
            .get_mut(&listing_id)
            .ok_or_else(|| StoreError::NotFound(format!("listing {listing_id}")))?;
        listing.metrics.engagement_score = engagement_score;
        listing.metrics.trending_score = trending_score;
        Ok(())
    }

    async fn upsert_similarity(&self, row: SimilarityRow) -> StoreResult<()> {
        self.similarities.insert((row.user_a, row.user_b), row);
        Ok(())
    }

    async fn similarity_rows_for_user(&self, user_id: Uuid) -> StoreResult<Vec<SimilarityRow>> {
        Ok(self
            .similarities
            .iter()
            .filter(|entry| entry.user_a == user_id || entry.user_b == user_id)
            .map(|entry| entry.clone())
            .collect())
    }

    async fn upsert_feature_vector(&self, row: UserFeatureRow) -> StoreResult<()> {
        self.features.insert(row.user_id, row);
        Ok(())
    }

    async fn feature_vector(&self, user_id: Uuid) -> StoreResult<Option<UserFeatureRow>> {
        Ok(self.features.get(&user_id).map(|f| f.clone()))
    }

    async fn record_impressions(&self, impressions: Vec<ImpressionRecord>) -> StoreResult<()> {
        let mut log = self.impressions.write().expect("impression log poisoned");
        log.extend(impressions);
        Ok(())
    }
}
