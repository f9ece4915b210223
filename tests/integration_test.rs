use chrono::{Duration, Utc};
use listing_ranking_service::config::TrainingConfig;
use listing_ranking_service::jobs::TrainingService;
use listing_ranking_service::models::{
    EngagementMetrics, HybridWeights, InteractionKind, InteractionRecord, Listing,
    ListingStatus, UserContext,
};
use listing_ranking_service::store::{
    InMemoryStore, RecommendationStore, StoreImpressionSink,
};
use listing_ranking_service::{FeedRanker, HybridRecommender};
use std::sync::Arc;
use uuid::Uuid;

fn listing(tags: Vec<i64>, compensation: f64, age_days: i64) -> Listing {
    Listing {
        id: Uuid::new_v4(),
        title: format!("listing-{tags:?}"),
        tags,
        latitude: Some(40.7),
        longitude: Some(-74.0),
        compensation: Some(compensation),
        status: ListingStatus::Active,
        created_at: Utc::now() - Duration::days(age_days),
        poster_id: Uuid::new_v4(),
        poster_rating: Some(4.0),
        poster_listings_posted: 12,
        poster_listings_completed: 10,
        metrics: EngagementMetrics {
            view_count: 40,
            click_count: 10,
            apply_count: 2,
            save_count: 3,
            share_count: 1,
            dismiss_count: 0,
            ..Default::default()
        },
    }
}

fn interaction(user: Uuid, listing: Uuid, kind: InteractionKind, days_ago: i64) -> InteractionRecord {
    InteractionRecord {
        user_id: user,
        listing_id: listing,
        kind,
        occurred_at: Utc::now() - Duration::days(days_ago),
        dwell_seconds: None,
    }
}

fn training_config() -> TrainingConfig {
    TrainingConfig {
        window_days: 90,
        min_interactions: 100,
        neighbor_limit: 50,
        min_similarity: 0.1,
        tag_universe_size: 10,
        trending_window_hours: 24,
    }
}

#[tokio::test]
async fn test_train_then_serve_workflow() {
    let store = Arc::new(InMemoryStore::new());

    let listings: Vec<Listing> = vec![
        listing(vec![1, 2], 150.0, 1),
        listing(vec![2, 3], 300.0, 3),
        listing(vec![3], 80.0, 10),
        listing(vec![4, 5], 500.0, 20),
        listing(vec![1], 220.0, 5),
        listing(vec![5], 90.0, 40),
    ];
    for l in &listings {
        store.insert_listing(l.clone());
    }

    // Two users with heavily overlapping histories plus a third outlier,
    // comfortably above the 100-interaction training threshold.
    let (u1, u2, u3) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let mut records = Vec::new();
    for i in 0..40 {
        let l = &listings[i % 3];
        records.push(interaction(u1, l.id, InteractionKind::Save, (i % 5) as i64));
        records.push(interaction(u2, l.id, InteractionKind::Save, (i % 5) as i64));
    }
    for i in 0..30 {
        let l = &listings[3 + i % 3];
        records.push(interaction(u3, l.id, InteractionKind::Click, (i % 7) as i64));
    }
    store.record_interactions(records);

    let recommender = Arc::new(HybridRecommender::new(HybridWeights::default(), 10));
    let training = TrainingService::new(store.clone(), recommender.clone(), training_config());

    // Daily: similarity structure is built, persisted, and published.
    let similarity_stats = training.recompute_similarity().await.unwrap();
    assert!(!similarity_stats.skipped);
    assert_eq!(similarity_stats.users, 3);
    assert!(similarity_stats.rows_written > 0);
    assert_eq!(similarity_stats.rows_failed, 0);
    assert!(recommender.collaborative_available());

    let rows = store.similarity_rows_for_user(u1).await.unwrap();
    assert!(rows.iter().all(|r| r.user_a < r.user_b));
    assert!(rows
        .iter()
        .any(|r| (r.user_a == u2 || r.user_b == u2) && r.score > 0.9));

    // Hourly: engagement and trending scores are written back.
    let engagement_stats = training.refresh_engagement_scores().await.unwrap();
    assert_eq!(engagement_stats.listings_processed, listings.len());
    assert_eq!(engagement_stats.listings_failed, 0);

    let refreshed = store.listing(listings[0].id).await.unwrap().unwrap();
    assert!(refreshed.metrics.engagement_score > 0.0);
    // Recent interactions exist for this listing, so trending outpaces the
    // engagement carry-over alone.
    assert!(refreshed.metrics.trending_score > refreshed.metrics.engagement_score * 0.3);

    // Frequent: every active user gets a feature row, and the content
    // structure goes live for serving.
    let feature_stats = training.refresh_feature_vectors().await.unwrap();
    assert_eq!(feature_stats.users_updated, 3);
    assert_eq!(feature_stats.users_failed, 0);
    assert!(recommender.content_available());

    let row = store.feature_vector(u1).await.unwrap().unwrap();
    assert_eq!(row.tag_vector.len(), 10);
    assert!(row.activity_level > 0.0);

    // Serving: ranked page with impressions through the store-backed sink.
    let ranker = FeedRanker::new(
        store.clone(),
        recommender.clone(),
        Arc::new(StoreImpressionSink::new(store.clone())),
    );

    let mut user = UserContext::new(u1);
    user.latitude = Some(40.7);
    user.longitude = Some(-74.0);
    user.preferred_tags = vec![1, 2];

    let page = ranker.ranked_feed(&user, 4, 0).await.unwrap();
    assert_eq!(page.len(), 4);
    for pair in page.windows(2) {
        assert!(pair[0].recommendation_score >= pair[1].recommendation_score);
    }
    for ranked in &page {
        let c = &ranked.score_components;
        for score in [
            c.location,
            c.tags,
            c.engagement,
            c.recency,
            c.poster_quality,
            c.collaborative,
            c.content,
        ] {
            assert!((0.0..=1.0).contains(&score));
        }
    }

    let impressions = store.impressions();
    assert_eq!(impressions.len(), 4);
    assert_eq!(impressions[0].user_id, u1);
    assert_eq!(impressions[0].position, 0);

    // Cold start: a brand-new user still gets a full, neutral-scored page.
    let stranger = UserContext::new(Uuid::new_v4());
    let cold_page = ranker.ranked_feed(&stranger, 10, 0).await.unwrap();
    assert_eq!(cold_page.len(), listings.len());
    assert!(cold_page
        .iter()
        .all(|r| r.score_components.collaborative == 0.5));
}

#[tokio::test]
async fn test_sparse_history_leaves_similarity_untouched() {
    let store = Arc::new(InMemoryStore::new());
    let l = listing(vec![1], 100.0, 1);
    store.insert_listing(l.clone());

    let user = Uuid::new_v4();
    store.record_interactions((0..50).map(|i| {
        interaction(user, l.id, InteractionKind::View, (i % 3) as i64)
    }));

    let recommender = Arc::new(HybridRecommender::new(HybridWeights::default(), 10));
    let training = TrainingService::new(store.clone(), recommender.clone(), training_config());

    let stats = training.recompute_similarity().await.unwrap();
    assert!(stats.skipped);
    assert_eq!(store.similarity_row_count(), 0);
    assert!(!recommender.collaborative_available());
}
