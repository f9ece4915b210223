use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub training: TrainingConfig,
    pub scheduler: SchedulerConfig,
    pub ranking: RankingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrainingConfig {
    /// Trailing window for similarity and feature-vector jobs, in days.
    pub window_days: i64,
    /// Below this many interactions the similarity job is a warned no-op.
    pub min_interactions: usize,
    /// Neighbors retained per user when persisting similarity rows.
    pub neighbor_limit: usize,
    /// Similarity floor for persisted neighbor rows.
    pub min_similarity: f64,
    /// Bounded tag universe: ids 1..=size.
    pub tag_universe_size: i64,
    /// Window for the trending recent-interaction count, in hours.
    pub trending_window_hours: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// UTC hour for the daily similarity training run.
    pub daily_hour_utc: u32,
    pub hourly_interval_secs: u64,
    pub frequent_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RankingConfig {
    pub default_max_distance_km: f64,
    pub collaborative_top_k: usize,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Config {
            service: ServiceConfig {
                service_name: env::var("SERVICE_NAME")
                    .unwrap_or_else(|_| "listing-ranking-service".to_string()),
            },
            training: TrainingConfig {
                window_days: env::var("TRAINING_WINDOW_DAYS")
                    .unwrap_or_else(|_| "90".to_string())
                    .parse()
                    .expect("TRAINING_WINDOW_DAYS must be a valid i64"),
                min_interactions: env::var("TRAINING_MIN_INTERACTIONS")
                    .unwrap_or_else(|_| "100".to_string())
                    .parse()
                    .expect("TRAINING_MIN_INTERACTIONS must be a valid usize"),
                neighbor_limit: env::var("TRAINING_NEIGHBOR_LIMIT")
                    .unwrap_or_else(|_| "50".to_string())
                    .parse()
                    .expect("TRAINING_NEIGHBOR_LIMIT must be a valid usize"),
                min_similarity: env::var("TRAINING_MIN_SIMILARITY")
                    .unwrap_or_else(|_| "0.1".to_string())
                    .parse()
                    .expect("TRAINING_MIN_SIMILARITY must be a valid f64"),
                tag_universe_size: env::var("TRAINING_TAG_UNIVERSE_SIZE")
                    .unwrap_or_else(|_| "50".to_string())
                    .parse()
                    .expect("TRAINING_TAG_UNIVERSE_SIZE must be a valid i64"),
                trending_window_hours: env::var("TRAINING_TRENDING_WINDOW_HOURS")
                    .unwrap_or_else(|_| "24".to_string())
                    .parse()
                    .expect("TRAINING_TRENDING_WINDOW_HOURS must be a valid i64"),
            },
            scheduler: SchedulerConfig {
                daily_hour_utc: env::var("SCHEDULER_DAILY_HOUR_UTC")
                    .unwrap_or_else(|_| "2".to_string())
                    .parse()
                    .expect("SCHEDULER_DAILY_HOUR_UTC must be a valid u32"),
                hourly_interval_secs: env::var("SCHEDULER_HOURLY_INTERVAL_SECS")
                    .unwrap_or_else(|_| "3600".to_string())
                    .parse()
                    .expect("SCHEDULER_HOURLY_INTERVAL_SECS must be a valid u64"),
                frequent_interval_secs: env::var("SCHEDULER_FREQUENT_INTERVAL_SECS")
                    .unwrap_or_else(|_| "900".to_string())
                    .parse()
                    .expect("SCHEDULER_FREQUENT_INTERVAL_SECS must be a valid u64"),
            },
            ranking: RankingConfig {
                default_max_distance_km: env::var("RANKING_DEFAULT_MAX_DISTANCE_KM")
                    .unwrap_or_else(|_| "50.0".to_string())
                    .parse()
                    .expect("RANKING_DEFAULT_MAX_DISTANCE_KM must be a valid f64"),
                collaborative_top_k: env::var("RANKING_COLLABORATIVE_TOP_K")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .expect("RANKING_COLLABORATIVE_TOP_K must be a valid usize"),
            },
        }
    }
}
