pub mod config;
pub mod error;
pub mod jobs;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

pub use config::Config;
pub use error::{RankingError, StoreError};
pub use jobs::{TrainingScheduler, TrainingService};
pub use services::{FeedRanker, HybridRecommender};
