pub mod scheduler;
pub mod training;

pub use scheduler::{SchedulerStatus, TrainingScheduler};
pub use training::{
    EngagementJobStats, FeatureJobStats, SimilarityJobStats, TrainingService,
};
