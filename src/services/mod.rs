pub mod collaborative;
pub mod content;
pub mod hybrid;
pub mod signals;

pub use collaborative::{CollaborativeFilter, UserItemMatrix};
pub use content::ContentModel;
pub use hybrid::{FeedRanker, HybridRecommender};
