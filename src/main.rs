use listing_ranking_service::{
    jobs::{TrainingScheduler, TrainingService},
    store::InMemoryStore,
    Config, HybridRecommender,
};
use listing_ranking_service::models::HybridWeights;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    // Load config
    let config = Config::from_env();
    let mode = parse_mode();

    info!(
        service = %config.service.service_name,
        mode = %mode,
        "starting service"
    );

    // The in-memory store backs local runs; a deployment wires in its own
    // RecommendationStore implementation here.
    let store = Arc::new(InMemoryStore::new());
    let recommender = Arc::new(HybridRecommender::new(
        HybridWeights::default(),
        config.ranking.collaborative_top_k,
    ));
    let training = Arc::new(TrainingService::new(
        store,
        recommender,
        config.training.clone(),
    ));

    match mode.as_str() {
        // Manual one-shot triggers for bootstrapping and debugging.
        "daily" => training.run_daily().await?,
        "hourly" => training.run_hourly().await?,
        "frequent" => training.run_frequent().await?,
        "serve" => {
            let scheduler = TrainingScheduler::new(training, config.scheduler.clone());
            scheduler.start();

            tokio::signal::ctrl_c().await?;
            info!("shutdown signal received");
            scheduler.stop();
        }
        other => {
            anyhow::bail!("unknown mode: {other} (expected serve|daily|hourly|frequent)");
        }
    }

    Ok(())
}

/// `--mode serve|daily|hourly|frequent`, defaulting to serve.
fn parse_mode() -> String {
    let args: Vec<String> = std::env::args().collect();
    args.iter()
        .position(|a| a == "--mode")
        .and_then(|i| args.get(i + 1))
        .cloned()
        .unwrap_or_else(|| "serve".to_string())
}
