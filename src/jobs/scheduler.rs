//! Recurring triggers for the training jobs.
//!
//! One long-lived scheduler is constructed at startup and owned by whatever
//! drives process lifecycle; there is no global instance. Three trigger
//! tasks run independently: daily at a fixed UTC hour, hourly, and every
//! fifteen minutes. Each firing is spawned as its own task and awaited, so a
//! failing or panicking run is logged without crashing the scheduler or
//! delaying the next firing.

use crate::config::SchedulerConfig;
use crate::jobs::training::TrainingService;
use chrono::{Duration as ChronoDuration, Utc};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct JobDescriptor {
    pub name: &'static str,
    pub cadence: String,
}

#[derive(Debug, Clone)]
pub struct SchedulerStatus {
    pub running: bool,
    pub jobs: Vec<JobDescriptor>,
}

pub struct TrainingScheduler {
    service: Arc<TrainingService>,
    config: SchedulerConfig,
    running: AtomicBool,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl TrainingScheduler {
    pub fn new(service: Arc<TrainingService>, config: SchedulerConfig) -> Self {
        Self {
            service,
            config,
            running: AtomicBool::new(false),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> SchedulerStatus {
        let jobs = if self.is_running() {
            vec![
                JobDescriptor {
                    name: "daily_similarity_training",
                    cadence: format!("daily at {:02}:00 UTC", self.config.daily_hour_utc),
                },
                JobDescriptor {
                    name: "hourly_engagement_refresh",
                    cadence: format!("every {}s", self.config.hourly_interval_secs),
                },
                JobDescriptor {
                    name: "frequent_feature_refresh",
                    cadence: format!("every {}s", self.config.frequent_interval_secs),
                },
            ]
        } else {
            Vec::new()
        };
        SchedulerStatus {
            running: self.is_running(),
            jobs,
        }
    }

    /// Register the three triggers and begin firing. A second `start` while
    /// running is a safe no-op.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("scheduler is already running");
            return;
        }

        info!(
            daily_hour_utc = self.config.daily_hour_utc,
            hourly_interval_secs = self.config.hourly_interval_secs,
            frequent_interval_secs = self.config.frequent_interval_secs,
            "starting training scheduler"
        );

        let daily_hour = self.config.daily_hour_utc;
        let daily_service = self.service.clone();
        let daily = tokio::spawn(async move {
            loop {
                sleep(duration_until_utc_hour(daily_hour)).await;
                let service = daily_service.clone();
                fire("daily_similarity_training", async move {
                    service.run_daily().await
                })
                .await;
            }
        });

        let hourly_service = self.service.clone();
        let hourly_secs = self.config.hourly_interval_secs;
        let hourly = tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(hourly_secs));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; wait a full period.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let service = hourly_service.clone();
                fire("hourly_engagement_refresh", async move {
                    service.run_hourly().await
                })
                .await;
            }
        });

        let frequent_service = self.service.clone();
        let frequent_secs = self.config.frequent_interval_secs;
        let frequent = tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(frequent_secs));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let service = frequent_service.clone();
                fire("frequent_feature_refresh", async move {
                    service.run_frequent().await
                })
                .await;
            }
        });

        let mut handles = self.handles.lock().expect("scheduler handles poisoned");
        handles.extend([daily, hourly, frequent]);
    }

    /// Cancel all triggers. Runs already spawned by a firing complete on
    /// their own; only future firings are prevented. Safe when stopped.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("scheduler is not running");
            return;
        }

        let mut handles = self.handles.lock().expect("scheduler handles poisoned");
        for handle in handles.drain(..) {
            handle.abort();
        }
        info!("training scheduler stopped");
    }
}

impl Drop for TrainingScheduler {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
        }
    }
}

/// Run one firing in its own task so a panic inside the job is contained.
async fn fire<F>(job: &'static str, run: F)
where
    F: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    info!(job, "scheduled job firing");
    let handle = tokio::spawn(run);
    match handle.await {
        Ok(Ok(())) => info!(job, "scheduled job complete"),
        Ok(Err(e)) => error!(job, error = %e, "scheduled job failed"),
        Err(e) => error!(job, error = %e, "scheduled job panicked"),
    }
}

/// Time until the next occurrence of `hour:00:00` UTC.
fn duration_until_utc_hour(hour: u32) -> Duration {
    let now = Utc::now();
    let today_target = now
        .date_naive()
        .and_hms_opt(hour.min(23), 0, 0)
        .expect("valid wall-clock hour")
        .and_utc();

    let target = if today_target > now {
        today_target
    } else {
        today_target + ChronoDuration::days(1)
    };

    (target - now).to_std().unwrap_or(Duration::from_secs(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrainingConfig;
    use crate::services::hybrid::HybridRecommender;
    use crate::store::InMemoryStore;

    fn scheduler(frequent_secs: u64) -> TrainingScheduler {
        let store = Arc::new(InMemoryStore::new());
        let recommender = Arc::new(HybridRecommender::default());
        let training = TrainingConfig {
            window_days: 90,
            min_interactions: 100,
            neighbor_limit: 50,
            min_similarity: 0.1,
            tag_universe_size: 50,
            trending_window_hours: 24,
        };
        let service = Arc::new(TrainingService::new(store, recommender, training));
        TrainingScheduler::new(
            service,
            SchedulerConfig {
                daily_hour_utc: 2,
                hourly_interval_secs: 3600,
                frequent_interval_secs: frequent_secs,
            },
        )
    }

    #[test]
    fn test_duration_until_utc_hour_is_within_a_day() {
        for hour in [0, 2, 12, 23] {
            let d = duration_until_utc_hour(hour);
            assert!(d <= Duration::from_secs(86_400));
            assert!(d >= Duration::from_secs(1));
        }
    }

    #[tokio::test]
    async fn test_start_twice_is_a_noop() {
        let s = scheduler(900);
        s.start();
        assert!(s.is_running());
        assert_eq!(s.handles.lock().unwrap().len(), 3);

        s.start();
        assert_eq!(s.handles.lock().unwrap().len(), 3);

        s.stop();
        assert!(!s.is_running());
    }

    #[tokio::test]
    async fn test_stop_when_stopped_is_safe() {
        let s = scheduler(900);
        s.stop();
        assert!(!s.is_running());

        s.start();
        s.stop();
        s.stop();
        assert!(s.handles.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_status_reports_registered_jobs() {
        let s = scheduler(900);
        assert!(s.status().jobs.is_empty());

        s.start();
        let status = s.status();
        assert!(status.running);
        assert_eq!(status.jobs.len(), 3);
        assert_eq!(status.jobs[0].name, "daily_similarity_training");

        s.stop();
        assert!(s.status().jobs.is_empty());
    }
}
