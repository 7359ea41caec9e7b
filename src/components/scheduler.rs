use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::lifecycle::Component;

/// A unit of cron-scheduled work.
#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &str;

    /// Cron expression with a leading seconds field, e.g. `"0 */5 * * * *"`.
    fn schedule(&self) -> &str;

    async fn run(&self) -> anyhow::Result<()>;
}

struct ScheduledJob {
    job: Arc<dyn Job>,
    schedule: cron::Schedule,
}

/// Pins cron's wall-clock fire times to the runtime clock, so waits are
/// measured by `tokio::time`.
#[derive(Clone, Copy)]
struct WallAnchor {
    wall: DateTime<Utc>,
    instant: Instant,
}

impl WallAnchor {
    fn now() -> Self {
        Self {
            wall: Utc::now(),
            instant: Instant::now(),
        }
    }

    fn wall_now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.instant.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.wall + elapsed
    }

    fn instant_at(&self, at: DateTime<Utc>) -> Instant {
        self.instant + (at - self.wall).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Runs registered jobs on their cron schedules.
///
/// Jobs keep firing after the entry routine is cancelled; only teardown
/// stops scheduling, then waits for jobs already running. Fire times missed
/// while a job is still running are skipped.
pub struct SchedulerComponent {
    jobs: Vec<ScheduledJob>,
    tracker: TaskTracker,
    stop: CancellationToken,
}

impl SchedulerComponent {
    pub fn new(jobs: Vec<Arc<dyn Job>>) -> Self {
        let mut accepted = Vec::with_capacity(jobs.len());
        for job in jobs {
            match cron::Schedule::from_str(job.schedule()) {
                Ok(schedule) => {
                    tracing::info!(job = job.name(), schedule = job.schedule(), "Job registered");
                    accepted.push(ScheduledJob { job, schedule });
                }
                Err(e) => {
                    tracing::warn!(
                        job = job.name(),
                        schedule = job.schedule(),
                        error = %e,
                        "Failed to register job, skipping"
                    );
                }
            }
        }

        Self {
            jobs: accepted,
            tracker: TaskTracker::new(),
            stop: CancellationToken::new(),
        }
    }

    pub fn list_jobs(&self) -> Vec<String> {
        self.jobs.iter().map(|j| j.job.name().to_string()).collect()
    }

    fn spawn_job(&self, job: Arc<dyn Job>, schedule: cron::Schedule) {
        let stop = self.stop.clone();
        self.tracker.spawn(async move {
            let anchor = WallAnchor::now();
            let mut cursor = anchor.wall;

            loop {
                let Some(next) = schedule.after(&cursor).next() else {
                    tracing::info!(job = job.name(), "Job schedule has no further fire times");
                    break;
                };

                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = sleep_until(anchor.instant_at(next)) => {
                        tracing::info!(job = job.name(), "Job started");
                        match job.run().await {
                            Ok(()) => tracing::info!(job = job.name(), "Job completed successfully"),
                            Err(e) => tracing::error!(job = job.name(), error = %e, "Job execution failed"),
                        }
                    }
                }

                cursor = next.max(anchor.wall_now());
            }
        });
    }
}

#[async_trait]
impl Component for SchedulerComponent {
    fn name(&self) -> &'static str {
        "scheduler"
    }

    async fn run(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        for scheduled in &self.jobs {
            self.spawn_job(scheduled.job.clone(), scheduled.schedule.clone());
        }
        tracing::debug!(jobs = self.jobs.len(), "Scheduler started");

        cancel.cancelled().await;
        tracing::debug!("Scheduler component context cancelled");
        Ok(())
    }

    async fn teardown(&self, deadline: Duration) -> anyhow::Result<()> {
        self.stop.cancel();
        self.tracker.close();

        match tokio::time::timeout(deadline, self.tracker.wait()).await {
            Ok(()) => {
                tracing::debug!("Scheduler stopped");
                Ok(())
            }
            Err(_) => Err(anyhow::anyhow!("scheduler stop timed out")),
        }
    }
}
