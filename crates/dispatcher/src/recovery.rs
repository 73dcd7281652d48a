use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tickd_core::SchedulerResult;
use tickd_domain::{JobState, JobStore};
use tracing::{error, info, warn};

/// Periodic sweep for jobs whose runner died without finalizing.
///
/// A runner killed from outside leaves its job at RUNNING forever; there is
/// no heartbeat to tell that apart from a slow worker, so the sweep marks
/// RUNNING jobs older than a configured age as FAIL with an explanatory
/// message. Swept jobs are not retried.
pub struct JobRecoveryService {
    job_store: Arc<dyn JobStore>,
    max_running: Duration,
}

impl JobRecoveryService {
    pub fn new(job_store: Arc<dyn JobStore>, max_running_minutes: i64) -> Self {
        Self {
            job_store,
            max_running: Duration::minutes(max_running_minutes),
        }
    }

    pub async fn sweep_once(&self, now: DateTime<Utc>) -> SchedulerResult<usize> {
        let cutoff = now - self.max_running;
        let stale = self.job_store.list_running_older_than(cutoff).await?;
        let mut swept = 0;

        for job in stale {
            let note = format!(
                "job exceeded the maximum running age of {} minutes and was marked FAIL by the recovery sweep",
                self.max_running.num_minutes()
            );
            match self
                .job_store
                .finalize(job.id, JobState::Failed, std::slice::from_ref(&note))
                .await
            {
                Ok(()) => {
                    warn!(job_id = job.id, task_id = job.task_id, ran_at = %job.ran_at,
                        "recovered stale running job");
                    swept += 1;
                }
                Err(e) => error!(job_id = job.id, error = %e, "failed to recover stale job"),
            }
        }

        if swept > 0 {
            info!(swept, "recovery sweep finished");
        }
        Ok(swept)
    }

    pub async fn run(&self, interval: StdDuration) {
        info!(
            interval_seconds = interval.as_secs(),
            max_running_minutes = self.max_running.num_minutes(),
            "job recovery sweep started"
        );
        loop {
            if let Err(e) = self.sweep_once(Utc::now()).await {
                error!(error = %e, "recovery sweep failed");
            }
            tokio::time::sleep(interval).await;
        }
    }
}
