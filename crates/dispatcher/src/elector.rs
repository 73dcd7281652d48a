use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tickd_core::{SchedulerError, SchedulerResult};
use tickd_domain::value_objects::{
    election_key, replica_identity, CONFIGURED_SLOT_KEY, MANUAL_QUEUE_KEY,
};
use tickd_domain::{ElectionStore, RunRequest, Task, TaskRepository, TimeBucket};
use tracing::{debug, warn};

use crate::cron_utils::CronMatcher;

/// Default validity of an election claim. Long enough to observe the claim
/// and spawn the runner, short enough to expire before the same minute
/// bucket could recur.
pub const DEFAULT_ELECTION_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunSource {
    Scheduled,
    Manual,
    Configured,
}

/// One task this replica should execute right now.
#[derive(Debug, Clone)]
pub struct ElectedRun {
    pub task: Task,
    pub context: serde_json::Value,
    pub source: RunSource,
}

impl ElectedRun {
    pub fn into_request(self) -> RunRequest {
        RunRequest {
            task_id: self.task.id,
            worker_name: self.task.worker_name,
            context: self.context,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ConfiguredRun {
    task_id: i64,
    context: serde_json::Value,
}

/// Produces, per invocation, the de-duplicated set of tasks to execute now:
/// cron-matched tasks that won the election for the current minute bucket,
/// plus manually queued and configured (context-overridden) runs.
pub struct Elector {
    task_repo: Arc<dyn TaskRepository>,
    store: Arc<dyn ElectionStore>,
    identity: String,
    election_ttl: Duration,
}

impl Elector {
    pub fn new(task_repo: Arc<dyn TaskRepository>, store: Arc<dyn ElectionStore>) -> Self {
        Self::with_identity(task_repo, store, replica_identity(), DEFAULT_ELECTION_TTL)
    }

    pub fn with_identity(
        task_repo: Arc<dyn TaskRepository>,
        store: Arc<dyn ElectionStore>,
        identity: String,
        election_ttl: Duration,
    ) -> Self {
        Self {
            task_repo,
            store,
            identity,
            election_ttl,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub async fn elect(&self, now: DateTime<Utc>) -> SchedulerResult<Vec<ElectedRun>> {
        let bucket = TimeBucket::from_datetime(now);
        let mut runs = self.scheduled_runs(&bucket).await?;
        runs.extend(self.manual_runs().await);
        if let Some(run) = self.configured_run().await {
            runs.push(run);
        }
        Ok(runs)
    }

    async fn scheduled_runs(&self, bucket: &TimeBucket) -> SchedulerResult<Vec<ElectedRun>> {
        let tasks = self.task_repo.list_enabled().await?;
        let mut elected = Vec::new();

        for task in tasks {
            let matcher = match CronMatcher::new(&task.cron_expr) {
                Ok(matcher) => matcher,
                Err(e) => {
                    warn!(task_id = task.id, task = %task.name, error = %e,
                        "skipping task with invalid cron expression");
                    continue;
                }
            };
            if !matcher.matches(bucket) {
                continue;
            }
            if self.is_elected(task.id, bucket).await {
                counter!("tickd_elections_won_total").increment(1);
                debug!(task_id = task.id, task = %task.name, %bucket, "won election");
                elected.push(ElectedRun {
                    context: task.context.clone(),
                    task,
                    source: RunSource::Scheduled,
                });
            }
        }
        Ok(elected)
    }

    /// The election protocol: claim the (task, bucket) key with a TTL'd
    /// set-if-absent, then read it back and require our own identity. Any
    /// store error means "not elected" - skipping a run is recoverable on
    /// the next bucket, double-scheduling is not.
    pub async fn is_elected(&self, task_id: i64, bucket: &TimeBucket) -> bool {
        let key = election_key(task_id, bucket);

        let claimed = match self
            .store
            .set_if_absent(&key, &self.identity, self.election_ttl)
            .await
        {
            Ok(claimed) => claimed,
            Err(e) => {
                warn!(%key, error = %e, "election store unreachable, treating as not elected");
                return false;
            }
        };
        if !claimed {
            return false;
        }

        match self.store.get(&key).await {
            Ok(Some(value)) if value == self.identity => true,
            Ok(_) => {
                debug!(%key, "claim confirmation failed, another replica holds the slot");
                false
            }
            Err(e) => {
                warn!(%key, error = %e, "could not confirm election claim, treating as not elected");
                false
            }
        }
    }

    /// Drain the manual trigger channel. Each popped entry runs exactly
    /// once, on whichever replica dequeued it, without election or cron
    /// match; the enabled flag is not consulted.
    async fn manual_runs(&self) -> Vec<ElectedRun> {
        let mut runs = Vec::new();
        loop {
            let raw = match self.store.pop(MANUAL_QUEUE_KEY).await {
                Ok(Some(raw)) => raw,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "manual trigger channel unreachable");
                    break;
                }
            };
            let task_id: i64 = match raw.parse() {
                Ok(id) => id,
                Err(_) => {
                    warn!(entry = %raw, "discarding malformed manual trigger");
                    continue;
                }
            };
            match self.task_repo.get_by_id(task_id).await {
                Ok(Some(task)) => {
                    counter!("tickd_manual_runs_total").increment(1);
                    runs.push(ElectedRun {
                        context: task.context.clone(),
                        task,
                        source: RunSource::Manual,
                    });
                }
                Ok(None) => warn!(task_id, "manual trigger references unknown task"),
                Err(e) => warn!(task_id, error = %e, "failed to load manually triggered task"),
            }
        }
        runs
    }

    /// Consume the single configured-run slot, if occupied. The submitted
    /// context replaces the task's default context for this run only.
    async fn configured_run(&self) -> Option<ElectedRun> {
        let raw = match self.store.take(CONFIGURED_SLOT_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "configured run slot unreachable");
                return None;
            }
        };
        let submitted: ConfiguredRun = match serde_json::from_str(&raw) {
            Ok(submitted) => submitted,
            Err(e) => {
                warn!(error = %e, "discarding malformed configured run");
                return None;
            }
        };
        match self.task_repo.get_by_id(submitted.task_id).await {
            Ok(Some(task)) => {
                counter!("tickd_configured_runs_total").increment(1);
                Some(ElectedRun {
                    task,
                    context: submitted.context,
                    source: RunSource::Configured,
                })
            }
            Ok(None) => {
                warn!(task_id = submitted.task_id, "configured run references unknown task");
                None
            }
            Err(e) => {
                warn!(task_id = submitted.task_id, error = %e, "failed to load configured task");
                None
            }
        }
    }
}

/// Queue a task for immediate, unconditional execution.
pub async fn push_manual(store: &dyn ElectionStore, task_id: i64) -> SchedulerResult<()> {
    store.append(MANUAL_QUEUE_KEY, &task_id.to_string()).await
}

/// Submit a one-shot run with a context override. The slot holds at most
/// one pending submission; a second submission replaces the first.
pub async fn submit_configured(
    store: &dyn ElectionStore,
    task_id: i64,
    context: serde_json::Value,
) -> SchedulerResult<()> {
    let payload = serde_json::to_string(&ConfiguredRun { task_id, context })
        .map_err(|e| SchedulerError::Serialization(e.to_string()))?;
    store.put(CONFIGURED_SLOT_KEY, &payload).await
}
