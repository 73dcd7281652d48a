use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use metrics::counter;
use tickd_core::SchedulerResult;
use tickd_domain::value_objects::logging_key;
use tickd_domain::{ElectionStore, Job, JobState, JobStore, WorkerRegistry};
use tracing::instrument::WithSubscriber;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;

use crate::log_sink::{self, CaptureLayer, JobLogHandle};

/// Single-shot execution of one task: create the job, capture logs, invoke
/// the worker, persist the outcome. Nothing thrown by the worker escapes.
pub struct TaskRunner {
    job_store: Arc<dyn JobStore>,
    store: Arc<dyn ElectionStore>,
    registry: Arc<dyn WorkerRegistry>,
    /// Retention of the transient log buffer after persistence; a slow
    /// reader may still be draining it.
    log_key_ttl: Duration,
}

impl TaskRunner {
    pub fn new(
        job_store: Arc<dyn JobStore>,
        store: Arc<dyn ElectionStore>,
        registry: Arc<dyn WorkerRegistry>,
        log_key_ttl: Duration,
    ) -> Self {
        Self {
            job_store,
            store,
            registry,
            log_key_ttl,
        }
    }

    pub async fn run(
        &self,
        task_id: i64,
        context: serde_json::Value,
        worker_name: &str,
    ) -> SchedulerResult<Job> {
        // Committed before any worker code runs: a crash mid-execution
        // still leaves a discoverable RUNNING job.
        let job = self.job_store.create_job(task_id, Utc::now()).await?;
        info!(job_id = job.id, task_id, worker = worker_name, "job created");

        let log_key = context
            .get("log_key")
            .and_then(|v| v.as_str())
            .map(str::to_owned)
            .unwrap_or_else(|| logging_key(task_id, job.id));
        let (handle, layer, forwarder) =
            log_sink::attach(Arc::clone(&self.store), log_key.clone());

        let state = self.execute(&context, worker_name, &handle, layer).await;

        // Close the channel so the forwarder drains and exits before the
        // buffer is read back.
        drop(handle);
        let _ = forwarder.await;

        // An unreadable buffer means the captured lines are gone. Recording
        // SUCCESS without them would be indistinguishable from a worker that
        // logged nothing, so the job goes to FAIL with a note instead.
        let (state, lines) = match self.store.list_range(&log_key, 0, -1).await {
            Ok(lines) => (state, lines),
            Err(e) => {
                error!(job_id = job.id, error = %e, "failed to read back job logs");
                (
                    JobState::Failed,
                    vec![format!("log buffer unreadable, captured output lost: {e}")],
                )
            }
        };

        if let Err(e) = self.job_store.finalize(job.id, state, &lines).await {
            error!(job_id = job.id, error = %e, "failed to persist job outcome");
            // An outcome that cannot be recorded is indistinguishable from a
            // failure; at least try not to leave the job RUNNING.
            if let Err(e2) = self.job_store.set_state(job.id, JobState::Failed).await {
                error!(job_id = job.id, error = %e2, "failed to mark job FAIL after persistence error");
            }
            return Err(e);
        }

        if let Err(e) = self.store.expire(&log_key, self.log_key_ttl).await {
            warn!(job_id = job.id, error = %e, "failed to expire job log buffer");
        }

        match state {
            JobState::Success => counter!("tickd_jobs_succeeded_total").increment(1),
            _ => counter!("tickd_jobs_failed_total").increment(1),
        }
        info!(job_id = job.id, state = state.as_str(), "job finished");

        Ok(Job { state, ..job })
    }

    async fn execute(
        &self,
        context: &serde_json::Value,
        worker_name: &str,
        handle: &JobLogHandle,
        layer: CaptureLayer,
    ) -> JobState {
        let worker = match self.registry.get(worker_name).await {
            Some(worker) => worker,
            None => {
                handle.append(format!("worker '{worker_name}' is not registered"));
                error!(worker = worker_name, "worker not found");
                return JobState::Failed;
            }
        };

        // Everything the worker logs goes to the capture subscriber, and
        // from there into the shared buffer rather than local output.
        let subscriber = tracing_subscriber::registry().with(layer);
        let outcome = std::panic::AssertUnwindSafe(worker.start(context))
            .catch_unwind()
            .with_subscriber(subscriber)
            .await;

        match outcome {
            Ok(Ok(())) => JobState::Success,
            Ok(Err(e)) => {
                handle.append(format!("worker '{worker_name}' failed: {e}"));
                JobState::Failed
            }
            Err(_) => {
                handle.append(format!("worker '{worker_name}' panicked"));
                JobState::Failed
            }
        }
    }
}
