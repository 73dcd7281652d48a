use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tickd_core::SchedulerResult;

use crate::entities::{Job, JobMessage, JobState, Task};

/// Read-only access to task definitions.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn get_by_id(&self, id: i64) -> SchedulerResult<Option<Task>>;

    async fn list_enabled(&self) -> SchedulerResult<Vec<Task>>;
}

/// Durable storage for jobs and their captured log lines.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Create and commit a new RUNNING job. This happens before any worker
    /// code runs, so a crash mid-execution still leaves a discoverable row.
    async fn create_job(&self, task_id: i64, ran_at: DateTime<Utc>) -> SchedulerResult<Job>;

    async fn set_state(&self, job_id: i64, state: JobState) -> SchedulerResult<()>;

    /// Insert log lines for a job, preserving their order.
    async fn bulk_insert_messages(&self, job_id: i64, lines: &[String]) -> SchedulerResult<()>;

    /// Persist the terminal state and the log lines in one transaction.
    /// Neither may land without the other.
    async fn finalize(
        &self,
        job_id: i64,
        state: JobState,
        lines: &[String],
    ) -> SchedulerResult<()>;

    async fn get_job(&self, job_id: i64) -> SchedulerResult<Option<Job>>;

    async fn list_messages(&self, job_id: i64) -> SchedulerResult<Vec<JobMessage>>;

    /// RUNNING jobs created before `cutoff`, for the recovery sweep.
    async fn list_running_older_than(&self, cutoff: DateTime<Utc>)
        -> SchedulerResult<Vec<Job>>;
}
