use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tickd_core::SchedulerResult;

/// Shared TTL-capable key/value store backing leader election, the manual
/// and configured run channels, and the transient per-job log buffers.
///
/// Every operation must be atomic with respect to concurrent callers across
/// processes; `set_if_absent` in particular is what makes the election
/// correct under concurrent replicas. Implementations map transport
/// failures to `SchedulerError::ElectionStore`, which callers on the
/// election path treat as "not elected".
#[async_trait]
pub trait ElectionStore: Send + Sync {
    /// Set `key` to `value` with `ttl` iff the key is absent. Returns true
    /// iff this call created the key.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration)
        -> SchedulerResult<bool>;

    async fn get(&self, key: &str) -> SchedulerResult<Option<String>>;

    /// Unconditionally set `key` to `value`, replacing any previous value.
    async fn put(&self, key: &str, value: &str) -> SchedulerResult<()>;

    async fn expire(&self, key: &str, ttl: Duration) -> SchedulerResult<()>;

    /// Append to the list at `key`, creating it if needed.
    async fn append(&self, key: &str, value: &str) -> SchedulerResult<()>;

    /// Inclusive range over the list at `key`; negative indices count from
    /// the end, so `(0, -1)` is the whole list.
    async fn list_range(&self, key: &str, start: isize, end: isize)
        -> SchedulerResult<Vec<String>>;

    /// Pop the oldest element of the list at `key`. Each element is
    /// delivered to exactly one caller.
    async fn pop(&self, key: &str) -> SchedulerResult<Option<String>>;

    /// Atomically read and delete the value at `key`.
    async fn take(&self, key: &str) -> SchedulerResult<Option<String>>;

    async fn remove(&self, key: &str) -> SchedulerResult<()>;
}

/// Pluggable business logic invoked by the task runner. Implementations
/// must not assume they run in the scheduler's process.
#[async_trait]
pub trait Worker: Send + Sync {
    fn name(&self) -> &str;

    async fn start(&self, context: &serde_json::Value) -> SchedulerResult<()>;
}

/// Name-to-worker lookup, populated at process startup by explicit
/// registration. Replaces resolving worker modules by string import.
#[async_trait]
pub trait WorkerRegistry: Send + Sync {
    async fn register(&self, worker: Arc<dyn Worker>);

    async fn get(&self, name: &str) -> Option<Arc<dyn Worker>>;

    async fn names(&self) -> Vec<String>;
}

/// Everything a spawned task runner needs to execute one elected run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    pub task_id: i64,
    pub worker_name: String,
    pub context: serde_json::Value,
}

/// Fire-and-forget dispatch of one isolated unit of execution. The
/// production implementation spawns an OS process; tests record requests.
#[async_trait]
pub trait RunnerSpawner: Send + Sync {
    async fn spawn(&self, request: RunRequest) -> SchedulerResult<()>;
}
