use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tickd_core::{SchedulerError, SchedulerResult};
use tickd_domain::{ElectionStore, RunRequest, RunnerSpawner, Task};
use tokio::sync::Mutex;

pub fn test_task(id: i64, cron_expr: &str, enabled: bool, worker_name: &str) -> Task {
    let now = Utc::now();
    Task {
        id,
        name: format!("task-{id}"),
        enabled,
        cron_expr: cron_expr.to_string(),
        context: serde_json::json!({}),
        worker_name: worker_name.to_string(),
        created_at: now,
        updated_at: now,
    }
}

/// Spawner that records every request instead of starting anything.
pub struct RecordingSpawner {
    requests: Mutex<Vec<RunRequest>>,
}

impl RecordingSpawner {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
        }
    }

    pub async fn requests(&self) -> Vec<RunRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl RunnerSpawner for RecordingSpawner {
    async fn spawn(&self, request: RunRequest) -> SchedulerResult<()> {
        self.requests.lock().await.push(request);
        Ok(())
    }
}

/// Election store where every operation fails, simulating an outage.
pub struct FailingElectionStore;

fn unavailable() -> SchedulerError {
    SchedulerError::ElectionStore("store unavailable".to_string())
}

#[async_trait]
impl ElectionStore for FailingElectionStore {
    async fn set_if_absent(
        &self,
        _key: &str,
        _value: &str,
        _ttl: Duration,
    ) -> SchedulerResult<bool> {
        Err(unavailable())
    }

    async fn get(&self, _key: &str) -> SchedulerResult<Option<String>> {
        Err(unavailable())
    }

    async fn put(&self, _key: &str, _value: &str) -> SchedulerResult<()> {
        Err(unavailable())
    }

    async fn expire(&self, _key: &str, _ttl: Duration) -> SchedulerResult<()> {
        Err(unavailable())
    }

    async fn append(&self, _key: &str, _value: &str) -> SchedulerResult<()> {
        Err(unavailable())
    }

    async fn list_range(
        &self,
        _key: &str,
        _start: isize,
        _end: isize,
    ) -> SchedulerResult<Vec<String>> {
        Err(unavailable())
    }

    async fn pop(&self, _key: &str) -> SchedulerResult<Option<String>> {
        Err(unavailable())
    }

    async fn take(&self, _key: &str) -> SchedulerResult<Option<String>> {
        Err(unavailable())
    }

    async fn remove(&self, _key: &str) -> SchedulerResult<()> {
        Err(unavailable())
    }
}
