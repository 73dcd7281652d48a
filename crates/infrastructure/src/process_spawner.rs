//! Spawns each elected run as a separate OS process.

use std::path::PathBuf;

use async_trait::async_trait;
use tickd_core::{SchedulerError, SchedulerResult};
use tickd_domain::{RunRequest, RunnerSpawner};
use tokio::process::Command;
use tracing::info;

/// Re-executes the current binary in runner mode, one process per run.
/// A crashing or hanging worker therefore cannot take the scheduler loop
/// down with it.
pub struct ProcessSpawner {
    binary: PathBuf,
    config_path: Option<String>,
}

impl ProcessSpawner {
    pub fn new(config_path: Option<String>) -> SchedulerResult<Self> {
        let binary = std::env::current_exe().map_err(|e| {
            SchedulerError::Configuration(format!("cannot locate current executable: {e}"))
        })?;
        Ok(Self {
            binary,
            config_path,
        })
    }
}

#[async_trait]
impl RunnerSpawner for ProcessSpawner {
    async fn spawn(&self, request: RunRequest) -> SchedulerResult<()> {
        let context = serde_json::to_string(&request.context)
            .map_err(|e| SchedulerError::Serialization(e.to_string()))?;

        let mut cmd = Command::new(&self.binary);
        cmd.arg("--mode")
            .arg("runner")
            .arg("--task-id")
            .arg(request.task_id.to_string())
            .arg("--worker")
            .arg(&request.worker_name)
            .arg("--context")
            .arg(&context);
        if let Some(path) = &self.config_path {
            cmd.arg("--config").arg(path);
        }

        // Fire and forget. The runner process records its own outcome in
        // the job store, so the dispatcher never waits on it.
        let child = cmd.spawn().map_err(|e| {
            SchedulerError::TaskExecution(format!(
                "failed to spawn runner for task {}: {e}",
                request.task_id
            ))
        })?;

        info!(
            task_id = request.task_id,
            worker = %request.worker_name,
            pid = child.id(),
            "spawned runner process"
        );
        Ok(())
    }
}
