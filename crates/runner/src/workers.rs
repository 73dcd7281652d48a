use std::collections::HashMap;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tickd_core::{SchedulerError, SchedulerResult};
use tickd_domain::Worker;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct ShellParams {
    command: String,
    #[serde(default)]
    args: Vec<String>,
    working_dir: Option<String>,
    #[serde(default)]
    env: HashMap<String, String>,
}

/// Runs a command and streams its stdout/stderr lines as log records.
pub struct ShellWorker;

impl ShellWorker {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ShellWorker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Worker for ShellWorker {
    fn name(&self) -> &str {
        "shell"
    }

    async fn start(&self, context: &serde_json::Value) -> SchedulerResult<()> {
        let params: ShellParams = serde_json::from_value(context.clone())
            .map_err(|e| SchedulerError::TaskExecution(format!("invalid shell parameters: {e}")))?;

        let mut cmd = Command::new(&params.command);
        cmd.args(&params.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &params.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &params.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|e| {
            SchedulerError::TaskExecution(format!("failed to start '{}': {e}", params.command))
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SchedulerError::TaskExecution("stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SchedulerError::TaskExecution("stderr not captured".to_string()))?;

        let mut stdout_reader = BufReader::new(stdout).lines();
        let mut stderr_reader = BufReader::new(stderr).lines();

        let stdout_task = async {
            while let Ok(Some(line)) = stdout_reader.next_line().await {
                info!(target: "worker::shell", "{line}");
            }
        };
        let stderr_task = async {
            while let Ok(Some(line)) = stderr_reader.next_line().await {
                warn!(target: "worker::shell", "{line}");
            }
        };
        tokio::join!(stdout_task, stderr_task);

        let status = child.wait().await.map_err(|e| {
            SchedulerError::TaskExecution(format!("failed to wait for '{}': {e}", params.command))
        })?;

        if status.success() {
            Ok(())
        } else {
            Err(SchedulerError::TaskExecution(format!(
                "command '{}' exited with {status}",
                params.command
            )))
        }
    }
}

#[derive(Debug, Deserialize)]
struct HttpParams {
    url: String,
    #[serde(default = "default_method")]
    method: String,
    body: Option<serde_json::Value>,
}

fn default_method() -> String {
    "GET".to_string()
}

/// Issues one HTTP request; any non-2xx response fails the run.
pub struct HttpWorker {
    client: reqwest::Client,
}

impl HttpWorker {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpWorker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Worker for HttpWorker {
    fn name(&self) -> &str {
        "http"
    }

    async fn start(&self, context: &serde_json::Value) -> SchedulerResult<()> {
        let params: HttpParams = serde_json::from_value(context.clone())
            .map_err(|e| SchedulerError::TaskExecution(format!("invalid http parameters: {e}")))?;

        let request = match params.method.to_uppercase().as_str() {
            "GET" => self.client.get(&params.url),
            "POST" => {
                let request = self.client.post(&params.url);
                match &params.body {
                    Some(body) => request.json(body),
                    None => request,
                }
            }
            other => {
                return Err(SchedulerError::TaskExecution(format!(
                    "unsupported http method: {other}"
                )))
            }
        };

        let response = request.send().await.map_err(|e| {
            SchedulerError::TaskExecution(format!("request to {} failed: {e}", params.url))
        })?;
        let status = response.status();
        info!(target: "worker::http", "{} {} -> {status}", params.method, params.url);

        if status.is_success() {
            Ok(())
        } else {
            Err(SchedulerError::TaskExecution(format!(
                "request to {} returned {status}",
                params.url
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shell_worker_runs_a_command_to_completion() {
        let worker = ShellWorker::new();
        let context = serde_json::json!({"command": "echo", "args": ["hello"]});
        assert!(worker.start(&context).await.is_ok());
    }

    #[tokio::test]
    async fn shell_worker_fails_on_nonzero_exit() {
        let worker = ShellWorker::new();
        let context = serde_json::json!({"command": "false"});
        let result = worker.start(&context).await;
        assert!(matches!(result, Err(SchedulerError::TaskExecution(_))));
    }

    #[tokio::test]
    async fn shell_worker_rejects_missing_command() {
        let worker = ShellWorker::new();
        let result = worker.start(&serde_json::json!({"args": ["x"]})).await;
        assert!(matches!(result, Err(SchedulerError::TaskExecution(_))));
    }

    #[tokio::test]
    async fn http_worker_rejects_unsupported_methods() {
        let worker = HttpWorker::new();
        let context = serde_json::json!({"url": "http://localhost:1/", "method": "BREW"});
        let result = worker.start(&context).await;
        assert!(matches!(result, Err(SchedulerError::TaskExecution(_))));
    }

    #[tokio::test]
    async fn http_worker_rejects_missing_url() {
        let worker = HttpWorker::new();
        let result = worker.start(&serde_json::json!({"method": "GET"})).await;
        assert!(matches!(result, Err(SchedulerError::TaskExecution(_))));
    }
}
