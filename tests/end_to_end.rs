//! Full pipeline coverage against the in-memory infrastructure: election,
//! dispatch, execution and persistence in one process.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tickd_core::SchedulerResult;
use tickd_dispatcher::{push_manual, submit_configured, Elector, SchedulerLoop};
use tickd_domain::{
    ElectionStore, JobState, JobStore, RunRequest, RunnerSpawner, Task, TaskRepository, Worker,
    WorkerRegistry,
};
use tickd_infrastructure::{MemoryElectionStore, MemoryJobStore, MemoryTaskRepository};
use tickd_runner::{InMemoryWorkerRegistry, TaskRunner};

struct EchoWorker;

#[async_trait]
impl Worker for EchoWorker {
    fn name(&self) -> &str {
        "echo"
    }

    async fn start(&self, context: &serde_json::Value) -> SchedulerResult<()> {
        if let Some(message) = context.get("message").and_then(|v| v.as_str()) {
            tracing::info!("{message}");
        }
        Ok(())
    }
}

/// Executes elected runs inline instead of spawning a process, so the whole
/// pipeline stays observable within the test.
struct InlineSpawner {
    runner: TaskRunner,
}

#[async_trait]
impl RunnerSpawner for InlineSpawner {
    async fn spawn(&self, request: RunRequest) -> SchedulerResult<()> {
        self.runner
            .run(request.task_id, request.context, &request.worker_name)
            .await
            .map(|_| ())
    }
}

struct World {
    task_repo: Arc<MemoryTaskRepository>,
    store: Arc<MemoryElectionStore>,
    job_store: Arc<MemoryJobStore>,
    scheduler: SchedulerLoop,
}

async fn world() -> World {
    let task_repo = Arc::new(MemoryTaskRepository::new());
    let store = Arc::new(MemoryElectionStore::new());
    let job_store = Arc::new(MemoryJobStore::new());

    let registry = Arc::new(InMemoryWorkerRegistry::new());
    registry.register(Arc::new(EchoWorker)).await;

    let runner = TaskRunner::new(
        Arc::clone(&job_store) as Arc<dyn JobStore>,
        Arc::clone(&store) as Arc<dyn ElectionStore>,
        registry as Arc<dyn WorkerRegistry>,
        Duration::from_secs(300),
    );
    let elector = Elector::with_identity(
        Arc::clone(&task_repo) as Arc<dyn TaskRepository>,
        Arc::clone(&store) as Arc<dyn ElectionStore>,
        "test-replica".to_string(),
        Duration::from_secs(60),
    );
    let scheduler = SchedulerLoop::new(
        elector,
        Arc::new(InlineSpawner { runner }),
        Duration::from_secs(1),
    );

    World {
        task_repo,
        store,
        job_store,
        scheduler,
    }
}

fn every_minute_task(id: i64, message: &str) -> Task {
    let created = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    Task {
        id,
        name: format!("task-{id}"),
        enabled: true,
        cron_expr: "* * * * *".to_string(),
        context: serde_json::json!({ "message": message }),
        worker_name: "echo".to_string(),
        created_at: created,
        updated_at: created,
    }
}

#[tokio::test]
async fn scheduled_task_runs_once_and_persists_its_output() {
    let w = world().await;
    w.task_repo.insert(every_minute_task(1, "hello")).await;

    assert_eq!(w.scheduler.run_once().await, 1);

    let job = w.job_store.get_job(1).await.unwrap().unwrap();
    assert_eq!(job.task_id, 1);
    assert_eq!(job.state, JobState::Success);

    let messages = w.job_store.list_messages(job.id).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].content.contains("hello"));
}

#[tokio::test]
async fn a_won_election_is_not_rerun_within_the_same_minute() {
    let w = world().await;
    w.task_repo.insert(every_minute_task(1, "once")).await;

    assert_eq!(w.scheduler.run_once().await, 1);
    // Same minute bucket: the claim still stands, nothing is dispatched.
    assert_eq!(w.scheduler.run_once().await, 0);
    assert_eq!(w.job_store.job_count().await, 1);
}

#[tokio::test]
async fn manual_trigger_runs_a_disabled_task() {
    let w = world().await;
    let mut task = every_minute_task(3, "manual");
    task.enabled = false;
    w.task_repo.insert(task).await;

    // Disabled, so the scheduled path never picks it up.
    assert_eq!(w.scheduler.run_once().await, 0);

    push_manual(w.store.as_ref(), 3).await.unwrap();
    assert_eq!(w.scheduler.run_once().await, 1);

    let job = w.job_store.get_job(1).await.unwrap().unwrap();
    assert_eq!(job.task_id, 3);
    assert_eq!(job.state, JobState::Success);
}

#[tokio::test]
async fn configured_run_overrides_the_task_context_for_one_run() {
    let w = world().await;
    let mut task = every_minute_task(4, "default");
    task.enabled = false;
    w.task_repo.insert(task).await;

    submit_configured(
        w.store.as_ref(),
        4,
        serde_json::json!({ "message": "override" }),
    )
    .await
    .unwrap();

    assert_eq!(w.scheduler.run_once().await, 1);
    let messages = w.job_store.list_messages(1).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].content.contains("override"));

    // The slot is consumed; nothing runs a second time.
    assert_eq!(w.scheduler.run_once().await, 0);
}

#[tokio::test]
async fn unknown_worker_yields_a_failed_job_not_a_crash() {
    let w = world().await;
    let mut task = every_minute_task(5, "ignored");
    task.worker_name = "missing".to_string();
    w.task_repo.insert(task).await;

    assert_eq!(w.scheduler.run_once().await, 1);

    let job = w.job_store.get_job(1).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Failed);
    let messages = w.job_store.list_messages(job.id).await.unwrap();
    assert!(messages
        .iter()
        .any(|m| m.content.contains("'missing' is not registered")));
}
