use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::{counter, histogram};
use tickd_domain::RunnerSpawner;
use tracing::{error, info};

use crate::elector::Elector;

/// The long-running dispatch loop: wake up, ask the elector what to run,
/// spawn one isolated runner per elected task, sleep, repeat. Dispatch is
/// fire-and-forget; nothing here waits for a runner to finish, and
/// concurrency across tasks is unbounded.
pub struct SchedulerLoop {
    elector: Elector,
    spawner: Arc<dyn RunnerSpawner>,
    wakeup: Duration,
}

impl SchedulerLoop {
    pub fn new(elector: Elector, spawner: Arc<dyn RunnerSpawner>, wakeup: Duration) -> Self {
        Self {
            elector,
            spawner,
            wakeup,
        }
    }

    /// One iteration: elect and dispatch. Returns how many runners were
    /// spawned. Election and spawn failures are logged, never fatal.
    pub async fn run_once(&self) -> usize {
        let started = std::time::Instant::now();

        let runs = match self.elector.elect(Utc::now()).await {
            Ok(runs) => runs,
            Err(e) => {
                error!(error = %e, "election cycle failed");
                return 0;
            }
        };

        let mut dispatched = 0;
        for run in runs {
            let source = run.source;
            let request = run.into_request();
            let task_id = request.task_id;
            match self.spawner.spawn(request).await {
                Ok(()) => {
                    counter!("tickd_runs_dispatched_total").increment(1);
                    info!(task_id, ?source, "dispatched task runner");
                    dispatched += 1;
                }
                Err(e) => error!(task_id, error = %e, "failed to spawn task runner"),
            }
        }

        histogram!("tickd_schedule_cycle_seconds").record(started.elapsed().as_secs_f64());
        dispatched
    }

    /// Run until the process is terminated. There is no in-loop shutdown
    /// primitive; external process termination is the only stop mechanism.
    pub async fn run(&self) {
        info!(
            identity = self.elector.identity(),
            wakeup_seconds = self.wakeup.as_secs(),
            "scheduler loop started"
        );
        loop {
            self.run_once().await;
            tokio::time::sleep(self.wakeup).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tickd_domain::{ElectionStore, TaskRepository};
    use tickd_infrastructure::memory::{MemoryElectionStore, MemoryTaskRepository};

    use super::*;
    use crate::elector::{push_manual, Elector, DEFAULT_ELECTION_TTL};
    use crate::test_utils::{test_task, RecordingSpawner};

    async fn setup(
        tasks: Vec<tickd_domain::Task>,
    ) -> (SchedulerLoop, Arc<RecordingSpawner>, Arc<MemoryElectionStore>) {
        let repo = Arc::new(MemoryTaskRepository::new());
        for task in tasks {
            repo.insert(task).await;
        }
        let store = Arc::new(MemoryElectionStore::new());
        let elector = Elector::with_identity(
            repo as Arc<dyn TaskRepository>,
            Arc::clone(&store) as Arc<dyn ElectionStore>,
            "replica-test".to_string(),
            DEFAULT_ELECTION_TTL,
        );
        let spawner = Arc::new(RecordingSpawner::new());
        let scheduler = SchedulerLoop::new(
            elector,
            Arc::clone(&spawner) as Arc<dyn RunnerSpawner>,
            Duration::from_secs(1),
        );
        (scheduler, spawner, store)
    }

    #[tokio::test]
    async fn run_once_dispatches_each_elected_run() {
        let (scheduler, spawner, _store) =
            setup(vec![test_task(1, "* * * * *", true, "shell")]).await;

        assert_eq!(scheduler.run_once().await, 1);
        let requests = spawner.requests().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].task_id, 1);
        assert_eq!(requests[0].worker_name, "shell");

        // Same minute bucket: the claim is already held, nothing dispatches.
        assert_eq!(scheduler.run_once().await, 0);
        assert_eq!(spawner.requests().await.len(), 1);
    }

    #[tokio::test]
    async fn manual_triggers_are_dispatched_alongside_scheduled_runs() {
        let (scheduler, spawner, store) =
            setup(vec![test_task(1, "0 0 1 1 *", true, "shell")]).await;

        push_manual(store.as_ref(), 1).await.unwrap();
        assert_eq!(scheduler.run_once().await, 1);
        assert_eq!(spawner.requests().await[0].task_id, 1);
    }
}
