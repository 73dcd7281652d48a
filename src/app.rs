use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tickd_core::config::AppConfig;
use tickd_dispatcher::{push_manual, submit_configured, Elector, JobRecoveryService, SchedulerLoop};
use tickd_domain::value_objects::replica_identity;
use tickd_domain::{ElectionStore, JobState, JobStore, TaskRepository, WorkerRegistry};
use tickd_infrastructure::{
    PostgresJobStore, PostgresTaskRepository, ProcessSpawner, RedisElectionStore,
};
use tickd_runner::{InMemoryWorkerRegistry, TaskRunner};
use tokio::signal;
use tracing::{error, info, warn};

pub enum AppMode {
    /// Long-running election and dispatch loop.
    Scheduler,
    /// Execute one task to completion, then exit.
    Runner {
        task_id: i64,
        worker_name: String,
        context: serde_json::Value,
    },
    /// Queue a task for immediate execution on some scheduler replica.
    Trigger { task_id: i64 },
    /// Submit a one-shot run with a context override.
    Submit {
        task_id: i64,
        context: serde_json::Value,
    },
}

pub struct Application {
    config: AppConfig,
    config_path: Option<String>,
    pool: PgPool,
    store: Arc<dyn ElectionStore>,
}

impl Application {
    pub async fn new(config: AppConfig, config_path: Option<String>) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(10))
            .connect(&config.database_url)
            .await
            .with_context(|| format!("failed to connect to {}", config.database_url))?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run database migrations")?;

        let store: Arc<dyn ElectionStore> = Arc::new(
            RedisElectionStore::new(&config.redis_url)
                .await
                .with_context(|| format!("failed to connect to {}", config.redis_url))?,
        );

        Ok(Self {
            config,
            config_path,
            pool,
            store,
        })
    }

    pub async fn run(&self, mode: AppMode) -> Result<()> {
        match mode {
            AppMode::Scheduler => self.run_scheduler().await,
            AppMode::Runner {
                task_id,
                worker_name,
                context,
            } => self.run_runner(task_id, &worker_name, context).await,
            AppMode::Trigger { task_id } => self.run_trigger(task_id).await,
            AppMode::Submit { task_id, context } => self.run_submit(task_id, context).await,
        }
    }

    async fn run_scheduler(&self) -> Result<()> {
        if self.config.metrics.enabled {
            let addr: SocketAddr = self
                .config
                .metrics
                .listen_addr
                .parse()
                .with_context(|| {
                    format!("invalid metrics address: {}", self.config.metrics.listen_addr)
                })?;
            PrometheusBuilder::new()
                .with_http_listener(addr)
                .install()
                .context("failed to start metrics exporter")?;
            info!(%addr, "metrics exporter listening");
        }

        let task_repo: Arc<dyn TaskRepository> =
            Arc::new(PostgresTaskRepository::new(self.pool.clone()));
        let elector = Elector::with_identity(
            task_repo,
            Arc::clone(&self.store),
            replica_identity(),
            Duration::from_secs(self.config.election_ttl_seconds),
        );
        let spawner = Arc::new(ProcessSpawner::new(self.config_path.clone())?);
        let scheduler = SchedulerLoop::new(
            elector,
            spawner,
            Duration::from_secs(self.config.wakeup_interval_seconds),
        );

        if self.config.recovery.enabled {
            let job_store: Arc<dyn JobStore> = Arc::new(PostgresJobStore::new(self.pool.clone()));
            let recovery =
                JobRecoveryService::new(job_store, self.config.recovery.max_running_minutes);
            let interval = Duration::from_secs(self.config.recovery.sweep_interval_seconds);
            tokio::spawn(async move {
                recovery.run(interval).await;
            });
        }

        tokio::select! {
            _ = scheduler.run() => {}
            _ = wait_for_shutdown_signal() => {
                info!("shutdown signal received, stopping scheduler");
            }
        }
        Ok(())
    }

    async fn run_runner(
        &self,
        task_id: i64,
        worker_name: &str,
        context: serde_json::Value,
    ) -> Result<()> {
        let job_store: Arc<dyn JobStore> = Arc::new(PostgresJobStore::new(self.pool.clone()));
        let registry: Arc<dyn WorkerRegistry> =
            Arc::new(InMemoryWorkerRegistry::with_builtin_workers());
        let runner = TaskRunner::new(
            job_store,
            Arc::clone(&self.store),
            registry,
            Duration::from_secs(self.config.log_key_ttl_seconds),
        );

        let job = runner.run(task_id, context, worker_name).await?;
        if job.state == JobState::Failed {
            error!(job_id = job.id, task_id, "job failed");
            std::process::exit(1);
        }
        info!(job_id = job.id, task_id, "job succeeded");
        Ok(())
    }

    async fn run_trigger(&self, task_id: i64) -> Result<()> {
        // Unknown ids would be silently dropped by the elector; reject them
        // here where the caller can see it.
        let task_repo = PostgresTaskRepository::new(self.pool.clone());
        if task_repo.get_by_id(task_id).await?.is_none() {
            return Err(anyhow::anyhow!("task {task_id} does not exist"));
        }

        push_manual(self.store.as_ref(), task_id).await?;
        info!(task_id, "queued manual run");
        Ok(())
    }

    async fn run_submit(&self, task_id: i64, context: serde_json::Value) -> Result<()> {
        let task_repo = PostgresTaskRepository::new(self.pool.clone());
        if task_repo.get_by_id(task_id).await?.is_none() {
            return Err(anyhow::anyhow!("task {task_id} does not exist"));
        }

        submit_configured(self.store.as_ref(), task_id, context).await?;
        info!(task_id, "submitted configured run");
        Ok(())
    }
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C"),
        _ = terminate => info!("received SIGTERM"),
    }
}
