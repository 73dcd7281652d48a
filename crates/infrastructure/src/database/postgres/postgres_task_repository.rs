use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tickd_core::SchedulerResult;
use tickd_domain::{Task, TaskRepository};
use tracing::debug;

pub struct PostgresTaskRepository {
    pool: PgPool,
}

impl PostgresTaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_task(row: &sqlx::postgres::PgRow) -> SchedulerResult<Task> {
        Ok(Task {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            enabled: row.try_get("enabled")?,
            cron_expr: row.try_get("cron_expr")?,
            context: row.try_get("context")?,
            worker_name: row.try_get("worker_name")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl TaskRepository for PostgresTaskRepository {
    async fn get_by_id(&self, id: i64) -> SchedulerResult<Option<Task>> {
        let row = sqlx::query(
            "SELECT id, name, enabled, cron_expr, context, worker_name, created_at, updated_at \
             FROM tasks WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_task).transpose()
    }

    async fn list_enabled(&self) -> SchedulerResult<Vec<Task>> {
        let rows = sqlx::query(
            "SELECT id, name, enabled, cron_expr, context, worker_name, created_at, updated_at \
             FROM tasks WHERE enabled = TRUE ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        let tasks: Vec<Task> = rows
            .iter()
            .map(Self::row_to_task)
            .collect::<SchedulerResult<_>>()?;
        debug!("loaded {} enabled tasks", tasks.len());
        Ok(tasks)
    }
}
