use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tickd_core::{SchedulerError, SchedulerResult};
use tickd_domain::{Job, JobMessage, JobState, JobStore};
use tracing::debug;

pub struct PostgresJobStore {
    pool: PgPool,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_job(row: &sqlx::postgres::PgRow) -> SchedulerResult<Job> {
        Ok(Job {
            id: row.try_get("id")?,
            task_id: row.try_get("task_id")?,
            state: row.try_get("state")?,
            ran_at: row.try_get("ran_at")?,
        })
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    async fn create_job(&self, task_id: i64, ran_at: DateTime<Utc>) -> SchedulerResult<Job> {
        let row = sqlx::query(
            r#"
            INSERT INTO jobs (task_id, state, ran_at)
            VALUES ($1, $2, $3)
            RETURNING id, task_id, state, ran_at
            "#,
        )
        .bind(task_id)
        .bind(JobState::Running)
        .bind(ran_at)
        .fetch_one(&self.pool)
        .await?;

        let job = Self::row_to_job(&row)?;
        debug!(job_id = job.id, task_id, "created job");
        Ok(job)
    }

    async fn set_state(&self, job_id: i64, state: JobState) -> SchedulerResult<()> {
        let result = sqlx::query("UPDATE jobs SET state = $2 WHERE id = $1")
            .bind(job_id)
            .bind(state)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::JobNotFound { id: job_id });
        }
        Ok(())
    }

    async fn bulk_insert_messages(&self, job_id: i64, lines: &[String]) -> SchedulerResult<()> {
        if lines.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for line in lines {
            sqlx::query("INSERT INTO job_messages (job_id, content) VALUES ($1, $2)")
                .bind(job_id)
                .bind(line)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn finalize(
        &self,
        job_id: i64,
        state: JobState,
        lines: &[String],
    ) -> SchedulerResult<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("UPDATE jobs SET state = $2 WHERE id = $1")
            .bind(job_id)
            .bind(state)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(SchedulerError::JobNotFound { id: job_id });
        }

        for line in lines {
            sqlx::query("INSERT INTO job_messages (job_id, content) VALUES ($1, $2)")
                .bind(job_id)
                .bind(line)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!(job_id, state = state.as_str(), lines = lines.len(), "finalized job");
        Ok(())
    }

    async fn get_job(&self, job_id: i64) -> SchedulerResult<Option<Job>> {
        let row = sqlx::query("SELECT id, task_id, state, ran_at FROM jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_job).transpose()
    }

    async fn list_messages(&self, job_id: i64) -> SchedulerResult<Vec<JobMessage>> {
        let rows = sqlx::query(
            "SELECT id, job_id, content FROM job_messages WHERE job_id = $1 ORDER BY id",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(JobMessage {
                    id: row.try_get("id")?,
                    job_id: row.try_get("job_id")?,
                    content: row.try_get("content")?,
                })
            })
            .collect()
    }

    async fn list_running_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> SchedulerResult<Vec<Job>> {
        let rows = sqlx::query(
            "SELECT id, task_id, state, ran_at FROM jobs \
             WHERE state = $1 AND ran_at < $2 ORDER BY id",
        )
        .bind(JobState::Running)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_job).collect()
    }
}
