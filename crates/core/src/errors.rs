use thiserror::Error;

/// Unified error type for the scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("task not found: {id}")]
    TaskNotFound { id: i64 },

    #[error("job not found: {id}")]
    JobNotFound { id: i64 },

    #[error("worker not found: {name}")]
    WorkerNotFound { name: String },

    #[error("invalid cron expression: {expr} - {message}")]
    InvalidCron { expr: String, message: String },

    #[error("election store error: {0}")]
    ElectionStore(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("task execution error: {0}")]
    TaskExecution(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;
