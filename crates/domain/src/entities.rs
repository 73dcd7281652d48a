use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A recurring task definition. Owned by an external admin surface; this
/// system only ever reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub name: String,
    pub enabled: bool,
    /// 5-field cron expression; 6/7-field (with seconds/year) also accepted.
    pub cron_expr: String,
    /// Default parameters handed to the worker, a JSON object.
    pub context: serde_json::Value,
    /// Which registered worker executes this task.
    pub worker_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One execution attempt of a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub task_id: i64,
    pub state: JobState,
    pub ran_at: DateTime<Utc>,
}

impl Job {
    pub fn is_running(&self) -> bool {
        self.state == JobState::Running
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobState {
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "FAIL")]
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Running => "RUNNING",
            JobState::Success => "SUCCESS",
            JobState::Failed => "FAIL",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Running)
    }
}

impl sqlx::Type<sqlx::Postgres> for JobState {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        sqlx::postgres::PgTypeInfo::with_name("VARCHAR")
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for JobState {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        match s {
            "RUNNING" => Ok(JobState::Running),
            "SUCCESS" => Ok(JobState::Success),
            "FAIL" => Ok(JobState::Failed),
            _ => Err(format!("Invalid job state: {s}").into()),
        }
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for JobState {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode(self.as_str(), buf)
    }
}

/// A single captured log line belonging to a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMessage {
    pub id: i64,
    pub job_id: i64,
    pub content: String,
}
