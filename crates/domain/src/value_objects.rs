use std::fmt;

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Key of the FIFO channel holding manually triggered task ids.
pub const MANUAL_QUEUE_KEY: &str = "runs:manual";
/// Key of the single-slot exchange holding one pending configured run.
pub const CONFIGURED_SLOT_KEY: &str = "runs:configured";

/// A UTC timestamp truncated to the minute. Elections are scoped to one
/// bucket, so a task can win at most once per minute across all replicas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeBucket {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
}

impl TimeBucket {
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self {
            year: at.year(),
            month: at.month(),
            day: at.day(),
            hour: at.hour(),
            minute: at.minute(),
        }
    }

    /// The bucket as a concrete instant, at second zero.
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.with_ymd_and_hms(self.year, self.month, self.day, self.hour, self.minute, 0)
            .single()
    }
}

impl fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}-{:02}-{:02}",
            self.year, self.month, self.day, self.hour, self.minute
        )
    }
}

/// Election key for one (task, minute bucket) pair.
pub fn election_key(task_id: i64, bucket: &TimeBucket) -> String {
    format!("election:{task_id}:{bucket}")
}

/// Default key scoping the transient log buffer of one job.
pub fn logging_key(task_id: i64, job_id: i64) -> String {
    format!("job-log:{task_id}:{job_id}")
}

/// Identity stored in election keys. The uuid component keeps two replicas
/// on one host distinguishable even under pid reuse.
pub fn replica_identity() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown-host".to_string());
    let nonce = Uuid::new_v4().simple().to_string();
    format!("{host}:{}:{}", std::process::id(), &nonce[..8])
}
