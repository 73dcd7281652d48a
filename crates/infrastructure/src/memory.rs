//! In-memory implementations of the storage ports.
//!
//! These are real implementations, not mocks: the election store honors
//! TTLs and redis-style list ranges, and the job store enforces the same
//! id/ordering behavior as Postgres. They back the test suites of every
//! crate and embedded single-process deployments.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tickd_core::{SchedulerError, SchedulerResult};
use tickd_domain::{
    ElectionStore, Job, JobMessage, JobState, JobStore, Task, TaskRepository,
};
use tokio::sync::{Mutex, RwLock};

#[derive(Debug, Clone)]
enum Slot {
    Value(String),
    List(Vec<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    slot: Slot,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Instant::now())
    }
}

/// Process-local election store with the same atomicity guarantees as the
/// Redis implementation, scoped to one process.
pub struct MemoryElectionStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryElectionStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryElectionStore {
    fn default() -> Self {
        Self::new()
    }
}

fn live_entry<'a>(entries: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a mut Entry> {
    if entries.get(key).is_some_and(Entry::expired) {
        entries.remove(key);
    }
    entries.get_mut(key)
}

/// Redis-style inclusive range with negative indices counting from the end.
fn range_slice(list: &[String], start: isize, end: isize) -> Vec<String> {
    let len = list.len() as isize;
    let mut from = if start < 0 { len + start } else { start };
    let mut to = if end < 0 { len + end } else { end };
    from = from.max(0);
    to = to.min(len - 1);
    if from > to || len == 0 {
        return Vec::new();
    }
    list[from as usize..=to as usize].to_vec()
}

#[async_trait]
impl ElectionStore for MemoryElectionStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> SchedulerResult<bool> {
        let mut entries = self.entries.lock().await;
        if live_entry(&mut entries, key).is_some() {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                slot: Slot::Value(value.to_string()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    async fn get(&self, key: &str) -> SchedulerResult<Option<String>> {
        let mut entries = self.entries.lock().await;
        match live_entry(&mut entries, key) {
            Some(Entry {
                slot: Slot::Value(value),
                ..
            }) => Ok(Some(value.clone())),
            _ => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: &str) -> SchedulerResult<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            Entry {
                slot: Slot::Value(value.to_string()),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> SchedulerResult<()> {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = live_entry(&mut entries, key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn append(&self, key: &str, value: &str) -> SchedulerResult<()> {
        let mut entries = self.entries.lock().await;
        match live_entry(&mut entries, key) {
            Some(Entry {
                slot: Slot::List(list),
                ..
            }) => {
                list.push(value.to_string());
                Ok(())
            }
            Some(_) => Err(SchedulerError::ElectionStore(format!(
                "key '{key}' holds a plain value, not a list"
            ))),
            None => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        slot: Slot::List(vec![value.to_string()]),
                        expires_at: None,
                    },
                );
                Ok(())
            }
        }
    }

    async fn list_range(
        &self,
        key: &str,
        start: isize,
        end: isize,
    ) -> SchedulerResult<Vec<String>> {
        let mut entries = self.entries.lock().await;
        match live_entry(&mut entries, key) {
            Some(Entry {
                slot: Slot::List(list),
                ..
            }) => Ok(range_slice(list, start, end)),
            _ => Ok(Vec::new()),
        }
    }

    async fn pop(&self, key: &str) -> SchedulerResult<Option<String>> {
        let mut entries = self.entries.lock().await;
        match live_entry(&mut entries, key) {
            Some(Entry {
                slot: Slot::List(list),
                ..
            }) => {
                if list.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(list.remove(0)))
                }
            }
            _ => Ok(None),
        }
    }

    async fn take(&self, key: &str) -> SchedulerResult<Option<String>> {
        let mut entries = self.entries.lock().await;
        if live_entry(&mut entries, key).is_none() {
            return Ok(None);
        }
        match entries.remove(key) {
            Some(Entry {
                slot: Slot::Value(value),
                ..
            }) => Ok(Some(value)),
            _ => Ok(None),
        }
    }

    async fn remove(&self, key: &str) -> SchedulerResult<()> {
        let mut entries = self.entries.lock().await;
        entries.remove(key);
        Ok(())
    }
}

/// Task definitions held in memory, for tests and embedded deployments.
pub struct MemoryTaskRepository {
    tasks: RwLock<HashMap<i64, Task>>,
}

impl MemoryTaskRepository {
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
        }
    }

    pub async fn insert(&self, task: Task) {
        let mut tasks = self.tasks.write().await;
        tasks.insert(task.id, task);
    }
}

impl Default for MemoryTaskRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskRepository for MemoryTaskRepository {
    async fn get_by_id(&self, id: i64) -> SchedulerResult<Option<Task>> {
        let tasks = self.tasks.read().await;
        Ok(tasks.get(&id).cloned())
    }

    async fn list_enabled(&self) -> SchedulerResult<Vec<Task>> {
        let tasks = self.tasks.read().await;
        let mut enabled: Vec<Task> = tasks.values().filter(|t| t.enabled).cloned().collect();
        enabled.sort_by_key(|t| t.id);
        Ok(enabled)
    }
}

#[derive(Default)]
struct JobStoreInner {
    jobs: HashMap<i64, Job>,
    messages: Vec<JobMessage>,
    next_job_id: i64,
    next_message_id: i64,
}

/// Jobs and messages held in memory with sequential ids.
pub struct MemoryJobStore {
    inner: Mutex<JobStoreInner>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(JobStoreInner::default()),
        }
    }

    pub async fn job_count(&self) -> usize {
        self.inner.lock().await.jobs.len()
    }
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

fn insert_messages(inner: &mut JobStoreInner, job_id: i64, lines: &[String]) {
    for line in lines {
        inner.next_message_id += 1;
        inner.messages.push(JobMessage {
            id: inner.next_message_id,
            job_id,
            content: line.clone(),
        });
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create_job(&self, task_id: i64, ran_at: DateTime<Utc>) -> SchedulerResult<Job> {
        let mut inner = self.inner.lock().await;
        inner.next_job_id += 1;
        let job = Job {
            id: inner.next_job_id,
            task_id,
            state: JobState::Running,
            ran_at,
        };
        inner.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn set_state(&self, job_id: i64, state: JobState) -> SchedulerResult<()> {
        let mut inner = self.inner.lock().await;
        let job = inner
            .jobs
            .get_mut(&job_id)
            .ok_or(SchedulerError::JobNotFound { id: job_id })?;
        job.state = state;
        Ok(())
    }

    async fn bulk_insert_messages(
        &self,
        job_id: i64,
        lines: &[String],
    ) -> SchedulerResult<()> {
        let mut inner = self.inner.lock().await;
        if !inner.jobs.contains_key(&job_id) {
            return Err(SchedulerError::JobNotFound { id: job_id });
        }
        insert_messages(&mut inner, job_id, lines);
        Ok(())
    }

    async fn finalize(
        &self,
        job_id: i64,
        state: JobState,
        lines: &[String],
    ) -> SchedulerResult<()> {
        // One lock guard for both writes mirrors the transactional
        // guarantee of the Postgres implementation.
        let mut inner = self.inner.lock().await;
        let job = inner
            .jobs
            .get_mut(&job_id)
            .ok_or(SchedulerError::JobNotFound { id: job_id })?;
        job.state = state;
        insert_messages(&mut inner, job_id, lines);
        Ok(())
    }

    async fn get_job(&self, job_id: i64) -> SchedulerResult<Option<Job>> {
        let inner = self.inner.lock().await;
        Ok(inner.jobs.get(&job_id).cloned())
    }

    async fn list_messages(&self, job_id: i64) -> SchedulerResult<Vec<JobMessage>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .messages
            .iter()
            .filter(|m| m.job_id == job_id)
            .cloned()
            .collect())
    }

    async fn list_running_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> SchedulerResult<Vec<Job>> {
        let inner = self.inner.lock().await;
        let mut stale: Vec<Job> = inner
            .jobs
            .values()
            .filter(|j| j.is_running() && j.ran_at < cutoff)
            .cloned()
            .collect();
        stale.sort_by_key(|j| j.id);
        Ok(stale)
    }
}
