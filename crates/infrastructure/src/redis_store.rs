//! Redis implementation of the election store.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tickd_core::{SchedulerError, SchedulerResult};
use tickd_domain::ElectionStore;
use tracing::debug;

fn store_err(context: &str, e: impl std::fmt::Display) -> SchedulerError {
    SchedulerError::ElectionStore(format!("{context}: {e}"))
}

/// Shared key/value store backed by a single Redis instance. All replicas
/// of the scheduler point at the same instance; Redis' single-threaded
/// command execution is what makes `set_if_absent` and `take` atomic.
pub struct RedisElectionStore {
    conn: ConnectionManager,
}

impl RedisElectionStore {
    /// Connect and verify the server responds before returning, so a bad
    /// URL fails at startup instead of at the first election.
    pub async fn new(redis_url: &str) -> SchedulerResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| store_err("failed to create redis client", e))?;
        let mut conn = client
            .get_connection_manager()
            .await
            .map_err(|e| store_err("failed to connect to redis", e))?;

        let response: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| store_err("redis ping failed", e))?;
        if response != "PONG" {
            return Err(SchedulerError::ElectionStore(format!(
                "unexpected ping response: {response}"
            )));
        }
        debug!("connected to redis at {redis_url}");

        Ok(Self { conn })
    }
}

#[async_trait]
impl ElectionStore for RedisElectionStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> SchedulerResult<bool> {
        let mut conn = self.conn.clone();
        // SET NX EX replies OK when the key was created and nil otherwise.
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await
            .map_err(|e| store_err("SET NX failed", e))?;
        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> SchedulerResult<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(|e| store_err("GET failed", e))
    }

    async fn put(&self, key: &str, value: &str) -> SchedulerResult<()> {
        let mut conn = self.conn.clone();
        conn.set(key, value)
            .await
            .map_err(|e| store_err("SET failed", e))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> SchedulerResult<()> {
        let mut conn = self.conn.clone();
        let _: bool = conn
            .expire(key, ttl.as_secs().max(1) as i64)
            .await
            .map_err(|e| store_err("EXPIRE failed", e))?;
        Ok(())
    }

    async fn append(&self, key: &str, value: &str) -> SchedulerResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .rpush(key, value)
            .await
            .map_err(|e| store_err("RPUSH failed", e))?;
        Ok(())
    }

    async fn list_range(
        &self,
        key: &str,
        start: isize,
        end: isize,
    ) -> SchedulerResult<Vec<String>> {
        let mut conn = self.conn.clone();
        conn.lrange(key, start, end)
            .await
            .map_err(|e| store_err("LRANGE failed", e))
    }

    async fn pop(&self, key: &str) -> SchedulerResult<Option<String>> {
        let mut conn = self.conn.clone();
        conn.lpop(key, None)
            .await
            .map_err(|e| store_err("LPOP failed", e))
    }

    async fn take(&self, key: &str) -> SchedulerResult<Option<String>> {
        let mut conn = self.conn.clone();
        redis::cmd("GETDEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| store_err("GETDEL failed", e))
    }

    async fn remove(&self, key: &str) -> SchedulerResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .del(key)
            .await
            .map_err(|e| store_err("DEL failed", e))?;
        Ok(())
    }
}
