pub mod database;
pub mod memory;
pub mod process_spawner;
pub mod redis_store;

pub use database::postgres::{PostgresJobStore, PostgresTaskRepository};
pub use memory::{MemoryElectionStore, MemoryJobStore, MemoryTaskRepository};
pub use process_spawner::ProcessSpawner;
pub use redis_store::RedisElectionStore;
