pub mod postgres_job_store;
pub mod postgres_task_repository;

pub use postgres_job_store::PostgresJobStore;
pub use postgres_task_repository::PostgresTaskRepository;
