pub mod entities;
pub mod ports;
pub mod repositories;
pub mod value_objects;

pub use entities::{Job, JobMessage, JobState, Task};
pub use ports::{ElectionStore, RunRequest, RunnerSpawner, Worker, WorkerRegistry};
pub use repositories::{JobStore, TaskRepository};
pub use value_objects::TimeBucket;
