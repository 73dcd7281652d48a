pub mod log_sink;
pub mod registry;
pub mod service;
pub mod workers;

pub use registry::InMemoryWorkerRegistry;
pub use service::TaskRunner;
pub use workers::{HttpWorker, ShellWorker};
