pub mod cron_utils;
pub mod elector;
pub mod recovery;
pub mod scheduler;

#[cfg(test)]
pub mod test_utils;

pub use cron_utils::CronMatcher;
pub use elector::{push_manual, submit_configured, ElectedRun, Elector, RunSource};
pub use recovery::JobRecoveryService;
pub use scheduler::SchedulerLoop;
