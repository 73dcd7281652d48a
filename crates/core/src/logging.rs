use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::errors::{SchedulerError, SchedulerResult};

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` wins over the `log_level` argument when set.
pub fn init_logging(log_level: &str, log_format: &str) -> SchedulerResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let result = match log_format {
        "json" => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        _ => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init(),
    };

    result.map_err(|e| SchedulerError::Configuration(format!("failed to initialize logging: {e}")))
}
