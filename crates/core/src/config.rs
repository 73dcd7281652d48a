use std::path::Path;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::errors::{SchedulerError, SchedulerResult};

/// Top-level application configuration.
///
/// Values are layered: built-in defaults, then an optional TOML file, then
/// `TICKD__*` environment overrides. The wake-up interval is special: it
/// comes from the required `WAKEUP_TIMER` environment variable and loading
/// fails without it.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub redis_url: String,
    /// Seconds between scheduler loop iterations. Filled from `WAKEUP_TIMER`.
    #[serde(default)]
    pub wakeup_interval_seconds: u64,
    /// How long an election claim stays valid. Must outlive the time needed
    /// to observe the claim and spawn the runner, but expire before the same
    /// minute bucket can recur.
    pub election_ttl_seconds: u64,
    /// Retention window for the per-job log buffer after persistence.
    pub log_key_ttl_seconds: u64,
    pub recovery: RecoveryConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecoveryConfig {
    pub enabled: bool,
    /// RUNNING jobs older than this are swept to FAIL.
    pub max_running_minutes: i64,
    pub sweep_interval_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen_addr: String,
}

impl AppConfig {
    /// Load configuration, reading `WAKEUP_TIMER` from the process
    /// environment.
    pub fn load(config_path: Option<&str>) -> SchedulerResult<Self> {
        let wakeup = std::env::var("WAKEUP_TIMER").ok();
        Self::load_with_wakeup(config_path, wakeup.as_deref())
    }

    /// Load with an explicit wake-up value, used directly by tests.
    pub fn load_with_wakeup(
        config_path: Option<&str>,
        wakeup: Option<&str>,
    ) -> SchedulerResult<Self> {
        let mut builder = Config::builder()
            .set_default("database_url", "postgres://localhost/tickd")
            .map_err(config_err)?
            .set_default("redis_url", "redis://127.0.0.1:6379")
            .map_err(config_err)?
            .set_default("election_ttl_seconds", 60)
            .map_err(config_err)?
            .set_default("log_key_ttl_seconds", 300)
            .map_err(config_err)?
            .set_default("recovery.enabled", true)
            .map_err(config_err)?
            .set_default("recovery.max_running_minutes", 60)
            .map_err(config_err)?
            .set_default("recovery.sweep_interval_seconds", 300)
            .map_err(config_err)?
            .set_default("metrics.enabled", false)
            .map_err(config_err)?
            .set_default("metrics.listen_addr", "127.0.0.1:9090")
            .map_err(config_err)?;

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }
        builder = builder.add_source(Environment::with_prefix("TICKD").separator("__"));

        let mut app_config: AppConfig = builder
            .build()
            .map_err(config_err)?
            .try_deserialize()
            .map_err(config_err)?;

        app_config.wakeup_interval_seconds = parse_wakeup_timer(wakeup)?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub fn validate(&self) -> SchedulerResult<()> {
        if self.database_url.is_empty() {
            return Err(SchedulerError::Configuration(
                "database_url must not be empty".to_string(),
            ));
        }
        if self.redis_url.is_empty() {
            return Err(SchedulerError::Configuration(
                "redis_url must not be empty".to_string(),
            ));
        }
        if self.election_ttl_seconds == 0 {
            return Err(SchedulerError::Configuration(
                "election_ttl_seconds must be positive".to_string(),
            ));
        }
        if self.log_key_ttl_seconds == 0 {
            return Err(SchedulerError::Configuration(
                "log_key_ttl_seconds must be positive".to_string(),
            ));
        }
        if self.recovery.max_running_minutes <= 0 {
            return Err(SchedulerError::Configuration(
                "recovery.max_running_minutes must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Validate the `WAKEUP_TIMER` value: required, positive integer seconds.
pub fn parse_wakeup_timer(value: Option<&str>) -> SchedulerResult<u64> {
    let raw = value.ok_or_else(|| {
        SchedulerError::Configuration(
            "WAKEUP_TIMER environment variable must be set".to_string(),
        )
    })?;
    let seconds: u64 = raw.trim().parse().map_err(|_| {
        SchedulerError::Configuration(format!(
            "WAKEUP_TIMER must be a positive integer number of seconds, got '{raw}'"
        ))
    })?;
    if seconds == 0 {
        return Err(SchedulerError::Configuration(
            "WAKEUP_TIMER must be a positive integer number of seconds, got '0'".to_string(),
        ));
    }
    Ok(seconds)
}

fn config_err(e: config::ConfigError) -> SchedulerError {
    SchedulerError::Configuration(e.to_string())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn missing_wakeup_timer_is_a_configuration_error() {
        let result = AppConfig::load_with_wakeup(None, None);
        assert!(matches!(result, Err(SchedulerError::Configuration(_))));
    }

    #[test]
    fn zero_or_negative_wakeup_timer_is_rejected() {
        assert!(matches!(
            parse_wakeup_timer(Some("0")),
            Err(SchedulerError::Configuration(_))
        ));
        assert!(matches!(
            parse_wakeup_timer(Some("-5")),
            Err(SchedulerError::Configuration(_))
        ));
        assert!(matches!(
            parse_wakeup_timer(Some("abc")),
            Err(SchedulerError::Configuration(_))
        ));
    }

    #[test]
    fn valid_wakeup_timer_is_parsed() {
        assert_eq!(parse_wakeup_timer(Some("30")).unwrap(), 30);
        assert_eq!(parse_wakeup_timer(Some(" 5 ")).unwrap(), 5);
    }

    #[test]
    fn defaults_load_with_wakeup_present() {
        let config = AppConfig::load_with_wakeup(None, Some("10")).unwrap();
        assert_eq!(config.wakeup_interval_seconds, 10);
        assert_eq!(config.election_ttl_seconds, 60);
        assert_eq!(config.log_key_ttl_seconds, 300);
        assert!(config.recovery.enabled);
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn config_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            r#"
database_url = "postgres://db.internal/tickd"
election_ttl_seconds = 45

[recovery]
enabled = false
max_running_minutes = 30
sweep_interval_seconds = 60
"#
        )
        .unwrap();

        let config =
            AppConfig::load_with_wakeup(Some(file.path().to_str().unwrap()), Some("15")).unwrap();
        assert_eq!(config.database_url, "postgres://db.internal/tickd");
        assert_eq!(config.election_ttl_seconds, 45);
        assert!(!config.recovery.enabled);
        assert_eq!(config.recovery.max_running_minutes, 30);
        assert_eq!(config.wakeup_interval_seconds, 15);
    }
}
