use anyhow::{Context, Result};
use clap::{Arg, Command};
use tickd_core::config::AppConfig;
use tickd_core::logging::init_logging;
use tracing::info;

mod app;

use app::{AppMode, Application};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("tickd")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Elected recurring task scheduler")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config/tickd.toml"),
        )
        .arg(
            Arg::new("mode")
                .short('m')
                .long("mode")
                .value_name("MODE")
                .help("Run mode")
                .value_parser(["scheduler", "runner", "trigger", "submit"])
                .default_value("scheduler"),
        )
        .arg(
            Arg::new("task-id")
                .long("task-id")
                .value_name("ID")
                .help("Task id (runner, trigger and submit modes)")
                .value_parser(clap::value_parser!(i64))
                .required_if_eq("mode", "runner")
                .required_if_eq("mode", "trigger")
                .required_if_eq("mode", "submit"),
        )
        .arg(
            Arg::new("worker")
                .long("worker")
                .value_name("NAME")
                .help("Registered worker name (runner mode)")
                .required_if_eq("mode", "runner"),
        )
        .arg(
            Arg::new("context")
                .long("context")
                .value_name("JSON")
                .help("Worker parameters as a JSON object (runner and submit modes)")
                .default_value("{}"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level")
                .value_parser(["trace", "debug", "info", "warn", "error"])
                .default_value("info"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("Log format")
                .value_parser(["json", "pretty"])
                .default_value("pretty"),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config").unwrap();
    let mode_str = matches.get_one::<String>("mode").unwrap();
    let log_level = matches.get_one::<String>("log-level").unwrap();
    let log_format = matches.get_one::<String>("log-format").unwrap();

    init_logging(log_level, log_format)?;

    let config = AppConfig::load(Some(config_path.as_str()))
        .with_context(|| format!("failed to load configuration from {config_path}"))?;

    let mode = parse_app_mode(mode_str, &matches)?;
    info!(mode = mode_str, config = config_path, "starting tickd");

    let app = Application::new(config, Some(config_path.clone())).await?;
    app.run(mode).await
}

fn parse_app_mode(mode_str: &str, matches: &clap::ArgMatches) -> Result<AppMode> {
    let task_id = matches.get_one::<i64>("task-id").copied();
    let context = matches.get_one::<String>("context").unwrap();

    match mode_str {
        "scheduler" => Ok(AppMode::Scheduler),
        "runner" => Ok(AppMode::Runner {
            task_id: task_id.context("--task-id is required in runner mode")?,
            worker_name: matches
                .get_one::<String>("worker")
                .context("--worker is required in runner mode")?
                .clone(),
            context: parse_context(context)?,
        }),
        "trigger" => Ok(AppMode::Trigger {
            task_id: task_id.context("--task-id is required in trigger mode")?,
        }),
        "submit" => Ok(AppMode::Submit {
            task_id: task_id.context("--task-id is required in submit mode")?,
            context: parse_context(context)?,
        }),
        _ => Err(anyhow::anyhow!("unsupported run mode: {mode_str}")),
    }
}

fn parse_context(raw: &str) -> Result<serde_json::Value> {
    let value: serde_json::Value =
        serde_json::from_str(raw).with_context(|| format!("--context is not valid JSON: {raw}"))?;
    if !value.is_object() {
        return Err(anyhow::anyhow!("--context must be a JSON object: {raw}"));
    }
    Ok(value)
}
