//! pacequeue - paced API request runner
//!
//! CLI entry point for sending requests through a RequestScheduler.

use std::fs;
use std::sync::Arc;

use clap::{CommandFactory, FromArgMatches};
use colored::*;
use eyre::{Context, Result};
use serde_json::{Value, json};
use tracing::{debug, info};

use pacequeue::api::{ApiError, HttpApiClient, ScheduledApi};
use pacequeue::cli::{Cli, Command, OutputFormat, generate_after_help, get_log_path};
use pacequeue::config::Config;
use pacequeue::scheduler::{RequestError, RequestScheduler, SubmitOptions};

fn parse_level(s: &str) -> Option<tracing::Level> {
    match s.to_uppercase().as_str() {
        "TRACE" => Some(tracing::Level::TRACE),
        "DEBUG" => Some(tracing::Level::DEBUG),
        "INFO" => Some(tracing::Level::INFO),
        "WARN" | "WARNING" => Some(tracing::Level::WARN),
        "ERROR" => Some(tracing::Level::ERROR),
        _ => None,
    }
}

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => parse_level(s).unwrap_or_else(|| {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
            tracing::Level::INFO
        }),
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cmd = Cli::command().after_help(generate_after_help());
    let cli = Cli::from_arg_matches(&cmd.get_matches())?;

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate()?;
    info!(base_url = %config.api.base_url, "pacequeue loaded config");

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Get {
            paths,
            params,
            max_retries,
            format,
        } => cmd_get(&config, paths, params, max_retries, format).await,
        Command::Post {
            path,
            body,
            max_retries,
            format,
        } => cmd_post(&config, path, &body, max_retries, format).await,
        Command::Config => cmd_config(&config),
        Command::Backoff { attempts } => cmd_backoff(&config, attempts),
    }
}

fn scheduled_api(config: &Config) -> Result<ScheduledApi> {
    let client = HttpApiClient::from_config(&config.api).context("Failed to create API client")?;
    let scheduler = RequestScheduler::new(config.scheduler.clone());
    Ok(ScheduledApi::new(Arc::new(client), scheduler))
}

fn submit_options(max_retries: Option<u32>) -> SubmitOptions {
    match max_retries {
        Some(n) => SubmitOptions::default().with_max_retries(n),
        None => SubmitOptions::default(),
    }
}

/// GET every path through one scheduler; results print in submission order
async fn cmd_get(
    config: &Config,
    paths: Vec<String>,
    params: Vec<(String, String)>,
    max_retries: Option<u32>,
    format: OutputFormat,
) -> Result<()> {
    debug!(?paths, ?params, ?max_retries, "cmd_get: called");
    let api = scheduled_api(config)?;

    let handles: Vec<_> = paths
        .iter()
        .map(|path| api.get_with(path.clone(), params.clone(), submit_options(max_retries)))
        .collect();
    let results = futures::future::join_all(handles).await;

    let labelled: Vec<_> = paths.iter().map(|p| format!("GET {}", p)).zip(results).collect();
    let outcome = report(&labelled, &format);

    let stats = api.scheduler().stats();
    debug!(?stats, "cmd_get: finished");
    outcome
}

/// POST one JSON body through the scheduler
async fn cmd_post(
    config: &Config,
    path: String,
    body: &str,
    max_retries: Option<u32>,
    format: OutputFormat,
) -> Result<()> {
    debug!(%path, ?max_retries, "cmd_post: called");
    let body: Value = serde_json::from_str(body).context("Request body is not valid JSON")?;
    let api = scheduled_api(config)?;

    let result = api.post_with(path.clone(), body, submit_options(max_retries)).await;
    report(&[(format!("POST {}", path), result)], &format)
}

fn report(results: &[(String, Result<Value, RequestError<ApiError>>)], format: &OutputFormat) -> Result<()> {
    let failed = results.iter().filter(|(_, r)| r.is_err()).count();

    match format {
        OutputFormat::Json => {
            let rows: Vec<Value> = results
                .iter()
                .map(|(label, result)| match result {
                    Ok(value) => json!({ "request": label, "ok": true, "value": value }),
                    Err(e) => json!({
                        "request": label,
                        "ok": false,
                        "status": e.as_inner().and_then(|inner| inner.status()),
                        "error": e.to_string(),
                    }),
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        OutputFormat::Text => {
            for (label, result) in results {
                match result {
                    Ok(value) => {
                        println!("{} {}", "OK".green().bold(), label);
                        println!("{}", serde_json::to_string_pretty(value)?);
                    }
                    Err(e) => println!("{} {}: {}", "FAILED".red().bold(), label, e),
                }
            }
        }
    }

    if failed > 0 {
        return Err(eyre::eyre!("{} of {} requests failed", failed, results.len()));
    }
    Ok(())
}

fn cmd_config(config: &Config) -> Result<()> {
    debug!("cmd_config: called");
    print!("{}", serde_yaml::to_string(config).context("Failed to serialize config")?);
    Ok(())
}

fn cmd_backoff(config: &Config, attempts: u32) -> Result<()> {
    debug!(attempts, "cmd_backoff: called");
    let scheduler = &config.scheduler;
    let policy = scheduler
        .backoff
        .build(scheduler.pacing_interval(), scheduler.backoff_multiplier);

    println!(
        "{} {:?}, max retries {}",
        "Strategy:".cyan(),
        scheduler.backoff.strategy,
        scheduler.max_retries
    );
    for attempt in 1..=attempts {
        let marker = if attempt <= scheduler.max_retries { "" } else { " (beyond max-retries)" };
        println!("  attempt {:>2}: {} ms{}", attempt, policy.delay(attempt).as_millis(), marker.dimmed());
    }
    Ok(())
}
