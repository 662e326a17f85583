mod bot;
mod config;
mod domain;
mod exchanges;
mod notification;
mod storage;
#[cfg(test)]
mod testing;
mod trailing;

use bot::{Bot, Shutdown};
use config::Config;
use std::env;
use std::process::ExitCode;
use tracing::{Level, error, info};
use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_CONFIG_PATH: &str = "configs/config.yaml";

fn parse_config_path() -> String {
    for arg in env::args().skip(1) {
        if let Some(path) = arg.strip_prefix("--config=") {
            return path.to_string();
        }
    }
    DEFAULT_CONFIG_PATH.to_string()
}

fn init_tracing(log_level: Option<&str>) {
    let level = match log_level {
        Some("debug") => Level::DEBUG,
        Some("info") => Level::INFO,
        Some("warn") | Some("warning") => Level::WARN,
        Some("error") => Level::ERROR,
        Some("trace") => Level::TRACE,
        _ => Level::INFO,
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let config_path = parse_config_path();

    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config {}: {}", config_path, e);
            return ExitCode::FAILURE;
        }
    };

    init_tracing(config.app.log_level.as_deref());

    let bot = match Bot::from_config(config).await {
        Ok(bot) => bot,
        Err(e) => {
            error!(error = %e, "Failed to create bot");
            return ExitCode::FAILURE;
        }
    };

    info!(config = %config_path, "Bot initialized");

    match bot.run().await {
        Ok(Shutdown::Finished) | Ok(Shutdown::Interrupted) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Bot error");
            ExitCode::FAILURE
        }
    }
}
