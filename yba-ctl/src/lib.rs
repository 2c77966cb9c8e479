// yba-ctl: YugabyteDB Anywhere installer and lifecycle orchestrator
// Library entry point

pub mod backup;
pub mod cli;
pub mod config;
pub mod database;
pub mod error;
pub mod installation;
pub mod licensing;
pub mod models;
pub mod orchestrator;
pub mod preflight;
pub mod services;
pub mod utils;

use log::LevelFilter;
use std::path::{Path, PathBuf};

use crate::config::InstallLayout;

pub const TEXT_LOG_FILE: &str = "yba-ctl.log";
pub const JSON_LOG_FILE: &str = "yba-ctl.json.log";

/// Target for the final error record; kept off the console, which `main` prints to itself.
pub const FATAL_LOG_TARGET: &str = "yba_ctl::fatal";

/// Log directory inside an existing installation, otherwise `./yba-ctl-logs`. A fresh host's
/// install root is not created just to hold logs.
pub fn resolve_log_dir(layout: &InstallLayout) -> PathBuf {
    if layout.ybactl_dir().is_dir() {
        let dir = layout.log_dir();
        if std::fs::create_dir_all(&dir).is_ok() {
            return dir;
        }
    }
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("yba-ctl-logs")
}

/// Initialize logging: console at `console_level`, plus text and JSON files at debug.
pub fn init_logging(console_level: LevelFilter, log_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(log_dir)?;

    let json_log_file = log_dir.join(JSON_LOG_FILE);
    let txt_log_file = log_dir.join(TEXT_LOG_FILE);

    let file_level = LevelFilter::Debug.max(console_level);
    fern::Dispatch::new()
        .level(file_level)
        // sqlx and reqwest internals are noise at debug.
        .level_for("sqlx", LevelFilter::Warn)
        .level_for("hyper", LevelFilter::Warn)
        .level_for("reqwest", LevelFilter::Warn)
        .chain(
            fern::Dispatch::new()
                .level(console_level)
                .filter(|meta| meta.target() != FATAL_LOG_TARGET)
                .format(move |out, message, record| {
                    let message_str = format!("{}", message);
                    let (_, _, cleaned_message) = utils::logging::parse_log_metadata(&message_str);
                    out.finish(format_args!(
                        "{}",
                        utils::logging::format_console_log(record.level(), &cleaned_message)
                    ));
                })
                .chain(std::io::stdout()),
        )
        .chain(
            fern::Dispatch::new()
                .format(move |out, message, record| {
                    let timestamp_utc = chrono::Utc::now().to_rfc3339();
                    let message_str = format!("{}", message);
                    let (phase, step, cleaned_message) =
                        utils::logging::parse_log_metadata(&message_str);
                    let json_line = utils::logging::format_json_log(
                        &timestamp_utc,
                        record.level(),
                        record.target(),
                        &cleaned_message,
                        phase.as_deref(),
                        step.as_deref(),
                    );
                    out.finish(format_args!("{}", json_line));
                })
                .chain(fern::log_file(json_log_file)?),
        )
        .chain(
            fern::Dispatch::new()
                .format(move |out, message, record| {
                    let timestamp_local = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
                    let message_str = format!("{}", message);
                    let (phase, step, cleaned_message) =
                        utils::logging::parse_log_metadata(&message_str);
                    let txt_line = utils::logging::format_human_readable_log(
                        &timestamp_local.to_string(),
                        record.level(),
                        record.target(),
                        &cleaned_message,
                        phase.as_deref(),
                        step.as_deref(),
                    );
                    out.finish(format_args!("{}", txt_line));
                })
                .chain(fern::log_file(txt_log_file)?),
        )
        .apply()?;

    log::debug!(
        "[PHASE: initialization] Logging initialized, log directory: {:?}",
        log_dir
    );
    Ok(())
}
