// Installer error taxonomy
//
// Every component boundary returns `InstallerError`. Only `main` turns one into a
// process exit; library code never exits.

use crate::utils::version::VersionError;
use thiserror::Error;

pub type InstallerResult<T> = std::result::Result<T, InstallerError>;

#[derive(Debug, Error)]
pub enum InstallerError {
    /// Wrong invocation context (already installed, not installed, wrong copy of the binary).
    #[error("{0}")]
    Precondition(String),

    #[error(
        "Preflight checks failed for {operation}: {}. To skip (not recommended), rerun the command with --skip_preflight <check name1>,<check name2>",
        failed.join(", ")
    )]
    PreflightFailed {
        operation: String,
        failed: Vec<String>,
    },

    #[error(
        "upgrade target version '{target}' must be greater than the installed YugabyteDB Anywhere version '{installed}'"
    )]
    VersionGate { installed: String, target: String },

    #[error("invalid version: {0}")]
    Version(#[from] VersionError),

    #[error("{phase} of {service} failed: {source:#}")]
    Service {
        service: String,
        phase: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("{service} is not running! {phase} might have failed, please check {log_file}")]
    UnhealthyService {
        service: String,
        phase: String,
        log_file: String,
    },

    #[error("{phase} failed: {detail}")]
    Script { phase: String, detail: String },

    #[error("database error: {0}")]
    Database(String),

    #[error("installer state error: {0}")]
    State(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("license error: {0}")]
    License(String),

    #[error("{0}")]
    Aborted(String),

    #[error("{0}")]
    Lock(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl InstallerError {
    pub fn service(service: &str, phase: &str, source: anyhow::Error) -> Self {
        InstallerError::Service {
            service: service.to_string(),
            phase: phase.to_string(),
            source,
        }
    }
}

impl From<config::ConfigError> for InstallerError {
    fn from(e: config::ConfigError) -> Self {
        InstallerError::Config(e.to_string())
    }
}

/// Outcome of a step the orchestrator may tolerate.
///
/// `Soft` failures are logged and the operation continues; `Hard` failures abort it.
#[derive(Debug)]
pub enum StepFailure {
    Soft(String),
    Hard(InstallerError),
}

impl From<InstallerError> for StepFailure {
    fn from(e: InstallerError) -> Self {
        StepFailure::Hard(e)
    }
}

pub type StepResult = std::result::Result<(), StepFailure>;
