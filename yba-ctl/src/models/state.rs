// Installer state (persisted)
//
// One record per host installation. Read at the start of upgrade/backup/restore,
// rewritten at the end of every successful install/upgrade. Absence means "no prior
// state" (installations that predate state tracking).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Workflow recorded as in progress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Workflow {
    #[default]
    Idle,
    Installing,
    Upgrading { target: String },
}

impl Workflow {
    pub fn is_idle(&self) -> bool {
        matches!(self, Workflow::Idle)
    }

    pub fn describe(&self) -> String {
        match self {
            Workflow::Idle => "idle".to_string(),
            Workflow::Installing => "install".to_string(),
            Workflow::Upgrading { target } => format!("upgrade to {}", target),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostgresMode {
    #[default]
    Unknown,
    Bundled,
    Existing,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallerState {
    /// Installed YugabyteDB Anywhere version; empty when unknown.
    pub version: String,
    pub workflow: Workflow,
    /// Set by a yugabundle restore; upgrades keep `yb.fixPaths` on while it is set.
    pub fix_paths_pending: bool,
    pub install_root: Option<PathBuf>,
    pub service_username: Option<String>,
    pub postgres_mode: PostgresMode,
    pub updated_at: Option<DateTime<Utc>>,
}

impl InstallerState {
    pub fn new(version: &str) -> Self {
        Self {
            version: version.to_string(),
            ..Default::default()
        }
    }

    pub fn has_version(&self) -> bool {
        !self.version.trim().is_empty()
    }
}
