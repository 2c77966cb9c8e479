// Backup/restore command descriptors
//
// Built from command-line input right before the script bridge runs; never persisted.

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRequest {
    /// Directory the archive is written into.
    pub output_path: PathBuf,
    pub data_dir: PathBuf,
    pub exclude_prometheus: bool,
    pub skip_restart: bool,
    pub verbose: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreRequest {
    pub input_path: PathBuf,
    pub destination: PathBuf,
    pub skip_restart: bool,
    pub verbose: bool,
    /// Restore from a full-bundle archive: drops and recreates the platform database.
    pub yugabundle: bool,
    pub use_system_pg: bool,
    /// Skip the confirmation and the database drop/recreate.
    pub skip_dbdrop: bool,
}

impl RestoreRequest {
    /// Whether this restore drops and recreates the platform database.
    pub fn is_disruptive(&self) -> bool {
        self.yugabundle && !self.skip_dbdrop
    }
}
