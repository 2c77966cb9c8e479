//! Installer state persistence.
//!
//! `store` writes to a sibling temp file, fsyncs it and renames it over the state
//! file, so a crash mid-write leaves either the old record or the new one.

use crate::error::{InstallerError, InstallerResult};
use crate::models::state::InstallerState;
use log::{debug, info};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Missing file yields the zero-value state. Unreadable or malformed files are errors.
    pub async fn load(&self) -> InstallerResult<InstallerState> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(
                    "[PHASE: state] [STEP: load] No state file at {:?}; using empty state",
                    self.path
                );
                return Ok(InstallerState::default());
            }
            Err(e) => {
                return Err(InstallerError::State(format!(
                    "failed to read {:?}: {}",
                    self.path, e
                )))
            }
        };

        let state: InstallerState = serde_json::from_slice(&bytes).map_err(|e| {
            InstallerError::State(format!("malformed state file {:?}: {}", self.path, e))
        })?;
        debug!(
            "[PHASE: state] [STEP: load] Loaded state (version={}, workflow={})",
            state.version,
            state.workflow.describe()
        );
        Ok(state)
    }

    pub async fn store(&self, state: &InstallerState) -> InstallerResult<()> {
        let bytes = serde_json::to_vec_pretty(state)
            .map_err(|e| InstallerError::State(format!("failed to serialize state: {}", e)))?;
        write_atomic(&self.path, &bytes)
            .await
            .map_err(|e| InstallerError::State(format!("failed to write {:?}: {:#}", self.path, e)))?;
        info!(
            "[PHASE: state] [STEP: store] Stored state (version={}, workflow={}, path={:?})",
            state.version,
            state.workflow.describe(),
            self.path
        );
        Ok(())
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    use anyhow::Context;
    use tokio::io::AsyncWriteExt;

    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("state path has no parent directory"))?;
    tokio::fs::create_dir_all(parent)
        .await
        .with_context(|| format!("create_dir_all failed: {:?}", parent))?;

    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("state path has no file name"))?
        .to_string_lossy();
    let tmp_path = parent.join(format!("{}.tmp", file_name));

    let mut opts = tokio::fs::OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    opts.mode(0o600);
    let mut file = opts
        .open(&tmp_path)
        .await
        .with_context(|| format!("open temp state file failed: {:?}", tmp_path))?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all()
        .await
        .with_context(|| format!("fsync failed: {:?}", tmp_path))?;
    drop(file);

    tokio::fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("rename {:?} -> {:?} failed", tmp_path, path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::state::{PostgresMode, Workflow};

    #[tokio::test]
    async fn load_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("yba-ctl").join(".yba_installer.state"));
        let state = store.load().await.unwrap();
        assert_eq!(state, InstallerState::default());
        assert!(!store.exists());
    }

    #[tokio::test]
    async fn store_then_load_round_trips_every_field() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("yba-ctl").join(".yba_installer.state"));
        let state = InstallerState {
            version: "2.17.1.0-b123".to_string(),
            workflow: Workflow::Upgrading {
                target: "2.18.0.0-b4".to_string(),
            },
            fix_paths_pending: true,
            install_root: Some(PathBuf::from("/opt/yugabyte")),
            service_username: Some("yugabyte".to_string()),
            postgres_mode: PostgresMode::Existing,
            updated_at: Some(chrono::Utc::now()),
        };

        store.store(&state).await.unwrap();
        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, state);

        // No temp file is left behind.
        let leftovers: Vec<_> = std::fs::read_dir(store.path().parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn store_replaces_previous_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        store.store(&InstallerState::new("2.16.0.0")).await.unwrap();
        store.store(&InstallerState::new("2.17.0.0")).await.unwrap();
        assert_eq!(store.load().await.unwrap().version, "2.17.0.0");
    }

    #[tokio::test]
    async fn malformed_state_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, b"{not json").unwrap();
        let err = StateStore::new(path).load().await.unwrap_err();
        assert!(matches!(err, InstallerError::State(_)), "{:?}", err);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stored_state_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        StateStore::new(path.clone())
            .store(&InstallerState::new("2.17.0.0"))
            .await
            .unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}
