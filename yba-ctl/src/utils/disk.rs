//! Disk / filesystem probes (read-only).
//!
//! We only *detect* free space; nothing here modifies mounts or partitions.

use crate::installation::linux_parsers::parse_df_available_bytes;
use anyhow::Result;
use log::debug;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::time::Duration;

/// Closest existing ancestor of `path` (the path itself if it exists).
///
/// Lets the disk probe run against an install root that has not been created yet.
pub fn nearest_existing_ancestor(path: &Path) -> PathBuf {
    let mut cur = Some(path);
    while let Some(p) = cur {
        if p.exists() {
            return p.to_path_buf();
        }
        cur = p.parent();
    }
    PathBuf::from("/")
}

/// Free bytes on the filesystem holding `path`, via `df -Pk`.
pub async fn free_space_bytes(path: &Path) -> Result<u64> {
    let started = Instant::now();
    let probe = nearest_existing_ancestor(path);
    let probe_str = probe
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid path {:?}", probe))?
        .to_string();

    let out = crate::installation::run_cmd(
        "df",
        &["-Pk".to_string(), probe_str],
        Some(Duration::from_secs(10)),
        "df_free_space",
    )
    .await?;

    if !out.success() {
        anyhow::bail!(
            "Failed to query free space for {:?} (exit_code={:?}): {}",
            probe,
            out.exit_code,
            out.error_text()
        );
    }

    let bytes = parse_df_available_bytes(&out.stdout)
        .ok_or_else(|| anyhow::anyhow!("Unable to parse df output for {:?}", probe))?;

    debug!(
        "[PHASE: preflight] [STEP: free_space] {:?} has {} bytes free (duration_ms={})",
        probe,
        bytes,
        started.elapsed().as_millis()
    );
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_existing_ancestor_walks_up() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("a").join("b").join("c");
        assert_eq!(nearest_existing_ancestor(&missing), dir.path());
        assert_eq!(nearest_existing_ancestor(dir.path()), dir.path());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn free_space_of_temp_dir_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = free_space_bytes(&dir.path().join("not-yet")).await.unwrap();
        assert!(bytes > 0);
    }
}
