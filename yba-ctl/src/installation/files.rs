//! File deployment helpers.
//!
//! Goals:
//! - Async I/O only (tokio)
//! - Timeout copies so a wedged filesystem surfaces as an error
//! - Preserve permissions on Unix
//! - Never fail silently (log with context)

use anyhow::{Context, Result};
use log::{debug, info};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{timeout, Duration};

use crate::installation::run_cmd;

/// Recursively collect all regular files under `root`.
///
/// Returns absolute paths.
pub async fn collect_files_recursive(root: &Path) -> Result<Vec<PathBuf>> {
    let started = Instant::now();
    let mut out: Vec<PathBuf> = Vec::new();
    let mut stack: Vec<PathBuf> = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let mut rd = tokio::fs::read_dir(&dir)
            .await
            .with_context(|| format!("read_dir failed: {:?}", dir))?;
        while let Some(ent) = rd.next_entry().await? {
            let p = ent.path();
            let meta = ent.metadata().await?;
            if meta.is_dir() {
                stack.push(p);
            } else if meta.is_file() {
                out.push(p);
            }
        }
    }
    out.sort();

    debug!(
        "[PHASE: fs] [STEP: collect] collect_files_recursive exit (root={:?}, files={}, duration_ms={})",
        root,
        out.len(),
        started.elapsed().as_millis()
    );
    Ok(out)
}

/// Copy one file, returning `(bytes_written, sha256_hex)` of the copied contents.
///
/// Creates the parent directory of `dst`.
pub async fn copy_file_with_sha256(src: &Path, dst: &Path, label: &str) -> Result<(u64, String)> {
    let started = Instant::now();
    if let Some(parent) = dst.parent() {
        ensure_dir(parent).await?;
    }

    // Base 60s + 1s per MiB, capped at 10 minutes.
    let timeout_dur = match tokio::fs::metadata(src).await {
        Ok(m) => {
            let mib = (m.len() / (1024 * 1024)).min(10_000);
            Duration::from_secs(60_u64.saturating_add(mib).min(600))
        }
        Err(e) => {
            return Err(anyhow::Error::new(e)).with_context(|| format!("stat src failed: {:?}", src))
        }
    };

    let (n, sha) = timeout(timeout_dur, copy_file_once_and_sha256(src, dst))
        .await
        .map_err(|_| {
            anyhow::anyhow!(
                "copy of {:?} timed out (timeout_ms={})",
                src,
                timeout_dur.as_millis()
            )
        })??;

    debug!(
        "[PHASE: fs] [STEP: copy] copied {} (bytes={}, sha256={}, dst={:?}, duration_ms={})",
        label,
        n,
        sha,
        dst,
        started.elapsed().as_millis()
    );
    Ok((n, sha))
}

async fn copy_file_once_and_sha256(src: &Path, dst: &Path) -> Result<(u64, String)> {
    let mut src_f = tokio::fs::File::open(src)
        .await
        .with_context(|| format!("open src failed: {:?}", src))?;
    let mut dst_f = tokio::fs::File::create(dst)
        .await
        .with_context(|| format!("create dst failed: {:?}", dst))?;

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    let mut total: u64 = 0;

    loop {
        let n = src_f.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        dst_f.write_all(&buf[..n]).await?;
        total = total.saturating_add(n as u64);
    }
    dst_f.flush().await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let meta = tokio::fs::metadata(src).await?;
        let mode = meta.permissions().mode();
        tokio::fs::set_permissions(dst, std::fs::Permissions::from_mode(mode))
            .await
            .with_context(|| format!("chmod dst failed: {:?}", dst))?;
    }

    Ok((total, hex_digest(hasher.finalize().as_slice())))
}

pub(crate) fn hex_digest(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect::<String>()
}

/// Mirror the directory tree `src` into `dst`, overwriting files that already exist.
///
/// Returns the number of files copied.
pub async fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<usize> {
    let started = Instant::now();
    let files = collect_files_recursive(src).await?;
    ensure_dir(dst).await?;
    for file in &files {
        let rel = file
            .strip_prefix(src)
            .with_context(|| format!("{:?} is not under {:?}", file, src))?;
        copy_file_with_sha256(file, &dst.join(rel), &rel.to_string_lossy()).await?;
    }
    info!(
        "[PHASE: fs] [STEP: copy_dir] Copied {} files {:?} -> {:?} (duration_ms={})",
        files.len(),
        src,
        dst,
        started.elapsed().as_millis()
    );
    Ok(files.len())
}

/// Replace `path` with `contents`. The new file is created with `mode`, so it is never
/// readable more widely than that, even before the final chmod.
pub async fn write_file_with_mode(path: &Path, contents: &[u8], mode: u32) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent).await?;
    }
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e).with_context(|| format!("remove old file failed: {:?}", path)),
    }

    let mut opts = tokio::fs::OpenOptions::new();
    opts.write(true).create_new(true);
    #[cfg(unix)]
    opts.mode(mode);
    let mut file = opts
        .open(path)
        .await
        .with_context(|| format!("create failed: {:?}", path))?;
    file.write_all(contents)
        .await
        .with_context(|| format!("write failed: {:?}", path))?;
    file.flush().await?;
    file.sync_all().await?;

    // umask may have narrowed the creation mode.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
            .await
            .with_context(|| format!("chmod {:o} failed: {:?}", mode, path))?;
    }
    #[cfg(not(unix))]
    let _ = mode;
    Ok(())
}

pub async fn ensure_dir(path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .with_context(|| format!("create_dir_all failed: {:?}", path))
}

/// Point `link` at `target`, replacing an existing symlink in one rename.
///
/// Refuses to replace a real file or directory at `link`.
#[cfg(unix)]
pub async fn replace_symlink(target: &Path, link: &Path) -> Result<()> {
    if let Ok(meta) = tokio::fs::symlink_metadata(link).await {
        if !meta.file_type().is_symlink() {
            anyhow::bail!("{:?} exists and is not a symlink; refusing to replace it", link);
        }
    }
    let parent = link
        .parent()
        .ok_or_else(|| anyhow::anyhow!("link path has no parent: {:?}", link))?;
    ensure_dir(parent).await?;

    let file_name = link
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("link path has no file name: {:?}", link))?
        .to_string_lossy();
    let tmp = parent.join(format!(".{}.tmp-link", file_name));
    let _ = tokio::fs::remove_file(&tmp).await;
    tokio::fs::symlink(target, &tmp)
        .await
        .with_context(|| format!("symlink {:?} -> {:?} failed", tmp, target))?;
    tokio::fs::rename(&tmp, link)
        .await
        .with_context(|| format!("rename {:?} -> {:?} failed", tmp, link))?;
    debug!(
        "[PHASE: fs] [STEP: symlink] {:?} -> {:?}",
        link, target
    );
    Ok(())
}

/// `chown -R user:user path`.
pub async fn chown_recursive(path: &Path, user: &str, timeout_dur: Duration) -> Result<()> {
    let path_str = path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid path {:?}", path))?
        .to_string();
    let args = vec!["-R".to_string(), format!("{}:{}", user, user), path_str];
    let out = run_cmd("chown", &args, Some(timeout_dur), "chown_data_dir").await?;
    if !out.success() {
        anyhow::bail!(
            "chown -R {}:{} {:?} failed: {}",
            user,
            user,
            path,
            out.error_text()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[tokio::test]
    async fn write_file_with_mode_replaces_world_readable_file() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("platform.conf");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"old").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        write_file_with_mode(&path, b"db.default.password = \"x\"", 0o600)
            .await
            .unwrap();

        let meta = std::fs::metadata(&path).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "db.default.password = \"x\"");
    }

    #[tokio::test]
    async fn copy_reports_size_and_sha256() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("yba-ctl");
        tokio::fs::write(&src, b"abc").await.unwrap();
        let dst = dir.path().join("installed").join("yba-ctl");

        let (n, sha) = copy_file_with_sha256(&src, &dst, "yba-ctl").await.unwrap();
        assert_eq!(n, 3);
        assert_eq!(
            sha,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(tokio::fs::read(&dst).await.unwrap(), b"abc");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn copy_preserves_executable_bit() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("script.sh");
        tokio::fs::write(&src, b"#!/bin/sh\n").await.unwrap();
        std::fs::set_permissions(&src, std::fs::Permissions::from_mode(0o755)).unwrap();
        let dst = dir.path().join("out.sh");
        copy_file_with_sha256(&src, &dst, "script").await.unwrap();
        let mode = std::fs::metadata(&dst).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o755);
    }

    #[tokio::test]
    async fn copy_dir_mirrors_nested_tree() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("bundle").join("prometheus");
        tokio::fs::create_dir_all(src.join("consoles")).await.unwrap();
        tokio::fs::write(src.join("prometheus"), b"bin").await.unwrap();
        tokio::fs::write(src.join("consoles").join("index.html"), b"<html/>")
            .await
            .unwrap();

        let dst = dir.path().join("software").join("2.18.0.0").join("prometheus");
        let copied = copy_dir_recursive(&src, &dst).await.unwrap();
        assert_eq!(copied, 2);
        assert_eq!(
            tokio::fs::read(dst.join("consoles").join("index.html")).await.unwrap(),
            b"<html/>"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn replace_symlink_swaps_target() {
        let dir = tempfile::tempdir().unwrap();
        let v1 = dir.path().join("software").join("v1");
        let v2 = dir.path().join("software").join("v2");
        tokio::fs::create_dir_all(&v1).await.unwrap();
        tokio::fs::create_dir_all(&v2).await.unwrap();
        let link = dir.path().join("yb-platform");

        replace_symlink(&v1, &link).await.unwrap();
        assert_eq!(tokio::fs::read_link(&link).await.unwrap(), v1);
        replace_symlink(&v2, &link).await.unwrap();
        assert_eq!(tokio::fs::read_link(&link).await.unwrap(), v2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn replace_symlink_refuses_real_directory() {
        let dir = tempfile::tempdir().unwrap();
        let link = dir.path().join("yb-platform");
        tokio::fs::create_dir_all(&link).await.unwrap();
        let err = replace_symlink(dir.path(), &link).await.unwrap_err();
        assert!(err.to_string().contains("not a symlink"), "{}", err);
    }
}
