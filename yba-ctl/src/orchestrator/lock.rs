// Advisory lock around a whole lifecycle operation
//
// Two yba-ctl processes against one installation would race on the state file and the
// pgpass file. The lock is a non-blocking `flock`; a second invocation fails fast.

use log::debug;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::config::InstallLayout;
use crate::error::{InstallerError, InstallerResult};
use crate::installation::files::hex_digest;

/// Lock file for the installation at `layout.root()`. It lives in the temp dir, keyed by
/// the install root, so taking it never creates anything under the root; a failed
/// preflight leaves a fresh host untouched.
pub fn resolve_lock_path(layout: &InstallLayout) -> PathBuf {
    let root = layout.root().to_string_lossy();
    let digest = hex_digest(&Sha256::digest(root.as_bytes()));
    std::env::temp_dir().join(format!("yba-ctl-{}.lock", &digest[..16]))
}

/// Held for the duration of an operation; released when dropped.
#[derive(Debug)]
pub struct OperationLock {
    file: File,
    path: PathBuf,
}

impl OperationLock {
    pub fn acquire(path: &Path) -> InstallerResult<Self> {
        let lock_err = |detail: String| InstallerError::Lock(detail);

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|e| lock_err(format!("cannot open lock file {:?}: {}", path, e)))?;

        #[cfg(target_os = "linux")]
        {
            use std::os::unix::io::AsRawFd;
            // SAFETY: the descriptor belongs to `file`, which outlives this call.
            let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
            if rc != 0 {
                let err = std::io::Error::last_os_error();
                if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
                    return Err(lock_err(format!(
                        "another yba-ctl operation is already running (lock held on {:?})",
                        path
                    )));
                }
                return Err(lock_err(format!("flock {:?} failed: {}", path, err)));
            }
        }

        // Holder's pid, for operators inspecting a stuck lock.
        let _ = file.set_len(0);
        let _ = writeln!(file, "{}", std::process::id());

        debug!("[PHASE: initialization] [STEP: lock] Acquired {:?}", path);
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for OperationLock {
    fn drop(&mut self) {
        #[cfg(target_os = "linux")]
        {
            use std::os::unix::io::AsRawFd;
            // SAFETY: the descriptor is still open; closing it would release the lock anyway.
            unsafe {
                libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
            }
        }
        debug!("[PHASE: initialization] [STEP: lock] Released {:?}", self.path);
    }
}
