// License file handling for `install --license-path`
//
// The license is read and checked before the install preflight runs, so a bad path
// fails the install before anything on the host changes. It is copied into the
// installation only once the preflight gate has passed.

use log::info;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::config::InstallLayout;
use crate::error::{InstallerError, InstallerResult};
use crate::installation::files::{hex_digest, write_file_with_mode};

/// Licenses are small text documents; anything larger is not one.
pub const MAX_LICENSE_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct License {
    source: PathBuf,
    contents: Vec<u8>,
    sha256: String,
}

impl License {
    /// Read and check the license at `path`.
    pub async fn from_file(path: &Path) -> InstallerResult<Self> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| InstallerError::License(format!("cannot read license {:?}: {}", path, e)))?;
        if !meta.is_file() {
            return Err(InstallerError::License(format!(
                "license {:?} is not a regular file",
                path
            )));
        }
        if meta.len() > MAX_LICENSE_BYTES {
            return Err(InstallerError::License(format!(
                "license {:?} is {} bytes, larger than the {} byte limit",
                path,
                meta.len(),
                MAX_LICENSE_BYTES
            )));
        }

        let contents = tokio::fs::read(path)
            .await
            .map_err(|e| InstallerError::License(format!("cannot read license {:?}: {}", path, e)))?;
        Self::from_bytes(path, contents)
    }

    fn from_bytes(source: &Path, contents: Vec<u8>) -> InstallerResult<Self> {
        let text = std::str::from_utf8(&contents)
            .map_err(|_| InstallerError::License(format!("license {:?} is not a text file", source)))?;
        if text.trim().is_empty() {
            return Err(InstallerError::License(format!("license {:?} is empty", source)));
        }
        if text.contains('\0') {
            return Err(InstallerError::License(format!("license {:?} is not a text file", source)));
        }
        let sha256 = hex_digest(&Sha256::digest(&contents));
        Ok(Self {
            source: source.to_path_buf(),
            contents,
            sha256,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    /// Write the license into the installation, readable by its owner only.
    pub async fn install(&self, layout: &InstallLayout) -> InstallerResult<PathBuf> {
        let dest = layout.license_file();
        write_file_with_mode(&dest, &self.contents, 0o600)
            .await
            .map_err(|e| InstallerError::License(format!("{:#}", e)))?;
        info!(
            "[PHASE: install] [STEP: license] Installed license {:?} -> {:?} (sha256={})",
            self.source, dest, self.sha256
        );
        Ok(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn valid_license_is_installed_owner_only() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("customer.lic");
        std::fs::write(&src, "-----BEGIN LICENSE-----\nabc123\n-----END LICENSE-----\n").unwrap();

        let license = License::from_file(&src).await.unwrap();
        assert_eq!(license.sha256().len(), 64);

        let layout = InstallLayout::new(&dir.path().join("root"));
        let dest = license.install(&layout).await.unwrap();
        assert_eq!(dest, layout.license_file());
        assert_eq!(std::fs::read(&dest).unwrap(), std::fs::read(&src).unwrap());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&dest).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[tokio::test]
    async fn missing_license_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = License::from_file(&dir.path().join("nope.lic")).await.unwrap_err();
        assert!(matches!(err, InstallerError::License(_)));
        assert!(err.to_string().contains("cannot read license"), "{}", err);
    }

    #[tokio::test]
    async fn directory_empty_and_binary_licenses_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = License::from_file(dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("not a regular file"), "{}", err);

        let empty = dir.path().join("empty.lic");
        std::fs::write(&empty, "  \n").unwrap();
        let err = License::from_file(&empty).await.unwrap_err();
        assert!(err.to_string().contains("is empty"), "{}", err);

        let binary = dir.path().join("binary.lic");
        std::fs::write(&binary, [0x7f, b'E', b'L', b'F', 0, 0xff]).unwrap();
        let err = License::from_file(&binary).await.unwrap_err();
        assert!(err.to_string().contains("not a text file"), "{}", err);
    }
}
