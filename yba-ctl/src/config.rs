// Installer configuration
//
// Loaded once in `main` and threaded through orchestrator construction. Sources, in
// increasing precedence: struct defaults, the YAML config file, `YBA_CTL__*` env vars.

use crate::error::{InstallerError, InstallerResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "/opt/yba-ctl/yba-ctl.yml";
pub const CONFIG_FILE_NAME: &str = "yba-ctl.yml";
pub const ENV_PREFIX: &str = "YBA_CTL";

/// Database owned by the platform; the only database a full-bundle restore recreates.
pub const PLATFORM_DB_NAME: &str = "yugaware";

/// A string that never shows up in `Debug` output.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("Secret(<empty>)")
        } else {
            f.write_str("Secret(***)")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallerConfig {
    pub install_root: PathBuf,
    pub service_username: String,
    pub platform: PlatformConfig,
    pub prometheus: PrometheusConfig,
    pub postgres: PostgresConfig,
    pub timeouts: TimeoutConfig,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            install_root: PathBuf::from("/opt/yugabyte"),
            service_username: "yugabyte".to_string(),
            platform: PlatformConfig::default(),
            prometheus: PrometheusConfig::default(),
            postgres: PostgresConfig::default(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub port: u16,
    pub health_path: String,
    pub ready_timeout_secs: u64,
    /// Rewrite stored paths on next platform start (set after a yugabundle restore).
    pub fix_paths: bool,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            port: 443,
            health_path: "/api/v1/app_version".to_string(),
            ready_timeout_secs: 300,
            fix_paths: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrometheusConfig {
    pub port: u16,
    pub retention_time: String,
    pub scrape_interval: String,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            port: 9090,
            retention_time: "15d".to_string(),
            scrape_interval: "10s".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostgresConfig {
    pub install: PostgresInstallConfig,
    #[serde(alias = "useExisting", alias = "useexisting")]
    pub use_existing: ExistingPostgresConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostgresInstallConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for PostgresInstallConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 5432,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExistingPostgresConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Secret,
    pub pg_dump_path: Option<PathBuf>,
    pub pg_restore_path: Option<PathBuf>,
}

impl Default for ExistingPostgresConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "localhost".to_string(),
            port: 5432,
            username: "postgres".to_string(),
            password: Secret::default(),
            pg_dump_path: None,
            pg_restore_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Per-call limit for systemctl invocations.
    pub service_command_secs: u64,
    /// Limit for the backup/restore script. Unset means wait for it to exit.
    pub script_secs: Option<u64>,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            service_command_secs: 60,
            script_secs: None,
        }
    }
}

/// Which config file a run reads, and whether it has to exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLocation {
    pub path: PathBuf,
    pub required: bool,
}

impl ConfigLocation {
    /// An explicit `--config` must exist. Without one, the `yba-ctl.yml` next to the
    /// running binary wins (install leaves a copy beside the installed yba-ctl), then
    /// the system-wide default, which may be absent.
    pub fn resolve(explicit: Option<&Path>, exe_dir: &Path) -> Self {
        if let Some(path) = explicit {
            return Self {
                path: path.to_path_buf(),
                required: true,
            };
        }
        let beside_exe = exe_dir.join(CONFIG_FILE_NAME);
        if beside_exe.is_file() {
            return Self {
                path: beside_exe,
                required: true,
            };
        }
        Self {
            path: PathBuf::from(DEFAULT_CONFIG_PATH),
            required: false,
        }
    }
}

impl InstallerConfig {
    /// Load config from `path` plus `YBA_CTL__SECTION__KEY` env overrides.
    /// A missing file is an error only when `required`.
    pub fn load(path: &Path, required: bool) -> InstallerResult<Self> {
        if required && !path.is_file() {
            return Err(InstallerError::Config(format!(
                "config file {:?} not found",
                path
            )));
        }
        let settings = config::Config::builder()
            .add_source(
                config::File::from(path)
                    .format(config::FileFormat::Yaml)
                    .required(required),
            )
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let cfg: InstallerConfig = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load_from(location: &ConfigLocation) -> InstallerResult<Self> {
        Self::load(&location.path, location.required)
    }

    pub fn validate(&self) -> InstallerResult<()> {
        if self.service_username.trim().is_empty() {
            return Err(InstallerError::Config(
                "service_username must not be empty".to_string(),
            ));
        }
        if !self.install_root.is_absolute() {
            return Err(InstallerError::Config(format!(
                "install_root must be an absolute path (got {:?})",
                self.install_root
            )));
        }
        let install = self.postgres.install.enabled;
        let existing = self.postgres.use_existing.enabled;
        if install == existing {
            return Err(InstallerError::Config(
                "exactly one of postgres.install.enabled and postgres.use_existing.enabled must be true"
                    .to_string(),
            ));
        }
        let ports = [
            ("platform.port", self.platform.port),
            ("prometheus.port", self.prometheus.port),
            ("postgres.install.port", self.postgres.install.port),
            ("postgres.use_existing.port", self.postgres.use_existing.port),
        ];
        if let Some((key, _)) = ports.iter().find(|(_, p)| *p == 0) {
            return Err(InstallerError::Config(format!("{} must be non-zero", key)));
        }
        if existing && self.postgres.use_existing.host.trim().is_empty() {
            return Err(InstallerError::Config(
                "postgres.use_existing.host must be set".to_string(),
            ));
        }
        Ok(())
    }

    pub fn layout(&self) -> InstallLayout {
        InstallLayout::new(&self.install_root)
    }
}

/// Every fixed path of an installation, derived from the install root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    root: PathBuf,
}

impl InstallLayout {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ybactl_dir(&self) -> PathBuf {
        self.root.join("yba-ctl")
    }

    pub fn state_file(&self) -> PathBuf {
        self.ybactl_dir().join(".yba_installer.state")
    }

    pub fn installed_marker(&self) -> PathBuf {
        self.ybactl_dir().join(".yba_installed")
    }

    /// Where `install --license-path` places the license.
    pub fn license_file(&self) -> PathBuf {
        self.ybactl_dir().join("yba.lic")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.ybactl_dir().join("logs")
    }

    pub fn log_file(&self) -> PathBuf {
        self.log_dir().join("yba-ctl.log")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    pub fn pgpass_file(&self) -> PathBuf {
        self.data_dir().join(".pgpass")
    }

    pub fn software_dir(&self, version: &str) -> PathBuf {
        self.root.join("software").join(version)
    }

    pub fn platform_dir(&self) -> PathBuf {
        self.root.join("yb-platform")
    }

    pub fn platform_conf(&self) -> PathBuf {
        self.platform_dir().join("conf").join("platform.conf")
    }

    pub fn platform_version_metadata(&self) -> PathBuf {
        self.platform_dir().join("version_metadata.json")
    }

    pub fn backup_script(&self) -> PathBuf {
        self.platform_dir()
            .join("devops")
            .join("bin")
            .join("yb_platform_backup.sh")
    }

    pub fn prometheus_dir(&self) -> PathBuf {
        self.root.join("prometheus")
    }

    pub fn postgres_dir(&self) -> PathBuf {
        self.root.join("pgsql")
    }

    pub fn pg_bin(&self) -> PathBuf {
        self.postgres_dir().join("bin")
    }

    pub fn postgres_data_dir(&self) -> PathBuf {
        self.data_dir().join("postgres")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_validate() {
        let cfg = InstallerConfig::default();
        assert!(cfg.validate().is_ok());
        assert!(cfg.postgres.install.enabled);
        assert!(!cfg.postgres.use_existing.enabled);
    }

    #[test]
    fn both_postgres_modes_enabled_is_rejected() {
        let mut cfg = InstallerConfig::default();
        cfg.postgres.use_existing.enabled = true;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("exactly one"), "{}", err);
    }

    #[test]
    fn zero_port_is_rejected() {
        let mut cfg = InstallerConfig::default();
        cfg.prometheus.port = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("prometheus.port"), "{}", err);
    }

    #[test]
    fn loads_yaml_file_with_camel_case_alias() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            r#"
install_root: /data/yba
service_username: yba
platform:
  port: 8443
postgres:
  install:
    enabled: false
  useExisting:
    enabled: true
    host: db.internal
    port: 6543
    username: yw
    password: hunter2
    pg_dump_path: /usr/bin/pg_dump
"#
        )
        .unwrap();

        let cfg = InstallerConfig::load(&path, true).unwrap();
        assert_eq!(cfg.install_root, PathBuf::from("/data/yba"));
        assert_eq!(cfg.platform.port, 8443);
        assert_eq!(cfg.prometheus.port, 9090);
        assert!(cfg.postgres.use_existing.enabled);
        assert_eq!(cfg.postgres.use_existing.host, "db.internal");
        assert_eq!(cfg.postgres.use_existing.port, 6543);
        assert_eq!(cfg.postgres.use_existing.password.expose(), "hunter2");
        assert_eq!(
            cfg.postgres.use_existing.pg_dump_path,
            Some(PathBuf::from("/usr/bin/pg_dump"))
        );
    }

    #[test]
    fn missing_optional_config_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = InstallerConfig::load(&dir.path().join("absent.yml"), false).unwrap();
        assert_eq!(cfg.install_root, PathBuf::from("/opt/yugabyte"));
    }

    #[test]
    fn missing_explicit_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let location = ConfigLocation::resolve(Some(&dir.path().join("absent.yml")), dir.path());
        assert!(location.required);
        let err = InstallerConfig::load_from(&location).unwrap_err();
        assert!(matches!(err, InstallerError::Config(_)));
        assert!(err.to_string().contains("not found"), "{}", err);
    }

    #[test]
    fn config_beside_binary_is_preferred_over_default() {
        let dir = tempfile::tempdir().unwrap();
        let location = ConfigLocation::resolve(None, dir.path());
        assert_eq!(location.path, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert!(!location.required);

        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "install_root: /data/yba\npostgres:\n  install:\n    enabled: false\n  use_existing:\n    enabled: true\n    host: db.internal\n",
        )
        .unwrap();
        let location = ConfigLocation::resolve(None, dir.path());
        assert_eq!(location.path, dir.path().join(CONFIG_FILE_NAME));
        let cfg = InstallerConfig::load_from(&location).unwrap();
        assert_eq!(cfg.install_root, PathBuf::from("/data/yba"));
        assert!(cfg.postgres.use_existing.enabled);
        assert_eq!(cfg.postgres.use_existing.host, "db.internal");
    }

    #[test]
    fn secret_debug_is_redacted() {
        let s = Secret::new("hunter2");
        let dbg = format!("{:?}", s);
        assert!(!dbg.contains("hunter2"));
        assert_eq!(dbg, "Secret(***)");
    }

    #[test]
    fn layout_paths_hang_off_install_root() {
        let layout = InstallLayout::new(Path::new("/opt/yugabyte"));
        assert_eq!(
            layout.state_file(),
            PathBuf::from("/opt/yugabyte/yba-ctl/.yba_installer.state")
        );
        assert_eq!(layout.pgpass_file(), PathBuf::from("/opt/yugabyte/data/.pgpass"));
        assert_eq!(
            layout.backup_script(),
            PathBuf::from("/opt/yugabyte/yb-platform/devops/bin/yb_platform_backup.sh")
        );
    }
}
