// Managed services
//
// The orchestrator only sees `Service` trait objects in a `ServiceRegistry`. The
// production services (postgres, prometheus, yb-platform) are systemd units deployed
// from the installer bundle into `<install_root>/software/<version>/<package>` and
// reached through a `<install_root>/<package>` symlink.

pub mod platform;
pub mod postgres;
pub mod prometheus;

use anyhow::Context;
use async_trait::async_trait;
use log::{debug, info};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::Duration;

use crate::config::{InstallLayout, InstallerConfig};
use crate::error::{InstallerError, InstallerResult, StepResult};
use crate::installation::files::{copy_dir_recursive, write_file_with_mode};
#[cfg(unix)]
use crate::installation::files::replace_symlink;
use crate::installation::service::{self as systemd, UnitStatus};

pub use platform::PLATFORM_SERVICE_NAME;
pub use postgres::POSTGRES_SERVICE_NAME;
pub use prometheus::PROMETHEUS_SERVICE_NAME;

/// Health classification of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Running,
    Degraded,
    Stopped,
    NotInstalled,
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Health::Running => "Running",
            Health::Degraded => "Degraded",
            Health::Stopped => "Stopped",
            Health::NotInstalled => "Not Installed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRecord {
    pub service: String,
    pub health: Health,
    pub version: Option<String>,
    pub port: Option<u16>,
    pub detail: String,
}

/// Post-condition used after install/upgrade: only a running service is happy.
pub fn is_happy(status: &StatusRecord) -> bool {
    status.health == Health::Running
}

/// Fixed-width status table for the operator.
pub fn format_statuses(statuses: &[StatusRecord]) -> String {
    let header = ["Service", "Status", "Version", "Port", "Detail"];
    let rows: Vec<[String; 5]> = statuses
        .iter()
        .map(|s| {
            [
                s.service.clone(),
                s.health.to_string(),
                s.version.clone().unwrap_or_else(|| "-".to_string()),
                s.port.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
                s.detail.clone(),
            ]
        })
        .collect();

    let mut widths = header.map(str::len);
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.len());
        }
    }

    let fmt_row = |cells: [&str; 5]| {
        cells
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{:<w$}", c, w = widths[i]))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    let mut out = vec![fmt_row(header)];
    out.push(
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-"),
    );
    for row in &rows {
        out.push(fmt_row([&row[0], &row[1], &row[2], &row[3], &row[4]]));
    }
    out.join("\n")
}

/// Lifecycle contract every managed service implements.
#[async_trait]
pub trait Service: Send + Sync {
    fn name(&self) -> &str;
    /// Must be safe to re-run on an installed service.
    async fn install(&self) -> anyhow::Result<()>;
    /// Deploy the new version in place; the orchestrator restarts afterwards.
    async fn upgrade(&self) -> anyhow::Result<()>;
    async fn start(&self) -> anyhow::Result<()>;
    async fn stop(&self) -> anyhow::Result<()>;
    async fn restart(&self) -> anyhow::Result<()>;
    async fn status(&self) -> anyhow::Result<StatusRecord>;

    /// Capability query for the service that owns the platform database and backups.
    fn as_platform(&self) -> Option<&dyn PlatformControl> {
        None
    }
}

/// Operations only the platform service supports.
#[async_trait]
pub trait PlatformControl: Send + Sync {
    /// Set `yb.fixPaths` and regenerate the platform config file.
    async fn set_fix_paths(&self, enabled: bool) -> anyhow::Result<()>;
    /// Give the service user ownership of the data directory.
    async fn set_data_dir_perms(&self) -> StepResult;
    /// Version recorded in the installed platform's `version_metadata.json`.
    async fn installed_version(&self) -> anyhow::Result<Option<String>>;
    /// Poll the platform HTTP endpoint until it answers or `timeout` elapses.
    async fn wait_for_ready(&self, timeout: Duration) -> anyhow::Result<()>;
    fn backup_script(&self) -> PathBuf;
    fn data_dir(&self) -> PathBuf;
}

/// Ordered collection of services, fixed before orchestration begins.
pub struct ServiceRegistry {
    services: Vec<Arc<dyn Service>>,
}

impl ServiceRegistry {
    pub fn new(services: Vec<Arc<dyn Service>>) -> InstallerResult<Self> {
        let mut seen = HashSet::new();
        for s in &services {
            if !seen.insert(s.name().to_string()) {
                return Err(InstallerError::Config(format!(
                    "service '{}' registered twice",
                    s.name()
                )));
            }
        }
        Ok(Self { services })
    }

    /// Dependency order: install, upgrade and start walk it forward.
    pub fn order(&self) -> Vec<String> {
        self.services.iter().map(|s| s.name().to_string()).collect()
    }

    /// Shutdown order.
    pub fn reverse_order(&self) -> Vec<String> {
        let mut names = self.order();
        names.reverse();
        names
    }

    pub fn get(&self, name: &str) -> InstallerResult<Arc<dyn Service>> {
        self.services
            .iter()
            .find(|s| s.name() == name)
            .cloned()
            .ok_or_else(|| InstallerError::Config(format!("service '{}' is not registered", name)))
    }

    /// The platform service, reached through its capability rather than a cast.
    pub fn platform(&self) -> InstallerResult<Arc<dyn Service>> {
        let svc = self.get(PLATFORM_SERVICE_NAME)?;
        if svc.as_platform().is_none() {
            return Err(InstallerError::Config(format!(
                "service '{}' does not provide platform controls",
                PLATFORM_SERVICE_NAME
            )));
        }
        Ok(svc)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

/// What the production services share: config, paths, bundle, and systemctl limits.
#[derive(Debug, Clone)]
pub struct ServiceEnv {
    pub config: InstallerConfig,
    pub layout: InstallLayout,
    /// Directory of the bundle being installed (holds one directory per package).
    pub bundle_dir: PathBuf,
    /// Version being deployed (install/upgrade) or running (everything else).
    pub version: String,
    pub unit_dir: PathBuf,
    pub command_timeout: Duration,
}

impl ServiceEnv {
    pub fn new(config: InstallerConfig, bundle_dir: PathBuf, version: String) -> Self {
        let layout = config.layout();
        let command_timeout = Duration::from_secs(config.timeouts.service_command_secs);
        Self {
            config,
            layout,
            bundle_dir,
            version,
            unit_dir: PathBuf::from(systemd::SYSTEMD_UNIT_DIR),
            command_timeout,
        }
    }

    /// Copy `<bundle>/<package>` into the versioned software dir and point
    /// `<install_root>/<package>` at it.
    pub async fn deploy_package(&self, package: &str) -> anyhow::Result<PathBuf> {
        let src = self.bundle_dir.join(package);
        if !src.is_dir() {
            anyhow::bail!(
                "package '{}' not found in bundle {:?}",
                package,
                self.bundle_dir
            );
        }
        let dst = self.layout.software_dir(&self.version).join(package);
        copy_dir_recursive(&src, &dst).await?;

        let link = self.layout.root().join(package);
        #[cfg(unix)]
        replace_symlink(&dst, &link).await?;
        info!(
            "[PHASE: services] [STEP: deploy] Deployed {} {} -> {:?}",
            package, self.version, link
        );
        Ok(link)
    }

    pub async fn write_config_file(&self, path: &Path, contents: &str, mode: u32) -> anyhow::Result<()> {
        write_file_with_mode(path, contents.as_bytes(), mode)
            .await
            .with_context(|| format!("write config failed: {:?}", path))?;
        debug!("[PHASE: services] [STEP: config] Wrote {:?}", path);
        Ok(())
    }

    /// The user services run as; None when not root (units then run as the caller).
    pub fn unit_user(&self) -> Option<String> {
        if crate::installation::is_running_as_root() {
            Some(self.config.service_username.clone())
        } else {
            None
        }
    }

    pub async fn unit_health(&self, unit: &str) -> anyhow::Result<(Health, String)> {
        let status = systemd::unit_status(unit, self.command_timeout).await?;
        Ok(health_from_unit(&status))
    }
}

/// Map systemd unit state onto a health classification plus detail text.
pub fn health_from_unit(status: &UnitStatus) -> (Health, String) {
    if !status.is_loaded() {
        return (Health::NotInstalled, format!("unit {}", status.load_state));
    }
    if status.is_running() {
        let detail = status
            .main_pid
            .map(|p| format!("pid {}", p))
            .unwrap_or_default();
        return (Health::Running, detail);
    }
    let detail = format!("{} ({})", status.active_state, status.sub_state);
    match status.active_state.as_str() {
        "inactive" => (Health::Stopped, detail),
        _ => (Health::Degraded, detail),
    }
}

/// Services in dependency order for this configuration.
pub fn production_services(env: Arc<ServiceEnv>) -> InstallerResult<ServiceRegistry> {
    let mut services: Vec<Arc<dyn Service>> = Vec::new();
    if env.config.postgres.install.enabled {
        services.push(Arc::new(postgres::PostgresService::new(env.clone())));
    }
    services.push(Arc::new(prometheus::PrometheusService::new(env.clone())));
    services.push(Arc::new(platform::PlatformService::new(env)));
    ServiceRegistry::new(services)
}
