// yb-platform (YugabyteDB Anywhere) service
//
// The only service with platform controls: it renders `platform.conf` (including the
// `yb.fixPaths` switch a full-bundle restore flips), owns the backup script and the
// data directory, and answers the HTTP readiness probe.

use anyhow::Context;
use async_trait::async_trait;
use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

use super::{Health, PlatformControl, Service, ServiceEnv, StatusRecord};
use crate::config::PLATFORM_DB_NAME;
use crate::error::{StepFailure, StepResult};
use crate::installation::files::{chown_recursive, ensure_dir};
use crate::installation::service::{self as systemd, UnitSpec};
use crate::installation::is_running_as_root;
use crate::utils::version::read_version_metadata;

pub const PLATFORM_SERVICE_NAME: &str = "yb-platform";

pub struct PlatformService {
    env: Arc<ServiceEnv>,
    fix_paths: AtomicBool,
}

impl PlatformService {
    pub fn new(env: Arc<ServiceEnv>) -> Self {
        let fix_paths = env.config.platform.fix_paths;
        Self {
            env,
            fix_paths: AtomicBool::new(fix_paths),
        }
    }

    fn storage_dir(&self) -> PathBuf {
        self.env.layout.data_dir().join("yb-platform")
    }

    fn unit_spec(&self) -> UnitSpec {
        let layout = &self.env.layout;
        let mut after = vec![format!("{}.service", super::PROMETHEUS_SERVICE_NAME)];
        if self.env.config.postgres.install.enabled {
            after.insert(0, format!("{}.service", super::POSTGRES_SERVICE_NAME));
        }
        UnitSpec {
            name: PLATFORM_SERVICE_NAME.to_string(),
            description: "YugabyteDB Anywhere".to_string(),
            exec_start: vec![
                layout
                    .platform_dir()
                    .join("yugaware")
                    .join("bin")
                    .join("yugaware")
                    .to_string_lossy()
                    .to_string(),
                format!("-Dconfig.file={}", layout.platform_conf().to_string_lossy()),
            ],
            working_dir: layout.platform_dir(),
            user: self.env.unit_user(),
            after,
            environment: Vec::new(),
        }
    }

    async fn write_platform_conf(&self) -> anyhow::Result<()> {
        let text = render_platform_conf(&self.env, self.fix_paths.load(Ordering::SeqCst), &self.storage_dir());
        // Holds the database password when an existing database is used.
        self.env
            .write_config_file(&self.env.layout.platform_conf(), &text, 0o600)
            .await
    }

    async fn probe_once(client: &reqwest::Client, url: &str) -> anyhow::Result<()> {
        let resp = client
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;
        if !resp.status().is_success() {
            anyhow::bail!("GET {} returned {}", url, resp.status());
        }
        Ok(())
    }
}

/// Render `platform.conf` for the current settings.
pub fn render_platform_conf(env: &ServiceEnv, fix_paths: bool, storage_dir: &std::path::Path) -> String {
    let cfg = &env.config;
    let (db_host, db_port, db_user, db_password) = if cfg.postgres.use_existing.enabled {
        let e = &cfg.postgres.use_existing;
        (e.host.clone(), e.port, e.username.clone(), e.password.expose().to_string())
    } else {
        (
            "localhost".to_string(),
            cfg.postgres.install.port,
            "postgres".to_string(),
            String::new(),
        )
    };

    format!(
        r#"include classpath("application.common.conf")

http.port = disabled
https.port = {https_port}

db.default.url = "jdbc:postgresql://{db_host}:{db_port}/{db_name}"
db.default.username = "{db_user}"
db.default.password = "{db_password}"

yb.storage.path = "{storage}"
yb.devops.home = "{devops}"
yb.metrics.url = "http://localhost:{prom_port}/api/v1"
yb.fixPaths = {fix_paths}
"#,
        https_port = cfg.platform.port,
        db_host = db_host,
        db_port = db_port,
        db_name = PLATFORM_DB_NAME,
        db_user = db_user,
        db_password = db_password.replace('\\', "\\\\").replace('"', "\\\""),
        storage = storage_dir.to_string_lossy(),
        devops = env.layout.platform_dir().join("devops").to_string_lossy(),
        prom_port = cfg.prometheus.port,
        fix_paths = fix_paths,
    )
}

#[async_trait]
impl Service for PlatformService {
    fn name(&self) -> &str {
        PLATFORM_SERVICE_NAME
    }

    async fn install(&self) -> anyhow::Result<()> {
        self.env.deploy_package(PLATFORM_SERVICE_NAME).await?;
        ensure_dir(&self.storage_dir()).await?;
        self.write_platform_conf().await?;
        systemd::install_unit(&self.unit_spec(), &self.env.unit_dir, self.env.command_timeout).await?;
        systemd::start_unit(PLATFORM_SERVICE_NAME, self.env.command_timeout).await
    }

    async fn upgrade(&self) -> anyhow::Result<()> {
        self.env.deploy_package(PLATFORM_SERVICE_NAME).await?;
        self.write_platform_conf().await?;
        systemd::install_unit(&self.unit_spec(), &self.env.unit_dir, self.env.command_timeout).await
    }

    async fn start(&self) -> anyhow::Result<()> {
        systemd::start_unit(PLATFORM_SERVICE_NAME, self.env.command_timeout).await
    }

    async fn stop(&self) -> anyhow::Result<()> {
        systemd::stop_unit(PLATFORM_SERVICE_NAME, self.env.command_timeout).await
    }

    async fn restart(&self) -> anyhow::Result<()> {
        systemd::restart_unit(PLATFORM_SERVICE_NAME, self.env.command_timeout).await
    }

    async fn status(&self) -> anyhow::Result<StatusRecord> {
        let (health, detail) = self.env.unit_health(PLATFORM_SERVICE_NAME).await?;
        let version = if health == Health::NotInstalled {
            None
        } else {
            self.installed_version().await.ok().flatten()
        };
        Ok(StatusRecord {
            service: PLATFORM_SERVICE_NAME.to_string(),
            health,
            version,
            port: Some(self.env.config.platform.port),
            detail,
        })
    }

    fn as_platform(&self) -> Option<&dyn PlatformControl> {
        Some(self)
    }
}

#[async_trait]
impl PlatformControl for PlatformService {
    async fn set_fix_paths(&self, enabled: bool) -> anyhow::Result<()> {
        self.fix_paths.store(enabled, Ordering::SeqCst);
        self.write_platform_conf().await?;
        info!(
            "[PHASE: services] [STEP: config] Regenerated {:?} (yb.fixPaths={})",
            self.env.layout.platform_conf(),
            enabled
        );
        Ok(())
    }

    async fn set_data_dir_perms(&self) -> StepResult {
        let data_dir = self.env.layout.data_dir();
        if !is_running_as_root() {
            debug!(
                "[PHASE: services] [STEP: perms] Not root; leaving ownership of {:?} unchanged",
                data_dir
            );
            return Ok(());
        }
        chown_recursive(&data_dir, &self.env.config.service_username, self.env.command_timeout)
            .await
            .map_err(|e| StepFailure::Soft(format!("Could not set {:?} permissions: {:#}", data_dir, e)))
    }

    async fn installed_version(&self) -> anyhow::Result<Option<String>> {
        let path = self.env.layout.platform_version_metadata();
        if !path.exists() {
            return Ok(None);
        }
        read_version_metadata(&path).await.map(Some)
    }

    async fn wait_for_ready(&self, timeout: Duration) -> anyhow::Result<()> {
        let started = Instant::now();
        let url = format!(
            "https://localhost:{}{}",
            self.env.config.platform.port, self.env.config.platform.health_path
        );
        // The platform serves a self-signed certificate out of the box.
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(Duration::from_secs(10))
            .build()?;

        let strategy = ExponentialBackoff::from_millis(2)
            .factor(250)
            .max_delay(Duration::from_secs(10))
            .map(jitter);

        info!(
            "[PHASE: services] [STEP: ready] Waiting for YugabyteDB Anywhere at {} (timeout_secs={})",
            url,
            timeout.as_secs()
        );
        match tokio::time::timeout(timeout, Retry::spawn(strategy, || Self::probe_once(&client, &url))).await {
            Ok(Ok(())) => {
                info!(
                    "[PHASE: services] [STEP: ready] YugabyteDB Anywhere is ready (duration_ms={})",
                    started.elapsed().as_millis()
                );
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!(
                    "[PHASE: services] [STEP: ready] YugabyteDB Anywhere not ready after {}s",
                    timeout.as_secs()
                );
                anyhow::bail!("{} did not answer within {}s", url, timeout.as_secs())
            }
        }
    }

    fn backup_script(&self) -> PathBuf {
        self.env.layout.backup_script()
    }

    fn data_dir(&self) -> PathBuf {
        self.env.layout.data_dir()
    }
}
