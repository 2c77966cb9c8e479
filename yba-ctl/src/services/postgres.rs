// Bundled postgres service
//
// Only registered when `postgres.install.enabled`; an existing database is not ours to
// manage. The cluster is initialized once (trust auth on localhost) and survives upgrades.

use anyhow::Context;
use async_trait::async_trait;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;

use super::{Health, Service, ServiceEnv, StatusRecord};
use crate::installation::files::{chown_recursive, ensure_dir};
use crate::installation::service::{self as systemd, UnitSpec};
use crate::installation::{is_running_as_root, run_cmd};

pub const POSTGRES_SERVICE_NAME: &str = "postgres";

/// Package directory name inside the bundle.
const POSTGRES_PACKAGE: &str = "pgsql";

pub struct PostgresService {
    env: Arc<ServiceEnv>,
}

impl PostgresService {
    pub fn new(env: Arc<ServiceEnv>) -> Self {
        Self { env }
    }

    fn pgdata(&self) -> PathBuf {
        self.env.layout.postgres_data_dir()
    }

    fn unit_spec(&self) -> UnitSpec {
        let layout = &self.env.layout;
        UnitSpec {
            name: POSTGRES_SERVICE_NAME.to_string(),
            description: "PostgreSQL for YugabyteDB Anywhere".to_string(),
            exec_start: postgres_exec_start(&layout.pg_bin(), &self.pgdata(), self.env.config.postgres.install.port),
            working_dir: layout.postgres_dir(),
            user: self.env.unit_user(),
            after: Vec::new(),
            environment: Vec::new(),
        }
    }

    /// `initdb` unless the cluster already exists; re-running install keeps the data.
    async fn init_cluster(&self) -> anyhow::Result<()> {
        let pgdata = self.pgdata();
        if pgdata.join("PG_VERSION").is_file() {
            info!(
                "[PHASE: services] [STEP: initdb] Cluster already initialized at {:?}",
                pgdata
            );
            return Ok(());
        }
        ensure_dir(&pgdata).await?;

        let initdb = self.env.layout.pg_bin().join("initdb");
        let mut args = vec![
            "-D".to_string(),
            pgdata.to_string_lossy().to_string(),
            "-U".to_string(),
            "postgres".to_string(),
            "--auth=trust".to_string(),
            "--encoding=UTF8".to_string(),
        ];
        // initdb refuses to run as root.
        let program = if is_running_as_root() {
            chown_recursive(&pgdata, &self.env.config.service_username, self.env.command_timeout).await?;
            let mut wrapped = vec![
                "-u".to_string(),
                self.env.config.service_username.clone(),
                "--".to_string(),
                initdb.to_string_lossy().to_string(),
            ];
            wrapped.append(&mut args);
            args = wrapped;
            "runuser".to_string()
        } else {
            initdb.to_string_lossy().to_string()
        };

        let out = run_cmd(&program, &args, Some(self.env.command_timeout), "initdb").await?;
        if !out.success() {
            anyhow::bail!("initdb failed: {}", out.error_text());
        }
        info!("[PHASE: services] [STEP: initdb] Initialized cluster at {:?}", pgdata);
        Ok(())
    }

    async fn cluster_version(&self) -> anyhow::Result<String> {
        let path = self.pgdata().join("PG_VERSION");
        let raw = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("read {:?} failed", path))?;
        Ok(raw.trim().to_string())
    }
}

pub fn postgres_exec_start(pg_bin: &std::path::Path, pgdata: &std::path::Path, port: u16) -> Vec<String> {
    vec![
        pg_bin.join("postgres").to_string_lossy().to_string(),
        "-D".to_string(),
        pgdata.to_string_lossy().to_string(),
        "-p".to_string(),
        port.to_string(),
        "-k".to_string(),
        "/tmp".to_string(),
    ]
}

#[async_trait]
impl Service for PostgresService {
    fn name(&self) -> &str {
        POSTGRES_SERVICE_NAME
    }

    async fn install(&self) -> anyhow::Result<()> {
        self.env.deploy_package(POSTGRES_PACKAGE).await?;
        self.init_cluster().await?;
        systemd::install_unit(&self.unit_spec(), &self.env.unit_dir, self.env.command_timeout).await?;
        systemd::start_unit(POSTGRES_SERVICE_NAME, self.env.command_timeout).await
    }

    async fn upgrade(&self) -> anyhow::Result<()> {
        // Binaries move; the cluster's major version does not.
        self.env.deploy_package(POSTGRES_PACKAGE).await?;
        systemd::install_unit(&self.unit_spec(), &self.env.unit_dir, self.env.command_timeout).await
    }

    async fn start(&self) -> anyhow::Result<()> {
        systemd::start_unit(POSTGRES_SERVICE_NAME, self.env.command_timeout).await
    }

    async fn stop(&self) -> anyhow::Result<()> {
        systemd::stop_unit(POSTGRES_SERVICE_NAME, self.env.command_timeout).await
    }

    async fn restart(&self) -> anyhow::Result<()> {
        systemd::restart_unit(POSTGRES_SERVICE_NAME, self.env.command_timeout).await
    }

    async fn status(&self) -> anyhow::Result<StatusRecord> {
        let (health, detail) = self.env.unit_health(POSTGRES_SERVICE_NAME).await?;
        let version = if health == Health::NotInstalled {
            None
        } else {
            self.cluster_version().await.ok()
        };
        Ok(StatusRecord {
            service: POSTGRES_SERVICE_NAME.to_string(),
            health,
            version,
            port: Some(self.env.config.postgres.install.port),
            detail,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InstallerConfig;
    use std::path::Path;

    #[test]
    fn exec_start_points_at_data_dir_and_port() {
        let args = postgres_exec_start(
            Path::new("/opt/yugabyte/pgsql/bin"),
            Path::new("/opt/yugabyte/data/postgres"),
            5433,
        );
        assert_eq!(
            args,
            vec![
                "/opt/yugabyte/pgsql/bin/postgres",
                "-D",
                "/opt/yugabyte/data/postgres",
                "-p",
                "5433",
                "-k",
                "/tmp"
            ]
        );
    }

    #[tokio::test]
    async fn existing_cluster_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = InstallerConfig::default();
        cfg.install_root = dir.path().to_path_buf();
        let env = Arc::new(ServiceEnv::new(cfg, dir.path().join("bundle"), "2.18.0.0-b4".to_string()));
        let svc = PostgresService::new(env);

        let pgdata = dir.path().join("data/postgres");
        std::fs::create_dir_all(&pgdata).unwrap();
        std::fs::write(pgdata.join("PG_VERSION"), "14\n").unwrap();

        // No initdb binary exists under the temp root, so reaching it would fail.
        svc.init_cluster().await.unwrap();
        assert_eq!(svc.cluster_version().await.unwrap(), "14");
    }
}
