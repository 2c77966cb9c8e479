// prometheus service: metrics collector scraping itself and the platform

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

use super::{Health, Service, ServiceEnv, StatusRecord};
use crate::installation::files::ensure_dir;
use crate::installation::service::{self as systemd, UnitSpec};

pub const PROMETHEUS_SERVICE_NAME: &str = "prometheus";

pub struct PrometheusService {
    env: Arc<ServiceEnv>,
}

impl PrometheusService {
    pub fn new(env: Arc<ServiceEnv>) -> Self {
        Self { env }
    }

    fn config_file(&self) -> PathBuf {
        self.env.layout.prometheus_dir().join("conf").join("prometheus.yml")
    }

    fn storage_dir(&self) -> PathBuf {
        self.env.layout.data_dir().join("prometheus")
    }

    fn unit_spec(&self) -> UnitSpec {
        let cfg = &self.env.config.prometheus;
        let dir = self.env.layout.prometheus_dir();
        UnitSpec {
            name: PROMETHEUS_SERVICE_NAME.to_string(),
            description: "Prometheus metrics for YugabyteDB Anywhere".to_string(),
            exec_start: vec![
                dir.join("prometheus").to_string_lossy().to_string(),
                format!("--config.file={}", self.config_file().to_string_lossy()),
                format!("--storage.tsdb.path={}", self.storage_dir().to_string_lossy()),
                format!("--web.listen-address=:{}", cfg.port),
                format!("--storage.tsdb.retention.time={}", cfg.retention_time),
                "--web.enable-admin-api".to_string(),
                "--web.enable-lifecycle".to_string(),
            ],
            working_dir: dir,
            user: self.env.unit_user(),
            after: Vec::new(),
            environment: Vec::new(),
        }
    }

    async fn write_config(&self) -> anyhow::Result<()> {
        let text = render_prometheus_config(
            &self.env.config.prometheus.scrape_interval,
            self.env.config.prometheus.port,
            self.env.config.platform.port,
        );
        self.env.write_config_file(&self.config_file(), &text, 0o644).await
    }
}

/// Scrape config: prometheus itself plus the platform's metrics endpoint.
pub fn render_prometheus_config(scrape_interval: &str, prometheus_port: u16, platform_port: u16) -> String {
    format!(
        r#"global:
  scrape_interval: {interval}
  evaluation_interval: {interval}

scrape_configs:
  - job_name: "prometheus"
    static_configs:
      - targets: ["localhost:{prom_port}"]

  - job_name: "platform"
    scheme: https
    tls_config:
      insecure_skip_verify: true
    metrics_path: "/api/v1/prometheus_metrics"
    static_configs:
      - targets: ["localhost:{platform_port}"]
"#,
        interval = scrape_interval,
        prom_port = prometheus_port,
        platform_port = platform_port,
    )
}

#[async_trait]
impl Service for PrometheusService {
    fn name(&self) -> &str {
        PROMETHEUS_SERVICE_NAME
    }

    async fn install(&self) -> anyhow::Result<()> {
        self.env.deploy_package(PROMETHEUS_SERVICE_NAME).await?;
        ensure_dir(&self.storage_dir()).await?;
        self.write_config().await?;
        systemd::install_unit(&self.unit_spec(), &self.env.unit_dir, self.env.command_timeout).await?;
        systemd::start_unit(PROMETHEUS_SERVICE_NAME, self.env.command_timeout).await
    }

    async fn upgrade(&self) -> anyhow::Result<()> {
        self.env.deploy_package(PROMETHEUS_SERVICE_NAME).await?;
        self.write_config().await?;
        systemd::install_unit(&self.unit_spec(), &self.env.unit_dir, self.env.command_timeout).await
    }

    async fn start(&self) -> anyhow::Result<()> {
        systemd::start_unit(PROMETHEUS_SERVICE_NAME, self.env.command_timeout).await
    }

    async fn stop(&self) -> anyhow::Result<()> {
        systemd::stop_unit(PROMETHEUS_SERVICE_NAME, self.env.command_timeout).await
    }

    async fn restart(&self) -> anyhow::Result<()> {
        systemd::restart_unit(PROMETHEUS_SERVICE_NAME, self.env.command_timeout).await
    }

    async fn status(&self) -> anyhow::Result<StatusRecord> {
        let (health, detail) = self.env.unit_health(PROMETHEUS_SERVICE_NAME).await?;
        Ok(StatusRecord {
            service: PROMETHEUS_SERVICE_NAME.to_string(),
            health,
            version: (health != Health::NotInstalled).then(|| self.env.version.clone()),
            port: Some(self.env.config.prometheus.port),
            detail,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InstallerConfig;

    #[test]
    fn config_scrapes_self_and_platform() {
        let text = render_prometheus_config("10s", 9090, 443);
        assert!(text.contains("scrape_interval: 10s"));
        assert!(text.contains("targets: [\"localhost:9090\"]"));
        assert!(text.contains("targets: [\"localhost:443\"]"));
        assert!(text.contains("insecure_skip_verify: true"));
    }

    #[test]
    fn unit_carries_port_retention_and_storage() {
        let mut cfg = InstallerConfig::default();
        cfg.prometheus.port = 9091;
        cfg.prometheus.retention_time = "30d".to_string();
        let env = Arc::new(ServiceEnv::new(cfg, PathBuf::from("/tmp/bundle"), "2.18.0.0-b4".to_string()));
        let spec = PrometheusService::new(env).unit_spec();

        assert_eq!(spec.exec_start[0], "/opt/yugabyte/prometheus/prometheus");
        assert!(spec
            .exec_start
            .contains(&"--config.file=/opt/yugabyte/prometheus/conf/prometheus.yml".to_string()));
        assert!(spec
            .exec_start
            .contains(&"--storage.tsdb.path=/opt/yugabyte/data/prometheus".to_string()));
        assert!(spec.exec_start.contains(&"--web.listen-address=:9091".to_string()));
        assert!(spec
            .exec_start
            .contains(&"--storage.tsdb.retention.time=30d".to_string()));
        assert!(spec.after.is_empty());
    }
}
