// Preflight probes
//
// Each probe gathers host facts and hands them to a pure `evaluate_*` function, which is
// where the thresholds live and what the tests exercise. A probe that cannot gather its
// facts reports a warning rather than a failure.

use async_trait::async_trait;
use std::net::TcpListener;
use std::path::Path;

use super::{CheckResult, PreflightCheck, PreflightContext, GB};
use crate::installation::linux_parsers::{parse_meminfo, parse_os_release, OsFamily, OsRelease};
use crate::installation::{current_username, is_running_as_root};
use crate::utils::disk::free_space_bytes;

pub const MIN_CPUS: usize = 4;
pub const HARD_MIN_CPUS: usize = 2;
pub const MIN_MEMORY_KB: u64 = 8 * 1024 * 1024;

// ---------------------------------------------------------------------------
// user
// ---------------------------------------------------------------------------

pub struct UserCheck;

pub fn evaluate_user(service_user: &str, running_as: &str, is_root: bool) -> CheckResult {
    const NAME: &str = "user";
    if service_user.trim().is_empty() {
        return CheckResult::fail(NAME, "service_username is not configured");
    }
    if is_root {
        return CheckResult::pass(NAME, format!("running as root; services run as {}", service_user));
    }
    if running_as == service_user {
        return CheckResult::pass(NAME, format!("running as service user {}", service_user));
    }
    CheckResult::fail(
        NAME,
        format!(
            "running as {}; run as root or as the service user {}",
            running_as, service_user
        ),
    )
}

#[async_trait]
impl PreflightCheck for UserCheck {
    fn name(&self) -> &str {
        "user"
    }

    async fn execute(&self, ctx: &PreflightContext) -> CheckResult {
        evaluate_user(
            &ctx.config.service_username,
            &current_username(),
            is_running_as_root(),
        )
    }
}

// ---------------------------------------------------------------------------
// os
// ---------------------------------------------------------------------------

pub struct OsCheck;

pub fn evaluate_os(rel: &OsRelease) -> CheckResult {
    const NAME: &str = "os";
    match rel.family() {
        OsFamily::Other => CheckResult::warning(
            NAME,
            format!("{} is not a tested distribution", rel.pretty_name),
        ),
        family => CheckResult::pass(NAME, format!("{} ({:?} family)", rel.pretty_name, family)),
    }
}

#[async_trait]
impl PreflightCheck for OsCheck {
    fn name(&self) -> &str {
        "os"
    }

    async fn execute(&self, _ctx: &PreflightContext) -> CheckResult {
        match tokio::fs::read_to_string("/etc/os-release").await {
            Ok(text) => evaluate_os(&parse_os_release(&text)),
            Err(e) => CheckResult::warning(self.name(), format!("cannot read /etc/os-release: {}", e)),
        }
    }
}

// ---------------------------------------------------------------------------
// cpu
// ---------------------------------------------------------------------------

pub struct CpuCheck;

pub fn evaluate_cpu(cpus: usize) -> CheckResult {
    const NAME: &str = "cpu";
    if cpus < HARD_MIN_CPUS {
        CheckResult::fail(NAME, format!("{} CPUs, need at least {}", cpus, HARD_MIN_CPUS))
    } else if cpus < MIN_CPUS {
        CheckResult::warning(NAME, format!("{} CPUs, {} recommended", cpus, MIN_CPUS))
    } else {
        CheckResult::pass(NAME, format!("{} CPUs", cpus))
    }
}

#[async_trait]
impl PreflightCheck for CpuCheck {
    fn name(&self) -> &str {
        "cpu"
    }

    async fn execute(&self, _ctx: &PreflightContext) -> CheckResult {
        match std::thread::available_parallelism() {
            Ok(n) => evaluate_cpu(n.get()),
            Err(e) => CheckResult::warning(self.name(), format!("cannot count CPUs: {}", e)),
        }
    }
}

// ---------------------------------------------------------------------------
// memory
// ---------------------------------------------------------------------------

pub struct MemoryCheck;

pub fn evaluate_memory(total_kb: u64) -> CheckResult {
    const NAME: &str = "memory";
    let detail = format!(
        "{:.1} GB total, need {} GB",
        total_kb as f64 / (1024.0 * 1024.0),
        MIN_MEMORY_KB / (1024 * 1024)
    );
    if total_kb < MIN_MEMORY_KB {
        CheckResult::fail(NAME, detail)
    } else {
        CheckResult::pass(NAME, detail)
    }
}

#[async_trait]
impl PreflightCheck for MemoryCheck {
    fn name(&self) -> &str {
        "memory"
    }

    async fn execute(&self, _ctx: &PreflightContext) -> CheckResult {
        let text = match tokio::fs::read_to_string("/proc/meminfo").await {
            Ok(t) => t,
            Err(e) => return CheckResult::warning(self.name(), format!("cannot read /proc/meminfo: {}", e)),
        };
        match parse_meminfo(&text).total_kb {
            Some(kb) => evaluate_memory(kb),
            None => CheckResult::warning(self.name(), "MemTotal missing from /proc/meminfo"),
        }
    }
}

// ---------------------------------------------------------------------------
// disk_space
// ---------------------------------------------------------------------------

pub struct DiskSpaceCheck {
    min_free_bytes: u64,
}

impl DiskSpaceCheck {
    pub fn new(min_free_bytes: u64) -> Self {
        Self { min_free_bytes }
    }
}

pub fn evaluate_disk(path: &Path, free_bytes: u64, min_free_bytes: u64) -> CheckResult {
    const NAME: &str = "disk_space";
    let detail = format!(
        "{} GB free at {:?}, need {} GB",
        free_bytes / GB,
        path,
        min_free_bytes / GB
    );
    if free_bytes < min_free_bytes {
        CheckResult::fail(NAME, detail)
    } else {
        CheckResult::pass(NAME, detail)
    }
}

#[async_trait]
impl PreflightCheck for DiskSpaceCheck {
    fn name(&self) -> &str {
        "disk_space"
    }

    async fn execute(&self, ctx: &PreflightContext) -> CheckResult {
        let root = ctx.layout.root();
        match free_space_bytes(root).await {
            Ok(free) => evaluate_disk(root, free, self.min_free_bytes),
            Err(e) => CheckResult::warning(self.name(), format!("cannot determine free space: {:#}", e)),
        }
    }
}

// ---------------------------------------------------------------------------
// ports / postgres_port
// ---------------------------------------------------------------------------

fn port_is_free(port: u16) -> bool {
    TcpListener::bind(("0.0.0.0", port)).is_ok()
}

pub fn evaluate_ports(name: &str, ports: &[(&str, u16)], is_free: impl Fn(u16) -> bool) -> CheckResult {
    let busy: Vec<String> = ports
        .iter()
        .filter(|(_, p)| !is_free(*p))
        .map(|(what, p)| format!("{} {}", what, p))
        .collect();
    if busy.is_empty() {
        let list = ports
            .iter()
            .map(|(_, p)| p.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        CheckResult::pass(name, format!("ports available: {}", list))
    } else {
        CheckResult::fail(name, format!("ports in use: {}", busy.join(", ")))
    }
}

pub struct PortsCheck;

#[async_trait]
impl PreflightCheck for PortsCheck {
    fn name(&self) -> &str {
        "ports"
    }

    async fn execute(&self, ctx: &PreflightContext) -> CheckResult {
        evaluate_ports(
            self.name(),
            &[
                ("platform.port", ctx.config.platform.port),
                ("prometheus.port", ctx.config.prometheus.port),
            ],
            port_is_free,
        )
    }
}

pub struct PostgresPortCheck;

#[async_trait]
impl PreflightCheck for PostgresPortCheck {
    fn name(&self) -> &str {
        "postgres_port"
    }

    async fn execute(&self, ctx: &PreflightContext) -> CheckResult {
        evaluate_ports(
            self.name(),
            &[("postgres.install.port", ctx.config.postgres.install.port)],
            port_is_free,
        )
    }
}

// ---------------------------------------------------------------------------
// install_root
// ---------------------------------------------------------------------------

pub struct InstallRootCheck;

/// Entries the installer itself may have created before preflight runs (logs, lock).
const SELF_CREATED_ENTRIES: &[&str] = &["yba-ctl"];

pub fn evaluate_install_root(root: &Path) -> CheckResult {
    const NAME: &str = "install_root";
    if !root.is_absolute() {
        return CheckResult::fail(NAME, format!("{:?} is not an absolute path", root));
    }
    if !root.exists() {
        return CheckResult::pass(NAME, format!("{:?} will be created", root));
    }
    if !root.is_dir() {
        return CheckResult::fail(NAME, format!("{:?} exists and is not a directory", root));
    }
    let entries = match std::fs::read_dir(root) {
        Ok(e) => e,
        Err(e) => return CheckResult::fail(NAME, format!("cannot read {:?}: {}", root, e)),
    };
    let mut foreign: Vec<String> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|n| !SELF_CREATED_ENTRIES.contains(&n.as_str()))
        .collect();
    if foreign.is_empty() {
        return CheckResult::pass(NAME, format!("{:?} is empty", root));
    }
    foreign.sort();
    CheckResult::fail(
        NAME,
        format!("{:?} is not empty (found: {})", root, foreign.join(", ")),
    )
}

#[async_trait]
impl PreflightCheck for InstallRootCheck {
    fn name(&self) -> &str {
        "install_root"
    }

    async fn execute(&self, ctx: &PreflightContext) -> CheckResult {
        evaluate_install_root(ctx.layout.root())
    }
}

// ---------------------------------------------------------------------------
// db_config
// ---------------------------------------------------------------------------

pub struct DbConfigCheck;

#[async_trait]
impl PreflightCheck for DbConfigCheck {
    fn name(&self) -> &str {
        "db_config"
    }

    async fn execute(&self, ctx: &PreflightContext) -> CheckResult {
        let pg = &ctx.config.postgres;
        if pg.install.enabled == pg.use_existing.enabled {
            return CheckResult::fail(
                self.name(),
                "exactly one of postgres.install.enabled and postgres.use_existing.enabled must be true",
            );
        }
        if pg.install.enabled {
            return CheckResult::pass(self.name(), format!("bundled postgres on port {}", pg.install.port));
        }

        let mut missing = Vec::new();
        for (key, path) in [
            ("pg_dump_path", &pg.use_existing.pg_dump_path),
            ("pg_restore_path", &pg.use_existing.pg_restore_path),
        ] {
            if let Some(p) = path {
                if !p.is_file() {
                    missing.push(format!("{} {:?} does not exist", key, p));
                }
            }
        }
        if !missing.is_empty() {
            return CheckResult::fail(self.name(), missing.join("; "));
        }
        CheckResult::pass(
            self.name(),
            format!(
                "existing postgres at {}:{}",
                pg.use_existing.host, pg.use_existing.port
            ),
        )
    }
}

// ---------------------------------------------------------------------------
// backup_script / input_file / pg_restore
// ---------------------------------------------------------------------------

pub struct BackupScriptCheck;

#[async_trait]
impl PreflightCheck for BackupScriptCheck {
    fn name(&self) -> &str {
        "backup_script"
    }

    async fn execute(&self, ctx: &PreflightContext) -> CheckResult {
        let script = ctx.layout.backup_script();
        if script.is_file() {
            CheckResult::pass(self.name(), format!("{:?}", script))
        } else {
            CheckResult::fail(self.name(), format!("backup script {:?} not found", script))
        }
    }
}

pub struct InputFileCheck;

#[async_trait]
impl PreflightCheck for InputFileCheck {
    fn name(&self) -> &str {
        "input_file"
    }

    async fn execute(&self, ctx: &PreflightContext) -> CheckResult {
        match &ctx.input_path {
            None => CheckResult::fail(self.name(), "no backup archive given"),
            Some(p) if p.is_file() => CheckResult::pass(self.name(), format!("{:?}", p)),
            Some(p) if p.exists() => CheckResult::fail(self.name(), format!("{:?} is not a file", p)),
            Some(p) => CheckResult::fail(self.name(), format!("{:?} does not exist", p)),
        }
    }
}

pub struct PgRestoreCheck;

#[async_trait]
impl PreflightCheck for PgRestoreCheck {
    fn name(&self) -> &str {
        "pg_restore"
    }

    async fn execute(&self, ctx: &PreflightContext) -> CheckResult {
        if !ctx.use_system_pg {
            return CheckResult::pass(self.name(), "not required (bundled pg_restore)");
        }
        match which::which("pg_restore") {
            Ok(p) => CheckResult::pass(self.name(), format!("{:?}", p)),
            Err(_) => CheckResult::fail(
                self.name(),
                "--use_system_pg given but pg_restore is not on $PATH",
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InstallerConfig;
    use crate::preflight::CheckStatus;
    use std::path::PathBuf;

    #[test]
    fn user_rules() {
        assert_eq!(evaluate_user("yugabyte", "root", true).status, CheckStatus::Pass);
        assert_eq!(evaluate_user("yugabyte", "yugabyte", false).status, CheckStatus::Pass);
        assert_eq!(evaluate_user("yugabyte", "alice", false).status, CheckStatus::Fail);
        assert_eq!(evaluate_user(" ", "root", true).status, CheckStatus::Fail);
    }

    #[test]
    fn unknown_distro_is_only_a_warning() {
        let rel = parse_os_release("ID=gentoo\nPRETTY_NAME=\"Gentoo Linux\"\n");
        assert_eq!(evaluate_os(&rel).status, CheckStatus::Warning);
        let rel = parse_os_release("ID=\"almalinux\"\nVERSION_ID=\"8.9\"\n");
        assert_eq!(evaluate_os(&rel).status, CheckStatus::Pass);
    }

    #[test]
    fn cpu_thresholds() {
        assert_eq!(evaluate_cpu(1).status, CheckStatus::Fail);
        assert_eq!(evaluate_cpu(2).status, CheckStatus::Warning);
        assert_eq!(evaluate_cpu(4).status, CheckStatus::Pass);
    }

    #[test]
    fn memory_threshold() {
        assert_eq!(evaluate_memory(4 * 1024 * 1024).status, CheckStatus::Fail);
        let ok = evaluate_memory(16 * 1024 * 1024);
        assert_eq!(ok.status, CheckStatus::Pass);
        assert_eq!(ok.detail, "16.0 GB total, need 8 GB");
    }

    #[test]
    fn disk_threshold() {
        let p = Path::new("/opt/yugabyte");
        assert_eq!(evaluate_disk(p, 12 * GB, 50 * GB).status, CheckStatus::Fail);
        assert_eq!(evaluate_disk(p, 60 * GB, 50 * GB).status, CheckStatus::Pass);
    }

    #[test]
    fn busy_ports_are_named() {
        let r = evaluate_ports("ports", &[("platform.port", 443), ("prometheus.port", 9090)], |p| p != 9090);
        assert_eq!(r.status, CheckStatus::Fail);
        assert_eq!(r.detail, "ports in use: prometheus.port 9090");

        let r = evaluate_ports("ports", &[("platform.port", 443)], |_| true);
        assert_eq!(r.status, CheckStatus::Pass);
    }

    #[test]
    fn install_root_must_be_empty_apart_from_installer_dir() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("yugabyte");
        assert_eq!(evaluate_install_root(&root).status, CheckStatus::Pass);

        std::fs::create_dir_all(root.join("yba-ctl/logs")).unwrap();
        assert_eq!(evaluate_install_root(&root).status, CheckStatus::Pass);

        std::fs::write(root.join("leftover.txt"), b"x").unwrap();
        let r = evaluate_install_root(&root);
        assert_eq!(r.status, CheckStatus::Fail);
        assert!(r.detail.contains("leftover.txt"), "{}", r.detail);

        assert_eq!(evaluate_install_root(Path::new("relative")).status, CheckStatus::Fail);
    }

    #[tokio::test]
    async fn db_config_checks_configured_tools() {
        let mut cfg = InstallerConfig::default();
        cfg.postgres.install.enabled = false;
        cfg.postgres.use_existing.enabled = true;
        cfg.postgres.use_existing.pg_dump_path = Some(PathBuf::from("/nonexistent/pg_dump"));
        let r = DbConfigCheck.execute(&PreflightContext::new(&cfg)).await;
        assert_eq!(r.status, CheckStatus::Fail);
        assert!(r.detail.contains("pg_dump_path"), "{}", r.detail);

        cfg.postgres.use_existing.pg_dump_path = None;
        let r = DbConfigCheck.execute(&PreflightContext::new(&cfg)).await;
        assert_eq!(r.status, CheckStatus::Pass);
    }

    #[tokio::test]
    async fn input_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = PreflightContext::new(&InstallerConfig::default());
        assert_eq!(InputFileCheck.execute(&ctx).await.status, CheckStatus::Fail);

        ctx.input_path = Some(dir.path().to_path_buf());
        assert_eq!(InputFileCheck.execute(&ctx).await.status, CheckStatus::Fail);

        let archive = dir.path().join("backup_23-04-25-16-54.tgz");
        std::fs::write(&archive, b"tgz").unwrap();
        ctx.input_path = Some(archive);
        assert_eq!(InputFileCheck.execute(&ctx).await.status, CheckStatus::Pass);
    }

    #[tokio::test]
    async fn pg_restore_only_required_with_system_pg() {
        let ctx = PreflightContext::new(&InstallerConfig::default());
        assert_eq!(PgRestoreCheck.execute(&ctx).await.status, CheckStatus::Pass);
    }

    #[tokio::test]
    async fn backup_script_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = InstallerConfig::default();
        cfg.install_root = dir.path().to_path_buf();
        let ctx = PreflightContext::new(&cfg);
        assert_eq!(BackupScriptCheck.execute(&ctx).await.status, CheckStatus::Fail);

        let script = ctx.layout.backup_script();
        std::fs::create_dir_all(script.parent().unwrap()).unwrap();
        std::fs::write(&script, b"#!/bin/bash\n").unwrap();
        assert_eq!(BackupScriptCheck.execute(&ctx).await.status, CheckStatus::Pass);
    }
}
