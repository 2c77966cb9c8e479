// Preflight check engine
//
// A check set is chosen per lifecycle operation. `run` executes every check in order,
// never stopping early, so the operator sees the whole picture in one pass. Checks named
// in the skip list are recorded as skipped without running their probe.

pub mod checks;

use async_trait::async_trait;
use log::{info, warn};
use std::fmt;
use std::path::PathBuf;
use std::time::Instant;

use crate::config::{InstallLayout, InstallerConfig};
use checks::{
    BackupScriptCheck, CpuCheck, DbConfigCheck, DiskSpaceCheck, InputFileCheck, InstallRootCheck,
    MemoryCheck, OsCheck, PgRestoreCheck, PortsCheck, PostgresPortCheck, UserCheck,
};

pub const GB: u64 = 1024 * 1024 * 1024;
pub const INSTALL_MIN_FREE_BYTES: u64 = 50 * GB;
pub const MAINTENANCE_MIN_FREE_BYTES: u64 = 10 * GB;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Warning,
    Fail,
    Skipped,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CheckStatus::Pass => "Pass",
            CheckStatus::Warning => "Warning",
            CheckStatus::Fail => "Fail",
            CheckStatus::Skipped => "Skipped",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub check: String,
    pub status: CheckStatus,
    pub detail: String,
}

impl CheckResult {
    pub fn pass(check: &str, detail: impl Into<String>) -> Self {
        Self::with_status(check, CheckStatus::Pass, detail)
    }

    pub fn warning(check: &str, detail: impl Into<String>) -> Self {
        Self::with_status(check, CheckStatus::Warning, detail)
    }

    pub fn fail(check: &str, detail: impl Into<String>) -> Self {
        Self::with_status(check, CheckStatus::Fail, detail)
    }

    fn with_status(check: &str, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            check: check.to_string(),
            status,
            detail: detail.into(),
        }
    }
}

/// Everything a probe may look at. Built fresh for each operation.
#[derive(Debug, Clone)]
pub struct PreflightContext {
    pub config: InstallerConfig,
    pub layout: InstallLayout,
    /// Restore archive, when gating a restore.
    pub input_path: Option<PathBuf>,
    pub use_system_pg: bool,
}

impl PreflightContext {
    pub fn new(config: &InstallerConfig) -> Self {
        Self {
            layout: config.layout(),
            config: config.clone(),
            input_path: None,
            use_system_pg: false,
        }
    }
}

#[async_trait]
pub trait PreflightCheck: Send + Sync {
    /// Unique name; also the key operators pass to `--skip_preflight`.
    fn name(&self) -> &str;
    async fn execute(&self, ctx: &PreflightContext) -> CheckResult;
}

pub struct PreflightCheckSet {
    pub name: String,
    pub checks: Vec<Box<dyn PreflightCheck>>,
}

impl PreflightCheckSet {
    pub fn new(name: &str, checks: Vec<Box<dyn PreflightCheck>>) -> Self {
        Self {
            name: name.to_string(),
            checks,
        }
    }

    pub fn install_with_postgres() -> Self {
        Self::new(
            "InstallChecksWithPostgres",
            vec![
                Box::new(UserCheck),
                Box::new(OsCheck),
                Box::new(CpuCheck),
                Box::new(MemoryCheck),
                Box::new(DiskSpaceCheck::new(INSTALL_MIN_FREE_BYTES)),
                Box::new(InstallRootCheck),
                Box::new(PortsCheck),
                Box::new(PostgresPortCheck),
                Box::new(DbConfigCheck),
            ],
        )
    }

    pub fn install() -> Self {
        Self::new(
            "InstallChecks",
            vec![
                Box::new(UserCheck),
                Box::new(OsCheck),
                Box::new(CpuCheck),
                Box::new(MemoryCheck),
                Box::new(DiskSpaceCheck::new(INSTALL_MIN_FREE_BYTES)),
                Box::new(InstallRootCheck),
                Box::new(PortsCheck),
                Box::new(DbConfigCheck),
            ],
        )
    }

    /// Install set matching the configured postgres mode.
    pub fn for_install(config: &InstallerConfig) -> Self {
        if config.postgres.install.enabled {
            Self::install_with_postgres()
        } else {
            Self::install()
        }
    }

    pub fn upgrade() -> Self {
        Self::new(
            "UpgradeChecks",
            vec![
                Box::new(UserCheck),
                Box::new(OsCheck),
                Box::new(CpuCheck),
                Box::new(MemoryCheck),
                Box::new(DiskSpaceCheck::new(MAINTENANCE_MIN_FREE_BYTES)),
                Box::new(DbConfigCheck),
            ],
        )
    }

    pub fn backup() -> Self {
        Self::new(
            "BackupChecks",
            vec![
                Box::new(UserCheck),
                Box::new(DiskSpaceCheck::new(MAINTENANCE_MIN_FREE_BYTES)),
                Box::new(BackupScriptCheck),
                Box::new(DbConfigCheck),
            ],
        )
    }

    pub fn restore() -> Self {
        Self::new(
            "RestoreChecks",
            vec![
                Box::new(UserCheck),
                Box::new(DiskSpaceCheck::new(MAINTENANCE_MIN_FREE_BYTES)),
                Box::new(BackupScriptCheck),
                Box::new(DbConfigCheck),
                Box::new(InputFileCheck),
                Box::new(PgRestoreCheck),
            ],
        )
    }

    pub fn names(&self) -> Vec<&str> {
        self.checks.iter().map(|c| c.name()).collect()
    }
}

/// Run every check in `set`, skipping (not executing) those named in `skip`.
pub async fn run(set: &PreflightCheckSet, ctx: &PreflightContext, skip: &[String]) -> Vec<CheckResult> {
    let started = Instant::now();
    let names = set.names();
    for unknown in skip.iter().filter(|s| !names.contains(&s.as_str())) {
        warn!(
            "[PHASE: preflight] [STEP: {}] Ignoring unknown check '{}' in skip list (known: {})",
            set.name,
            unknown,
            names.join(", ")
        );
    }

    let mut results = Vec::with_capacity(set.checks.len());
    for check in &set.checks {
        let name = check.name();
        let result = if skip.iter().any(|s| s == name) {
            CheckResult::with_status(name, CheckStatus::Skipped, "skipped by operator")
        } else {
            check.execute(ctx).await
        };
        match result.status {
            CheckStatus::Fail => warn!(
                "[PHASE: preflight] [STEP: {}] {} failed: {}",
                name, name, result.detail
            ),
            CheckStatus::Warning => warn!(
                "[PHASE: preflight] [STEP: {}] {} warning: {}",
                name, name, result.detail
            ),
            _ => info!(
                "[PHASE: preflight] [STEP: {}] {}: {} {}",
                name, result.status, name, result.detail
            ),
        }
        results.push(result);
    }

    info!(
        "[PHASE: preflight] [STEP: {}] Ran {} checks (failed={}, duration_ms={})",
        set.name,
        results.len(),
        failed_checks(&results).len(),
        started.elapsed().as_millis()
    );
    results
}

/// True iff any outcome is a failure. Warnings never block.
pub fn should_fail(results: &[CheckResult]) -> bool {
    results.iter().any(|r| r.status == CheckStatus::Fail)
}

pub fn failed_checks(results: &[CheckResult]) -> Vec<String> {
    results
        .iter()
        .filter(|r| r.status == CheckStatus::Fail)
        .map(|r| r.check.clone())
        .collect()
}

pub fn format_results(results: &[CheckResult]) -> String {
    let header = ["Check", "Result", "Detail"];
    let mut widths = header.map(str::len);
    for r in results {
        widths[0] = widths[0].max(r.check.len());
        widths[1] = widths[1].max(r.status.to_string().len());
    }

    let row = |a: &str, b: &str, c: &str| {
        format!("{:<w0$} | {:<w1$} | {}", a, b, c, w0 = widths[0], w1 = widths[1])
            .trim_end()
            .to_string()
    };

    let mut out = vec![
        row(header[0], header[1], header[2]),
        format!("{}-+-{}-+-{}", "-".repeat(widths[0]), "-".repeat(widths[1]), "-".repeat(widths[2])),
    ];
    for r in results {
        out.push(row(&r.check, &r.status.to_string(), &r.detail));
    }
    out.join("\n")
}
