// Lifecycle orchestrator
//
// Drives install, upgrade, createBackup and restoreBackup (plus the service control
// commands) over the service registry. Every operation follows the same shape:
// precondition, preflight gate, state, ordered service walk, post-condition, state.
//
// Nothing here exits the process. Every failure is returned as an `InstallerError`
// naming the phase, service or check that failed; `main` reports it once.

pub mod lock;
pub mod prompt;

use chrono::Utc;
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::Duration;

use crate::backup::{DbConnection, RestoreIdentity, ScriptBridge, ScriptRunner};
use crate::config::{InstallLayout, InstallerConfig, CONFIG_FILE_NAME, PLATFORM_DB_NAME};
use crate::database::connection::DatabaseAdmin;
use crate::error::{InstallerError, InstallerResult, StepFailure, StepResult};
use crate::installation::files::copy_file_with_sha256;
use crate::installation::state_store::StateStore;
use crate::installation::{current_username, is_running_as_root};
use crate::licensing::License;
use crate::models::requests::{BackupRequest, RestoreRequest};
use crate::models::state::{InstallerState, PostgresMode, Workflow};
use crate::preflight::{self, format_results, CheckResult, PreflightCheckSet, PreflightContext};
use crate::services::{
    format_statuses, is_happy, PlatformControl, Service, ServiceRegistry, StatusRecord,
    PLATFORM_SERVICE_NAME,
};
use crate::utils::version::less_versions;
use lock::{resolve_lock_path, OperationLock};
use prompt::Confirmer;

pub const YUGABUNDLE_PROMPT: &str =
    "Restoring from yugabundle will drop the existing yugaware database. Continue?";

/// Name of the installed control binary.
pub const YBA_CTL_BINARY: &str = "yba-ctl";
pub const VERSION_METADATA_FILE: &str = "version_metadata.json";

/// Lifecycle operation a preflight set gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Install,
    Upgrade,
    Backup,
    Restore,
}

pub type CheckSetFactory = fn(Operation, &InstallerConfig) -> PreflightCheckSet;

pub fn default_check_sets(op: Operation, config: &InstallerConfig) -> PreflightCheckSet {
    match op {
        Operation::Install => PreflightCheckSet::for_install(config),
        Operation::Upgrade => PreflightCheckSet::upgrade(),
        Operation::Backup => PreflightCheckSet::backup(),
        Operation::Restore => PreflightCheckSet::restore(),
    }
}

/// Where this invocation runs from.
#[derive(Debug, Clone)]
pub struct OrchestratorContext {
    /// The running yba-ctl binary.
    pub exe_path: PathBuf,
    pub config_path: PathBuf,
    /// Version of the bundle this binary ships with, from `version_metadata.json`.
    pub bundle_version: Option<String>,
}

impl OrchestratorContext {
    pub fn exe_dir(&self) -> PathBuf {
        self.exe_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

pub struct OrchestratorParts {
    pub config: InstallerConfig,
    pub layout: InstallLayout,
    pub registry: ServiceRegistry,
    pub state_store: StateStore,
    pub script_runner: Arc<dyn ScriptRunner>,
    pub db_admin: Arc<dyn DatabaseAdmin>,
    pub confirmer: Arc<dyn Confirmer>,
    pub context: OrchestratorContext,
    pub check_sets: CheckSetFactory,
}

#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    pub skip_preflight: Vec<String>,
    /// License to place in the installation.
    pub license_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct UpgradeOptions {
    pub skip_preflight: Vec<String>,
    pub skip_version_checks: bool,
}

#[derive(Debug, Clone)]
pub struct StatusReport {
    pub version: Option<String>,
    pub statuses: Vec<StatusRecord>,
}

/// Log a soft failure and carry on; propagate a hard one.
pub fn tolerate(step: StepResult, what: &str) -> InstallerResult<()> {
    match step {
        Ok(()) => Ok(()),
        Err(StepFailure::Soft(msg)) => {
            warn!("[PHASE: services] [STEP: best_effort] {}: {}. Continuing.", what, msg);
            Ok(())
        }
        Err(StepFailure::Hard(e)) => Err(e),
    }
}

#[derive(Debug, Clone, Copy)]
enum Action {
    Install,
    Upgrade,
    Start,
    Stop,
    Restart,
}

impl Action {
    fn label(self) -> &'static str {
        match self {
            Action::Install => "install",
            Action::Upgrade => "upgrade",
            Action::Start => "start",
            Action::Stop => "stop",
            Action::Restart => "restart",
        }
    }

    async fn apply(self, svc: &dyn Service) -> anyhow::Result<()> {
        match self {
            Action::Install => svc.install().await,
            Action::Upgrade => svc.upgrade().await,
            Action::Start => svc.start().await,
            Action::Stop => svc.stop().await,
            Action::Restart => svc.restart().await,
        }
    }
}

fn platform_control(svc: &Arc<dyn Service>) -> InstallerResult<&dyn PlatformControl> {
    svc.as_platform().ok_or_else(|| {
        InstallerError::Config(format!(
            "service '{}' does not provide platform controls",
            svc.name()
        ))
    })
}

pub struct Orchestrator {
    config: InstallerConfig,
    layout: InstallLayout,
    registry: ServiceRegistry,
    state_store: StateStore,
    script_runner: Arc<dyn ScriptRunner>,
    db_admin: Arc<dyn DatabaseAdmin>,
    confirmer: Arc<dyn Confirmer>,
    context: OrchestratorContext,
    check_sets: CheckSetFactory,
}

impl Orchestrator {
    pub fn new(parts: OrchestratorParts) -> Self {
        Self {
            config: parts.config,
            layout: parts.layout,
            registry: parts.registry,
            state_store: parts.state_store,
            script_runner: parts.script_runner,
            db_admin: parts.db_admin,
            confirmer: parts.confirmer,
            context: parts.context,
            check_sets: parts.check_sets,
        }
    }

    // ------------------------------------------------------------------
    // Preconditions
    // ------------------------------------------------------------------

    fn lock(&self) -> InstallerResult<OperationLock> {
        OperationLock::acquire(&resolve_lock_path(&self.layout))
    }

    pub fn is_installed(&self) -> bool {
        self.layout.installed_marker().exists()
    }

    /// Whether this process is the copy of yba-ctl installed under the install root.
    pub fn is_running_from_installed(&self) -> bool {
        let exe_dir = self.context.exe_dir();
        match (exe_dir.canonicalize(), self.layout.ybactl_dir().canonicalize()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }

    fn installed_binary(&self) -> PathBuf {
        self.layout.ybactl_dir().join(YBA_CTL_BINARY)
    }

    fn require_installed(&self) -> InstallerResult<()> {
        if !self.is_installed() {
            return Err(InstallerError::Precondition(format!(
                "YugabyteDB Anywhere is not installed at {:?}; run `yba-ctl install` first",
                self.layout.root()
            )));
        }
        Ok(())
    }

    fn require_run_from_installed(&self, command: &str) -> InstallerResult<()> {
        self.require_installed()?;
        if !self.is_running_from_installed() {
            return Err(InstallerError::Precondition(format!(
                "{} must be run from {}. It may be in the systems $PATH for easy of use.",
                command,
                self.installed_binary().to_string_lossy()
            )));
        }
        Ok(())
    }

    fn target_version(&self) -> InstallerResult<String> {
        self.context.bundle_version.clone().ok_or_else(|| {
            InstallerError::Precondition(format!(
                "cannot determine the version of this bundle: {} not found in {:?}",
                VERSION_METADATA_FILE,
                self.context.exe_dir()
            ))
        })
    }

    // ------------------------------------------------------------------
    // Shared steps
    // ------------------------------------------------------------------

    fn preflight_context(&self) -> PreflightContext {
        PreflightContext::new(&self.config)
    }

    /// Run the set for `op`; any failing check aborts with the full report logged.
    async fn gate(&self, op: Operation, ctx: &PreflightContext, skip: &[String]) -> InstallerResult<()> {
        let set = (self.check_sets)(op, &self.config);
        let results = preflight::run(&set, ctx, skip).await;
        if preflight::should_fail(&results) {
            error!(
                "[PHASE: preflight] [STEP: {}] Preflight checks failed:\n{}",
                set.name,
                format_results(&results)
            );
            return Err(InstallerError::PreflightFailed {
                operation: format!("{:?}", op).to_lowercase(),
                failed: preflight::failed_checks(&results),
            });
        }
        debug!(
            "[PHASE: preflight] [STEP: {}] Preflight passed:\n{}",
            set.name,
            format_results(&results)
        );
        Ok(())
    }

    /// Load state; an absent file is an empty state. Warns about interrupted workflows.
    async fn load_state(&self) -> InstallerResult<InstallerState> {
        let state = self.state_store.load().await?;
        if !state.workflow.is_idle() {
            warn!(
                "[PHASE: state] [STEP: load] A previous {} did not complete (recorded version '{}')",
                state.workflow.describe(),
                state.version
            );
        }
        Ok(state)
    }

    fn postgres_mode(&self) -> PostgresMode {
        if self.config.postgres.use_existing.enabled {
            PostgresMode::Existing
        } else {
            PostgresMode::Bundled
        }
    }

    fn state_for(&self, version: &str, workflow: Workflow) -> InstallerState {
        InstallerState {
            version: version.to_string(),
            workflow,
            fix_paths_pending: false,
            install_root: Some(self.layout.root().to_path_buf()),
            service_username: Some(self.config.service_username.clone()),
            postgres_mode: self.postgres_mode(),
            updated_at: Some(Utc::now()),
        }
    }

    /// Walk `names`, applying `action` to each; stop at the first failure.
    async fn walk(&self, names: &[String], action: Action) -> InstallerResult<()> {
        for name in names {
            let svc = self.registry.get(name)?;
            let started = Instant::now();
            info!(
                "[PHASE: services] [STEP: {}] {} {}",
                action.label(),
                action.label(),
                name
            );
            action
                .apply(svc.as_ref())
                .await
                .map_err(|e| InstallerError::service(name, action.label(), e))?;
            debug!(
                "[PHASE: services] [STEP: {}] {} done (duration_ms={})",
                action.label(),
                name,
                started.elapsed().as_millis()
            );
        }
        Ok(())
    }

    async fn collect_statuses(&self) -> InstallerResult<Vec<StatusRecord>> {
        let mut statuses = Vec::with_capacity(self.registry.len());
        for name in self.registry.order() {
            let svc = self.registry.get(&name)?;
            let status = svc
                .status()
                .await
                .map_err(|e| InstallerError::service(&name, "status", e))?;
            statuses.push(status);
        }
        Ok(statuses)
    }

    /// Every service must be happy; the first that is not ends the operation.
    fn verify_happy(&self, statuses: &[StatusRecord], phase: &str) -> InstallerResult<()> {
        if let Some(bad) = statuses.iter().find(|s| !is_happy(s)) {
            return Err(InstallerError::UnhealthyService {
                service: bad.service.clone(),
                phase: phase.to_string(),
                log_file: self.layout.log_file().to_string_lossy().to_string(),
            });
        }
        Ok(())
    }

    /// Copy this binary (and its config and version metadata) into the installation.
    async fn install_ybactl(&self) -> InstallerResult<()> {
        let dest_dir = self.layout.ybactl_dir();
        tokio::fs::create_dir_all(&dest_dir).await?;

        let to_service_err = |e: anyhow::Error| InstallerError::service(YBA_CTL_BINARY, "install", e);
        copy_file_with_sha256(&self.context.exe_path, &self.installed_binary(), YBA_CTL_BINARY)
            .await
            .map_err(to_service_err)?;

        let extras = [
            (self.context.config_path.clone(), dest_dir.join(CONFIG_FILE_NAME)),
            (
                self.context.exe_dir().join(VERSION_METADATA_FILE),
                dest_dir.join(VERSION_METADATA_FILE),
            ),
        ];
        for (src, dst) in extras {
            if !src.is_file() || same_file(&src, &dst) {
                continue;
            }
            let label = src
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            copy_file_with_sha256(&src, &dst, &label)
                .await
                .map_err(to_service_err)?;
        }
        info!(
            "[PHASE: install] [STEP: yba_ctl] Installed yba-ctl into {:?}",
            dest_dir
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Install
    // ------------------------------------------------------------------

    pub async fn install(&self, opts: &InstallOptions) -> InstallerResult<Vec<StatusRecord>> {
        let started = Instant::now();
        let _lock = self.lock()?;

        if self.is_installed() {
            return Err(InstallerError::Precondition(
                "YugabyteDB Anywhere already installed, cannot install twice.".to_string(),
            ));
        }
        if self.is_running_from_installed() {
            return Err(InstallerError::Precondition(
                "install must be run from the yba bundle that is getting installed.".to_string(),
            ));
        }
        let target = self.target_version()?;
        info!(
            "[PHASE: install] [STEP: start] Installing YugabyteDB Anywhere {} into {:?}",
            target,
            self.layout.root()
        );

        // A bad license path fails here, before the gate and before the host changes.
        let license = match &opts.license_path {
            Some(path) => Some(License::from_file(path).await?),
            None => None,
        };

        self.gate(Operation::Install, &self.preflight_context(), &opts.skip_preflight)
            .await?;

        self.state_store
            .store(&self.state_for("", Workflow::Installing))
            .await?;
        for dir in [self.layout.root().to_path_buf(), self.layout.data_dir(), self.layout.ybactl_dir()] {
            tokio::fs::create_dir_all(&dir).await?;
        }
        if let Some(license) = &license {
            license.install(&self.layout).await?;
        }

        self.walk(&self.registry.order(), Action::Install).await?;
        self.install_ybactl().await?;

        let platform = self.registry.platform()?;
        let ready_timeout = Duration::from_secs(self.config.platform.ready_timeout_secs);
        if let Err(e) = platform_control(&platform)?.wait_for_ready(ready_timeout).await {
            warn!(
                "[PHASE: install] [STEP: ready] YugabyteDB Anywhere did not report ready: {:#}",
                e
            );
        }

        let statuses = self.collect_statuses().await?;
        self.verify_happy(&statuses, "Install")?;

        self.state_store
            .store(&self.state_for(&target, Workflow::Idle))
            .await?;
        tokio::fs::write(self.layout.installed_marker(), format!("{}\n", target)).await?;

        info!(
            "[PHASE: install] [STEP: done] Successfully installed YugabyteDB Anywhere {} (duration_ms={})\n{}",
            target,
            started.elapsed().as_millis(),
            format_statuses(&statuses)
        );
        Ok(statuses)
    }

    // ------------------------------------------------------------------
    // Upgrade
    // ------------------------------------------------------------------

    pub async fn upgrade(&self, opts: &UpgradeOptions) -> InstallerResult<Vec<StatusRecord>> {
        let started = Instant::now();
        let _lock = self.lock()?;

        self.require_installed()?;
        if self.is_running_from_installed() {
            return Err(InstallerError::Precondition(
                "Upgrade must be executed from the target yba bundle, not the existing install"
                    .to_string(),
            ));
        }

        let state = self.load_state().await?;
        let platform = self.registry.platform()?;
        let installed = if state.has_version() {
            state.version.clone()
        } else {
            platform_control(&platform)?
                .installed_version()
                .await
                .map_err(|e| InstallerError::State(format!("cannot read installed version: {:#}", e)))?
                .ok_or_else(|| {
                    InstallerError::Precondition(
                        "cannot determine the installed YugabyteDB Anywhere version".to_string(),
                    )
                })?
        };
        let target = self.target_version()?;

        if opts.skip_version_checks {
            warn!(
                "[PHASE: upgrade] [STEP: version] Skipping version check ({} -> {})",
                installed, target
            );
        } else if !less_versions(&installed, &target)? {
            return Err(InstallerError::VersionGate { installed, target });
        }

        self.gate(Operation::Upgrade, &self.preflight_context(), &opts.skip_preflight)
            .await?;

        // The recorded version stays the old one until every service is healthy again.
        let mut marker = state.clone();
        marker.version = installed.clone();
        marker.workflow = Workflow::Upgrading {
            target: target.clone(),
        };
        marker.updated_at = Some(Utc::now());
        self.state_store.store(&marker).await?;

        info!(
            "[PHASE: upgrade] [STEP: start] Upgrading YugabyteDB Anywhere {} -> {}",
            installed, target
        );
        // A restored yugabundle still needs yb.fixPaths; the upgrade re-renders platform.conf.
        if state.fix_paths_pending {
            platform_control(&platform)?
                .set_fix_paths(true)
                .await
                .map_err(|e| InstallerError::service(PLATFORM_SERVICE_NAME, "regenerate config", e))?;
        }
        let order = self.registry.order();
        self.walk(&order, Action::Upgrade).await?;
        self.walk(&order, Action::Restart).await?;

        let statuses = self.collect_statuses().await?;
        self.verify_happy(&statuses, "Upgrade")?;

        self.install_ybactl().await?;
        let mut done = self.state_for(&target, Workflow::Idle);
        done.fix_paths_pending = state.fix_paths_pending;
        self.state_store.store(&done).await?;

        info!(
            "[PHASE: upgrade] [STEP: done] Successfully upgraded YugabyteDB Anywhere to {} (duration_ms={})\n{}",
            target,
            started.elapsed().as_millis(),
            format_statuses(&statuses)
        );
        Ok(statuses)
    }

    // ------------------------------------------------------------------
    // Backup / restore
    // ------------------------------------------------------------------

    fn script_bridge(&self, platform: &dyn PlatformControl) -> ScriptBridge {
        ScriptBridge::new(
            self.script_runner.clone(),
            platform.backup_script(),
            self.layout.pgpass_file(),
        )
    }

    pub async fn create_backup(&self, req: &BackupRequest, skip: &[String]) -> InstallerResult<()> {
        let _lock = self.lock()?;
        self.require_run_from_installed("createBackup")?;
        let state = self.load_state().await?;
        debug!(
            "[PHASE: backup] [STEP: state] Installed version '{}', data dir {:?}",
            state.version, req.data_dir
        );

        self.gate(Operation::Backup, &self.preflight_context(), skip)
            .await?;

        let platform = self.registry.platform()?;
        let conn = DbConnection::from_config(&self.config, &self.layout);
        self.script_bridge(platform_control(&platform)?)
            .create_backup(req, &conn)
            .await
    }

    pub async fn restore_backup(&self, req: &RestoreRequest, skip: &[String]) -> InstallerResult<()> {
        let started = Instant::now();
        let _lock = self.lock()?;
        self.require_run_from_installed("restoreBackup")?;
        let state = self.load_state().await?;
        if let Some(root) = &state.install_root {
            if root != self.layout.root() {
                warn!(
                    "[PHASE: restore] [STEP: state] State records install root {:?} but config uses {:?}",
                    root,
                    self.layout.root()
                );
            }
        }

        let mut ctx = self.preflight_context();
        ctx.input_path = Some(req.input_path.clone());
        ctx.use_system_pg = req.use_system_pg;
        self.gate(Operation::Restore, &ctx, skip).await?;

        let platform = self.registry.platform()?;
        let control = platform_control(&platform)?;
        let conn = DbConnection::from_config(&self.config, &self.layout);

        if req.is_disruptive() {
            if !self.confirmer.confirm(YUGABUNDLE_PROMPT, true) {
                return Err(InstallerError::Aborted(
                    "Stopping yugabundle restore.".to_string(),
                ));
            }
            let stopped = platform.stop().await.map_err(|e| {
                StepFailure::Soft(format!("Error {:#} stopping {}", e, PLATFORM_SERVICE_NAME))
            });
            tolerate(stopped, "Stopping yb-platform before yugabundle restore")?;

            let params = conn.admin_params();
            info!(
                "[PHASE: restore] [STEP: database] Dropping and recreating database {} on {}",
                PLATFORM_DB_NAME,
                params.describe()
            );
            self.db_admin
                .recreate_database(&params, PLATFORM_DB_NAME)
                .await
                .map_err(|e| {
                    error!(
                        "[PHASE: restore] [STEP: database] {} ({})",
                        e.user_message, e.internal_details
                    );
                    InstallerError::Database(format!(
                        "{}. The {} database may already be dropped and {} is stopped; create the database manually (CREATE DATABASE {};) and rerun restoreBackup",
                        e.user_message, PLATFORM_DB_NAME, PLATFORM_SERVICE_NAME, PLATFORM_DB_NAME
                    ))
                })?;
        }

        let identity = RestoreIdentity {
            yba_user: self.config.service_username.clone(),
            data_dir: self.layout.data_dir(),
            exec_user: if is_running_as_root() {
                self.config.service_username.clone()
            } else {
                current_username()
            },
        };
        self.script_bridge(control)
            .restore_backup(req, &conn, &identity)
            .await?;

        tolerate(
            control.set_data_dir_perms().await,
            &format!("Could not set {:?} permissions", control.data_dir()),
        )?;

        if req.yugabundle {
            control
                .set_fix_paths(true)
                .await
                .map_err(|e| InstallerError::service(PLATFORM_SERVICE_NAME, "regenerate config", e))?;
            let mut pending = state.clone();
            pending.fix_paths_pending = true;
            pending.updated_at = Some(Utc::now());
            self.state_store.store(&pending).await?;
            platform.restart().await.map_err(|e| {
                InstallerError::service(
                    PLATFORM_SERVICE_NAME,
                    "restart",
                    e.context("the backup was restored but yb-platform is not running; start it with `yba-ctl start`"),
                )
            })?;
        }

        info!(
            "[PHASE: restore] [STEP: done] Restore from {:?} complete (duration_ms={})",
            req.input_path,
            started.elapsed().as_millis()
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Service control
    // ------------------------------------------------------------------

    pub async fn start_all(&self) -> InstallerResult<()> {
        let _lock = self.lock()?;
        self.require_run_from_installed("start")?;
        self.walk(&self.registry.order(), Action::Start).await
    }

    pub async fn stop_all(&self) -> InstallerResult<()> {
        let _lock = self.lock()?;
        self.require_run_from_installed("stop")?;
        self.walk(&self.registry.reverse_order(), Action::Stop).await
    }

    pub async fn restart_all(&self) -> InstallerResult<()> {
        let _lock = self.lock()?;
        self.require_run_from_installed("restart")?;
        self.walk(&self.registry.order(), Action::Restart).await
    }

    pub async fn status(&self) -> InstallerResult<StatusReport> {
        self.require_installed()?;
        let state = self.load_state().await?;
        let version = if state.has_version() {
            Some(state.version)
        } else {
            let platform = self.registry.platform()?;
            platform_control(&platform)?
                .installed_version()
                .await
                .unwrap_or_default()
        };
        let statuses = self.collect_statuses().await?;
        Ok(StatusReport { version, statuses })
    }

    /// Run the install set (or the upgrade set on an installed host) without gating.
    pub async fn preflight(&self, skip: &[String]) -> InstallerResult<Vec<CheckResult>> {
        let op = if self.is_installed() {
            Operation::Upgrade
        } else {
            Operation::Install
        };
        let set = (self.check_sets)(op, &self.config);
        Ok(preflight::run(&set, &self.preflight_context(), skip).await)
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(x), Ok(y)) => x == y,
        _ => false,
    }
}
