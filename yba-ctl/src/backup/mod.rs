// Backup/restore script bridge
//
// Translates a BackupRequest/RestoreRequest plus configuration into the argument
// vector of `yb_platform_backup.sh`, and owns the lifetime of the pgpass credential
// file handed to it.
//
// IMPORTANT:
// - Boolean options are emitted only when true; there is no "--flag=false" form.
// - The password never appears in argv; it only reaches the script through pgpass.
// - Script failures are fatal and never retried.

use async_trait::async_trait;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::Duration;

use crate::config::{InstallLayout, InstallerConfig, Secret, PLATFORM_DB_NAME};
use crate::database::connection::PgConnectionParams;
use crate::error::{InstallerError, InstallerResult};
use crate::installation::run_cmd;
use crate::models::requests::{BackupRequest, RestoreRequest};

/// How the platform database is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbConnection {
    /// Postgres installed and run by yba-ctl.
    SelfManaged { port: u16, pg_bin: PathBuf },
    /// Operator-provided Postgres.
    External {
        host: String,
        port: u16,
        username: String,
        password: Secret,
        dump_path: Option<PathBuf>,
        restore_path: Option<PathBuf>,
    },
}

impl DbConnection {
    pub fn from_config(cfg: &InstallerConfig, layout: &InstallLayout) -> Self {
        let existing = &cfg.postgres.use_existing;
        if existing.enabled {
            DbConnection::External {
                host: existing.host.clone(),
                port: existing.port,
                username: existing.username.clone(),
                password: existing.password.clone(),
                dump_path: existing.pg_dump_path.clone(),
                restore_path: existing.pg_restore_path.clone(),
            }
        } else {
            DbConnection::SelfManaged {
                port: cfg.postgres.install.port,
                pg_bin: layout.pg_bin(),
            }
        }
    }

    /// Parameters for a direct admin connection.
    pub fn admin_params(&self) -> PgConnectionParams {
        match self {
            DbConnection::SelfManaged { port, .. } => PgConnectionParams {
                host: "localhost".to_string(),
                port: *port,
                username: "postgres".to_string(),
                password: Secret::default(),
            },
            DbConnection::External {
                host,
                port,
                username,
                password,
                ..
            } => PgConnectionParams {
                host: host.clone(),
                port: *port,
                username: username.clone(),
                password: password.clone(),
            },
        }
    }

    /// `host:port:yugaware:user:password`, when there is a password to hand over.
    pub fn pgpass_line(&self) -> Option<String> {
        match self {
            DbConnection::External {
                host,
                port,
                username,
                password,
                ..
            } if !password.is_empty() => Some(format!(
                "{}:{}:{}:{}:{}",
                host,
                port,
                PLATFORM_DB_NAME,
                username,
                password.expose()
            )),
            _ => None,
        }
    }

    fn postgres_args(&self) -> Vec<String> {
        let (user, host, port) = match self {
            DbConnection::SelfManaged { port, .. } => ("postgres".to_string(), "localhost".to_string(), *port),
            DbConnection::External {
                host,
                port,
                username,
                ..
            } => (username.clone(), host.clone(), *port),
        };
        vec![
            "--db_username".to_string(),
            user,
            "--db_host".to_string(),
            host,
            "--db_port".to_string(),
            port.to_string(),
        ]
    }
}

fn path_arg(p: &Path) -> String {
    p.to_string_lossy().to_string()
}

/// Argument vector for `yb_platform_backup.sh create`.
///
/// `pgpass` is passed only for an external database; building fails when an external
/// database has no `pg_dump_path` configured.
pub fn build_create_args(
    req: &BackupRequest,
    conn: &DbConnection,
    pgpass: Option<&Path>,
) -> InstallerResult<Vec<String>> {
    let mut args = vec![
        "create".to_string(),
        "--output".to_string(),
        path_arg(&req.output_path),
        "--data_dir".to_string(),
        path_arg(&req.data_dir),
        "--yba_installer".to_string(),
    ];
    if req.exclude_prometheus {
        args.push("--exclude-prometheus".to_string());
    }
    if req.skip_restart {
        args.push("--skip_restart".to_string());
    }
    if req.verbose {
        args.push("--verbose".to_string());
    }

    match conn {
        DbConnection::External { dump_path, .. } => {
            let dump = dump_path.as_ref().ok_or_else(|| {
                InstallerError::Precondition(
                    "postgres.use_existing.pg_dump_path must be set to back up an existing database. Stopping backup process"
                        .to_string(),
                )
            })?;
            args.push("--pg_dump_path".to_string());
            args.push(path_arg(dump));
            if let Some(p) = pgpass {
                args.push("--pgpass_path".to_string());
                args.push(path_arg(p));
            }
        }
        DbConnection::SelfManaged { pg_bin, .. } => {
            args.push("--pg_dump_path".to_string());
            args.push(path_arg(&pg_bin.join("pg_dump")));
        }
    }

    args.extend(conn.postgres_args());
    Ok(args)
}

/// Who the restore runs as and where the installation keeps its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreIdentity {
    /// `service_username` from config.
    pub yba_user: String,
    /// Installation data directory (`--ybai_data_dir`).
    pub data_dir: PathBuf,
    /// Owner of restored files (`-e`): the service user when privileged, else the caller.
    pub exec_user: String,
}

/// Argument vector for `yb_platform_backup.sh restore`.
pub fn build_restore_args(
    req: &RestoreRequest,
    conn: &DbConnection,
    identity: &RestoreIdentity,
    pgpass: Option<&Path>,
) -> InstallerResult<Vec<String>> {
    let destination = path_arg(&req.destination);
    let mut args = vec![
        "restore".to_string(),
        "--input".to_string(),
        path_arg(&req.input_path),
        "--destination".to_string(),
        destination.clone(),
        "--data_dir".to_string(),
        destination,
        "--disable_version_check".to_string(),
        "--yba_installer".to_string(),
        "--yba_user".to_string(),
        identity.yba_user.clone(),
        "--ybai_data_dir".to_string(),
        path_arg(&identity.data_dir),
    ];
    if req.skip_restart {
        args.push("--skip_restart".to_string());
    }
    if req.yugabundle {
        args.push("--yugabundle".to_string());
    }
    if req.use_system_pg {
        args.push("--use_system_pg".to_string());
    }
    if req.verbose {
        args.push("--verbose".to_string());
    }
    args.push("-e".to_string());
    args.push(identity.exec_user.clone());

    match conn {
        DbConnection::External { restore_path, .. } => {
            let restore = restore_path.as_ref().ok_or_else(|| {
                InstallerError::Precondition(
                    "postgres.use_existing.pg_restore_path must be set to restore into an existing database. Stopping restore process"
                        .to_string(),
                )
            })?;
            args.push("--pg_restore_path".to_string());
            args.push(path_arg(restore));
            if let Some(p) = pgpass {
                args.push("--pgpass_path".to_string());
                args.push(path_arg(p));
            }
        }
        DbConnection::SelfManaged { pg_bin, .. } => {
            args.push("--pg_restore_path".to_string());
            args.push(path_arg(&pg_bin.join("pg_restore")));
        }
    }

    args.extend(conn.postgres_args());
    Ok(args)
}

/// Scoped pgpass file. Any previous file is removed first, the new one is created
/// with mode 0600, and it is removed again when the guard drops.
#[derive(Debug)]
pub struct CredentialFile {
    path: PathBuf,
}

impl CredentialFile {
    pub async fn write(path: &Path, line: &str) -> InstallerResult<Self> {
        use tokio::io::AsyncWriteExt;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        match tokio::fs::remove_file(path).await {
            Ok(()) => debug!(
                "[PHASE: backup] [STEP: pgpass] Removed stale credential file {:?}",
                path
            ),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let mut opts = tokio::fs::OpenOptions::new();
        opts.write(true).create_new(true);
        #[cfg(unix)]
        opts.mode(0o600);
        let mut file = opts.open(path).await.map_err(|e| {
            InstallerError::Script {
                phase: "credential file".to_string(),
                detail: format!("could not create {:?}: {}", path, e),
            }
        })?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        file.sync_all().await?;

        debug!(
            "[PHASE: backup] [STEP: pgpass] Wrote credential file {:?} ({})",
            path,
            crate::utils::logging::mask_pgpass_line(line)
        );
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CredentialFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    "[PHASE: backup] [STEP: pgpass] Could not remove credential file {:?}: {}",
                    self.path, e
                );
            }
        }
    }
}

/// Runs the external backup script.
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    /// Run `script args...` to completion. Non-zero exit is `InstallerError::Script`.
    async fn run(&self, script: &Path, args: &[String], phase: &str) -> InstallerResult<()>;
}

/// Production runner: marks the script executable and waits for it to exit.
pub struct ShellScriptRunner {
    /// `None` waits as long as the script runs.
    pub timeout: Option<Duration>,
}

#[async_trait]
impl ScriptRunner for ShellScriptRunner {
    async fn run(&self, script: &Path, args: &[String], phase: &str) -> InstallerResult<()> {
        let script_err = |detail: String| InstallerError::Script {
            phase: phase.to_string(),
            detail,
        };

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(script, std::fs::Permissions::from_mode(0o755))
                .await
                .map_err(|e| script_err(format!("could not make {:?} executable: {}", script, e)))?;
            debug!(
                "[PHASE: backup] [STEP: script] {:?} has been given executable permissions",
                script
            );
        }

        let program = script
            .to_str()
            .ok_or_else(|| script_err(format!("invalid script path {:?}", script)))?;
        let out = run_cmd(program, args, self.timeout, phase)
            .await
            .map_err(|e| script_err(format!("{:#}", e)))?;

        for line in out.stdout.lines() {
            debug!("[PHASE: backup] [STEP: script] {}", line);
        }
        if !out.success() {
            return Err(script_err(out.error_text()));
        }
        Ok(())
    }
}

/// Bundles the script path, pgpass location and runner.
#[derive(Clone)]
pub struct ScriptBridge {
    runner: Arc<dyn ScriptRunner>,
    script: PathBuf,
    pgpass_path: PathBuf,
}

impl ScriptBridge {
    pub fn new(runner: Arc<dyn ScriptRunner>, script: PathBuf, pgpass_path: PathBuf) -> Self {
        Self {
            runner,
            script,
            pgpass_path,
        }
    }

    pub async fn create_backup(&self, req: &BackupRequest, conn: &DbConnection) -> InstallerResult<()> {
        let started = Instant::now();
        let line = conn.pgpass_line();
        // argv first: a missing pg_dump path fails before anything touches disk.
        let args = build_create_args(req, conn, line.as_ref().map(|_| self.pgpass_path.as_path()))?;
        let _credentials = match &line {
            Some(l) => Some(CredentialFile::write(&self.pgpass_path, l).await?),
            None => None,
        };

        info!(
            "[PHASE: backup] [STEP: script] Creating a backup of your YugabyteDB Anywhere installation in {:?}",
            req.output_path
        );
        self.runner.run(&self.script, &args, "create backup").await?;
        info!(
            "[PHASE: backup] [STEP: script] Backup complete (duration_ms={})",
            started.elapsed().as_millis()
        );
        Ok(())
    }

    pub async fn restore_backup(
        &self,
        req: &RestoreRequest,
        conn: &DbConnection,
        identity: &RestoreIdentity,
    ) -> InstallerResult<()> {
        let started = Instant::now();
        let line = conn.pgpass_line();
        let args = build_restore_args(
            req,
            conn,
            identity,
            line.as_ref().map(|_| self.pgpass_path.as_path()),
        )?;
        let _credentials = match &line {
            Some(l) => Some(CredentialFile::write(&self.pgpass_path, l).await?),
            None => None,
        };

        info!(
            "[PHASE: restore] [STEP: script] Restoring a backup of your YugabyteDB Anywhere installation from {:?}",
            req.input_path
        );
        self.runner
            .run(&self.script, &args, "restore backup")
            .await
            .map_err(|e| match e {
                InstallerError::Script { phase, detail } => InstallerError::Script {
                    phase,
                    detail: format!("{}. Services may need to be restarted", detail),
                },
                other => other,
            })?;
        info!(
            "[PHASE: restore] [STEP: script] Restore complete (duration_ms={})",
            started.elapsed().as_millis()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn backup_req(exclude: bool, skip_restart: bool, verbose: bool) -> BackupRequest {
        BackupRequest {
            output_path: PathBuf::from("/backups"),
            data_dir: PathBuf::from("/opt/yugabyte"),
            exclude_prometheus: exclude,
            skip_restart,
            verbose,
        }
    }

    fn restore_req() -> RestoreRequest {
        RestoreRequest {
            input_path: PathBuf::from("/backups/backup.tgz"),
            destination: PathBuf::from("/opt/yugabyte"),
            skip_restart: false,
            verbose: false,
            yugabundle: false,
            use_system_pg: false,
            skip_dbdrop: false,
        }
    }

    fn bundled() -> DbConnection {
        DbConnection::SelfManaged {
            port: 5432,
            pg_bin: PathBuf::from("/opt/yugabyte/pgsql/bin"),
        }
    }

    fn external(password: &str, dump: Option<&str>, restore: Option<&str>) -> DbConnection {
        DbConnection::External {
            host: "db.internal".to_string(),
            port: 6543,
            username: "yw".to_string(),
            password: Secret::new(password),
            dump_path: dump.map(PathBuf::from),
            restore_path: restore.map(PathBuf::from),
        }
    }

    fn identity() -> RestoreIdentity {
        RestoreIdentity {
            yba_user: "yugabyte".to_string(),
            data_dir: PathBuf::from("/opt/yugabyte/data"),
            exec_user: "yugabyte".to_string(),
        }
    }

    fn strs(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn create_args_for_bundled_postgres_omit_false_flags() {
        let args = build_create_args(&backup_req(false, false, false), &bundled(), None).unwrap();
        assert_eq!(
            args,
            strs(&[
                "create",
                "--output",
                "/backups",
                "--data_dir",
                "/opt/yugabyte",
                "--yba_installer",
                "--pg_dump_path",
                "/opt/yugabyte/pgsql/bin/pg_dump",
                "--db_username",
                "postgres",
                "--db_host",
                "localhost",
                "--db_port",
                "5432",
            ])
        );
        assert!(!args.iter().any(|a| a == "--verbose" || a == "--skip_restart"));
    }

    #[test]
    fn create_args_append_true_flags_in_order() {
        let args = build_create_args(&backup_req(true, true, true), &bundled(), None).unwrap();
        let pos = |flag: &str| args.iter().position(|a| a == flag).unwrap();
        assert!(pos("--yba_installer") < pos("--exclude-prometheus"));
        assert!(pos("--exclude-prometheus") < pos("--skip_restart"));
        assert!(pos("--skip_restart") < pos("--verbose"));
        assert!(pos("--verbose") < pos("--pg_dump_path"));
    }

    #[test]
    fn create_args_are_deterministic() {
        let conn = external("pw", Some("/usr/bin/pg_dump"), None);
        let pgpass = PathBuf::from("/opt/yugabyte/data/.pgpass");
        let a = build_create_args(&backup_req(true, false, true), &conn, Some(&pgpass)).unwrap();
        let b = build_create_args(&backup_req(true, false, true), &conn, Some(&pgpass)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn create_args_for_external_postgres_use_configured_tools() {
        let pgpass = PathBuf::from("/opt/yugabyte/data/.pgpass");
        let args = build_create_args(
            &backup_req(false, false, false),
            &external("pw", Some("/usr/pgsql-14/bin/pg_dump"), None),
            Some(&pgpass),
        )
        .unwrap();
        assert_eq!(
            &args[6..],
            &strs(&[
                "--pg_dump_path",
                "/usr/pgsql-14/bin/pg_dump",
                "--pgpass_path",
                "/opt/yugabyte/data/.pgpass",
                "--db_username",
                "yw",
                "--db_host",
                "db.internal",
                "--db_port",
                "6543",
            ])[..]
        );
    }

    #[test]
    fn create_args_fail_without_pg_dump_path() {
        let err = build_create_args(&backup_req(false, false, false), &external("pw", None, None), None)
            .unwrap_err();
        assert!(err.to_string().contains("pg_dump_path"), "{}", err);
    }

    #[test]
    fn restore_args_for_bundled_postgres() {
        let mut req = restore_req();
        req.yugabundle = true;
        req.verbose = true;
        let args = build_restore_args(&req, &bundled(), &identity(), None).unwrap();
        assert_eq!(
            args,
            strs(&[
                "restore",
                "--input",
                "/backups/backup.tgz",
                "--destination",
                "/opt/yugabyte",
                "--data_dir",
                "/opt/yugabyte",
                "--disable_version_check",
                "--yba_installer",
                "--yba_user",
                "yugabyte",
                "--ybai_data_dir",
                "/opt/yugabyte/data",
                "--yugabundle",
                "--verbose",
                "-e",
                "yugabyte",
                "--pg_restore_path",
                "/opt/yugabyte/pgsql/bin/pg_restore",
                "--db_username",
                "postgres",
                "--db_host",
                "localhost",
                "--db_port",
                "5432",
            ])
        );
    }

    #[test]
    fn restore_args_for_external_postgres_without_password_skip_pgpass() {
        let args = build_restore_args(
            &restore_req(),
            &external("", None, Some("/usr/bin/pg_restore")),
            &identity(),
            None,
        )
        .unwrap();
        assert!(args.windows(2).any(|w| w == ["--pg_restore_path", "/usr/bin/pg_restore"]));
        assert!(!args.iter().any(|a| a == "--pgpass_path"));
    }

    #[test]
    fn restore_args_fail_without_pg_restore_path() {
        let err = build_restore_args(
            &restore_req(),
            &external("pw", Some("/usr/bin/pg_dump"), None),
            &identity(),
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("pg_restore_path"), "{}", err);
    }

    #[test]
    fn pgpass_line_only_for_external_with_password() {
        assert_eq!(
            external("s3cret", None, None).pgpass_line().as_deref(),
            Some("db.internal:6543:yugaware:yw:s3cret")
        );
        assert_eq!(external("", None, None).pgpass_line(), None);
        assert_eq!(bundled().pgpass_line(), None);
    }

    #[test]
    fn from_config_resolves_mode() {
        let mut cfg = InstallerConfig::default();
        let layout = cfg.layout();
        assert_eq!(
            DbConnection::from_config(&cfg, &layout),
            DbConnection::SelfManaged {
                port: 5432,
                pg_bin: PathBuf::from("/opt/yugabyte/pgsql/bin"),
            }
        );
        cfg.postgres.install.enabled = false;
        cfg.postgres.use_existing.enabled = true;
        cfg.postgres.use_existing.host = "db.internal".to_string();
        let conn = DbConnection::from_config(&cfg, &layout);
        assert!(matches!(conn, DbConnection::External { .. }));
        assert_eq!(conn.admin_params().host, "db.internal");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn credential_file_replaces_stale_file_with_owner_only_mode() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join(".pgpass");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "old:1:yugaware:old:stale-password\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        {
            let guard = CredentialFile::write(&path, "db:5432:yugaware:yw:new").await.unwrap();
            let contents = std::fs::read_to_string(guard.path()).unwrap();
            assert_eq!(contents, "db:5432:yugaware:yw:new\n");
            let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o600);
        }
        assert!(!path.exists(), "credential file must be removed on drop");
    }

    /// Records argv and the pgpass contents visible at invocation time.
    struct RecordingRunner {
        pgpass: PathBuf,
        calls: Mutex<Vec<(Vec<String>, Option<String>)>>,
        fail_with: Option<String>,
    }

    #[async_trait]
    impl ScriptRunner for RecordingRunner {
        async fn run(&self, _script: &Path, args: &[String], phase: &str) -> InstallerResult<()> {
            let seen = std::fs::read_to_string(&self.pgpass).ok();
            self.calls.lock().unwrap().push((args.to_vec(), seen));
            match &self.fail_with {
                Some(detail) => Err(InstallerError::Script {
                    phase: phase.to_string(),
                    detail: detail.clone(),
                }),
                None => Ok(()),
            }
        }
    }

    fn bridge(dir: &Path, fail_with: Option<&str>) -> (ScriptBridge, Arc<RecordingRunner>) {
        let pgpass = dir.join(".pgpass");
        let runner = Arc::new(RecordingRunner {
            pgpass: pgpass.clone(),
            calls: Mutex::new(Vec::new()),
            fail_with: fail_with.map(String::from),
        });
        let b = ScriptBridge::new(runner.clone(), dir.join("yb_platform_backup.sh"), pgpass);
        (b, runner)
    }

    #[tokio::test]
    async fn backup_hands_credentials_through_pgpass_then_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let (b, runner) = bridge(dir.path(), None);
        b.create_backup(
            &backup_req(false, false, false),
            &external("s3cret", Some("/usr/bin/pg_dump"), None),
        )
        .await
        .unwrap();

        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (args, seen) = &calls[0];
        assert!(!args.iter().any(|a| a.contains("s3cret")));
        assert_eq!(seen.as_deref(), Some("db.internal:6543:yugaware:yw:s3cret\n"));
        assert!(!dir.path().join(".pgpass").exists());
    }

    #[tokio::test]
    async fn backup_without_dump_path_never_runs_script() {
        let dir = tempfile::tempdir().unwrap();
        let (b, runner) = bridge(dir.path(), None);
        let err = b
            .create_backup(&backup_req(false, false, false), &external("s3cret", None, None))
            .await
            .unwrap_err();
        assert!(matches!(err, InstallerError::Precondition(_)), "{:?}", err);
        assert!(runner.calls.lock().unwrap().is_empty());
        assert!(!dir.path().join(".pgpass").exists());
    }

    #[tokio::test]
    async fn restore_script_failure_is_fatal_and_mentions_restart() {
        let dir = tempfile::tempdir().unwrap();
        let (b, runner) = bridge(dir.path(), Some("tar: backup.tgz: Cannot open"));
        let err = b
            .restore_backup(&restore_req(), &bundled(), &identity())
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Cannot open"), "{}", msg);
        assert!(msg.contains("restarted"), "{}", msg);
        assert_eq!(runner.calls.lock().unwrap().len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn shell_runner_surfaces_script_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("yb_platform_backup.sh");
        std::fs::write(&script, "#!/bin/sh\necho \"bad option $1\" >&2\nexit 2\n").unwrap();

        let runner = ShellScriptRunner { timeout: None };
        let err = runner
            .run(&script, &strs(&["create"]), "create backup")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "create backup failed: bad option create");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn shell_runner_succeeds_on_zero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("yb_platform_backup.sh");
        std::fs::write(&script, "#!/bin/sh\necho done\n").unwrap();
        let runner = ShellScriptRunner { timeout: None };
        runner
            .run(&script, &strs(&["create"]), "create backup")
            .await
            .unwrap();
    }
}
