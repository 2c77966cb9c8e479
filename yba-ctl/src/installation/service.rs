// systemd service management helpers
//
// Every managed service (postgres, prometheus, yb-platform) runs as a systemd unit.
// Unit text generation and `systemctl show` parsing are pure functions; everything
// else shells out through `run_cmd` with a bounded timeout.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::path::Path;
use std::time::Instant;
use tokio::time::Duration;

use crate::installation::{is_running_as_root, run_cmd};

pub const SYSTEMD_UNIT_DIR: &str = "/etc/systemd/system";

/// Inputs for a generated unit file.
#[derive(Debug, Clone)]
pub struct UnitSpec {
    pub name: String,
    pub description: String,
    /// Program followed by its arguments.
    pub exec_start: Vec<String>,
    pub working_dir: std::path::PathBuf,
    pub user: Option<String>,
    /// Units that must be up first (e.g. `postgres.service`).
    pub after: Vec<String>,
    pub environment: Vec<(String, String)>,
}

impl UnitSpec {
    pub fn unit_file_name(&self) -> String {
        format!("{}.service", self.name)
    }
}

// ============================================================================
// Systemd unit file generation (pure function, testable on all platforms)
// ============================================================================

/// Build a systemd unit file text for a service.
///
/// Paths and arguments are quoted when they contain whitespace or quotes.
pub fn build_systemd_unit_text(spec: &UnitSpec) -> String {
    let exec = spec
        .exec_start
        .iter()
        .map(|a| quote_systemd_path(a))
        .collect::<Vec<_>>()
        .join(" ");
    let work_quoted = quote_systemd_path(&spec.working_dir.to_string_lossy());

    let mut after = vec!["network.target".to_string()];
    after.extend(spec.after.iter().cloned());

    let mut service_extra = String::new();
    if let Some(u) = &spec.user {
        service_extra.push_str(&format!("User={}\nGroup={}\n", u, u));
    }
    for (k, v) in &spec.environment {
        service_extra.push_str(&format!("Environment={}\n", quote_systemd_path(&format!("{}={}", k, v))));
    }

    format!(
        r#"[Unit]
Description={description}
After={after}

[Service]
Type=simple
WorkingDirectory={work_quoted}
ExecStart={exec}
Restart=always
RestartSec=5
{service_extra}
[Install]
WantedBy=multi-user.target
"#,
        description = spec.description,
        after = after.join(" "),
        work_quoted = work_quoted,
        exec = exec,
        service_extra = service_extra.trim_end(),
    )
}

/// Quote a path for systemd unit files if it contains spaces or special characters.
fn quote_systemd_path(path: &str) -> String {
    if path.contains(' ') || path.contains('\t') || path.contains('"') {
        format!("\"{}\"", path.replace('"', "\\\""))
    } else {
        path.to_string()
    }
}

// ============================================================================
// Unit state
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitStatus {
    /// Active state: "active", "inactive", "failed", "activating", ...
    pub active_state: String,
    /// Sub-state: "running", "dead", "exited", "auto-restart", ...
    pub sub_state: String,
    /// "loaded" or "not-found" when the unit file is missing.
    pub load_state: String,
    pub main_pid: Option<u32>,
}

impl UnitStatus {
    pub fn is_running(&self) -> bool {
        self.active_state == "active" && self.sub_state == "running"
    }

    pub fn is_loaded(&self) -> bool {
        self.load_state == "loaded"
    }
}

/// Parse `systemctl show -p LoadState -p ActiveState -p SubState -p MainPID` output.
pub fn parse_systemctl_show(output: &str) -> UnitStatus {
    let mut status = UnitStatus::default();
    for line in output.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "ActiveState" => status.active_state = value.to_string(),
            "SubState" => status.sub_state = value.to_string(),
            "LoadState" => status.load_state = value.to_string(),
            "MainPID" => status.main_pid = value.parse().ok().filter(|pid| *pid != 0),
            _ => {}
        }
    }
    status
}

// ============================================================================
// systemctl plumbing
// ============================================================================

/// Run a systemctl command, using sudo -n if not root.
/// Always includes --no-pager to prevent blocking on interactive pager.
pub async fn run_systemctl_cmd(args: &[&str], timeout_dur: Duration, operation: &str) -> Result<String> {
    let mut base_args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
    base_args.push("--no-pager".to_string());

    let (program, final_args) = if is_running_as_root() {
        ("systemctl", base_args)
    } else {
        let mut v = vec!["-n".to_string(), "systemctl".to_string()];
        v.extend(base_args);
        ("sudo", v)
    };

    let out = run_cmd(program, &final_args, Some(timeout_dur), operation).await?;

    if !out.success() {
        anyhow::bail!(
            "systemctl {} failed (exit_code={:?}): {}",
            args.join(" "),
            out.exit_code,
            out.error_text()
        );
    }

    Ok(out.stdout)
}

pub async fn unit_status(service_name: &str, timeout_dur: Duration) -> Result<UnitStatus> {
    let stdout = run_systemctl_cmd(
        &[
            "show",
            service_name,
            "-p",
            "LoadState",
            "-p",
            "ActiveState",
            "-p",
            "SubState",
            "-p",
            "MainPID",
        ],
        timeout_dur,
        "systemctl_show",
    )
    .await?;
    let status = parse_systemctl_show(&stdout);
    debug!(
        "[PHASE: services] [STEP: status] {} load_state={} active_state={} sub_state={} main_pid={:?}",
        service_name, status.load_state, status.active_state, status.sub_state, status.main_pid
    );
    Ok(status)
}

/// Write the unit file, reload systemd and enable the unit. Does not start it.
pub async fn install_unit(spec: &UnitSpec, unit_dir: &Path, timeout_dur: Duration) -> Result<()> {
    let started = Instant::now();
    let unit_content = build_systemd_unit_text(spec);
    let unit_path = unit_dir.join(spec.unit_file_name());

    if is_running_as_root() {
        tokio::fs::create_dir_all(unit_dir)
            .await
            .with_context(|| format!("Failed to create unit dir {:?}", unit_dir))?;
        tokio::fs::write(&unit_path, &unit_content)
            .await
            .with_context(|| format!("Failed to write systemd unit file: {:?}", unit_path))?;
    } else {
        write_file_via_sudo(&unit_path, &unit_content).await?;
    }
    info!(
        "[PHASE: services] [STEP: unit] Wrote systemd unit file {:?}",
        unit_path
    );

    run_systemctl_cmd(&["daemon-reload"], timeout_dur, "daemon_reload").await?;
    run_systemctl_cmd(&["enable", &spec.unit_file_name()], timeout_dur, "enable").await?;

    debug!(
        "[PHASE: services] [STEP: unit] install_unit exit ok (service_name={}, duration_ms={})",
        spec.name,
        started.elapsed().as_millis()
    );
    Ok(())
}

pub async fn start_unit(service_name: &str, timeout_dur: Duration) -> Result<()> {
    run_systemctl_cmd(&["start", service_name], timeout_dur, "start").await?;
    Ok(())
}

pub async fn stop_unit(service_name: &str, timeout_dur: Duration) -> Result<()> {
    run_systemctl_cmd(&["stop", service_name], timeout_dur, "stop").await?;
    Ok(())
}

pub async fn restart_unit(service_name: &str, timeout_dur: Duration) -> Result<()> {
    run_systemctl_cmd(&["restart", service_name], timeout_dur, "restart").await?;
    Ok(())
}

/// Write a file via sudo tee (for non-root users with passwordless sudo).
///
/// Uses `sudo -n tee -- <path>` with stdin write (no shell string building).
async fn write_file_via_sudo(path: &Path, content: &str) -> Result<()> {
    use std::process::Stdio;
    use tokio::io::AsyncWriteExt;
    use tokio::process::Command;

    debug!(
        "[PHASE: services] [STEP: unit] write_file_via_sudo entered (path={:?})",
        path
    );

    let mut child = Command::new("sudo")
        .arg("-n")
        .arg("tee")
        .arg("--")
        .arg(path)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .context("Failed to spawn sudo tee. Ensure passwordless sudo is configured.")?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(content.as_bytes()).await?;
        stdin.flush().await?;
        drop(stdin);
    }

    let output = child.wait_with_output().await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!(
            "sudo tee failed (path={:?}). Ensure passwordless sudo is configured. Error: {}",
            path,
            stderr.trim()
        );
    }

    let chmod_output = Command::new("sudo")
        .arg("-n")
        .arg("chmod")
        .arg("0644")
        .arg("--")
        .arg(path)
        .output()
        .await
        .context("Failed to run sudo chmod")?;

    if !chmod_output.status.success() {
        let stderr = String::from_utf8_lossy(&chmod_output.stderr);
        // systemd still reads units with other modes.
        warn!(
            "[PHASE: services] [STEP: unit] chmod 0644 failed (path={:?}): {}",
            path,
            stderr.trim()
        );
    }

    Ok(())
}
