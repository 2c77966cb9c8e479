// Installation plumbing
//
// External command execution, systemd unit management, filesystem helpers and the
// installer state store.
//
// IMPORTANT:
// - Never log secrets (passwords, pgpass contents).
// - Commands run one at a time; callers await each before starting the next.

pub mod files;
pub mod linux_parsers;
pub mod service;
pub mod state_store;

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use std::process::Stdio;
use std::time::Instant;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::{timeout, Duration};

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u128,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Script/tool error text for operator-facing messages; stderr first, stdout if empty.
    pub fn error_text(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        format!("exited with code {:?}", self.exit_code)
    }
}

pub(crate) fn mask_arg_for_log(arg: &str) -> String {
    let lower = arg.to_ascii_lowercase();
    if lower.contains("password=")
        || lower.contains("pwd=")
        || lower.contains("secret")
        || lower.contains("token")
    {
        return "***".to_string();
    }

    if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
        return crate::utils::logging::mask_connection_string(arg);
    }

    arg.to_string()
}

pub(crate) fn masked_args(args: &[String]) -> String {
    args.iter()
        .map(|a| mask_arg_for_log(a))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run an external command to completion, or until `timeout_dur` expires.
///
/// Returns captured stdout/stderr even when the exit code is non-zero (caller decides
/// success). Nothing is retried. With `timeout_dur = None` a hung child hangs the caller.
pub async fn run_cmd(
    program: &str,
    args: &[String],
    timeout_dur: Option<Duration>,
    operation: &str,
) -> Result<CommandOutput> {
    let started = Instant::now();

    info!(
        "[PHASE: cmd] [STEP: {}] Running {} {} (timeout_ms={:?})",
        operation,
        program,
        masked_args(args),
        timeout_dur.map(|d| d.as_millis())
    );

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().with_context(|| {
        format!(
            "Failed to spawn command '{}' (operation={})",
            program, operation
        )
    })?;

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow::anyhow!("Failed to capture stdout (operation={})", operation))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow::anyhow!("Failed to capture stderr (operation={})", operation))?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout.read_to_end(&mut buf).await?;
        Ok::<String, std::io::Error>(String::from_utf8_lossy(&buf).to_string())
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr.read_to_end(&mut buf).await?;
        Ok::<String, std::io::Error>(String::from_utf8_lossy(&buf).to_string())
    });

    let status = match timeout_dur {
        None => child.wait().await.with_context(|| {
            format!(
                "Command wait failed (operation={}, program={})",
                operation, program
            )
        })?,
        Some(dur) => match timeout(dur, child.wait()).await {
            Ok(Ok(s)) => s,
            Ok(Err(e)) => {
                return Err(anyhow::Error::new(e)).with_context(|| {
                    format!(
                        "Command wait failed (operation={}, program={})",
                        operation, program
                    )
                });
            }
            Err(_) => {
                warn!(
                    "[PHASE: cmd] [STEP: {}] Timeout reached (program={}, timeout_ms={}); killing process",
                    operation,
                    program,
                    dur.as_millis()
                );
                if let Err(e) = child.kill().await {
                    warn!(
                        "[PHASE: cmd] [STEP: {}] Failed to kill timed-out process (program={}): {}",
                        operation, program, e
                    );
                }
                let _ = timeout(Duration::from_secs(5), child.wait()).await;

                error!(
                    "[PHASE: cmd] [STEP: {}] Command timed out (program={}, duration_ms={})",
                    operation,
                    program,
                    started.elapsed().as_millis()
                );
                return Err(anyhow::anyhow!(
                    "Command timed out after {}ms (operation={}, program={})",
                    dur.as_millis(),
                    operation,
                    program
                ));
            }
        },
    };

    let stdout_str = stdout_task
        .await
        .context("stdout join failed")?
        .context("stdout read failed")?;
    let stderr_str = stderr_task
        .await
        .context("stderr join failed")?
        .context("stderr read failed")?;

    let out = CommandOutput {
        exit_code: status.code(),
        stdout: stdout_str,
        stderr: stderr_str,
        duration_ms: started.elapsed().as_millis(),
    };

    debug!(
        "[PHASE: cmd] [STEP: {}] Command exited (program={}, exit_code={:?}, duration_ms={}, stdout_len={}, stderr_len={})",
        operation,
        program,
        out.exit_code,
        out.duration_ms,
        out.stdout.len(),
        out.stderr.len()
    );

    Ok(out)
}

/// True when this process has root privileges.
pub fn is_running_as_root() -> bool {
    #[cfg(target_os = "linux")]
    {
        // SAFETY: geteuid has no preconditions and cannot fail.
        unsafe { libc::geteuid() == 0 }
    }
    #[cfg(not(target_os = "linux"))]
    {
        false
    }
}

/// Name of the user running this process.
pub fn current_username() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .unwrap_or_else(|_| {
            if is_running_as_root() {
                "root".to_string()
            } else {
                "unknown".to_string()
            }
        })
}
