use crate::core::errors::AdapterError;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::time::timeout;

const STDERR_TAIL_LINES: usize = 10;

/// How long output is still collected after a timed-out child was killed.
const DRAIN_AFTER_KILL: Duration = Duration::from_millis(500);

/// Output of a process that was started, whether or not it succeeded.
#[derive(Debug)]
pub struct CommandResult {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// `None` when the process was killed by a signal or timed out.
    pub exit_code: Option<i32>,
    pub duration_ms: u128,
    /// Set when the process timed out or exited unsuccessfully.
    pub failure: Option<AdapterError>,
}

impl CommandResult {
    /// The result itself when the process succeeded, its failure otherwise.
    pub fn into_success(mut self) -> Result<Self, AdapterError> {
        match self.failure.take() {
            Some(error) => Err(error),
            None => Ok(self),
        }
    }
}

type Captured = Arc<Mutex<Vec<u8>>>;

/// Spawns `tool` directly (no shell), feeds `stdin` if given, and collects
/// both output streams. The child is killed when `timeout_after` elapses.
///
/// Errors only when the process could not be started; timeouts and
/// non-zero exits come back in [`CommandResult::failure`] together with
/// whatever output was captured.
pub async fn execute(
    tool: &str,
    args: &[String],
    stdin: Option<&str>,
    cwd: &Path,
    timeout_after: Duration,
) -> Result<CommandResult, AdapterError> {
    let start = Instant::now();

    if which::which(tool).is_err() {
        return Err(AdapterError::ExecutableNotFound {
            executable: tool.to_string(),
        });
    }

    tracing::debug!("Executing: {} {:?} in {:?}", tool, args, cwd);

    let mut cmd = Command::new(tool);
    cmd.args(args)
        .current_dir(cwd)
        .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => AdapterError::ExecutableNotFound {
            executable: tool.to_string(),
        },
        _ => AdapterError::Spawn(format!("{}: {}", tool, e)),
    })?;

    if let (Some(mut handle), Some(input)) = (child.stdin.take(), stdin.map(|s| s.as_bytes().to_vec())) {
        tokio::spawn(async move {
            // The tool may exit before draining its input.
            let _ = handle.write_all(&input).await;
            let _ = handle.shutdown().await;
        });
    }

    let stdout: Captured = Arc::default();
    let stderr: Captured = Arc::default();
    let readers = [
        tokio::spawn(capture(child.stdout.take(), Arc::clone(&stdout))),
        tokio::spawn(capture(child.stderr.take(), Arc::clone(&stderr))),
    ];

    let status = match timeout(timeout_after, child.wait()).await {
        Ok(status) => Some(status.map_err(|e| AdapterError::Spawn(format!("{}: {}", tool, e)))?),
        Err(_) => {
            let _ = child.kill().await;
            tracing::warn!("{} timed out after {}ms", tool, timeout_after.as_millis());
            None
        }
    };

    for reader in readers {
        if status.is_some() {
            let _ = reader.await;
        } else {
            // Grandchildren may still hold the pipes open.
            let abort = reader.abort_handle();
            if timeout(DRAIN_AFTER_KILL, reader).await.is_err() {
                abort.abort();
            }
        }
    }

    let stdout = take(&stdout);
    let stderr = take(&stderr);

    let failure = match status {
        None => Some(AdapterError::Timeout {
            after: timeout_after,
        }),
        Some(status) if !status.success() => Some(AdapterError::NonZeroExit {
            code: status.code(),
            stderr_tail: stderr_tail(&stderr),
        }),
        Some(_) => None,
    };

    Ok(CommandResult {
        stdout,
        stderr,
        exit_code: status.and_then(|s| s.code()),
        duration_ms: start.elapsed().as_millis(),
        failure,
    })
}

async fn capture<R>(reader: Option<R>, into: Captured)
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return;
    };
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                if let Ok(mut buf) = into.lock() {
                    buf.extend_from_slice(&chunk[..n]);
                }
            }
            Err(e) => {
                tracing::debug!("Output stream ended with error: {}", e);
                break;
            }
        }
    }
}

fn take(captured: &Captured) -> Vec<u8> {
    captured
        .lock()
        .map(|mut buf| std::mem::take(&mut *buf))
        .unwrap_or_default()
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n")
}
