//! Launches, watches, and terminates a single child process.
//!
//! The supervisor makes no policy choices about *what* is run or *why* a
//! child's exit should be treated as success or failure; it only guarantees
//! that a process spawned through it can be asked to stop and that the
//! request won't return until the process is actually gone. The Transcode
//! Job and Stream Worker are built on top of this.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use crate::error::{ChannelError, ChannelResult};
use crate::protocol_constants::PROCESS_STOP_GRACE_SECS;

/// How a child's standard output should be handled.
pub enum StdoutMode {
    /// Standard output is discarded (piped to `/dev/null`).
    Discard,
    /// Standard output is read line-by-line and forwarded through the
    /// returned channel, trimmed of trailing newlines.
    LineStream,
    /// Standard output is collected in full, bounded by a hard timeout.
    Collect { timeout: Duration },
}

/// A spawned child process together with the plumbing needed to watch its
/// stdout (if requested).
pub struct SupervisedChild {
    child: Child,
    /// Present only when spawned with [`StdoutMode::LineStream`].
    pub stdout_lines: Option<mpsc::UnboundedReceiver<String>>,
}

impl SupervisedChild {
    /// Spawns `argv[0]` with the remaining elements as arguments.
    ///
    /// Stderr is always piped so callers can surface diagnostics on failure;
    /// stdin is always null since nothing this system launches reads from
    /// standard input.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::ProcessLaunch`] if the binary cannot be
    /// executed (missing binary, permission denied, invalid working
    /// directory).
    pub fn spawn(argv: &[String], stdout_mode: StdoutMode) -> ChannelResult<Self> {
        let Some((program, args)) = argv.split_first() else {
            return Err(ChannelError::ProcessLaunch("empty argv".to_string()));
        };

        let mut command = Command::new(program);
        command.args(args).stdin(Stdio::null()).stderr(Stdio::piped());

        let capture_stdout = matches!(stdout_mode, StdoutMode::LineStream);
        command.stdout(if matches!(stdout_mode, StdoutMode::Discard) {
            Stdio::null()
        } else {
            Stdio::piped()
        });

        let mut child = command
            .spawn()
            .map_err(|e| ChannelError::ProcessLaunch(format!("{program}: {e}")))?;

        let stdout_lines = if capture_stdout {
            let stdout = child.stdout.take();
            let (tx, rx) = mpsc::unbounded_channel();
            if let Some(stdout) = stdout {
                tokio::spawn(async move {
                    let mut lines = BufReader::new(stdout).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                });
            }
            Some(rx)
        } else {
            None
        };

        Ok(Self { child, stdout_lines })
    }

    /// Collects the remainder of stdout as a single string, bounded by
    /// `timeout`. Intended for `StdoutMode::Collect` invocations such as the
    /// prober, which runs to completion and reads the whole output at once.
    pub async fn collect_stdout(&mut self, timeout: Duration) -> ChannelResult<String> {
        let Some(stdout) = self.child.stdout.take() else {
            return Ok(String::new());
        };
        let fut = async {
            let mut reader = BufReader::new(stdout);
            let mut buf = String::new();
            use tokio::io::AsyncReadExt;
            let _ = reader.read_to_string(&mut buf).await;
            buf
        };
        tokio::time::timeout(timeout, fut)
            .await
            .map_err(|_| ChannelError::Probe("timed out reading process output".to_string()))
    }

    /// Waits for the child to exit and returns its exit code, or `None` if
    /// it was terminated by a signal rather than exiting normally.
    pub async fn wait(&mut self) -> ChannelResult<Option<i32>> {
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| ChannelError::ProcessRuntime(e.to_string()))?;
        Ok(status.code())
    }

    /// Sends a graceful termination request, waits up to `grace`, then kills
    /// the process outright if it hasn't exited.
    ///
    /// Returns once the child is confirmed gone. No child outlives this
    /// call returning.
    pub async fn stop(&mut self, grace: Duration) {
        #[cfg(unix)]
        {
            if let Some(pid) = self.child.id() {
                // SAFETY: libc::kill with a valid pid and SIGTERM is a plain
                // syscall wrapper; no memory is touched on our side.
                unsafe {
                    libc::kill(pid as libc::pid_t, libc::SIGTERM);
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = self.child.start_kill();
        }

        if tokio::time::timeout(grace, self.child.wait()).await.is_err() {
            let _ = self.child.start_kill();
            let _ = self.child.wait().await;
        }
    }
}

/// Default grace period for [`SupervisedChild::stop`].
#[must_use]
pub fn default_grace() -> Duration {
    Duration::from_secs(PROCESS_STOP_GRACE_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawn_missing_binary_is_process_launch_error() {
        let argv = vec!["definitely-not-a-real-binary-xyz".to_string()];
        let result = SupervisedChild::spawn(&argv, StdoutMode::Discard);
        assert!(matches!(result, Err(ChannelError::ProcessLaunch(_))));
    }

    #[tokio::test]
    async fn spawn_empty_argv_is_process_launch_error() {
        let result = SupervisedChild::spawn(&[], StdoutMode::Discard);
        assert!(matches!(result, Err(ChannelError::ProcessLaunch(_))));
    }

    #[tokio::test]
    async fn stop_is_idempotent_once_child_has_exited() {
        let argv = vec!["true".to_string()];
        let mut child = SupervisedChild::spawn(&argv, StdoutMode::Discard).unwrap();
        let _ = child.wait().await;
        // Stopping an already-exited child must not hang or panic.
        child.stop(Duration::from_millis(200)).await;
    }

    #[tokio::test]
    async fn line_stream_forwards_trimmed_lines() {
        let argv = vec![
            "/bin/sh".to_string(),
            "-c".to_string(),
            "echo one; echo two".to_string(),
        ];
        let mut child = SupervisedChild::spawn(&argv, StdoutMode::LineStream).unwrap();
        let mut lines = Vec::new();
        if let Some(rx) = &mut child.stdout_lines {
            while let Some(line) = rx.recv().await {
                lines.push(line);
            }
        }
        let _ = child.wait().await;
        assert_eq!(lines, vec!["one".to_string(), "two".to_string()]);
    }
}
