//! Runs one external transcoder process per job.

use encodeforge_av::{BitrateLadder, LineUpdate, ProgressTracker, ToolCommand};
use encodeforge_common::JobId;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;

use crate::state::{FailureKind, ProgressSender, Terminal};

/// Everything the transcoder needs for one job.
#[derive(Debug, Clone)]
pub struct TranscodeSpec {
    pub job_id: JobId,
    pub input_path: PathBuf,
    pub output_dir: PathBuf,
    pub ladder: BitrateLadder,
    pub duration: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    tool: ToolCommand,
    stderr_tail_bytes: usize,
}

impl ProcessSupervisor {
    pub fn new(tool: ToolCommand, stderr_tail_bytes: usize) -> Self {
        Self {
            tool,
            stderr_tail_bytes,
        }
    }

    /// Build the invocation: `<tool> <leading..> <input> <output_dir> <360> <480> <720> <1080>`.
    pub fn build_command(&self, spec: &TranscodeSpec) -> Command {
        let mut cmd = Command::new(&self.tool.program);
        cmd.args(&self.tool.leading_args)
            .arg(&spec.input_path)
            .arg(&spec.output_dir)
            .args(spec.ladder.positional_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Start supervising `spec` in the background.
    ///
    /// The returned handle completes after the terminal event has been sent.
    pub fn launch(&self, spec: TranscodeSpec, sender: ProgressSender) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let terminal = this.run(&spec, &sender).await;
            sender.finish(terminal);
        })
    }

    async fn run(&self, spec: &TranscodeSpec, sender: &ProgressSender) -> Terminal {
        let id = &spec.job_id;
        let name = self.tool.display_name();

        if !spec.input_path.exists() {
            tracing::warn!(job_id = %id, path = %spec.input_path.display(), "Input file missing");
            return Terminal::failed(
                FailureKind::NotFound,
                format!("input file not found: {}", spec.input_path.display()),
            );
        }

        if let Err(e) = tokio::fs::create_dir_all(&spec.output_dir).await {
            tracing::error!(job_id = %id, error = %e, "Failed to create output directory");
            return Terminal::failed(
                FailureKind::Launch,
                format!(
                    "failed to create output directory {}: {}",
                    spec.output_dir.display(),
                    e
                ),
            );
        }

        let mut child = match self.build_command(spec).spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(job_id = %id, tool = %name, error = %e, "Failed to start transcoder");
                return Terminal::failed(
                    FailureKind::Launch,
                    format!("failed to start {}: {}", name, e),
                );
            }
        };

        tracing::info!(
            job_id = %id,
            pid = child.id(),
            bitrate_1080 = spec.ladder.bitrate_1080,
            "Transcoder started"
        );

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Terminal::failed(FailureKind::Launch, "transcoder output was not captured");
        };

        let stderr_task = tokio::spawn(collect_tail(
            stderr,
            self.stderr_tail_bytes,
            id.clone(),
        ));

        let mut tracker = ProgressTracker::new(spec.duration);
        let mut lines = BufReader::new(stdout).split(b'\n');
        loop {
            match lines.next_segment().await {
                Ok(Some(raw)) => {
                    let line = String::from_utf8_lossy(&raw);
                    match tracker.observe(&line) {
                        LineUpdate::Progress(pct) => sender.progress(pct),
                        LineUpdate::Anomaly(anomaly) => sender.anomaly(anomaly.to_string()),
                        LineUpdate::NoUpdate => {}
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(job_id = %id, error = %e, "Stopped reading transcoder output");
                    break;
                }
            }
        }

        let status = match child.wait().await {
            Ok(status) => status,
            Err(e) => {
                return Terminal::failed(
                    FailureKind::Runtime,
                    format!("failed to wait for {}: {}", name, e),
                )
            }
        };
        let stderr_tail = stderr_task.await.unwrap_or_default();

        if status.success() {
            tracing::info!(job_id = %id, anomalies = tracker.anomaly_count(), "Transcoder finished");
            return Terminal::completed();
        }

        tracing::error!(
            job_id = %id,
            exit_code = status.code(),
            stderr = %stderr_tail,
            "Transcoder failed"
        );
        let message = if stderr_tail.is_empty() {
            format!("{} exited with {}", name, status)
        } else {
            format!("{} exited with {}: {}", name, status, stderr_tail)
        };
        Terminal::failed(FailureKind::Runtime, message)
    }
}

/// Drain `reader`, keeping roughly the last `limit` bytes of lines.
async fn collect_tail<R>(reader: R, limit: usize, id: JobId) -> String
where
    R: AsyncRead + Unpin,
{
    let mut tail: VecDeque<String> = VecDeque::new();
    let mut size = 0usize;
    let mut lines = BufReader::new(reader).split(b'\n');

    while let Ok(Some(raw)) = lines.next_segment().await {
        let line = String::from_utf8_lossy(&raw).trim_end().to_string();
        if line.is_empty() {
            continue;
        }
        tracing::trace!(job_id = %id, "stderr: {}", line);
        size += line.len() + 1;
        tail.push_back(line);
        while size > limit {
            match tail.pop_front() {
                Some(dropped) => size -= dropped.len() + 1,
                None => break,
            }
        }
    }

    Vec::from(tail).join("\n")
}
