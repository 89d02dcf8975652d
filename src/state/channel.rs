//! The per-job progress channel.
//!
//! The supervisor holds the only [`ProgressSender`]; the fan-out dispatcher
//! owns the receiving end. Consumers never read this channel directly.

use encodeforge_common::JobId;
use tokio::sync::mpsc;

use super::types::{FailureKind, JobResult, JobState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Terminal {
    pub state: JobState,
    pub result: JobResult,
}

impl Terminal {
    pub fn completed() -> Self {
        Self {
            state: JobState::Completed,
            result: JobResult::Succeeded,
        }
    }

    pub fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        let state = match kind {
            FailureKind::NotFound => JobState::NotFound,
            FailureKind::Probe => JobState::ProbeFailed,
            FailureKind::Launch | FailureKind::Runtime => JobState::Failed,
        };
        Self {
            state,
            result: JobResult::Failed {
                kind,
                message: message.into(),
            },
        }
    }

    pub fn success(&self) -> bool {
        self.state == JobState::Completed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Progress(u8),
    /// Recorded on the job, never forwarded to observers.
    Anomaly(String),
    Terminal(Terminal),
}

/// Producer half of a job's progress channel.
///
/// `finish` consumes the sender, so a job can emit at most one terminal
/// event. A sender dropped without finishing emits a runtime failure.
#[derive(Debug)]
pub struct ProgressSender {
    job_id: JobId,
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressSender {
    pub(crate) fn new(job_id: JobId, tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self {
            job_id,
            tx: Some(tx),
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn progress(&self, percentage: u8) {
        self.send(ProgressEvent::Progress(percentage.min(100)));
    }

    pub fn anomaly(&self, message: impl Into<String>) {
        self.send(ProgressEvent::Anomaly(message.into()));
    }

    pub fn finish(mut self, terminal: Terminal) {
        if let Some(tx) = self.tx.take() {
            if tx.send(ProgressEvent::Terminal(terminal)).is_err() {
                tracing::debug!(job_id = %self.job_id, "Dispatcher gone before terminal event");
            }
        }
    }

    fn send(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            if tx.send(event).is_err() {
                tracing::debug!(job_id = %self.job_id, "Dispatcher gone, dropping progress event");
            }
        }
    }
}

impl Drop for ProgressSender {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            tracing::warn!(job_id = %self.job_id, "Transcode task ended without a terminal event");
            let _ = tx.send(ProgressEvent::Terminal(Terminal::failed(
                FailureKind::Runtime,
                "transcode task ended without reporting a result",
            )));
        }
    }
}
