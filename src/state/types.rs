use chrono::{DateTime, Utc};
use encodeforge_av::BitrateLadder;
use encodeforge_common::JobId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Anomaly messages kept per job; older ones are dropped first.
const MAX_ANOMALIES: usize = 20;

#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub input_path: PathBuf,
    pub output_dir: PathBuf,
    pub ladder: Option<BitrateLadder>,
    pub duration: Option<Duration>,
    pub state: JobState,
    pub percentage: Option<u8>,
    pub result: JobResult,
    pub anomalies: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Created,
    Probing,
    Running,
    Completed,
    Failed,
    NotFound,
    ProbeFailed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::NotFound | Self::ProbeFailed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Probing => "probing",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::NotFound => "not_found",
            Self::ProbeFailed => "probe_failed",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which stage of a job failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NotFound,
    Probe,
    Launch,
    Runtime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobResult {
    Pending,
    Succeeded,
    Failed { kind: FailureKind, message: String },
}

impl JobResult {
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Failed { message, .. } => Some(message),
            _ => None,
        }
    }
}

impl Job {
    pub fn new(id: JobId, input_path: PathBuf, output_dir: PathBuf) -> Self {
        Self {
            id,
            input_path,
            output_dir,
            ladder: None,
            duration: None,
            state: JobState::Created,
            percentage: None,
            result: JobResult::Pending,
            anomalies: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Move to a non-terminal state. Returns false if the job already finished.
    pub fn advance(&mut self, state: JobState) -> bool {
        if self.is_terminal() || state.is_terminal() {
            return false;
        }
        self.state = state;
        true
    }

    pub fn start_running(&mut self, ladder: BitrateLadder, duration: Option<Duration>) -> bool {
        if !self.advance(JobState::Running) {
            return false;
        }
        self.ladder = Some(ladder);
        self.duration = duration;
        self.started_at = Some(Utc::now());
        true
    }

    pub fn update_progress(&mut self, percentage: u8) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.percentage = Some(percentage.min(100));
        true
    }

    /// Apply the terminal outcome. Returns false if already terminal.
    pub fn finish(&mut self, state: JobState, result: JobResult) -> bool {
        if self.is_terminal() || !state.is_terminal() {
            return false;
        }
        if state == JobState::Completed {
            self.percentage = Some(100);
        }
        self.state = state;
        self.result = result;
        self.finished_at = Some(Utc::now());
        true
    }

    pub fn record_anomaly(&mut self, message: String) {
        if self.anomalies.len() >= MAX_ANOMALIES {
            self.anomalies.remove(0);
        }
        self.anomalies.push(message);
    }

    pub fn view(&self) -> JobView {
        JobView {
            job_id: self.id.clone(),
            state: self.state,
            percentage: self.percentage,
            ladder: self.ladder,
            duration_secs: self.duration.map(|d| d.as_secs_f64()),
            result: self.result.clone(),
            anomalies: self.anomalies.len(),
            created_at: self.created_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }

    pub fn status_update(&self) -> StatusUpdate {
        StatusUpdate {
            job_id: self.id.clone(),
            percentage: self.percentage.unwrap_or(0),
            state: self.state,
            message: self.result.message().map(str::to_string),
        }
    }
}

/// Read-only snapshot of a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobView {
    pub job_id: JobId,
    pub state: JobState,
    pub percentage: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ladder: Option<BitrateLadder>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    pub result: JobResult,
    pub anomalies: usize,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// One item of a push or RPC status stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub job_id: JobId,
    pub percentage: u8,
    pub state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusUpdate {
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
