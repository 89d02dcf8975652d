//! Progress-line grammar for the transcoder's standard output.
//!
//! Two line shapes carry progress:
//!
//! - `out_time_ms=<n>` / `out_time_us=<n>`: elapsed output time. Both keys
//!   carry microseconds (ffmpeg's `out_time_ms` has always been microseconds
//!   despite its name). Turning this into a percentage needs the source
//!   duration.
//! - `Overall Progress: <n>%`: a ready-made percentage.
//!
//! Every other line is ignored. A recognized key with an unusable value is a
//! [`ParseAnomaly`], never an error.

use std::time::Duration;

const OUT_TIME_KEYS: &[&str] = &["out_time_ms", "out_time_us"];
const OVERALL_LABEL: &str = "Overall Progress";

/// A recognized progress line whose value could not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseAnomaly {
    /// Elapsed time is known but the total duration is not.
    UnknownDuration { line: String },
    /// The elapsed-time value is not an integer.
    InvalidTime { line: String },
    /// The labeled value is not a percentage in 0..=100.
    InvalidPercentage { line: String },
}

impl ParseAnomaly {
    pub fn line(&self) -> &str {
        match self {
            Self::UnknownDuration { line }
            | Self::InvalidTime { line }
            | Self::InvalidPercentage { line } => line,
        }
    }
}

impl std::fmt::Display for ParseAnomaly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownDuration { line } => {
                write!(f, "elapsed time without known duration: {line}")
            }
            Self::InvalidTime { line } => write!(f, "malformed elapsed time: {line}"),
            Self::InvalidPercentage { line } => write!(f, "malformed percentage: {line}"),
        }
    }
}

/// Outcome of classifying one output line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineUpdate {
    NoUpdate,
    Progress(u8),
    Anomaly(ParseAnomaly),
}

/// Classify a single line of transcoder output.
///
/// `total_duration` is the probed source duration; without it, elapsed-time
/// lines cannot be converted and are reported as an anomaly.
pub fn classify_line(line: &str, total_duration: Option<Duration>) -> LineUpdate {
    let line = line.trim();

    if let Some((key, value)) = line.split_once('=') {
        if OUT_TIME_KEYS.contains(&key.trim()) {
            return classify_elapsed(line, value.trim(), total_duration);
        }
        return LineUpdate::NoUpdate;
    }

    if let Some(rest) = line.strip_prefix(OVERALL_LABEL) {
        if let Some(value) = rest.trim_start().strip_prefix(':') {
            return classify_percentage(line, value.trim());
        }
    }

    LineUpdate::NoUpdate
}

fn classify_elapsed(line: &str, value: &str, total: Option<Duration>) -> LineUpdate {
    // ffmpeg reports N/A before the first frame is written
    if value.eq_ignore_ascii_case("n/a") {
        return LineUpdate::NoUpdate;
    }
    let micros = match value.parse::<i64>() {
        Ok(v) => v.max(0) as u128,
        Err(_) => {
            return LineUpdate::Anomaly(ParseAnomaly::InvalidTime {
                line: line.to_string(),
            })
        }
    };
    let total_micros = match total.map(|d| d.as_micros()) {
        Some(t) if t > 0 => t,
        _ => {
            return LineUpdate::Anomaly(ParseAnomaly::UnknownDuration {
                line: line.to_string(),
            })
        }
    };
    let pct = (micros * 100 / total_micros).min(100);
    LineUpdate::Progress(pct as u8)
}

fn classify_percentage(line: &str, value: &str) -> LineUpdate {
    let parsed = value
        .strip_suffix('%')
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && (0.0..=100.0).contains(v));
    match parsed {
        Some(v) => LineUpdate::Progress(v.floor() as u8),
        None => LineUpdate::Anomaly(ParseAnomaly::InvalidPercentage {
            line: line.to_string(),
        }),
    }
}

/// Per-job classifier state: emits a percentage only when it changes.
///
/// Values are passed through in the order observed; a lower value after a
/// higher one is emitted as-is.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    total_duration: Option<Duration>,
    last_emitted: Option<u8>,
    anomalies: usize,
}

impl ProgressTracker {
    pub fn new(total_duration: Option<Duration>) -> Self {
        Self {
            total_duration,
            last_emitted: None,
            anomalies: 0,
        }
    }

    /// Feed one line; returns the classification after deduplication.
    pub fn observe(&mut self, line: &str) -> LineUpdate {
        match classify_line(line, self.total_duration) {
            LineUpdate::Progress(pct) if self.last_emitted == Some(pct) => LineUpdate::NoUpdate,
            LineUpdate::Progress(pct) => {
                self.last_emitted = Some(pct);
                LineUpdate::Progress(pct)
            }
            LineUpdate::Anomaly(anomaly) => {
                self.anomalies += 1;
                #[cfg(feature = "tracing")]
                tracing::warn!(anomaly = %anomaly, "Unparseable progress line");
                LineUpdate::Anomaly(anomaly)
            }
            LineUpdate::NoUpdate => LineUpdate::NoUpdate,
        }
    }

    pub fn last_emitted(&self) -> Option<u8> {
        self.last_emitted
    }

    pub fn anomaly_count(&self) -> usize {
        self.anomalies
    }
}
