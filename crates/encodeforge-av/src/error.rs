//! Error types for encodeforge-av.

use std::path::PathBuf;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while computing ladders or talking to external tools.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Source bitrate was zero or negative.
    #[error("invalid source bitrate: {0}")]
    InvalidBitrate(i64),

    /// A required external tool is not available.
    #[error("tool not found: {tool}")]
    ToolNotFound { tool: String },

    /// The probe tool exited non-zero.
    #[error("{tool} failed ({status}): {message}")]
    ProbeTool {
        tool: String,
        status: String,
        message: String,
    },

    /// The probe output carried no usable bitrate.
    #[error("no bitrate found in probe output for {}", path.display())]
    MissingBitrate { path: PathBuf },

    /// The specified file was not found.
    #[error("file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a tool not found error.
    pub fn tool_not_found(tool: impl Into<String>) -> Self {
        Self::ToolNotFound { tool: tool.into() }
    }

    /// Create a probe tool failure.
    pub fn probe_tool(
        tool: impl Into<String>,
        status: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ProbeTool {
            tool: tool.into(),
            status: status.into(),
            message: message.into(),
        }
    }

    /// Create a file not found error.
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }
}
