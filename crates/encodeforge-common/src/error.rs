//! Error taxonomy shared by the job engine and its transports.
//!
//! Each variant corresponds to one failure class a caller can observe. Parse
//! anomalies in progress output are not errors and live in `encodeforge-av`.

/// Common error type for encodeforge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad file type, oversized upload, or malformed id.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unknown job id or missing input file.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The metadata tool failed or returned unusable data.
    #[error("Probe failed: {0}")]
    ProbeFailure(String),

    /// The transcoding process could not be started.
    #[error("Launch failed: {0}")]
    LaunchFailure(String),

    /// The transcoding process exited unsuccessfully.
    #[error("Transcode failed: {0}")]
    RuntimeFailure(String),

    /// A job with this id is still active.
    #[error("Job already running: {0}")]
    AlreadyRunning(String),

    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn probe_failure<S: Into<String>>(msg: S) -> Self {
        Self::ProbeFailure(msg.into())
    }

    pub fn launch_failure<S: Into<String>>(msg: S) -> Self {
        Self::LaunchFailure(msg.into())
    }

    pub fn runtime_failure<S: Into<String>>(msg: S) -> Self {
        Self::RuntimeFailure(msg.into())
    }

    pub fn already_running<S: Into<String>>(id: S) -> Self {
        Self::AlreadyRunning(id.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable machine-readable name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::NotFound(_) => "not_found",
            Self::ProbeFailure(_) => "probe_failure",
            Self::LaunchFailure(_) => "launch_failure",
            Self::RuntimeFailure(_) => "runtime_failure",
            Self::AlreadyRunning(_) => "already_running",
            Self::Io(_) => "io",
            Self::Internal(_) => "internal",
        }
    }
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;
