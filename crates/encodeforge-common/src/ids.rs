//! Job identifiers.
//!
//! A [`JobId`] is opaque to the engine. Generated ids are UUID v4 strings;
//! caller-supplied ids (the notify flow) are accepted when they are safe to
//! use as a file name stem.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Longest id accepted from a caller.
pub const MAX_JOB_ID_LEN: usize = 128;

/// Unique identifier for a transcoding job.
///
/// Deserialization goes through [`JobId::parse`], so ids read from a request
/// body are validated like path parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(String);

impl JobId {
    /// Generate a new random job ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Validate a caller-supplied id.
    ///
    /// Only ASCII alphanumerics, `-` and `_` are allowed, so an id can never
    /// escape the upload or output directory it is joined onto.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(Error::invalid_input("job id is empty"));
        }
        if raw.len() > MAX_JOB_ID_LEN {
            return Err(Error::invalid_input(format!(
                "job id exceeds {} characters",
                MAX_JOB_ID_LEN
            )));
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(Error::invalid_input(format!(
                "job id contains invalid characters: {}",
                raw
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for JobId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid.to_string())
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for JobId {
    type Error = Error;

    fn try_from(raw: String) -> Result<Self> {
        Self::parse(&raw)
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.0
    }
}

impl std::str::FromStr for JobId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
