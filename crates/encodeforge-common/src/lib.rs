//! Encodeforge-Common: Shared types and utilities.
//!
//! This crate provides functionality used across encodeforge:
//!
//! - **Job IDs**: An opaque, validated identifier for transcoding jobs
//! - **Error Handling**: The job error taxonomy and a result alias
//! - **Path Utilities**: Upload extension checks and upload file naming
//!
//! # Examples
//!
//! ```
//! use encodeforge_common::{Error, JobId, Result};
//! use encodeforge_common::paths::has_allowed_extension;
//! use std::path::Path;
//!
//! let id = JobId::new();
//! assert!(JobId::parse(id.as_str()).is_ok());
//!
//! let allowed = ["mp4".to_string(), "mkv".to_string()];
//! assert!(has_allowed_extension(Path::new("clip.MP4"), &allowed));
//!
//! fn example() -> Result<()> {
//!     Err(Error::not_found("job abc"))
//! }
//! assert!(example().is_err());
//! ```

pub mod error;
pub mod ids;
pub mod paths;

pub use error::{Error, Result};
pub use ids::JobId;
