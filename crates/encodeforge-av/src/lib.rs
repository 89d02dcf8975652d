//! # encodeforge-av
//!
//! The tool-facing half of encodeforge: everything that talks to, or reads
//! the output of, the external media tools.
//!
//! This crate provides:
//! - [`BitrateLadder`]: per-rendition target bitrates derived from the source
//! - [`Prober`]: an ffprobe adapter that extracts source bitrate and duration
//! - [`classify_line`] and [`ProgressTracker`]: progress-line parsing for the
//!   transcoder's standard output
//! - Tool detection helpers
//!
//! ## Features
//!
//! - `tracing` - Log parse anomalies and probe invocations
//!
//! ## Example
//!
//! ```
//! use encodeforge_av::{classify_line, BitrateLadder, LineUpdate};
//! use std::time::Duration;
//!
//! let ladder = BitrateLadder::from_source_bitrate(8_000_000)?;
//! assert_eq!(ladder.bitrate_1080, 3600);
//!
//! let update = classify_line("out_time_ms=5000000", Some(Duration::from_secs(50)));
//! assert_eq!(update, LineUpdate::Progress(10));
//! # Ok::<(), encodeforge_av::Error>(())
//! ```

mod error;
pub mod ladder;
pub mod probe;
pub mod progress;
pub mod tools;

// Re-exports
pub use error::{Error, Result};
pub use ladder::BitrateLadder;
pub use probe::{parse_probe_output, ProbeOutcome, Prober, ToolCommand};
pub use progress::{classify_line, LineUpdate, ParseAnomaly, ProgressTracker};
pub use tools::{check_tool, check_tool_with_arg, require_tool, ToolInfo};
