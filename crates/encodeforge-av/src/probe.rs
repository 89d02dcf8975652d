//! FFprobe-based source metadata extraction.
//!
//! Only two facts are needed from the source: its overall bitrate (to build
//! the ladder) and, when available, its duration (to turn elapsed-time
//! progress lines into percentages).

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use serde::Deserialize;

use crate::{Error, Result};

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    bit_rate: Option<String>,
}

/// What the probe learned about a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    /// Bits per second.
    pub bitrate: i64,
    pub duration: Option<Duration>,
}

/// An external program plus arguments placed before its own flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: PathBuf,
    pub leading_args: Vec<OsString>,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
        }
    }

    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn display_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }
}

/// Runs ffprobe (or a compatible tool) against source files.
#[derive(Debug, Clone)]
pub struct Prober {
    tool: ToolCommand,
}

impl Default for Prober {
    fn default() -> Self {
        Self::new(ToolCommand::new("ffprobe"))
    }
}

impl Prober {
    pub fn new(tool: ToolCommand) -> Self {
        Self { tool }
    }

    pub fn tool(&self) -> &ToolCommand {
        &self.tool
    }

    /// Probe `path` for bitrate and duration.
    ///
    /// Blocks until the external tool exits; call it from a blocking-capable
    /// thread.
    pub fn probe(&self, path: &Path) -> Result<ProbeOutcome> {
        if !path.exists() {
            return Err(Error::file_not_found(path));
        }

        let name = self.tool.display_name();

        #[cfg(feature = "tracing")]
        tracing::debug!(tool = %name, path = %path.display(), "Probing source");

        let output = Command::new(&self.tool.program)
            .args(&self.tool.leading_args)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::tool_not_found(&name)
                } else {
                    Error::Io(e)
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::probe_tool(
                name,
                output.status.to_string(),
                stderr.trim().to_string(),
            ));
        }

        parse_probe_output(&output.stdout).map_err(|e| match e {
            Error::MissingBitrate { .. } => Error::MissingBitrate {
                path: path.to_path_buf(),
            },
            other => other,
        })
    }
}

fn positive_bitrate(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|b| *b > 0)
}

/// Parse ffprobe's JSON output.
///
/// Bitrate comes from the container, falling back to the first video
/// stream. A missing, non-numeric, or non-positive duration is treated as
/// unknown.
pub fn parse_probe_output(stdout: &[u8]) -> Result<ProbeOutcome> {
    let parsed: FfprobeOutput = serde_json::from_slice(stdout)?;

    let format_bitrate = parsed
        .format
        .as_ref()
        .and_then(|f| positive_bitrate(f.bit_rate.as_deref()));

    let bitrate = format_bitrate
        .or_else(|| {
            parsed
                .streams
                .iter()
                .filter(|s| s.codec_type.as_deref() == Some("video"))
                .find_map(|s| positive_bitrate(s.bit_rate.as_deref()))
        })
        .ok_or(Error::MissingBitrate {
            path: PathBuf::new(),
        })?;

    let duration = parsed
        .format
        .and_then(|f| f.duration)
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs > 0.0)
        .map(Duration::from_secs_f64);

    Ok(ProbeOutcome { bitrate, duration })
}
