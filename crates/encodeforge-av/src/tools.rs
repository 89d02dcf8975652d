//! External tool detection.

use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Information about an external tool.
#[derive(Debug, Clone)]
pub struct ToolInfo {
    /// Name of the tool as configured.
    pub name: String,
    /// Whether the tool is available.
    pub available: bool,
    /// First line of the tool's version output, if any.
    pub version: Option<String>,
    /// Resolved path to the executable.
    pub path: Option<PathBuf>,
}

/// Check if a tool is available and get its information.
///
/// # Example
///
/// ```no_run
/// use encodeforge_av::check_tool;
///
/// let info = check_tool("ffprobe");
/// if info.available {
///     println!("ffprobe version: {:?}", info.version);
/// }
/// ```
pub fn check_tool(name: &str) -> ToolInfo {
    check_tool_with_arg(name, "-version")
}

/// Check if a tool is available using a custom version argument.
///
/// A tool that resolves on `PATH` but rejects the version flag is still
/// reported as available, without a version.
pub fn check_tool_with_arg(name: &str, version_arg: &str) -> ToolInfo {
    let path = resolve(name);
    let Some(path) = path else {
        return ToolInfo {
            name: name.to_string(),
            available: false,
            version: None,
            path: None,
        };
    };

    let version = Command::new(&path)
        .arg(version_arg)
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| {
            String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .map(|s| s.trim().to_string())
        })
        .filter(|s| !s.is_empty());

    ToolInfo {
        name: name.to_string(),
        available: true,
        version,
        path: Some(path),
    }
}

fn resolve(name: &str) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    which::which(name).ok()
}

/// Require that a tool is available, returning its path.
///
/// # Errors
///
/// Returns an error if the tool is not found.
pub fn require_tool(name: &str) -> Result<PathBuf> {
    resolve(name).ok_or_else(|| Error::tool_not_found(name))
}
