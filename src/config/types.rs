use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub jobs: JobsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Uploaded inputs are stored here as `<id><ext>`
    #[serde(default = "default_upload_root")]
    pub upload_root: PathBuf,

    /// Renditions for a job are written under `<output_root>/<id>/`
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,

    /// Uploads larger than this are rejected
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,

    /// Accepted upload extensions, without the dot
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

fn default_upload_root() -> PathBuf {
    PathBuf::from("/var/lib/encodeforge/uploads")
}
fn default_output_root() -> PathBuf {
    PathBuf::from("/var/lib/encodeforge/encoded")
}
fn default_max_upload_bytes() -> u64 {
    5 * 1024 * 1024 * 1024
}
fn default_allowed_extensions() -> Vec<String> {
    encodeforge_common::paths::DEFAULT_UPLOAD_EXTENSIONS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_root: default_upload_root(),
            output_root: default_output_root(),
            max_upload_bytes: default_max_upload_bytes(),
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolsConfig {
    #[serde(default = "default_ffprobe")]
    pub ffprobe: PathBuf,

    /// Arguments placed before ffprobe's own flags
    #[serde(default)]
    pub ffprobe_args: Vec<String>,

    /// Invoked as `<transcoder> <args..> <input> <output_dir> <360> <480> <720> <1080>`
    #[serde(default = "default_transcoder")]
    pub transcoder: PathBuf,

    #[serde(default)]
    pub transcoder_args: Vec<String>,
}

fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}
fn default_transcoder() -> PathBuf {
    PathBuf::from("transcoder")
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffprobe: default_ffprobe(),
            ffprobe_args: Vec::new(),
            transcoder: default_transcoder(),
            transcoder_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobsConfig {
    /// How long a finished job stays observable before it is retired
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    /// How long shutdown waits for running transcodes before aborting them
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    /// Bytes of transcoder stderr kept for the failure message
    #[serde(default = "default_stderr_tail_bytes")]
    pub stderr_tail_bytes: usize,
}

fn default_retention_secs() -> u64 {
    30
}
fn default_shutdown_grace_secs() -> u64 {
    10
}
fn default_stderr_tail_bytes() -> usize {
    4096
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            retention_secs: default_retention_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            stderr_tail_bytes: default_stderr_tail_bytes(),
        }
    }
}
