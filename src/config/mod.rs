mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./encodeforge.toml",
        "~/.config/encodeforge/config.toml",
        "/etc/encodeforge/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    if config.storage.max_upload_bytes == 0 {
        anyhow::bail!("storage.max_upload_bytes must be greater than 0");
    }

    if config
        .storage
        .allowed_extensions
        .iter()
        .all(|ext| ext.trim_start_matches('.').is_empty())
    {
        anyhow::bail!("storage.allowed_extensions must list at least one extension");
    }

    if config.storage.upload_root == config.storage.output_root {
        anyhow::bail!(
            "storage.upload_root and storage.output_root must differ: {:?}",
            config.storage.upload_root
        );
    }

    if config.tools.ffprobe.as_os_str().is_empty() {
        anyhow::bail!("tools.ffprobe cannot be empty");
    }
    if config.tools.transcoder.as_os_str().is_empty() {
        anyhow::bail!("tools.transcoder cannot be empty");
    }

    if config.jobs.retention_secs == 0 {
        tracing::warn!("jobs.retention_secs is 0; finished jobs are retired immediately");
    }

    Ok(())
}
