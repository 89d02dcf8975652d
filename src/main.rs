mod cli;

use encodeforge::{config, server};
use encodeforge_av::{check_tool_with_arg, require_tool, BitrateLadder, Prober, ToolCommand};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use serde::Serialize;
use std::path::Path;

async fn start_server(
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<&Path>,
) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;

    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config::validate_config(&config)?;

    for tool in [&config.tools.ffprobe, &config.tools.transcoder] {
        if let Err(e) = require_tool(&tool.to_string_lossy()) {
            tracing::warn!("{}; jobs will fail until it is installed", e);
        }
    }

    tracing::info!("Starting Encodeforge server");
    tracing::info!(
        "Uploads in {:?}, renditions in {:?}",
        config.storage.upload_root,
        config.storage.output_root
    );

    server::start_server(config).await
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "encodeforge=debug,encodeforge_av=debug,tower_http=debug".to_string()
        } else {
            "encodeforge=info,encodeforge_av=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::Probe { file, json } => probe_file(&file, json, cli.config.as_deref()),
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("encodeforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

#[derive(Serialize)]
struct ProbeReport<'a> {
    file: &'a Path,
    bitrate: i64,
    duration_secs: Option<f64>,
    ladder: BitrateLadder,
}

fn probe_file(file: &Path, json: bool, config_path: Option<&Path>) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let config = config::load_config_or_default(config_path)?;
    let prober = Prober::new(
        ToolCommand::new(&config.tools.ffprobe).with_leading_args(&config.tools.ffprobe_args),
    );

    let outcome = prober
        .probe(file)
        .with_context(|| format!("Failed to probe {:?}", file))?;
    let ladder = BitrateLadder::from_source_bitrate(outcome.bitrate)?;

    if json {
        let report = ProbeReport {
            file,
            bitrate: outcome.bitrate,
            duration_secs: outcome.duration.map(|d| d.as_secs_f64()),
            ladder,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("File: {}", file.display());
    println!("Bitrate: {} kbps", outcome.bitrate / 1000);
    match outcome.duration {
        Some(duration) => {
            let secs = duration.as_secs();
            let mins = secs / 60;
            let hours = mins / 60;
            println!("Duration: {:02}:{:02}:{:02}", hours, mins % 60, secs % 60);
        }
        None => println!("Duration: unknown"),
    }
    println!("\nBitrate ladder:");
    println!("  1080p: {} kbps", ladder.bitrate_1080);
    println!("   720p: {} kbps", ladder.bitrate_720);
    println!("   480p: {} kbps", ladder.bitrate_480);
    println!("   360p: {} kbps", ladder.bitrate_360);

    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;

    println!("Checking external tools...\n");

    let ffprobe = config.tools.ffprobe.to_string_lossy();
    let transcoder = config.tools.transcoder.to_string_lossy();
    let tools = [
        check_tool_with_arg(&ffprobe, "-version"),
        check_tool_with_arg(&transcoder, "--version"),
    ];
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Jobs will fail until they are installed.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            println!("  Server: {}:{}", config.server.host, config.server.port);
            println!("  Upload root: {}", config.storage.upload_root.display());
            println!("  Output root: {}", config.storage.output_root.display());
            println!("  Max upload: {} bytes", config.storage.max_upload_bytes);
            println!(
                "  Extensions: {}",
                config.storage.allowed_extensions.join(", ")
            );
            println!("  Transcoder: {}", config.tools.transcoder.display());
            println!("  Retention: {}s", config.jobs.retention_secs);
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("Default config:");
            println!("  Server: {}:{}", config.server.host, config.server.port);
        }
    }

    Ok(())
}
