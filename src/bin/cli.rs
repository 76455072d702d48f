//! RigLog CLI - operator tooling
//!
//! Port scan, CSV export of the local record store, offline replay of
//! device captures and config file management.

use clap::{Parser, Subcommand, ValueEnum};
use riglog_core::cli::{init_tracing, print_exit_codes, CliResult, ExitCodes};
use riglog_core::config::{self, AppConfig, LoggingConfig, SinkBackend};
use riglog_core::core::device::{DeviceLocator, DeviceRole};
use riglog_core::core::export;
use riglog_core::core::sink::{self, JsonLinesSink, RecordKeys, SinkError};
use riglog_core::{Aggregator, Effect, SystemSerial};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

/// CLI output format
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON format for scripting
    Json,
}

/// RigLog CLI
#[derive(Parser, Debug)]
#[command(name = "riglog-cli", version, about = "RigLog operator tooling", long_about = None)]
struct Cli {
    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Config file (defaults to the platform config directory)
    #[arg(short, long, env = "RIGLOG_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List available serial ports
    ListPorts,

    /// Write the local record store as CSV
    Export {
        /// Record store (defaults to the configured file sink)
        #[arg(short, long)]
        store: Option<PathBuf>,

        /// CSV output path (defaults to logs.csv in the data directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Feed a capture of device lines through the aggregator
    Replay {
        /// Capture file, one device line per line
        file: PathBuf,

        /// Send completed records to the configured sink
        #[arg(long)]
        upload: bool,
    },

    /// Config file management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Print the exit code table
    ExitCodes,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the config file location
    Path,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let logging = LoggingConfig {
        level: if cli.quiet { "error" } else { "warn" }.to_string(),
        ..LoggingConfig::default()
    };
    let _guard = match init_tracing(&logging, cli.verbose) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Could not initialize logging: {}", e);
            None
        }
    };

    let result = match run(&cli).await {
        Ok(result) => result,
        Err(result) => result,
    };

    if let Some(msg) = result.message() {
        if result.is_success() {
            if !cli.quiet {
                println!("{}", msg);
            }
        } else {
            eprintln!("Error: {}", msg);
        }
    }
    result.to_exit_code()
}

async fn run(cli: &Cli) -> Result<CliResult, CliResult> {
    match &cli.command {
        Commands::ListPorts => list_ports(cli),
        Commands::Export { store, output } => {
            let config = AppConfig::load(cli.config.as_deref())?;
            export_csv(&config, store.as_deref(), output.as_deref())
        }
        Commands::Replay { file, upload } => {
            let config = AppConfig::load(cli.config.as_deref())?;
            replay(cli, &config, file, *upload).await
        }
        Commands::Config { action } => handle_config(cli, action),
        Commands::ExitCodes => {
            print_exit_codes();
            Ok(CliResult::success())
        }
    }
}

fn list_ports(cli: &Cli) -> Result<CliResult, CliResult> {
    let ports = DeviceLocator::new(&SystemSerial).list()?;

    match cli.format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&ports)
                .map_err(|e| CliResult::error(ExitCodes::INTERNAL_ERROR, e.to_string()))?;
            println!("{}", json);
        }
        OutputFormat::Text => {
            if ports.is_empty() {
                return Ok(CliResult::success_with_message("No serial ports found."));
            }
            println!("Available Serial Ports:");
            println!("{:-<60}", "");
            for port in &ports {
                println!("  {} [{}]", port.name, port.kind);
                if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
                    println!("      VID:PID      {:04x}:{:04x} ({}/{})", vid, pid, vid, pid);
                }
                for (label, value) in [
                    ("Manufacturer", &port.manufacturer),
                    ("Product", &port.product),
                    ("Serial number", &port.serial_number),
                ] {
                    if let Some(value) = value {
                        println!("      {:<12} {}", label, value);
                    }
                }
            }
        }
    }

    Ok(CliResult::success())
}

fn store_path(config: &AppConfig, store: Option<&Path>) -> Result<PathBuf, CliResult> {
    if let Some(path) = store {
        return Ok(path.to_path_buf());
    }
    if let SinkBackend::File { path: Some(path) } = &config.sink.backend {
        return Ok(path.clone());
    }
    config::default_store_path().ok_or_else(|| {
        CliResult::error(ExitCodes::CONFIG_ERROR, "Could not determine data directory")
    })
}

fn export_csv(
    config: &AppConfig,
    store: Option<&Path>,
    output: Option<&Path>,
) -> Result<CliResult, CliResult> {
    let store = store_path(config, store)?;
    if !store.exists() {
        return Err(CliResult::file_not_found(&store.display().to_string()));
    }

    let output = match output {
        Some(path) => path.to_path_buf(),
        None => config::default_export_path().ok_or_else(|| {
            CliResult::error(ExitCodes::CONFIG_ERROR, "Could not determine data directory")
        })?,
    };

    let records = JsonLinesSink::load(&store)?;
    export::write_csv(&output, &records)?;

    Ok(CliResult::success_with_message(format!(
        "Exported {} records to {}",
        records.len(),
        output.display()
    )))
}

/// Source a captured line most likely came from; captures carry no device tag
fn capture_source(line: &str) -> DeviceRole {
    if line.trim_start().starts_with("LOG;CURRENT_MAX") {
        DeviceRole::CurrentLogger
    } else {
        DeviceRole::Controllino
    }
}

async fn replay(
    cli: &Cli,
    config: &AppConfig,
    file: &Path,
    upload: bool,
) -> Result<CliResult, CliResult> {
    if !file.exists() {
        return Err(CliResult::file_not_found(&file.display().to_string()));
    }
    let capture = std::fs::read_to_string(file)?;

    let sink = if upload {
        Some(sink::from_config(&config.sink)?)
    } else {
        None
    };
    let sink_timeout = Duration::from_secs(config.sink.timeout_secs);

    let mut aggregator = Aggregator::new();
    let mut keys = RecordKeys::new();
    let mut failed = 0usize;

    for line in capture.lines().filter(|l| !l.trim().is_empty()) {
        let Some(effect) = aggregator.handle_line(capture_source(line), line) else {
            continue;
        };

        match effect {
            Effect::Upload(completed) => {
                let key = keys.next(completed.completed_at);
                let value = completed.upload_value();
                match cli.format {
                    OutputFormat::Json => println!(
                        "{}",
                        serde_json::json!({ "kind": "record", "key": key, "value": value })
                    ),
                    OutputFormat::Text => println!("RECORD {}  {}", key, value),
                }

                if let Some(sink) = &sink {
                    let outcome = tokio::time::timeout(sink_timeout, sink.upload(&key, &value))
                        .await
                        .unwrap_or(Err(SinkError::Timeout(sink_timeout)));
                    if let Err(e) = outcome {
                        failed += 1;
                        tracing::error!(key = %key, error = %e, "upload failed");
                    }
                }
            }
            Effect::Notify(event) => match cli.format {
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::json!({ "kind": "alert", "event": event })
                ),
                OutputFormat::Text => println!("ALERT  {}", event),
            },
        }
    }

    let stats = aggregator.stats();
    let summary = format!(
        "{} lines, {} discarded, {} records, {} alerts",
        stats.lines, stats.discarded, stats.completed, stats.alerts
    );
    if failed > 0 {
        return Err(CliResult::error(
            ExitCodes::DELIVERY_FAILED,
            format!("{summary}; {failed} uploads failed"),
        ));
    }
    Ok(CliResult::success_with_message(summary))
}

fn handle_config(cli: &Cli, action: &ConfigAction) -> Result<CliResult, CliResult> {
    let path = match &cli.config {
        Some(path) => path.clone(),
        None => AppConfig::default_path()?,
    };

    match action {
        ConfigAction::Show => {
            let config = AppConfig::load(Some(&path))?;
            let rendered = match cli.format {
                OutputFormat::Json => serde_json::to_string_pretty(&config)
                    .map_err(|e| CliResult::error(ExitCodes::INTERNAL_ERROR, e.to_string()))?,
                OutputFormat::Text => toml::to_string_pretty(&config)
                    .map_err(|e| CliResult::error(ExitCodes::INTERNAL_ERROR, e.to_string()))?,
            };
            println!("{}", rendered);
            Ok(CliResult::success())
        }
        ConfigAction::Path => Ok(CliResult::success_with_message(path.display().to_string())),
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                return Err(CliResult::error(
                    ExitCodes::INVALID_ARGS,
                    format!("{} exists, use --force to overwrite", path.display()),
                ));
            }
            config::init_directories()?;
            AppConfig::default().save(&path)?;
            Ok(CliResult::success_with_message(format!(
                "Wrote default config to {}",
                path.display()
            )))
        }
    }
}
