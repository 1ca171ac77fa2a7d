//! tuple-migrate CLI - schema-driven legacy data translation.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tuple_migrate::{Config, MigrateError, Orchestrator, TranslationOutcome};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "tuple-migrate")]
#[command(about = "Translate legacy database rows through a matching model")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Translate from the last checkpoint
    Run {
        /// Run every tree without committing
        #[arg(long)]
        dry_run: bool,

        /// Discard the checkpoint and start from the first tree
        #[arg(long)]
        reset: bool,

        /// Pause after this many root trees
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        tree_limit: Option<u64>,
    },

    /// Show the process checkpoint
    Status,

    /// Validate the matching model and print its tuple tree
    Validate,

    /// Test database connections
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(|e| MigrateError::Config(e.to_string()))?;

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Run {
            dry_run,
            reset,
            tree_limit,
        } => {
            // Apply overrides
            if dry_run {
                config.translation.allow_commit = false;
            }
            if reset {
                config.translation.reset_process = true;
            }
            if let Some(limit) = tree_limit {
                config.translation.tree_limit = Some(limit);
            }

            // Setup signal handling for graceful shutdown (SIGINT and SIGTERM)
            let cancel_token = setup_signal_handler();
            let result = Orchestrator::new(config)
                .with_cancellation(cancel_token)
                .run()
                .await?;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                let status_msg = match result.outcome {
                    TranslationOutcome::Completed => "Translation completed!",
                    TranslationOutcome::Paused => "Translation paused at the tree limit.",
                    TranslationOutcome::Cancelled => "Translation interrupted.",
                    TranslationOutcome::Incomplete => "Translation finished with skipped root rows.",
                };
                println!("\n{}", status_msg);
                if dry_run {
                    println!("  (dry run: nothing was committed)");
                }
                println!("  Duration: {:.2}s", result.duration_seconds);
                println!(
                    "  Trees: {} this run, at {}/{}",
                    result.trees_processed, result.process_count, result.total_trees
                );
                println!("  Rows inserted: {}", result.rows_inserted);
                println!("  Rows skipped: {}", result.rows_skipped);
            }
        }

        Commands::Status => {
            let record = Orchestrator::new(config).status().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                println!("Process Status:");
                println!("  Status: {}", record.status);
                println!("  Last stop point: {}", record.last_stop_point);
                println!("  Recorded at: {}", record.timestamp.to_rfc3339());
                if let Some(ref hash) = record.model_hash {
                    println!("  Model hash: {}", hash);
                }
                println!(
                    "  Resumable: {}",
                    if record.is_resumable() { "yes" } else { "no" }
                );
            }
        }

        Commands::Validate => {
            let model = Orchestrator::new(config).load_model()?;

            if cli.output_json {
                let summary = serde_json::json!({
                    "valid": true,
                    "tuples": model.tree.len(),
                    "value_match_groups": model.value_matches.len(),
                    "hash": model.hash,
                });
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("Matching model is valid ({} tuples)", model.tree.len());
                print!("{}", model.tree.outline());
            }
        }

        Commands::HealthCheck => {
            let result = Orchestrator::new(config).health_check().await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source (MySQL): {} ({}ms)",
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms
                );
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Target (MySQL): {} ({}ms)",
                    if result.target_connected { "OK" } else { "FAILED" },
                    result.target_latency_ms
                );
                if let Some(ref err) = result.target_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(MigrateError::database(
                    "Health check failed",
                    "connecting to source and target",
                ));
            }
        }
    }

    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => return Err(format!("Invalid verbosity '{}'", other)),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => return Err(format!("Invalid log format '{}'", other)),
    }

    Ok(())
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM.
/// The translator checks the token between root trees.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        tokio::spawn(async move {
            let mut stream = match signal(kind) {
                Ok(stream) => stream,
                Err(e) => {
                    eprintln!("Failed to setup {} handler: {}", name, e);
                    return;
                }
            };
            stream.recv().await;
            eprintln!(
                "\nReceived {}. Pausing after the current tree...",
                name
            );
            token.cancel();
        });
    }

    cancel_token
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Pausing after the current tree...");
            token.cancel();
        }
    });

    cancel_token
}
