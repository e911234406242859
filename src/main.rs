use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use eventscope::config::AppConfig;
use eventscope::pipeline::{run_pipeline, StepState, StreamRecord};
use eventscope::render::{ChromiumBackend, RenderBackend};

#[derive(Parser)]
#[command(
    name = "eventscope",
    about = "Headless-browser extraction service for game event schedules",
    version,
    long_about = None
)]
struct Cli {
    /// Config file path (default: EVENTSCOPE_CONFIG, then /etc/eventscope/eventscope.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (API server + scrape pipeline)
    Serve {
        /// Bind address
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: String,
    },

    /// Run one extraction pipeline and stream progress to stdout
    Scrape {
        /// Emit the raw NDJSON stream protocol instead of human-readable output
        #[arg(long)]
        json: bool,
    },

    /// Check renderer availability, configuration, and source reachability
    Check {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::load_or_default(),
    };

    match cli.command {
        Commands::Serve { bind } => {
            tracing::info!(%bind, "Starting eventscope daemon");
            eventscope::serve(&bind, config).await?;
        }
        Commands::Scrape { json } => {
            run_scrape(config, json).await?;
        }
        Commands::Check { json } => {
            tracing::info!("Running environment self-check");
            let report = eventscope::selfcheck::run(&config).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("\nEventscope Environment Check");
                println!("{:<15} | {:<10} | Details", "Component", "Status");
                println!("{:-<15}-|-{:-<10}-|-{:-<40}", "", "", "");
                for res in &report.results {
                    let status_str = match res.status {
                        eventscope::selfcheck::CheckStatus::Pass => "PASS",
                        eventscope::selfcheck::CheckStatus::Fail => "FAIL",
                        eventscope::selfcheck::CheckStatus::Warning => "WARN",
                        eventscope::selfcheck::CheckStatus::Skipped => "SKIP",
                    };
                    println!("{:<15} | {:<10} | {}", res.component, status_str, res.details);
                    if let Some(rem) = &res.remediation {
                        println!("{:<15} | {:<10} |   -> Recommendation: {}", "", "", rem);
                    }
                }
                println!("\nReady: {}", if report.ready { "yes" } else { "no" });
                println!();
            }
        }
    }

    Ok(())
}

async fn run_scrape(config: AppConfig, json: bool) -> Result<()> {
    let backend: Arc<dyn RenderBackend> =
        Arc::new(ChromiumBackend::new(config.renderer.clone()));
    let (tx, mut rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();

    let pipeline = tokio::spawn(run_pipeline(backend, Arc::new(config), tx, cancel));

    while let Some(record) = rx.recv().await {
        if json {
            print!("{}", record.to_ndjson());
            continue;
        }
        match record {
            StreamRecord::Progress { progress, methods } => {
                // Show the most recently touched step.
                if let Some(step) = methods.iter().rev().find(|m| m.state != StepState::Pending)
                {
                    let timing = step
                        .duration_ms
                        .map(|ms| format!(" ({}ms)", ms))
                        .unwrap_or_default();
                    println!("[{:>3}%] {:<18} {}{}", progress, step.name, step.state, timing);
                }
            }
            StreamRecord::Final {
                success,
                events,
                successful_method_name,
                error,
            } => {
                println!("\n=== Scrape Result ===");
                let outcome = if success {
                    "success"
                } else if events.is_some() {
                    "degraded (sample data)"
                } else {
                    "failed"
                };
                println!("Outcome:    {}", outcome);
                if let Some(method) = successful_method_name {
                    println!("Method:     {}", method);
                }
                if let Some(error) = &error {
                    println!("Error:      {}", error);
                }
                if let Some(events) = &events {
                    let total: usize = events.values().map(Vec::len).sum();
                    println!("Events:     {} across {} date(s)", total, events.len());
                    println!("{}", serde_json::to_string_pretty(events)?);
                }
                println!("=====================\n");
            }
        }
    }

    pipeline.await?;
    Ok(())
}
