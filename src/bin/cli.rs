//! Disaster data CLI
//!
//! Local execution entry point for the polling loop and its maintenance
//! commands.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use disaster_data::{
    config::{self, Secrets},
    error::{AppError, Result},
    models::{Config, records_of},
    pipeline::ScrapeCycle,
    services::{ConfiguredSource, Source},
    utils::{get_domain, http},
};

/// disaster-data - versioned snapshots of disaster-relief data
#[derive(Parser, Debug)]
#[command(
    name = "disaster-data",
    version,
    about = "Polls disaster-relief data sources and versions every change"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "data/config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll every enabled source
    Run {
        /// Run a single pass and exit
        #[arg(long)]
        once: bool,

        /// Format messages but never write or notify
        #[arg(long)]
        dry_run: bool,
    },

    /// Run one cycle for one document
    Check {
        /// Document path or name, e.g. fema-nss.json
        path: String,

        #[arg(long)]
        dry_run: bool,
    },

    /// List configured sources
    Sources,

    /// Show the stored snapshot of a document
    Show {
        path: String,
    },

    /// Validate the configuration file
    Validate,
}

/// Initialize logging based on verbosity flag and configured level.
fn init_logging(verbose: bool, level: &str) {
    let level = if verbose { "debug" } else { level };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Level comes from the file, so read it before the logger exists
    let level = Config::load(&cli.config)
        .map(|c| c.logging.level)
        .unwrap_or_else(|_| "info".to_string());
    init_logging(cli.verbose, &level);

    let config = config::load_config(&cli.config)?;
    let secrets = Secrets::from_env();
    log::debug!("Secrets: {:?}", secrets);

    match cli.command {
        Command::Run { once, dry_run } => {
            let mut runner = config::build_runner(&config, &secrets, dry_run)?;
            log::info!("Polling {} sources", runner.sources().len());

            if once {
                let report = runner.run_pass().await?;
                if report.failed > 0 {
                    log::warn!("{} document(s) failed", report.failed);
                }
            } else {
                runner
                    .run_forever(
                        Duration::from_secs(config.poll.interval_secs),
                        Duration::from_secs(config.poll.max_backoff_secs),
                    )
                    .await;
            }
        }

        Command::Check { path, dry_run } => {
            config.validate()?;
            let spec = config
                .find_source(&path)
                .cloned()
                .ok_or_else(|| AppError::config(format!("No source owns {path}")))?;
            let source = ConfiguredSource::new(spec)?;

            let client = http::create_client(&config.poll)?;
            let store = config::build_store(&config.store, &client, &secrets)?;
            let dispatcher = config::build_dispatcher(&config.notifier, &client, &secrets);
            let cycle = ScrapeCycle::new(store, client).dry_run(dry_run || config.poll.dry_run);

            let mut state = Default::default();
            let event = cycle.run(&source, &mut state).await?;
            dispatcher.dispatch(&event).await;
            log::info!("{}: {}", event.document, event.kind);
        }

        Command::Sources => {
            for spec in &config.sources {
                let mode = if spec.is_delta() { "records" } else { "document" };
                let state = if spec.enabled { "" } else { " (disabled)" };
                println!(
                    "{:<40} {:<10} {:<8} {}{}",
                    spec.path,
                    spec.kind.as_str(),
                    mode,
                    get_domain(&spec.url).unwrap_or_else(|| spec.url.clone()),
                    state
                );
            }
        }

        Command::Show { path } => {
            let client = http::create_client(&config.poll)?;
            let store = config::build_store(&config.store, &client, &secrets)?;
            let path = config
                .find_source(&path)
                .map(|s| s.path.clone())
                .unwrap_or(path);

            let doc = store.read(&path).await?;
            let value: serde_json::Value = serde_json::from_str(&doc.content)?;
            println!("Document: {}", path);
            println!("Revision: {}", doc.revision);
            println!("Size:     {} bytes", doc.content.len());
            match records_of(&value) {
                Ok(records) => println!("Records:  {}", records.len()),
                Err(_) => println!("Records:  n/a (stored as a single document)"),
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            for spec in config.enabled_sources() {
                let source = ConfiguredSource::new(spec.clone())?;
                log::info!("✓ {} ({})", source.spec().path, source.spec().kind.as_str());
            }
            log::info!("All validations passed!");
        }
    }

    Ok(())
}
