//! docpipe - run documents through configured processing pipelines from the
//! command line, against local storage or a SQLite result store.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use docpipe::{load_pipelines, Settings, TriggerMessage, TriggerOutcome};

mod host;
mod logging;

use host::Host;

#[derive(Parser)]
#[command(name = "docpipe")]
#[command(version, about = "Document processing pipelines", long_about = None)]
struct Cli {
    /// Host settings file (TOML, JSON or YAML)
    #[arg(short, long, value_name = "FILE", global = true)]
    settings: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file and run it through a pipeline
    Process {
        /// Document to process
        file: PathBuf,

        /// Pipeline name
        #[arg(short, long)]
        pipeline: String,
    },

    /// Handle one queue message read from a JSON file
    Handle {
        /// Message file
        message: PathBuf,
    },

    /// Print a stored result
    Show { pipeline: String, id: String },

    /// Delete a stored result
    Delete { pipeline: String, id: String },

    /// List stored results of a pipeline (SQLite store only)
    List {
        pipeline: String,

        /// List recorded failures instead
        #[arg(long)]
        errors: bool,
    },

    /// Validate a pipelines file against the stage catalog
    CheckConfig {
        /// Pipelines file
        #[arg(default_value = "pipelines.json")]
        path: PathBuf,
    },

    /// Validate a pipelines file and make it the active configuration
    PublishConfig {
        /// Pipelines file
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.json)?;

    let settings = Settings::load(cli.settings.as_deref()).context("Failed to load settings")?;

    match cli.command {
        Commands::Process { file, pipeline } => {
            let host = Host::open(&settings).await?;
            let message = host.upload_document(&file, &pipeline).await?;
            handle_message(&host, message).await?;
        }
        Commands::Handle { message } => {
            let host = Host::open(&settings).await?;
            handle_message(&host, read_message(&message)?).await?;
        }
        Commands::Show { pipeline, id } => {
            let host = Host::open(&settings).await?;
            let envelope = host.store().get_by_id(&id, &pipeline).await?;
            println!("{}", serde_json::to_string_pretty(&envelope)?);
        }
        Commands::Delete { pipeline, id } => {
            let host = Host::open(&settings).await?;
            host.store().delete_by_id(&id, &pipeline).await?;
            info!(pipeline = %pipeline, id = %id, "Deleted stored result");
        }
        Commands::List { pipeline, errors } => {
            let host = Host::open(&settings).await?;
            if errors {
                for row in host.list_errors(&pipeline).await? {
                    println!("{}\t{}\t{}", row.created_at, row.key, row.message);
                }
            } else {
                for row in host.list_results(&pipeline).await? {
                    println!(
                        "{}\t{}\t{}\t{}",
                        row.id,
                        row.kind,
                        row.filename.as_deref().unwrap_or("-"),
                        row.updated_at
                    );
                }
            }
        }
        Commands::CheckConfig { path } => check_config(&settings, &path).await?,
        Commands::PublishConfig { path } => {
            let pipelines = load_pipelines(&path)
                .with_context(|| format!("Invalid pipelines file {}", path.display()))?;
            let host = Host::open(&settings).await?;
            host.publish_config(&pipelines).await?;
        }
    }

    Ok(())
}

fn read_message(path: &Path) -> Result<TriggerMessage> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&body).with_context(|| format!("{} is not a docpipe message", path.display()))
}

/// Runs one message and prints what it produced: the finished envelope, or
/// the messages it queued, one JSON document per line.
async fn handle_message(host: &Host, message: TriggerMessage) -> Result<()> {
    let outcome = host.trigger().handle(message).await?;

    match &outcome {
        TriggerOutcome::Completed(envelope) => {
            println!("{}", serde_json::to_string_pretty(envelope)?);
        }
        TriggerOutcome::Suspended { message, .. } => {
            info!(id = %message.id, pipeline = %message.pipeline, "Run suspended");
        }
        TriggerOutcome::Dispatched(kind) => info!(kind = %kind, "Continuation dispatched"),
    }

    for queued in host.drain_queue() {
        println!("{}", queued.to_json()?);
    }

    Ok(())
}

async fn check_config(settings: &Settings, path: &Path) -> Result<()> {
    let pipelines = load_pipelines(path)
        .with_context(|| format!("Invalid pipelines file {}", path.display()))?;
    let host = Host::open(settings).await?;
    let resolver = host.resolver();

    let mut unresolved = 0;
    for definition in &pipelines.pipelines {
        let resolved = resolver.resolve(&pipelines, &definition.name)?;
        let missing = definition.stages.len() - resolved.len();
        if missing > 0 {
            unresolved += missing;
            warn!(
                pipeline = %definition.name,
                missing,
                "Pipeline references stages missing from the catalog"
            );
        }
        println!("{}: {} of {} stages", definition.name, resolved.len(), definition.stages.len());
    }

    if unresolved > 0 {
        warn!(
            unresolved,
            catalog = ?resolver.catalog().names(),
            "Unknown stages are skipped at run time"
        );
    }
    Ok(())
}
