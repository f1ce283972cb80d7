//! CLI entry point for the palaver-orchestrator consumer.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use palaver_store::{ConversationStateRepository, FileEventStore};

use palaver_orchestrator::batch::Orchestrator;
use palaver_orchestrator::config::OrchestratorConfig;
use palaver_orchestrator::emit::{EventEmitter, FilePublisher};
use palaver_orchestrator::spool::SpoolConsumer;

#[derive(Parser)]
#[command(name = "palaver-orchestrator")]
#[command(about = "Conversation response orchestrator for the Palaver support platform")]
struct Cli {
    /// Process a single batch file and exit.
    #[arg(long)]
    once: bool,

    /// Batch file to process in --once mode.
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Run as daemon consuming the spool directory.
    #[arg(long)]
    daemon: bool,

    /// Override the event store data directory.
    #[arg(long)]
    data_dir: Option<String>,

    /// Config file prefix (default: palaver).
    #[arg(short, long, default_value = "palaver")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let cli = Cli::parse();
    let mut config = load_orchestrator_config(&cli.config)?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }

    let store = Arc::new(FileEventStore::new(&config.data_dir)?);
    let repository = ConversationStateRepository::new(store, config.assertion_retention_cap);
    let publisher = Arc::new(FilePublisher::new(&config.topic_dir)?);
    let emitter = EventEmitter::new(publisher, repository.clone(), config.topics());
    let orchestrator = Orchestrator::new(repository, emitter, config.decision_policy())?;
    tracing::info!(
        data_dir = %config.data_dir,
        topic_dir = %config.topic_dir,
        "Event store and publisher ready"
    );

    let consumer = SpoolConsumer::new(orchestrator, &config);

    if cli.once {
        let input = cli
            .input
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("--input is required in --once mode"))?;
        let report = consumer.process_file(input)?;
        tracing::info!(
            succeeded = report.summary.succeeded,
            failed = report.summary.failed,
            skipped = report.summary.skipped,
            "Replay complete"
        );
    } else if cli.daemon {
        consumer.run().await?;
    } else {
        anyhow::bail!("Specify --once (single batch file) or --daemon (spool consumer)");
    }

    Ok(())
}

fn load_orchestrator_config(file_prefix: &str) -> anyhow::Result<OrchestratorConfig> {
    let cfg = config::Config::builder()
        .add_source(config::File::with_name(file_prefix).required(false))
        .add_source(
            config::Environment::with_prefix("PALAVER_ORCHESTRATOR")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    match cfg.get::<OrchestratorConfig>("orchestrator") {
        Ok(c) => Ok(c),
        Err(_) => Ok(OrchestratorConfig::default()),
    }
}
