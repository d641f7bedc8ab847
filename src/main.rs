use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ragline_cli::{
    PipelineConfig, Providers, answer, build_pipeline, build_store, display_banner, load_dataset,
    run_repl,
};
use ragline_core::FanoutPolicy;
use ragline_online::OnlineClient;

#[derive(Parser)]
#[command(name = "ragline")]
#[command(about = "Ask questions about a directory of documents", long_about = None)]
struct Cli {
    /// Directory holding the documents to answer from
    #[arg(short, long, default_value = "rag_data")]
    dataset: PathBuf,

    /// Pipeline configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Answer a single question and exit
    #[arg(short, long)]
    query: Option<String>,

    /// Use local models instead of the online service
    #[arg(long)]
    offline: bool,

    /// Keep answering when some retrievers fail
    #[arg(long)]
    best_effort: bool,

    /// Per-question deadline in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_env("RAGLINE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(true);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("loading pipeline config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if cli.best_effort {
        config.policy = FanoutPolicy::BestEffort;
    }
    if let Some(secs) = cli.timeout_secs {
        config.deadline_secs = Some(secs);
    }
    config.validate()?;

    let providers = if cli.offline {
        Providers::offline()
    } else {
        let client = OnlineClient::from_env()
            .context("online mode needs credentials; set RAGLINE_API_KEY or pass --offline")?;
        Providers::online(client, &config)
    };

    let documents = load_dataset(&cli.dataset)
        .await
        .with_context(|| format!("loading dataset {}", cli.dataset.display()))?;
    if documents.is_empty() {
        warn!(dataset = %cli.dataset.display(), "dataset has no supported documents");
    }
    let document_count = documents.len();

    let store = build_store(&config, documents, &providers)?;
    let pipeline = build_pipeline(&config, store, &providers)?;
    info!(deadline_secs = ?config.deadline_secs, "ready");

    let mut stdout = io::stdout();

    if let Some(query) = cli.query {
        let answered = answer(&pipeline, &query, &mut stdout).await?;
        stdout.flush()?;
        if !answered {
            std::process::exit(1);
        }
        return Ok(());
    }

    display_banner(
        &cli.dataset.display().to_string(),
        document_count,
        cli.offline,
    );
    let answered = run_repl(&pipeline, io::stdin().lock(), &mut stdout).await?;
    info!(answered, "session ended");

    Ok(())
}
