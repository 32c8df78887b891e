use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vidscout::config::Config;
use vidscout::credentials::{
    ChainedCredentialSource, CredentialPool, CredentialSource, CredentialSpec, PoolSettings,
};
use vidscout::executor::RequestExecutor;
use vidscout::models::{RunSnapshot, RunStatus, Strategy};
use vidscout::orchestrator::{default_strategies, targeted, ExtractionOrchestrator, RunConfig};
use vidscout::provider::{ScriptedProvider, SharedSearchProvider, YouTubeProvider};
use vidscout::scoring::ContentScorer;
use vidscout::storage::{
    Deduplicator, InMemoryDeduplicator, JsonlSink, SharedDeduplicator, SqliteDeduplicator,
};

#[derive(Parser)]
#[command(
    name = "vidscout",
    version,
    about = "Quota-aware video metadata extraction for regional content",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML); environment variables are used otherwise
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the config file
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an extraction over the built-in strategies or the given queries
    Extract {
        /// Targeted query; repeat for several. Built-in strategies are used when absent
        #[arg(short, long = "query")]
        queries: Vec<String>,

        /// Strategy tag for targeted queries
        #[arg(long, default_value = "location")]
        strategy: Strategy,

        /// Override the number of workers
        #[arg(short, long)]
        workers: Option<usize>,

        /// Override the page limit per query
        #[arg(long)]
        max_pages: Option<u32>,

        /// Replay recorded responses from a JSON file instead of calling the API.
        /// Needs no keys and leaves the dedup store untouched
        #[arg(long)]
        replay: Option<PathBuf>,
    },

    /// Show credential health
    Keys,

    /// Remove expired dedup records
    Purge {
        /// Retention window; defaults to the configured value
        #[arg(long)]
        older_than_hours: Option<u64>,
    },

    /// List the built-in query strategies
    Strategies,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    let format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    setup_tracing(&format, &config.logging.level, cli.verbose)?;

    tracing::info!("vidscout starting");

    match cli.command {
        Commands::Extract {
            queries,
            strategy,
            workers,
            max_pages,
            replay,
        } => {
            tracing::info!(
                targeted = queries.len(),
                workers = ?workers,
                max_pages = ?max_pages,
                replay = ?replay,
                "Starting extract command"
            );
            extract(config, queries, strategy, workers, max_pages, replay).await?;
        }
        Commands::Keys => keys(&config)?,
        Commands::Purge { older_than_hours } => purge(&config, older_than_hours)?,
        Commands::Strategies => strategies(),
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("vidscout=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_new(format!("vidscout={level},warn"))
            .context("Invalid log level")?
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}

fn build_pool(config: &Config) -> Result<Arc<CredentialPool>> {
    let specs = ChainedCredentialSource::from_config(&config.credentials)
        .load()
        .context("Failed to load credentials")?;
    if specs.is_empty() {
        anyhow::bail!(
            "No API keys found; set {}_1, {}_2, ... or credentials.keys in the config file",
            config.credentials.env_prefix,
            config.credentials.env_prefix
        );
    }

    Ok(Arc::new(CredentialPool::new(
        specs,
        PoolSettings::from(&config.credentials),
    )))
}

async fn extract(
    mut config: Config,
    queries: Vec<String>,
    strategy: Strategy,
    workers: Option<usize>,
    max_pages: Option<u32>,
    replay: Option<PathBuf>,
) -> Result<()> {
    if let Some(workers) = workers {
        config.extraction.workers = workers;
    }
    if let Some(max_pages) = max_pages {
        config.extraction.max_pages_per_query = max_pages;
    }

    let (pool, provider, dedup) = match replay {
        Some(path) => (
            Arc::new(CredentialPool::new(
                vec![CredentialSpec::new("replay", config.credentials.daily_quota)],
                PoolSettings::from(&config.credentials),
            )),
            Arc::new(ScriptedProvider::load_fixture(&path)?) as SharedSearchProvider,
            Arc::new(InMemoryDeduplicator::new()) as SharedDeduplicator,
        ),
        None => (
            build_pool(&config)?,
            Arc::new(YouTubeProvider::from_config(&config)?) as SharedSearchProvider,
            Arc::new(
                SqliteDeduplicator::new(&config.dedup.sqlite_path)
                    .context("Failed to open dedup store")?,
            ) as SharedDeduplicator,
        ),
    };
    let executor = Arc::new(RequestExecutor::new(provider, Arc::clone(&pool), &config.executor));
    let sink = Arc::new(
        JsonlSink::open(&config.sink.output_path)
            .await
            .context("Failed to open output file")?,
    );

    let mut orchestrator = ExtractionOrchestrator::new(
        executor,
        dedup,
        ContentScorer::new(&config.scoring)?,
        sink,
    );
    if config.dedup.purge_on_start {
        orchestrator = orchestrator.with_purge(config.dedup.retention());
    }
    let orchestrator = Arc::new(orchestrator);

    let queries = if queries.is_empty() {
        default_strategies(chrono::Utc::now())
    } else {
        targeted(&queries, strategy)
    };

    let run_id = orchestrator.start(queries, RunConfig::from_config(&config))?;
    println!("Run {run_id} started, writing to {}", config.sink.output_path.display());

    let stopper = Arc::clone(&orchestrator);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\nStopping after in-flight queries...");
            stopper.stop();
        }
    });

    let snapshot = orchestrator.wait().await?;
    print_summary(&snapshot);
    print_health(&pool);

    if snapshot.status == RunStatus::Failed {
        anyhow::bail!(
            "Run failed: {}",
            snapshot.failure_reason.as_deref().unwrap_or("unknown")
        );
    }
    Ok(())
}

fn keys(config: &Config) -> Result<()> {
    let pool = build_pool(config)?;
    print_health(&pool);
    Ok(())
}

fn purge(config: &Config, older_than_hours: Option<u64>) -> Result<()> {
    let retention = older_than_hours
        .map(|h| Duration::from_secs(h * 3600))
        .unwrap_or_else(|| config.dedup.retention());

    let dedup = SqliteDeduplicator::new(&config.dedup.sqlite_path)
        .context("Failed to open dedup store")?;
    let purged = dedup.purge_older_than(retention)?;
    let remaining = dedup.len()?;

    tracing::info!(purged, remaining, "Dedup purge finished");
    println!("Purged {purged} records older than {}h ({remaining} remaining)", retention.as_secs() / 3600);
    Ok(())
}

fn strategies() {
    for query in default_strategies(chrono::Utc::now()) {
        let window = query
            .published_after
            .map(|at| format!(" (since {})", at.format("%Y-%m-%d")))
            .unwrap_or_default();
        println!("{:<10} {}{}", query.strategy, query.text, window);
    }
}

fn print_summary(snapshot: &RunSnapshot) {
    let c = &snapshot.counters;
    println!("\nRun {} {}", snapshot.run_id, snapshot.status);
    println!(
        "  queries:   {} succeeded, {} failed, {} skipped",
        c.queries_succeeded, c.queries_failed, c.queries_skipped
    );
    println!("  pages:     {}", c.pages_fetched);
    println!("  seen:      {}", c.candidates_seen);
    println!(
        "  accepted:  {} ({:.1}% of scored)",
        c.accepted,
        c.acceptance_rate() * 100.0
    );
    println!("  duplicate: {}", c.filtered_by_dedup);
    println!("  rejected:  {}", c.filtered_by_score);
    println!("  errored:   {}", c.errored);
    println!("  quota:     {} units", c.quota_units);

    for outcome in snapshot.outcomes.iter().filter(|o| !o.succeeded && !o.skipped) {
        println!(
            "  failed query {:?}: {}",
            outcome.query,
            outcome.error.as_deref().unwrap_or("unknown error")
        );
    }
}

fn print_health(pool: &CredentialPool) {
    println!("\nCredentials:");
    for health in pool.health() {
        println!(
            "  {:<8} {}  {:<9} {:>6}/{:<6} failures={}",
            health.id,
            health.fingerprint,
            health.status.as_str(),
            health.used,
            health.quota,
            health.consecutive_failures
        );
    }
}
