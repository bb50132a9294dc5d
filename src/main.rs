use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use yoyaku::config::Config;
use yoyaku::discovery::CatalogClient;
use yoyaku::engine::Engine;
use yoyaku::executor::Executor;
use yoyaku::pipeline::IntakePipeline;
use yoyaku::publish::CmsClient;
use yoyaku::rewrite;

#[derive(Parser)]
#[command(
    name = "yoyaku",
    version,
    about = "Publish scheduling and deduplication engine for automated CMS posting",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a TOML config file (environment variables are used otherwise)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true, default_value = "text")]
    log_format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Show schedule, registry, and cursor status
    Status,

    /// Discover new candidates and schedule them into publish slots
    Harvest {
        /// Override how many new candidates this run should take
        #[arg(short = 'n', long)]
        count: Option<u64>,
    },

    /// Execute the single next due entry
    ExecuteNext,

    /// Execute due entries until none remain or the batch bounds are hit
    ExecuteBatch {
        /// Maximum entries this invocation may execute
        #[arg(short, long)]
        max_items: Option<usize>,

        /// Wall-clock budget in seconds
        #[arg(long)]
        time_budget_secs: Option<u64>,
    },

    /// Re-enqueue today's recoverable failed entries
    Recover,

    /// Drop scheduled entries stranded in the past
    Cleanup,

    /// Remove expired file-tier cache entries
    SweepCache,

    /// Reset the discovery offset back to 1
    ResetOffset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },

    /// Clear the posted-id registry (destructive: every id becomes
    /// publishable again)
    ResetRegistry {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_tracing(&cli.log_format, cli.verbose)?;

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    tracing::info!("yoyaku starting");

    match cli.command {
        Commands::Status => status(config)?,
        Commands::Harvest { count } => harvest(config, count).await?,
        Commands::ExecuteNext => execute_next(config).await?,
        Commands::ExecuteBatch {
            max_items,
            time_budget_secs,
        } => execute_batch(config, max_items, time_budget_secs).await?,
        Commands::Recover => recover(config)?,
        Commands::Cleanup => cleanup(config)?,
        Commands::SweepCache => sweep_cache(config)?,
        Commands::ResetOffset { yes } => reset_offset(config, yes)?,
        Commands::ResetRegistry { yes } => reset_registry(config, yes)?,
    }

    tracing::info!("yoyaku finished");
    Ok(())
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("yoyaku=debug,info")
    } else {
        tracing_subscriber::EnvFilter::new("yoyaku=info,warn")
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

fn status(config: Config) -> Result<()> {
    let engine = Engine::open(config)?;
    let report = engine.status(Utc::now());
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn harvest(config: Config, count: Option<u64>) -> Result<()> {
    let mut engine = Engine::open(config)?;

    let discovery_config = engine.config().discovery.clone();
    let rewrite_config = engine.config().rewrite.clone();
    let required = count.unwrap_or(discovery_config.required_count);

    let catalog = CatalogClient::new(&discovery_config)?;
    let rewriter = rewrite::from_config(&rewrite_config)?;

    let mut pipeline = IntakePipeline::new(
        &catalog,
        rewriter.as_ref(),
        &engine.registry,
        &mut engine.manager,
        &engine.cursor,
        &engine.cache,
        &discovery_config,
    );

    let report = pipeline.run(required, Utc::now()).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn execute_next(config: Config) -> Result<()> {
    let mut engine = Engine::open(config)?;
    let buffer = engine.config().scheduler.due_buffer();
    let publisher = CmsClient::new(&engine.config().publisher)?;

    let mut executor = Executor::new(&mut engine.manager, &mut engine.registry, &publisher);
    let outcome = executor.execute_next(Utc::now(), buffer).await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

async fn execute_batch(
    config: Config,
    max_items: Option<usize>,
    time_budget_secs: Option<u64>,
) -> Result<()> {
    let mut engine = Engine::open(config)?;
    let buffer = engine.config().scheduler.due_buffer();
    let max_items = max_items.unwrap_or(engine.config().executor.max_batch_items);
    let time_budget = time_budget_secs
        .map(std::time::Duration::from_secs)
        .unwrap_or_else(|| engine.config().executor.time_budget());
    let publisher = CmsClient::new(&engine.config().publisher)?;

    let mut executor = Executor::new(&mut engine.manager, &mut engine.registry, &publisher);
    let summary = executor.execute_batch(max_items, time_budget, buffer).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn recover(config: Config) -> Result<()> {
    let mut engine = Engine::open(config)?;
    let count = engine.manager.reschedule_failed(Utc::now())?;
    println!("rescheduled {count} failed entries");
    Ok(())
}

fn cleanup(config: Config) -> Result<()> {
    let mut engine = Engine::open(config)?;
    let removed = engine.cleanup(Utc::now())?;
    println!("removed {removed} stale entries");
    Ok(())
}

fn sweep_cache(config: Config) -> Result<()> {
    let engine = Engine::open(config)?;
    let removed = engine.cache.sweep(Utc::now());
    println!("removed {removed} expired cache files");
    Ok(())
}

fn reset_offset(config: Config, yes: bool) -> Result<()> {
    if !yes {
        eprintln!("reset-offset restarts discovery from the beginning; re-run with --yes");
        return Ok(());
    }

    let engine = Engine::open(config)?;
    engine.cursor.reset(Utc::now())?;
    println!("search offset reset to 1");
    Ok(())
}

fn reset_registry(config: Config, yes: bool) -> Result<()> {
    if !yes {
        eprintln!(
            "reset-registry clears the dedup registry; every id becomes publishable again. \
             Re-run with --yes"
        );
        return Ok(());
    }

    let mut engine = Engine::open(config)?;
    let previous = engine.registry.posted_count();
    engine.registry.reset()?;
    println!("posted-id registry cleared ({previous} ids removed)");
    Ok(())
}
