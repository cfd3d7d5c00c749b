//! Cellgraph command-line front end.
//!
//! Usage:
//!   cellgraph run [--memory]      Start the worker pools, read submissions from stdin
//!   cellgraph submit --input ...  Queue one submission in the configured store
//!   cellgraph status              Show queue depths and learned graph size
//!   cellgraph inspect [<id>]      Show a behaviour's binding and connections
//!   cellgraph init                Write a default config file

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{info, warn};

use cellgraph::cells;
use cellgraph::config::{self, EngineConfig};
use cellgraph::graph::keys;
use cellgraph::state::{MemoryStore, SqliteStore, Store};
use cellgraph::types::*;
use cellgraph::Engine;

const CONFIG_FILE: &str = "cellgraph.toml";

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "cellgraph")]
#[command(version = "0.1.0")]
#[command(about = "Self-wiring computation graph engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to cellgraph home directory.
    #[arg(long, default_value = "~/.cellgraph")]
    home: String,

    /// Log level (debug, info, warn, error). Overrides the config file.
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start both worker pools and feed them JSON submissions from stdin.
    Run {
        /// Use a throwaway in-memory store instead of the database.
        #[arg(long)]
        memory: bool,
    },

    /// Append one submission to the durable input queue.
    Submit {
        #[arg(long)]
        input: String,

        #[arg(long)]
        session: String,

        #[arg(long)]
        expectation: Option<String>,

        /// Send the input straight to the output cell.
        #[arg(long)]
        echo: bool,
    },

    /// Show queue depths and the size of the learned graph.
    Status,

    /// Show a behaviour's cell and successors (a random one if no id is given).
    Inspect { behaviour_id: Option<String> },

    /// Write a default config file.
    Init,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let home_dir = PathBuf::from(shellexpand::tilde(&cli.home).into_owned());
    let config_path = home_dir.join(CONFIG_FILE);
    let cfg = config::load_config(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    // Initialize logging
    let level = cli.log_level.clone().unwrap_or_else(|| cfg.log_level.clone());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run { memory } => cmd_run(cfg, memory).await,
        Commands::Submit {
            input,
            session,
            expectation,
            echo,
        } => {
            let mut submission = Submission::new(input, session);
            submission.expectation = expectation;
            submission.echo = echo;
            cmd_submit(cfg, submission).await
        }
        Commands::Status => cmd_status(cfg).await,
        Commands::Inspect { behaviour_id } => cmd_inspect(cfg, behaviour_id).await,
        Commands::Init => cmd_init(&config_path),
    }
}

// ---------------------------------------------------------------------------
// Command implementations
// ---------------------------------------------------------------------------

async fn cmd_run(cfg: EngineConfig, memory: bool) -> Result<()> {
    let store: Arc<dyn Store> = if memory {
        Arc::new(MemoryStore::new())
    } else {
        open_store(&cfg)?
    };
    let engine = build_engine(cfg, store)?;

    println!(
        "{} Starting cellgraph ({} cells, {} event workers{})",
        ">>>".green().bold(),
        engine.registry().len(),
        engine.config().event_workers,
        if memory { ", in-memory" } else { "" },
    );

    for cell in engine.registry().cells() {
        println!("    {:<16} {}", cell.name().cyan(), cell.signature());
    }

    let handle = engine.start();
    let cancel = handle.cancel_token();

    let printer = tokio::spawn(print_events(engine.subscribe(), cancel.clone()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\n{} Interrupted", "<<<".red().bold());
                break;
            }
            line = lines.next_line() => match line.context("Failed to read stdin")? {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => match serde_json::from_str::<Submission>(&line) {
                    Ok(submission) => engine.submit(&submission).await?,
                    Err(e) => warn!("Ignoring malformed submission: {e}"),
                },
                None => {
                    info!("Input closed, draining queues");
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = wait_idle(&engine) => {}
                    }
                    break;
                }
            },
        }
    }

    println!("{} Shutting down gracefully...", "<<<".red().bold());
    let shutdown_timeout = Duration::from_secs(10);
    if tokio::time::timeout(shutdown_timeout, handle.shutdown()).await.is_err() {
        warn!("Workers did not stop within {:?}", shutdown_timeout);
    }
    if let Err(e) = printer.await {
        warn!("Printer task join error: {e}");
    }

    info!("Shutdown complete");
    Ok(())
}

async fn cmd_submit(cfg: EngineConfig, submission: Submission) -> Result<()> {
    let store = open_store(&cfg)?;
    let engine = build_engine(cfg, store)?;
    engine.submit(&submission).await?;

    println!(
        "{} Queued {:?} for session {}",
        ">>>".green().bold(),
        submission.input,
        submission.session_id.cyan(),
    );
    Ok(())
}

async fn cmd_status(cfg: EngineConfig) -> Result<()> {
    let db_path = cfg.resolved_db_path();
    let store = open_store(&cfg)?;

    let inputs = store.len(keys::INPUT_QUEUE).await?;
    let events = store.len(keys::EVENT_QUEUE).await?;
    let connection_sets = store.count_keys(&keys::connections("*")).await?;
    let behaviours = store.count_keys(&keys::binding("*")).await?;
    let trees = store.count_keys(&keys::first_behaviour("*")).await?;
    let information = store.count_keys(&keys::information("*")).await?;

    println!();
    println!("{}", "=== Cellgraph Status ===".bold());
    println!();
    println!("  {}:  {}", "Store".bold(), db_path);
    println!("  {}:", "Queues".bold());
    println!("    Inputs:    {}", colorize_depth(inputs));
    println!("    Events:    {}", colorize_depth(events));
    println!();
    println!("  {}:", "Graph".bold());
    println!("    Behaviours:      {}", behaviours);
    println!("    Connection sets: {}", connection_sets);
    println!("    Trees:           {}", trees);
    println!("    Information:     {}", information);
    println!();
    println!("  Checked at {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));

    Ok(())
}

async fn cmd_inspect(cfg: EngineConfig, behaviour_id: Option<String>) -> Result<()> {
    let store = open_store(&cfg)?;
    let engine = build_engine(cfg, store.clone())?;
    let graph = engine.graph();

    let behaviour_id = match behaviour_id {
        Some(id) => id,
        None => {
            let pattern = keys::connections("*");
            let key = match store.random_key(&pattern).await {
                Ok(key) => key,
                Err(e) if e.is_not_found() => {
                    println!("Nothing learned yet.");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            };
            behaviour_id_from_key(&key)
                .with_context(|| format!("Unexpected connection key: {key}"))?
                .to_string()
        }
    };

    let cell = match graph.binding(&behaviour_id).await {
        Ok(cell) => cell,
        Err(e) if e.is_not_found() => "(unbound)".to_string(),
        Err(e) => return Err(e.into()),
    };

    println!();
    println!("  {}: {}", "Behaviour".bold(), behaviour_id);
    println!("  {}:      {}", "Cell".bold(), cell.cyan());
    match graph.connections(&behaviour_id).await? {
        None => println!("  {}", "not explored yet".dimmed()),
        Some(successors) if successors.is_empty() => println!("  {}", "dead end".yellow()),
        Some(successors) => {
            println!("  {}:", "Successors".bold());
            for id in successors {
                let cell = graph.binding(&id).await.unwrap_or_else(|_| "(unbound)".into());
                println!("    {id} -> {cell}");
            }
        }
    }
    println!();

    Ok(())
}

fn cmd_init(config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("Config already exists at {}", config_path.display());
        return Ok(());
    }
    config::save_config(&EngineConfig::default(), config_path)?;
    println!("{} Wrote {}", ">>>".green().bold(), config_path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn open_store(cfg: &EngineConfig) -> Result<Arc<dyn Store>> {
    let db_path = cfg.resolved_db_path();
    let store = SqliteStore::open(Path::new(&db_path))
        .with_context(|| format!("Failed to open database at {db_path}"))?;
    Ok(Arc::new(store))
}

fn build_engine(cfg: EngineConfig, store: Arc<dyn Store>) -> Result<Engine> {
    let engine = Engine::builder()
        .config(cfg)
        .store(store)
        .cells(cells::standard_registry)
        .build()?;
    Ok(engine)
}

/// Resolve once both queues stay empty across two polls.
async fn wait_idle(engine: &Engine) {
    let interval = Duration::from_millis(engine.config().poll_interval_ms);
    let mut idle_polls = 0;
    while idle_polls < 2 {
        tokio::time::sleep(interval).await;
        let inputs = engine.input_queue().len().await.unwrap_or(1);
        let events = engine.event_queue().len().await.unwrap_or(1);
        idle_polls = if inputs + events == 0 { idle_polls + 1 } else { 0 };
    }
}

async fn print_events(
    mut events: broadcast::Receiver<EngineEvent>,
    cancel: tokio_util::sync::CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => event,
        };
        match event {
            Ok(EngineEvent::Emitted {
                session_id, output, ..
            }) => println!("{} [{}] {}", "=>".green().bold(), session_id.cyan(), output),
            Ok(EngineEvent::ExpectationNotMet { tree_id, attempt }) => {
                println!("{} tree {} retraversing (attempt {})", "~".yellow(), tree_id, attempt)
            }
            Ok(EngineEvent::RetraversalBudgetExhausted { tree_id, attempts }) => println!(
                "{} tree {} gave up after {} attempts",
                "x".red().bold(),
                tree_id,
                attempts
            ),
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(n)) => warn!("Event printer skipped {n} events"),
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// `behaviour:<id>:connections` → `<id>`.
fn behaviour_id_from_key(key: &str) -> Option<&str> {
    key.strip_prefix("behaviour:")?.strip_suffix(":connections")
}

fn colorize_depth(depth: usize) -> String {
    match depth {
        0 => depth.to_string().green().to_string(),
        1..=99 => depth.to_string().yellow().to_string(),
        _ => depth.to_string().red().to_string(),
    }
}
