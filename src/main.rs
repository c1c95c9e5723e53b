//! pktgraph - command-line driver
//!
//! Builds a router from a TOML or JSON description, runs it, and prints
//! handler values.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pktgraph::{config::RouterConfig, ElementRegistry, Router};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build a router from CONFIG and run it
    Run {
        /// Router description (.toml or .json)
        config: PathBuf,

        /// Stop after this many milliseconds instead of running until idle or stopped
        #[arg(short, long)]
        duration_ms: Option<u64>,

        /// Read handlers to print after the run, as element.handler
        #[arg(short, long = "read", value_name = "ELEMENT.HANDLER")]
        reads: Vec<String>,
    },

    /// Configure and resolve CONFIG without running it
    Check {
        /// Router description (.toml or .json)
        config: PathBuf,
    },

    /// List the element classes this build knows
    Classes,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,pktgraph=debug")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let registry = ElementRegistry::with_builtins();

    match cli.command {
        Command::Run {
            config,
            duration_ms,
            reads,
        } => run(&registry, &config, duration_ms, &reads),
        Command::Check { config } => check(&registry, &config),
        Command::Classes => {
            for class in registry.classes() {
                println!("{}", class);
            }
            Ok(())
        }
    }
}

fn build(registry: &ElementRegistry, path: &PathBuf) -> Result<Router> {
    let config = RouterConfig::load(path)?;
    let router = Router::from_config(&config, registry)
        .with_context(|| format!("Failed to build router from {}", path.display()))?;
    Ok(router)
}

fn run(
    registry: &ElementRegistry,
    path: &PathBuf,
    duration_ms: Option<u64>,
    reads: &[String],
) -> Result<()> {
    let mut router = build(registry, path)?;
    router.initialize().context("Failed to initialize router")?;

    match duration_ms {
        Some(ms) => router.run_for(Duration::from_millis(ms))?,
        None => router.run()?,
    }

    for path in reads {
        let value = router
            .read_handler(path)
            .with_context(|| format!("Failed to read {}", path))?;
        println!("{}: {}", path, value);
    }

    router.uninitialize();
    Ok(())
}

fn check(registry: &ElementRegistry, path: &PathBuf) -> Result<()> {
    let mut router = build(registry, path)?;
    router.resolve().context("Router does not resolve")?;

    let plan = router
        .plan()
        .context("Router resolved without a plan")?;
    for connection in router.connections() {
        let mode = plan
            .connection_mode(connection.id)
            .map_or_else(|| "?".to_string(), |m| m.to_string());
        println!(
            "{} {:<4} {}",
            connection.id,
            mode,
            router.describe_connection(connection)
        );
    }
    println!(
        "{} elements, {} connections ({} push, {} pull)",
        plan.stats.elements,
        plan.stats.connections,
        plan.stats.push_connections,
        plan.stats.pull_connections
    );
    Ok(())
}
