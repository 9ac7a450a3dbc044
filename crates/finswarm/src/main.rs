use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use finswarm::models::FinswarmConfig;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "finswarm", about = "Multi-agent financial question answering")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "config/finswarm.toml")]
    config: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Answer one question with the agent graph
    Run {
        #[arg(
            short,
            long,
            default_value = "Compare NVIDIA's revenue growth from 2023 to 2024."
        )]
        query: String,

        /// Pretty-print the output JSON
        #[arg(long)]
        pretty: bool,
    },
    /// Score a benchmark results file and write `<file>_scored.json`
    Evaluate { input: PathBuf },
    /// Report whether the model CLI and the RAG data are available
    Check,
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let output = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{output}");
    Ok(())
}

async fn run(config: &FinswarmConfig, query: &str, pretty: bool) -> Result<()> {
    let swarm = finswarm::build_graph(config).context("Failed to build agent graph")?;

    swarm
        .adapter
        .initialize()
        .await
        .map_err(|e| anyhow::anyhow!("Retrieval backend unavailable: {e}"))?;

    let report = swarm
        .graph
        .run(query)
        .await
        .map_err(|e| anyhow::anyhow!("Run failed: {e}"))?;

    print_json(&report, pretty)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing (respects RUST_LOG env var)
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    }

    let config = finswarm::load_config(&cli.config)?;

    match cli.command {
        Command::Run { query, pretty } => run(&config, &query, pretty).await,
        Command::Evaluate { input } => {
            let (metrics, output) = finswarm::eval::evaluate_file(&input)?;
            print_json(&metrics, true)?;
            eprintln!("Scored results written to {}", output.display());
            Ok(())
        }
        Command::Check => {
            let report = finswarm::check_environment(&config).await;
            print_json(&report, true)?;
            if !report.is_ready() {
                anyhow::bail!("Environment not ready");
            }
            Ok(())
        }
    }
}
