//! meridian: drive the scheduling framework from the command line.
//!
//! ```text
//! meridian [--log-json] simulate --cluster nodes.json --workload api.json [--profile p.toml] [--format json] [--metrics]
//! meridian plugins [--format json]
//! meridian validate --profile p.toml
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "meridian",
    about = "Meridian — pluggable workload scheduling framework",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one scheduling cycle for a workload against a cluster snapshot.
    Simulate {
        /// Scheduling profile (TOML). Defaults to the built-in profile.
        #[arg(short, long)]
        profile: Option<PathBuf>,
        /// Cluster snapshot: JSON array of nodes.
        #[arg(short, long)]
        cluster: PathBuf,
        /// Workload to place (JSON).
        #[arg(short, long)]
        workload: PathBuf,
        /// Output format: text or json
        #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
        format: String,
        /// Print the cycle's metrics in Prometheus text format.
        #[arg(long)]
        metrics: bool,
    },
    /// List the built-in plugins and their extension points.
    Plugins {
        /// Output format: text or json
        #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
        format: String,
    },
    /// Check that a profile parses and resolves against the built-in plugins.
    Validate {
        #[arg(short, long)]
        profile: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json)?;

    match cli.command {
        Commands::Simulate {
            profile,
            cluster,
            workload,
            format,
            metrics,
        } => {
            let args = commands::simulate::SimulateArgs {
                profile,
                cluster,
                workload,
                format,
                metrics,
            };
            commands::simulate::simulate(args).await
        }
        Commands::Plugins { format } => commands::plugins::list(&format),
        Commands::Validate { profile } => commands::validate::validate(&profile),
    }
}

fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive("meridian=info".parse()?);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}
