mod tui;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use slua_core::{SpriteCli, Worker, WorkerSource};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "slua")]
#[command(version)]
#[command(about = "Slua Sí — control tower for Sprite workers running Claude Code")]
#[command(long_about = "Slua Sí (Irish: \"the fairy host\") — a control tower for observing \
a fleet of Sprite workers running Claude Code.\n\n\
Run without arguments to launch the dashboard.")]
struct Cli {
    /// Organization to use
    #[arg(short = 'o', long, global = true)]
    org: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch the interactive dashboard (the default)
    Dashboard,
    /// Print worker status once and exit
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Attach to a worker's console session
    Connect {
        /// Worker name
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let source = Arc::new(SpriteCli::new(cli.org.clone()));

    match cli.command.unwrap_or(Commands::Dashboard) {
        Commands::Dashboard => tui::run_dashboard(source).await,
        Commands::Status { json } => run_status(source, json).await,
        Commands::Connect { name } => run_connect(source, &name).await,
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run_status(source: Arc<SpriteCli>, json: bool) -> Result<()> {
    let workers = source.list().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&workers)?);
        return Ok(());
    }

    if workers.is_empty() {
        println!("No workers running.");
        return Ok(());
    }

    print_status_table(&workers);
    Ok(())
}

fn print_status_table(workers: &[Worker]) {
    let now = Utc::now();
    let name_width = workers
        .iter()
        .map(|w| w.name.chars().count())
        .chain(["NAME".len()].into_iter())
        .max()
        .unwrap_or(4)
        + 2;

    println!("{:<name_width$}{:<14}{:<11}{}", "NAME", "STATUS", "UPTIME", "REGION");
    println!("{:<name_width$}{:<14}{:<11}{}", "────", "──────", "──────", "──────");
    for worker in workers {
        println!(
            "{:<name_width$}{:<14}{:<11}{}",
            worker.name,
            worker.status.as_str(),
            worker.format_uptime(now),
            worker.region,
        );
    }
}

async fn run_connect(source: Arc<SpriteCli>, name: &str) -> Result<()> {
    let status = source
        .console_cmd(name)
        .status()
        .await
        .with_context(|| format!("launch console for {name}"))?;
    if !status.success() {
        bail!("console for {name} exited with {status}");
    }
    Ok(())
}
