use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{ClockArgs, RunArgs, SignalArgs};

#[derive(Parser)]
#[command(name = "optrade")]
#[command(about = "Intraday options signal-and-cycle engine", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Append logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine for the configured subscriptions
    Run(RunArgs),
    /// Print the indicator table and decision for a candle CSV
    Signal(SignalArgs),
    /// Print the current and next bucket for an interval
    Clock(ClockArgs),
}

fn init_logging(json: bool, file: Option<&PathBuf>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match (file, json) {
        (Some(path), json) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            let builder = builder.with_ansi(false).with_writer(std::sync::Mutex::new(file));
            if json {
                builder.json().init();
            } else {
                builder.init();
            }
        }
        (None, true) => builder.json().init(),
        (None, false) => builder.init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json, cli.log_file.as_ref())?;

    match cli.command {
        Commands::Run(args) => commands::run_engine(args).await?,
        Commands::Signal(args) => commands::run_signal(&args)?,
        Commands::Clock(args) => commands::run_clock(&args)?,
    }

    Ok(())
}
