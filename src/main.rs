//! flowprobe - conformance test runner for a workflow server's HTTP interface
//!
//! Runs a dependency-ordered suite of command tests against the server and
//! waits on asynchronously executing tasks with bounded polling.

use std::path::PathBuf;

use clap::Parser;
use flowprobe::commands::Commands;
use flowprobe::common::config::Config;
use flowprobe::common::{logging, Result};
use flowprobe::cli;

#[derive(Parser)]
#[command(name = "flowprobe", about = "Conformance tests for a workflow server's HTTP API")]
#[command(version, long_about = None)]
struct Cli {
    /// Configuration file (default: the user config file when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override server.base_url
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Override poll.interval_ms
    #[arg(long, global = true)]
    poll_interval_ms: Option<u64>,

    /// Override poll.max_attempts
    #[arg(long, global = true)]
    max_attempts: Option<u32>,

    /// Also write logs to run.log in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Defaults to `smoke`
    #[command(subcommand)]
    command: Option<Commands>,
}

impl Cli {
    fn config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;
        if let Some(url) = &self.base_url {
            config.server.base_url = url.clone();
        }
        if let Some(ms) = self.poll_interval_ms {
            config.poll.interval_ms = ms;
        }
        if let Some(n) = self.max_attempts {
            config.poll.max_attempts = n;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let _guard = logging::init_cli(cli.verbose, cli.log_dir.as_deref());

    let result = match cli.config() {
        Ok(config) => cli::dispatch(cli.command.unwrap_or(Commands::Smoke), &config).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        if e.is_construction_error() {
            eprintln!("Error in suite definition: {e}");
        } else {
            eprintln!("Error: {e}");
        }
        std::process::exit(1);
    }
}
