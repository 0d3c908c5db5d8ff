// Copyright 2026 Case Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use case_harvest::cli::{self, output};
use case_harvest::config::{DetailSourceKind, HarvestConfig};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "case-harvest",
    about = "Case Harvest: capture and normalize weapon-case contents",
    version,
    after_help = "Run 'case-harvest <command> --help' for details on each command."
)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output results and logs as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Show the browser window
    #[arg(long, global = true)]
    headed: bool,

    /// Upstream proxy, `[user:pass@]host:port`
    #[arg(long, global = true)]
    proxy: Option<String>,

    /// Directory for JSON dumps
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Do not write JSON dumps
    #[arg(long, global = true)]
    no_file: bool,

    /// Do not write to the store
    #[arg(long, global = true)]
    no_db: bool,

    /// Pause between parents in milliseconds
    #[arg(long, global = true)]
    delay_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest the container list into the parent table
    Containers,
    /// Harvest container contents
    Details {
        /// Parent (container) ids to harvest
        ids: Vec<i64>,
        /// Harvest every eligible parent in the store
        #[arg(long, conflicts_with = "ids")]
        all: bool,
        /// Detail source (defaults to the configured one)
        #[arg(long, value_enum)]
        source: Option<DetailSourceKind>,
    },
    /// Run a registered harvester, or all of them
    Run {
        /// Harvester name (see `list`)
        name: Option<String>,
    },
    /// List registered harvesters
    List,
    /// Check environment and diagnose issues
    Doctor,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

impl Cli {
    fn apply(&self, config: &mut HarvestConfig) {
        if self.headed {
            config.crawler.headless = false;
        }
        if let Some(proxy) = &self.proxy {
            config.crawler.proxy = Some(proxy.clone());
        }
        if let Some(dir) = &self.output_dir {
            config.crawler.output_dir = dir.clone();
        }
        if self.no_file {
            config.crawler.save_to_file = false;
        }
        if self.no_db {
            config.crawler.save_to_db = false;
        }
        if let Some(delay) = self.delay_ms {
            config.crawler.delay_ms = delay;
        }
    }
}

async fn dispatch(cli: &Cli) -> Result<()> {
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "case-harvest", &mut std::io::stdout());
        return Ok(());
    }

    let mut config = HarvestConfig::load(cli.config.as_deref())?;
    cli.apply(&mut config);

    match &cli.command {
        Commands::Doctor => cli::doctor::run(&config).await,
        Commands::List => cli::harvest_cmd::list(&config),
        command => {
            config.validate()?;
            match command {
                Commands::Containers => cli::harvest_cmd::containers(&config).await,
                Commands::Details { ids, all, source } => {
                    cli::harvest_cmd::details(&config, ids, *all, *source).await
                }
                Commands::Run { name } => cli::harvest_cmd::run(&config, name.as_deref()).await,
                Commands::List | Commands::Doctor | Commands::Completions { .. } => Ok(()),
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    output::init(cli.json, cli.quiet);
    cli::logging::init(cli.json, cli.verbose, cli.quiet)?;

    let result = dispatch(&cli).await;

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        if output::is_json() {
            output::print_json(&serde_json::json!({
                "error": true,
                "message": format!("{e:#}"),
            }));
        } else if !output::is_quiet() {
            eprintln!("  Error: {e:#}");
        }
        std::process::exit(1);
    }

    result
}
