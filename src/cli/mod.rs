pub mod commands;
pub mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

use crate::cli::config::CrawlerConfig;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Configuration file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and scrape a range of candidate profiles
    Crawl {
        /// First candidate id
        #[arg(short, long)]
        start: Option<u32>,

        /// Last candidate id (inclusive)
        #[arg(short, long)]
        end: Option<u32>,

        /// Profiles fetched concurrently per batch
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Directory for candidates.csv and candidates.json
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Show the effective configuration
    Config {
        /// Print the default configuration path instead
        #[arg(short, long)]
        path: bool,
    },
}

/// Parse command line arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Process the command
pub async fn process_command(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Crawl {
            start,
            end,
            batch_size,
            output_dir,
        } => {
            let mut config = CrawlerConfig::load(cli.config.as_deref())?;

            if let Some(start) = start {
                config.crawler.start_id = start;
            }
            if let Some(end) = end {
                config.crawler.end_id = end;
            }
            if let Some(batch_size) = batch_size {
                config.crawler.batch_size = batch_size;
            }
            if let Some(dir) = output_dir {
                config.output.directory = dir;
            }

            info!(
                "Starting crawl of ids {}-{} against {}",
                config.crawler.start_id, config.crawler.end_id, config.site.base_url
            );
            commands::crawl(config).await
        }
        Commands::Config { path } => {
            if path {
                println!("{}", CrawlerConfig::default_path().display());
                Ok(ExitCode::SUCCESS)
            } else {
                let config = CrawlerConfig::load(cli.config.as_deref())?;
                commands::show_config(&config)?;
                Ok(ExitCode::SUCCESS)
            }
        }
    }
}
