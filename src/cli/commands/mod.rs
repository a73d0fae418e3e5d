//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod config_cmd;
mod helpers;
mod history;
mod init;
mod job;
mod watch;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{load_settings, LoadOptions};
use crate::models::JobType;

#[derive(Parser)]
#[command(name = "leadscout")]
#[command(about = "Prospect discovery from CRM search submissions")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory holding history, reports and the local database
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and local database
    Init,

    /// Open the CRM in a browser and run every search submitted there
    Watch {
        /// Login page to open (overrides LOGIN_URL)
        #[arg(long)]
        login_url: Option<String>,
        /// Run the browser without a window
        #[arg(long)]
        headless: bool,
        /// Attach to an existing browser's DevTools endpoint
        #[arg(long)]
        remote: Option<String>,
    },

    /// Run one search job directly, without the browser
    Run {
        /// Kind of records to extract
        #[arg(short = 't', long = "type", value_enum, default_value_t = JobType::People)]
        job_type: JobType,
        /// Search filters as a JSON object
        #[arg(short, long)]
        filters: String,
        /// Total matching entries reported by the search
        #[arg(short = 'n', long)]
        total: u64,
        /// User id recorded as the job's creator
        #[arg(long)]
        created_by: Option<String>,
        /// Forget any previous run of this query first
        #[arg(long)]
        force: bool,
    },

    /// Print the fingerprint of a query and whether it already ran
    Fingerprint {
        #[arg(short = 't', long = "type", value_enum, default_value_t = JobType::People)]
        job_type: JobType,
        /// Search filters as a JSON object
        filters: String,
    },

    /// Inspect or edit the query history
    History {
        #[command(subcommand)]
        command: HistoryCommands,
    },

    /// Show resolved configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum HistoryCommands {
    /// List recorded queries, most recent first
    List {
        /// Maximum entries to show (0 = all)
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Show one entry (fingerprint or unique prefix)
    Show { fingerprint: String },
    /// Remove one entry so the query can run again
    Forget { fingerprint: String },
    /// Remove every entry
    Clear {
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective settings (secrets omitted)
    Show,
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
        data_dir: cli.data_dir,
    };
    let (mut settings, config) = load_settings(options)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    match cli.command {
        Commands::Init => init::cmd_init(&settings).await,
        Commands::Watch {
            login_url,
            headless,
            remote,
        } => {
            if headless {
                settings.browser.headless = true;
            }
            if remote.is_some() {
                settings.browser.remote_url = remote;
            }
            watch::cmd_watch(&settings, login_url).await
        }
        Commands::Run {
            job_type,
            filters,
            total,
            created_by,
            force,
        } => job::cmd_run(&settings, job_type, &filters, total, created_by, force).await,
        Commands::Fingerprint { job_type, filters } => {
            job::cmd_fingerprint(&settings, job_type, &filters)
        }
        Commands::History { command } => match command {
            HistoryCommands::List { limit } => history::cmd_history_list(&settings, limit),
            HistoryCommands::Show { fingerprint } => {
                history::cmd_history_show(&settings, &fingerprint)
            }
            HistoryCommands::Forget { fingerprint } => {
                history::cmd_history_forget(&settings, &fingerprint)
            }
            HistoryCommands::Clear { yes } => history::cmd_history_clear(&settings, yes),
        },
        Commands::Config { command } => match command {
            ConfigCommands::Show => config_cmd::cmd_config_show(&settings, &config),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_command() {
        let cli = Cli::try_parse_from([
            "leadscout",
            "run",
            "--type",
            "companies",
            "--filters",
            r#"{"q":"x"}"#,
            "-n",
            "40",
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                job_type, total, ..
            } => {
                assert_eq!(job_type, JobType::Companies);
                assert_eq!(total, 40);
            }
            _ => panic!("expected run command"),
        }
    }
}
