mod acceptance;
mod cli;
mod commands;
mod config;
mod paths;
mod progress;
mod state;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use config::ProviderConfig;
use gocdkit::GocdClient;
use std::io;
use std::path::PathBuf;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    /// `--state` as given
    pub state: Option<String>,
    /// Connection settings from flags; env and settings file fill the rest
    pub provider: ProviderConfig,
}

impl Context {
    pub fn state_file(&self) -> Result<PathBuf> {
        paths::state_file(self.state.as_deref())
    }

    /// Open a client for the configured server
    pub fn client(&self) -> Result<GocdClient> {
        let settings = paths::provider_file()?;
        let config = config::resolve_provider(self.provider.clone(), &settings)?;
        log::info!("Using GoCD server {}", config.base_url());
        Ok(GocdClient::new(config)?)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        state: cli.state,
        provider: cli.provider.into(),
    };

    match cli.command {
        Command::Plan(args) => commands::plan::run(&ctx, &args),
        Command::Apply(args) => commands::apply::run(&ctx, &args),
        Command::Destroy(args) => commands::destroy::run(&ctx, &args),
        Command::Import { kind, id } => commands::import::run(&ctx, &kind, id.as_deref()),
        Command::VerifyDestroyed { kind, id } => commands::verify::run(&ctx, &kind, &id),
        Command::Check { scenario } => commands::check::run(&ctx, &scenario),
        Command::Completions { shell } => {
            generate(shell, &mut Cli::command(), "pipewright", &mut io::stdout());
            Ok(())
        }
    }
}
