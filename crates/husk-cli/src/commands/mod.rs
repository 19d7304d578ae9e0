//! CLI command definitions and dispatch.

pub mod run;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use husk_common::config::HuskConfig;
use husk_common::types::CleanupPolicy;

/// husk: run a command inside a throwaway isolated root filesystem.
#[derive(Parser, Debug)]
#[command(name = "husk", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// JSON configuration file.
    #[arg(long, global = true, env = "HUSK_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Keep the staging root after the run and log its path.
    #[arg(long, global = true)]
    pub keep_root: bool,

    /// Registry base URL, e.g. `https://registry-1.docker.io`.
    #[arg(long, global = true, value_name = "URL")]
    pub registry: Option<String>,

    /// Token endpoint of the registry.
    #[arg(long, global = true, value_name = "URL")]
    pub auth_url: Option<String>,
}

impl Cli {
    /// Effective configuration: defaults, then the config file, then the
    /// environment, then flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file or an environment value is invalid.
    pub fn load_config(&self) -> anyhow::Result<HuskConfig> {
        let mut config = HuskConfig::load(self.config.as_deref())?;
        if self.keep_root {
            config.cleanup = CleanupPolicy::Keep;
        }
        if let Some(url) = &self.registry {
            config.registry.registry_url.clone_from(url);
        }
        if let Some(url) = &self.auth_url {
            config.registry.auth_url.clone_from(url);
        }
        tracing::debug!(?config, "configuration loaded");
        Ok(config)
    }
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a command in an isolated root built from an image or host binary.
    Run(run::RunArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if configuration or the command fails.
pub fn execute(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = cli.load_config()?;
    match cli.command {
        Command::Run(args) => run::execute(args, &config),
    }
}
