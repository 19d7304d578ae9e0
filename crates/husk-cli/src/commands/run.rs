//! `husk run`: run a command in an isolated root.

use std::io;
use std::process::ExitCode;

use clap::Args;
use husk_common::config::HuskConfig;
use husk_image::reference::ImageReference;
use husk_runtime::engine::{Engine, RunRequest};

use crate::output;

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Build the root from a host binary and its shared libraries instead
    /// of an image. `IMAGE` is then ignored and `COMMAND` is the host path.
    #[arg(long, env = "HUSK_LOCAL", value_parser = clap::builder::FalseyValueParser::new())]
    pub local: bool,

    /// Image reference, e.g. `alpine:latest`.
    pub image: String,

    /// Command to run inside the root.
    pub command: String,

    /// Arguments passed to the command verbatim.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

impl RunArgs {
    /// Turns the arguments into a run request.
    ///
    /// # Errors
    ///
    /// Returns an error if the image reference is malformed.
    pub fn to_request(&self) -> anyhow::Result<RunRequest> {
        if self.local {
            tracing::debug!(image = %self.image, "local mode, image argument ignored");
            return Ok(RunRequest::local(&self.command, self.args.clone()));
        }
        let image = ImageReference::parse(&self.image)?;
        Ok(RunRequest::remote(image, self.command.clone(), self.args.clone()))
    }
}

/// Executes the `run` command.
///
/// The child's output is relayed byte for byte and its exit code becomes
/// husk's own.
///
/// # Errors
///
/// Returns an error if the root cannot be built or the child cannot be
/// launched.
pub fn execute(args: RunArgs, config: &HuskConfig) -> anyhow::Result<ExitCode> {
    let request = args.to_request()?;
    let engine = Engine::from_config(config)?;
    let result = engine.run(&request)?;

    output::write_captured(&result, &mut io::stdout().lock(), &mut io::stderr().lock())?;
    Ok(output::exit_code_for(&result))
}
