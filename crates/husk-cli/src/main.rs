//! # husk
//!
//! Runs a command inside a throwaway root filesystem, under fresh PID and
//! mount or hostname namespaces. The root is built either from a host
//! binary and its shared libraries, or from a registry image.

mod commands;
mod output;

use std::process::ExitCode;

use clap::Parser;
use husk_common::constants::EXIT_FAILURE;
use husk_common::error::HuskError;

use crate::commands::Cli;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match commands::execute(cli) {
        Ok(code) => code,
        Err(err) => {
            #[allow(clippy::print_stderr)]
            {
                eprintln!("Error: {err:#}");
            }
            ExitCode::from(failure_code(&err))
        }
    }
}

/// Exit status for a failed run: 2 when something required is missing,
/// 1 otherwise.
fn failure_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<HuskError>()
        .map_or(EXIT_FAILURE, HuskError::exit_code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_code_maps_missing_binary_to_2() {
        let err = anyhow::Error::new(HuskError::NotFound {
            kind: "binary",
            id: "/bin/does-not-exist".into(),
        });
        assert_eq!(failure_code(&err), 2);
    }

    #[test]
    fn failure_code_sees_through_context() {
        let err = anyhow::Error::new(HuskError::SetupNotFound {
            program: "unshare".into(),
        })
        .context("launching");
        assert_eq!(failure_code(&err), 2);
    }

    #[test]
    fn failure_code_defaults_to_1() {
        assert_eq!(failure_code(&anyhow::anyhow!("something else")), 1);
        let err = anyhow::Error::new(HuskError::Launch {
            message: "spawn failed".into(),
        });
        assert_eq!(failure_code(&err), 1);
    }
}
