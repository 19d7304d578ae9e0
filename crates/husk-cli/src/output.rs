//! Relaying a finished child's output and status.

use std::io::{self, Write};
use std::process::ExitCode;

use husk_common::constants::EXIT_FAILURE;
use husk_common::types::LaunchResult;

/// Writes the child's captured streams to `stdout` and `stderr` unchanged.
///
/// # Errors
///
/// Returns an error if either stream cannot be written.
pub fn write_captured(
    result: &LaunchResult,
    stdout: &mut impl Write,
    stderr: &mut impl Write,
) -> io::Result<()> {
    stdout.write_all(&result.stdout)?;
    stdout.flush()?;
    stderr.write_all(&result.stderr)?;
    stderr.flush()
}

/// Process exit status mirroring the child's exit code.
#[must_use]
pub fn exit_code_for(result: &LaunchResult) -> ExitCode {
    ExitCode::from(u8::try_from(result.exit_code).unwrap_or(EXIT_FAILURE))
}
