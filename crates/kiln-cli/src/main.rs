//! Entry point for the `kiln` binary.
//!
//! The binary delegates to [`kiln_cli::run`], which parses arguments, loads
//! configuration, and drives the lifecycle manager. IO handles are passed in
//! so tests can exercise the same code path with captured streams.

use std::io;
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout = io::stdout().lock();
    let mut stderr = io::stderr().lock();
    kiln_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}
