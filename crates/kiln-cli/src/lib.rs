//! Command-line interface for the Kiln local runtime.
//!
//! The crate owns argument parsing, configuration layering, telemetry
//! bootstrap, and the rendering of operation progress and outcomes. The
//! lifecycle semantics themselves live in [`kiln_core`]; everything here is
//! wiring and presentation, designed to be exercised both from the binary
//! entrypoint and from tests with substituted IO streams.

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use clap::error::ErrorKind;

use kiln_config::{Config, StopPolicy};
use kiln_core::{
    CtlInstaller, HttpRuntimeClient, Installer, LifecycleManager, LifecycleOperations,
    OperationKind,
};

mod cli;
mod commands;
mod errors;
mod telemetry;

use cli::{Cli, Command, effective_stop_policy};
use errors::AppError;

/// Runs the CLI using the provided arguments and IO handles.
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => return render_usage(&error, stdout, stderr),
    };
    match execute(cli, stdout, stderr) {
        Ok(exit_code) => exit_code,
        Err(error) => {
            let _ = writeln!(stderr, "{error}");
            ExitCode::FAILURE
        }
    }
}

/// Writes a parse outcome the way `clap` would have.
///
/// Help and version requests land on stdout and succeed; genuine usage
/// errors land on stderr with the conventional usage exit code.
fn render_usage<W, E>(error: &clap::Error, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    W: Write,
    E: Write,
{
    let rendered = error.render();
    if matches!(
        error.kind(),
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion
    ) {
        let _ = write!(stdout, "{rendered}");
        ExitCode::SUCCESS
    } else {
        let _ = write!(stderr, "{rendered}");
        ExitCode::from(2)
    }
}

fn execute<W, E>(cli: Cli, stdout: &mut W, stderr: &mut E) -> Result<ExitCode, AppError>
where
    W: Write,
    E: Write,
{
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    cli.apply_to(&mut config);
    telemetry::initialise(&config)?;

    let installer = Arc::new(CtlInstaller::from_config(&config));
    let client = Arc::new(HttpRuntimeClient::new(config.status_timeout())?);
    let manager = Arc::new(LifecycleManager::new(
        Arc::clone(&installer) as Arc<dyn Installer>,
        client,
        config.base_url.clone(),
    ));

    match cli.command {
        Command::Status { refresh, json } => {
            Ok(commands::status(&manager, refresh, json, stdout))
        }
        Command::Apps => Ok(commands::apps(&manager, stdout, stderr)),
        Command::Install => run_lifecycle(
            &manager,
            &installer,
            config.stop_policy,
            OperationKind::Install,
            stdout,
            stderr,
        ),
        Command::Start => run_lifecycle(
            &manager,
            &installer,
            config.stop_policy,
            OperationKind::Start,
            stdout,
            stderr,
        ),
        Command::Stop { all, runtime_only } => run_lifecycle(
            &manager,
            &installer,
            effective_stop_policy(all, runtime_only, config.stop_policy),
            OperationKind::Stop,
            stdout,
            stderr,
        ),
        Command::Uninstall { yes } => {
            if !yes && !commands::confirm_uninstall(stderr) {
                return Ok(ExitCode::FAILURE);
            }
            run_lifecycle(
                &manager,
                &installer,
                config.stop_policy,
                OperationKind::Uninstall,
                stdout,
                stderr,
            )
        }
    }
}

fn run_lifecycle<W, E>(
    manager: &Arc<LifecycleManager>,
    installer: &Arc<CtlInstaller>,
    stop_policy: StopPolicy,
    kind: OperationKind,
    stdout: &mut W,
    stderr: &mut E,
) -> Result<ExitCode, AppError>
where
    W: Write,
    E: Write,
{
    // Stop policy decisions read the registry, so prime it with the live
    // runtime state before any operation is scheduled.
    manager.bootstrap();
    let prompter = Arc::new(commands::DialoguerPrompt::from_terminal());
    let ops = LifecycleOperations::new(
        Arc::clone(manager),
        Arc::clone(installer) as Arc<dyn Installer>,
        stop_policy,
        prompter,
    );
    commands::run_operation(&ops, kind, stdout, stderr)
}
