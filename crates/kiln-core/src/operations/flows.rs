//! Phase pipelines for each lifecycle operation.
//!
//! Flows run on the operation's worker thread. Each one drives the
//! installer through weighted phases, checks for cancellation after every
//! phase before interpreting exit codes, and reduces everything to a
//! single terminal [`Outcome`].

use kiln_config::StopPolicy;
use tracing::warn;

use super::outcome::{OperationError, Outcome};
use super::{StopDecision, StopPrompter};
use crate::installer::{InstallStatus, Installer, InstallerError, ProcessResult};
use crate::manager::LifecycleManager;
use crate::progress::{PhaseProgress, TaskProgress};

/// Share of an install spent downloading images; the rest is the first
/// start.
const INSTALL_WEIGHT: u32 = 95;

/// Share of an uninstall spent stopping a running runtime.
const STOP_WEIGHT: u32 = 80;

pub(super) fn run_install(installer: &dyn Installer, progress: &mut TaskProgress) -> Outcome {
    let phase = progress.split("installing runtime images", INSTALL_WEIGHT);
    match run_step(installer.install(&phase), &phase, "install") {
        Outcome::Success => {}
        Outcome::Cancelled => {
            rollback_install(installer);
            return Outcome::Cancelled;
        }
        failed => return failed,
    }
    let phase = progress.split_remaining("starting runtime");
    match run_step(installer.start(&phase), &phase, "start") {
        // Cancelling this late still unwinds the install; a half-adopted
        // runtime is worse than none.
        Outcome::Cancelled => {
            rollback_install(installer);
            Outcome::Cancelled
        }
        other => other,
    }
}

pub(super) fn run_start(installer: &dyn Installer, progress: &mut TaskProgress) -> Outcome {
    let phase = progress.split_remaining("starting runtime");
    run_step(installer.start(&phase), &phase, "start")
}

pub(super) fn run_stop(
    manager: &LifecycleManager,
    installer: &dyn Installer,
    policy: StopPolicy,
    prompter: &dyn StopPrompter,
    progress: &mut TaskProgress,
) -> Outcome {
    let Some(stop_all) = resolve_stop_scope(manager, policy, prompter) else {
        return Outcome::Cancelled;
    };
    let label = if stop_all {
        "stopping runtime and workloads"
    } else {
        "stopping runtime"
    };
    let phase = progress.split_remaining(label);
    run_step(installer.stop(stop_all, &phase), &phase, "stop")
}

pub(super) fn run_uninstall(installer: &dyn Installer, progress: &mut TaskProgress) -> Outcome {
    // Uninstalling a running runtime stops everything first; removal always
    // takes the workload containers with it, so there is nothing to ask.
    let status = match installer.query_install_status() {
        Ok(status) => status,
        Err(error) => return Outcome::Failed(error.into()),
    };
    if status == InstallStatus::Running {
        let phase = progress.split("stopping runtime and workloads", STOP_WEIGHT);
        match run_step(installer.stop(true, &phase), &phase, "stop") {
            Outcome::Success => {}
            other => return other,
        }
    }
    let phase = progress.split_remaining("removing runtime images");
    run_step(installer.uninstall(&phase), &phase, "uninstall")
}

/// Decides whether a stop also takes workload containers down.
///
/// `None` means the user declined the prompt and the stop is abandoned
/// before the installer runs.
fn resolve_stop_scope(
    manager: &LifecycleManager,
    policy: StopPolicy,
    prompter: &dyn StopPrompter,
) -> Option<bool> {
    match policy {
        StopPolicy::Always => Some(true),
        StopPolicy::Never => Some(false),
        StopPolicy::Prompt => {
            if !manager.has_active_applications() {
                // Nothing to protect; no point asking.
                return Some(false);
            }
            match prompter.confirm_stop_all() {
                StopDecision::StopAll => Some(true),
                StopDecision::RuntimeOnly => Some(false),
                StopDecision::Cancelled => None,
            }
        }
    }
}

/// Interprets one installer call: cancellation first, then the exit code.
fn run_step(
    result: Result<ProcessResult, InstallerError>,
    phase: &PhaseProgress,
    action: &'static str,
) -> Outcome {
    let result = match result {
        Ok(result) => result,
        Err(error) => return Outcome::Failed(error.into()),
    };
    if phase.is_cancelled() {
        return Outcome::Cancelled;
    }
    if !result.success() {
        return Outcome::Failed(OperationError::CommandFailed {
            action,
            message: result.failure_text(),
        });
    }
    phase.complete();
    Outcome::Success
}

/// Best-effort removal after a cancelled install.
///
/// Failures are only logged; the caller still reports `Cancelled`.
fn rollback_install(installer: &dyn Installer) {
    let progress = PhaseProgress::detached();
    match installer.uninstall(&progress) {
        Ok(result) if !result.success() => {
            warn!(detail = %result.failure_text(), "rollback uninstall reported failure");
        }
        Ok(_) => {}
        Err(error) => warn!(error = %error, "rollback uninstall could not run"),
    }
}
