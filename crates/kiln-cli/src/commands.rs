//! Command execution against the lifecycle manager.
//!
//! Lifecycle operations run on a worker thread; the CLI thread renders
//! progress events to stderr while polling the operation handle. All
//! user-facing rendering lives here so the core crate stays silent.

use std::io::{self, IsTerminal, Write};
use std::process::ExitCode;
use std::sync::{Arc, Mutex, PoisonError, mpsc};
use std::time::Duration;

use dialoguer::Confirm;
use tracing::warn;

use kiln_core::{
    Activity, InstallStatus, LifecycleManager, LifecycleOperations, OperationHandle,
    OperationKind, Outcome, ProgressSink, StopDecision, StopPrompter,
};

use crate::errors::AppError;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Progress callbacks forwarded from the worker thread.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ProgressEvent {
    Task(String),
    Phase(String),
    Percent(u32),
    Detail(String),
}

/// Sink that ships progress events to the CLI thread over a channel.
pub(crate) struct ChannelSink {
    sender: Mutex<mpsc::Sender<ProgressEvent>>,
}

impl ChannelSink {
    pub(crate) fn new() -> (Arc<Self>, mpsc::Receiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::channel();
        (
            Arc::new(Self {
                sender: Mutex::new(sender),
            }),
            receiver,
        )
    }

    fn send(&self, event: ProgressEvent) {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        // A dropped receiver means the CLI gave up; losing events is fine.
        let _ = sender.send(event);
    }
}

impl ProgressSink for ChannelSink {
    fn task_started(&self, label: &str) {
        self.send(ProgressEvent::Task(label.to_owned()));
    }

    fn phase_started(&self, label: &str) {
        self.send(ProgressEvent::Phase(label.to_owned()));
    }

    fn progressed(&self, percent: u32) {
        self.send(ProgressEvent::Percent(percent));
    }

    fn detail(&self, line: &str) {
        self.send(ProgressEvent::Detail(line.to_owned()));
    }
}

/// Schedules `kind` and renders its progress until completion.
pub(crate) fn run_operation<W, E>(
    ops: &LifecycleOperations,
    kind: OperationKind,
    stdout: &mut W,
    stderr: &mut E,
) -> Result<ExitCode, AppError>
where
    W: Write,
    E: Write,
{
    let (sink, events) = ChannelSink::new();
    let handle = match kind {
        OperationKind::Install => ops.install(sink),
        OperationKind::Start => ops.start(sink),
        OperationKind::Stop => ops.stop(sink),
        OperationKind::Uninstall => ops.uninstall(sink),
    }?;
    let outcome = drive(handle, &events, stderr);
    Ok(conclude(kind, outcome, stdout, stderr))
}

/// Renders progress to stderr until the operation reaches its outcome.
fn drive<E: Write>(
    handle: OperationHandle,
    events: &mpsc::Receiver<ProgressEvent>,
    stderr: &mut E,
) -> Outcome {
    loop {
        match events.recv_timeout(POLL_INTERVAL) {
            Ok(event) => render_event(&event, stderr),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if handle.is_finished() {
                    // Drain anything sent between the last poll and the end.
                    while let Ok(event) = events.try_recv() {
                        render_event(&event, stderr);
                    }
                    return handle.join();
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => return handle.join(),
        }
    }
}

pub(crate) fn render_event<E: Write>(event: &ProgressEvent, stderr: &mut E) {
    match event {
        ProgressEvent::Task(label) => {
            let _ = writeln!(stderr, "{label} started");
        }
        ProgressEvent::Phase(label) => {
            let _ = writeln!(stderr, "{label}...");
        }
        ProgressEvent::Percent(percent) => {
            let _ = writeln!(stderr, "  {percent}%");
        }
        ProgressEvent::Detail(line) => {
            let _ = writeln!(stderr, "  {line}");
        }
    }
}

fn conclude<W, E>(kind: OperationKind, outcome: Outcome, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    W: Write,
    E: Write,
{
    match outcome {
        Outcome::Success => {
            let _ = writeln!(stdout, "{kind} complete");
            ExitCode::SUCCESS
        }
        Outcome::Cancelled => {
            let _ = writeln!(stderr, "{kind} cancelled");
            ExitCode::FAILURE
        }
        Outcome::Failed(error) => {
            let _ = writeln!(stderr, "{error}");
            ExitCode::FAILURE
        }
    }
}

/// Prints the installation status, and the running operation when present.
pub(crate) fn status<W: Write>(
    manager: &LifecycleManager,
    refresh: bool,
    json: bool,
    stdout: &mut W,
) -> ExitCode {
    let install_status = manager.install_status(refresh);
    let activity = manager.activity();
    if json {
        let _ = writeln!(stdout, "{}", status_document(install_status, activity));
    } else {
        let _ = writeln!(stdout, "{install_status}");
        if activity.is_busy() {
            let _ = writeln!(stdout, "operation in progress: {activity}");
        }
    }
    ExitCode::SUCCESS
}

/// JSON document emitted by `status --json`.
pub(crate) fn status_document(status: InstallStatus, activity: Activity) -> serde_json::Value {
    serde_json::json!({
        "install_status": status,
        "activity": activity.to_string(),
    })
}

/// Lists workloads on the local runtime.
pub(crate) fn apps<W, E>(manager: &LifecycleManager, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    W: Write,
    E: Write,
{
    if manager.install_status(false) != InstallStatus::Running {
        let _ = writeln!(stderr, "the runtime is not running");
        return ExitCode::FAILURE;
    }
    let Some(connection) = manager.create_local_connection() else {
        let _ = writeln!(
            stderr,
            "the runtime at {} is not answering",
            manager.base_url()
        );
        return ExitCode::FAILURE;
    };
    connection.refresh_apps();
    let apps = connection.applications();
    if apps.is_empty() {
        let _ = writeln!(stdout, "no workloads");
        return ExitCode::SUCCESS;
    }
    for app in apps {
        let _ = writeln!(stdout, "{}\t{}", app.name, app.state);
    }
    ExitCode::SUCCESS
}

/// Stop-scope prompt backed by `dialoguer`.
pub(crate) struct DialoguerPrompt {
    interactive: bool,
}

impl DialoguerPrompt {
    /// Prompts only when stdin is a terminal.
    pub(crate) fn from_terminal() -> Self {
        Self {
            interactive: io::stdin().is_terminal(),
        }
    }
}

impl StopPrompter for DialoguerPrompt {
    fn confirm_stop_all(&self) -> StopDecision {
        if !self.interactive {
            // Nobody to ask; leave workloads running.
            return StopDecision::RuntimeOnly;
        }
        match Confirm::new()
            .with_prompt("Also stop running workloads?")
            .default(false)
            .interact_opt()
        {
            Ok(Some(true)) => StopDecision::StopAll,
            Ok(Some(false)) => StopDecision::RuntimeOnly,
            Ok(None) => StopDecision::Cancelled,
            Err(error) => {
                warn!(error = %error, "stop prompt failed");
                StopDecision::Cancelled
            }
        }
    }
}

/// Asks for uninstall confirmation; refuses when nobody can answer.
pub(crate) fn confirm_uninstall<E: Write>(stderr: &mut E) -> bool {
    if !io::stdin().is_terminal() {
        let _ = writeln!(stderr, "uninstall requires confirmation; rerun with --yes");
        return false;
    }
    match Confirm::new()
        .with_prompt("Remove the runtime and all of its images?")
        .default(false)
        .interact_opt()
    {
        Ok(Some(true)) => true,
        Ok(Some(false) | None) => {
            let _ = writeln!(stderr, "uninstall cancelled");
            false
        }
        Err(error) => {
            let _ = writeln!(stderr, "confirmation failed: {error}");
            false
        }
    }
}
