//! Scripted stand-ins shared across the crate's test suites.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};

use reqwest::StatusCode;
use url::Url;

use crate::connection::{AppState, Application, ClientError, Connection, RuntimeClient};
use crate::events::ChangeListener;
use crate::installer::{InstallStatus, Installer, InstallerError, ProcessResult};
use crate::operations::{StopDecision, StopPrompter};
use crate::progress::PhaseProgress;

/// Base URL the scripted runtime answers on.
pub(crate) fn localhost() -> Url {
    Url::parse("http://localhost:9090/").expect("static URL parses")
}

/// Builds a workload record in the given state.
pub(crate) fn app(name: &str, state: AppState) -> Application {
    Application {
        name: name.to_owned(),
        state,
    }
}

/// Builds a process result with the given exit code and streams.
pub(crate) fn exit_with(exit_code: i32, output: &str, error: &str) -> ProcessResult {
    ProcessResult {
        exit_code,
        output: output.to_owned(),
        error: error.to_owned(),
    }
}

/// Opens a connection against a scripted client.
pub(crate) fn open_connection(client: ScriptedClient) -> Arc<Connection> {
    Arc::new(Connection::open(localhost(), Arc::new(client)).expect("open connection"))
}

/// Runtime client with switchable reachability and a scripted workload list.
#[derive(Default)]
pub(crate) struct ScriptedClient {
    reachable: AtomicBool,
    apps: Mutex<Vec<Application>>,
    pings: AtomicUsize,
}

impl ScriptedClient {
    pub(crate) fn reachable() -> Self {
        let client = Self::default();
        client.reachable.store(true, Ordering::SeqCst);
        client
    }

    pub(crate) fn unreachable() -> Self {
        Self::default()
    }

    pub(crate) fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub(crate) fn set_apps(&self, apps: Vec<Application>) {
        *self.apps.lock().expect("apps mutex poisoned") = apps;
    }

    pub(crate) fn ping_count(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    fn check(&self, base: &Url) -> Result<(), ClientError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ClientError::Status {
                url: base.clone(),
                status: StatusCode::SERVICE_UNAVAILABLE,
            })
        }
    }
}

impl RuntimeClient for ScriptedClient {
    fn ping(&self, base: &Url) -> Result<(), ClientError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        self.check(base)
    }

    fn applications(&self, base: &Url) -> Result<Vec<Application>, ClientError> {
        self.check(base)?;
        Ok(self.apps.lock().expect("apps mutex poisoned").clone())
    }
}

/// Which installer entry points ran, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InstallerCall {
    Status,
    Install,
    Start,
    Stop { stop_all: bool },
    Uninstall,
}

/// Installer whose responses are scripted per entry point.
///
/// Queued results are consumed in order; once a queue runs dry, commands
/// report a clean exit and status queries repeat the sticky status. Every
/// call is recorded for later inspection, and `gate_install` can hold the
/// next install until the test releases it.
pub(crate) struct ScriptedInstaller {
    calls: Mutex<Vec<InstallerCall>>,
    statuses: Mutex<VecDeque<Result<InstallStatus, InstallerError>>>,
    sticky_status: Mutex<InstallStatus>,
    install_results: Mutex<VecDeque<Result<ProcessResult, InstallerError>>>,
    start_results: Mutex<VecDeque<Result<ProcessResult, InstallerError>>>,
    stop_results: Mutex<VecDeque<Result<ProcessResult, InstallerError>>>,
    uninstall_results: Mutex<VecDeque<Result<ProcessResult, InstallerError>>>,
    install_gate: Mutex<Option<mpsc::Receiver<()>>>,
    panic_next_install: AtomicBool,
}

impl ScriptedInstaller {
    pub(crate) fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            statuses: Mutex::new(VecDeque::new()),
            sticky_status: Mutex::new(InstallStatus::Stopped),
            install_results: Mutex::new(VecDeque::new()),
            start_results: Mutex::new(VecDeque::new()),
            stop_results: Mutex::new(VecDeque::new()),
            uninstall_results: Mutex::new(VecDeque::new()),
            install_gate: Mutex::new(None),
            panic_next_install: AtomicBool::new(false),
        }
    }

    pub(crate) fn with_status(status: InstallStatus) -> Self {
        let installer = Self::new();
        installer.set_status(status);
        installer
    }

    /// Status returned whenever the scripted queue is empty.
    pub(crate) fn set_status(&self, status: InstallStatus) {
        *self.sticky_status.lock().expect("status mutex poisoned") = status;
    }

    /// Queues a one-shot status response consumed before the sticky status.
    pub(crate) fn push_status(&self, result: Result<InstallStatus, InstallerError>) {
        self.statuses
            .lock()
            .expect("status mutex poisoned")
            .push_back(result);
    }

    pub(crate) fn push_install(&self, result: Result<ProcessResult, InstallerError>) {
        Self::push(&self.install_results, result);
    }

    pub(crate) fn push_start(&self, result: Result<ProcessResult, InstallerError>) {
        Self::push(&self.start_results, result);
    }

    pub(crate) fn push_stop(&self, result: Result<ProcessResult, InstallerError>) {
        Self::push(&self.stop_results, result);
    }

    pub(crate) fn push_uninstall(&self, result: Result<ProcessResult, InstallerError>) {
        Self::push(&self.uninstall_results, result);
    }

    /// Makes the next install call panic, for worker supervision tests.
    pub(crate) fn panic_on_install(&self) {
        self.panic_next_install.store(true, Ordering::SeqCst);
    }

    /// Holds the next install call until the returned sender fires or drops.
    pub(crate) fn gate_install(&self) -> mpsc::Sender<()> {
        let (sender, receiver) = mpsc::channel();
        *self.install_gate.lock().expect("gate mutex poisoned") = Some(receiver);
        sender
    }

    pub(crate) fn calls(&self) -> Vec<InstallerCall> {
        self.calls.lock().expect("call mutex poisoned").clone()
    }

    pub(crate) fn count(&self, call: InstallerCall) -> usize {
        self.calls()
            .iter()
            .filter(|recorded| **recorded == call)
            .count()
    }

    fn record(&self, call: InstallerCall) {
        self.calls.lock().expect("call mutex poisoned").push(call);
    }

    fn push(
        queue: &Mutex<VecDeque<Result<ProcessResult, InstallerError>>>,
        result: Result<ProcessResult, InstallerError>,
    ) {
        queue.lock().expect("result mutex poisoned").push_back(result);
    }

    fn pop(
        queue: &Mutex<VecDeque<Result<ProcessResult, InstallerError>>>,
    ) -> Result<ProcessResult, InstallerError> {
        queue
            .lock()
            .expect("result mutex poisoned")
            .pop_front()
            .unwrap_or_else(|| Ok(exit_with(0, "", "")))
    }
}

impl Installer for ScriptedInstaller {
    fn query_install_status(&self) -> Result<InstallStatus, InstallerError> {
        self.record(InstallerCall::Status);
        if let Some(result) = self
            .statuses
            .lock()
            .expect("status mutex poisoned")
            .pop_front()
        {
            return result;
        }
        Ok(*self.sticky_status.lock().expect("status mutex poisoned"))
    }

    fn install(&self, _progress: &PhaseProgress) -> Result<ProcessResult, InstallerError> {
        self.record(InstallerCall::Install);
        let gate = self.install_gate.lock().expect("gate mutex poisoned").take();
        if let Some(gate) = gate {
            // Parked until the test releases or drops the sender.
            let _ = gate.recv();
        }
        if self.panic_next_install.swap(false, Ordering::SeqCst) {
            panic!("scripted install panic");
        }
        Self::pop(&self.install_results)
    }

    fn start(&self, _progress: &PhaseProgress) -> Result<ProcessResult, InstallerError> {
        self.record(InstallerCall::Start);
        Self::pop(&self.start_results)
    }

    fn stop(
        &self,
        stop_all: bool,
        _progress: &PhaseProgress,
    ) -> Result<ProcessResult, InstallerError> {
        self.record(InstallerCall::Stop { stop_all });
        Self::pop(&self.stop_results)
    }

    fn uninstall(&self, _progress: &PhaseProgress) -> Result<ProcessResult, InstallerError> {
        self.record(InstallerCall::Uninstall);
        Self::pop(&self.uninstall_results)
    }
}

/// Prompter answering every consultation with a fixed decision.
pub(crate) struct ScriptedPrompter {
    decision: StopDecision,
    asked: AtomicUsize,
}

impl ScriptedPrompter {
    pub(crate) fn answering(decision: StopDecision) -> Self {
        Self {
            decision,
            asked: AtomicUsize::new(0),
        }
    }

    pub(crate) fn times_asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

impl StopPrompter for ScriptedPrompter {
    fn confirm_stop_all(&self) -> StopDecision {
        self.asked.fetch_add(1, Ordering::SeqCst);
        self.decision
    }
}

/// Listener counting state-change notifications.
#[derive(Default)]
pub(crate) struct CountingListener {
    notified: AtomicUsize,
}

impl CountingListener {
    pub(crate) fn count(&self) -> usize {
        self.notified.load(Ordering::SeqCst)
    }
}

impl ChangeListener for CountingListener {
    fn state_changed(&self) {
        self.notified.fetch_add(1, Ordering::SeqCst);
    }
}
