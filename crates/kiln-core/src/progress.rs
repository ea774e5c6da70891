//! Progress reporting and cooperative cancellation for lifecycle operations.
//!
//! An operation owns a [`TaskProgress`] that carves the overall percentage
//! into weighted phases. Each phase receives a [`PhaseProgress`] that maps
//! its own fractional completion into the share it was given, so the sink
//! observes a single monotonic 0-100 scale regardless of how many phases an
//! operation runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Observer for progress emitted by a lifecycle operation.
///
/// Implementations must tolerate calls from the operation's worker thread
/// and return promptly; slow sinks stall installer output handling.
pub trait ProgressSink: Send + Sync {
    /// Invoked once when the operation starts.
    fn task_started(&self, label: &str);

    /// Invoked each time a new phase begins.
    fn phase_started(&self, label: &str);

    /// Invoked when the overall completed percentage increases.
    fn progressed(&self, percent: u32);

    /// Invoked with human-readable detail lines, typically installer output.
    fn detail(&self, line: &str);
}

impl<T> ProgressSink for Arc<T>
where
    T: ProgressSink,
{
    fn task_started(&self, label: &str) {
        (**self).task_started(label);
    }

    fn phase_started(&self, label: &str) {
        (**self).phase_started(label);
    }

    fn progressed(&self, percent: u32) {
        (**self).progressed(percent);
    }

    fn detail(&self, line: &str) {
        (**self).detail(line);
    }
}

/// Sink that discards everything, for callers without progress display.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn task_started(&self, _label: &str) {}

    fn phase_started(&self, _label: &str) {}

    fn progressed(&self, _percent: u32) {}

    fn detail(&self, _line: &str) {}
}

/// Cancellation flag shared between an operation and its caller.
///
/// Cancellation is sticky: once tripped the token stays cancelled for the
/// rest of the operation. Operations poll it between phases and the process
/// driver polls it while a child runs, so tripping the token both stops the
/// phase pipeline and interrupts the current installer command.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a token that has not been cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation; safe to call from any thread, more than once.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Divides one operation's percentage budget across its phases.
///
/// Phases are claimed in order with [`split`](Self::split) and
/// [`split_remaining`](Self::split_remaining); weights are percentage points
/// of the whole task and are clamped to whatever budget is left.
pub struct TaskProgress {
    sink: Arc<dyn ProgressSink>,
    cancel: CancelToken,
    reported: Arc<AtomicU32>,
    consumed: u32,
}

impl TaskProgress {
    /// Creates a task reporting to `sink` and observing `cancel`.
    pub fn new(label: &str, sink: Arc<dyn ProgressSink>, cancel: CancelToken) -> Self {
        sink.task_started(label);
        Self {
            sink,
            cancel,
            reported: Arc::new(AtomicU32::new(0)),
            consumed: 0,
        }
    }

    /// Claims `weight` percentage points of the task for the next phase.
    pub fn split(&mut self, label: &str, weight: u32) -> PhaseProgress {
        let span = weight.min(self.remaining());
        let base = self.consumed;
        self.consumed += span;
        self.sink.phase_started(label);
        PhaseProgress {
            sink: Arc::clone(&self.sink),
            cancel: self.cancel.clone(),
            reported: Arc::clone(&self.reported),
            base,
            span,
        }
    }

    /// Hands the whole remaining budget to the final phase.
    pub fn split_remaining(&mut self, label: &str) -> PhaseProgress {
        self.split(label, self.remaining())
    }

    /// Token that cancels this task.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    fn remaining(&self) -> u32 {
        100 - self.consumed
    }
}

/// Progress reporter scoped to one phase of a task.
///
/// The phase owns `span` percentage points starting at `base`; fractional
/// completion is mapped into that window. Reported percentages are kept
/// monotonic across the whole task, so stale or repeated reports from
/// installer output never move the displayed value backwards.
pub struct PhaseProgress {
    sink: Arc<dyn ProgressSink>,
    cancel: CancelToken,
    reported: Arc<AtomicU32>,
    base: u32,
    span: u32,
}

impl PhaseProgress {
    /// A phase wired to nothing, for internal work that reports no progress.
    pub fn detached() -> Self {
        Self {
            sink: Arc::new(NullSink),
            cancel: CancelToken::new(),
            reported: Arc::new(AtomicU32::new(0)),
            base: 0,
            span: 100,
        }
    }

    /// Reports completion of this phase as a fraction in `0.0..=1.0`.
    ///
    /// Out-of-range fractions are clamped rather than rejected; installer
    /// output is not trusted to stay in range.
    pub fn advance(&self, fraction: f64) {
        let clamped = fraction.clamp(0.0, 1.0);
        #[expect(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            reason = "value is clamped to 0..=span before the cast"
        )]
        let within = (clamped * f64::from(self.span)).round() as u32;
        let percent = self.base + within.min(self.span);
        let previous = self.reported.fetch_max(percent, Ordering::SeqCst);
        if percent > previous {
            self.sink.progressed(percent);
        }
    }

    /// Marks the phase finished.
    pub fn complete(&self) {
        self.advance(1.0);
    }

    /// Publishes a human-readable detail line.
    pub fn detail(&self, line: &str) {
        self.sink.detail(line);
    }

    /// Whether the owning task has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
