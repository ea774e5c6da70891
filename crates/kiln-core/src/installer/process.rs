//! Spawns installer commands and streams their output.
//!
//! One [`run_command`] call drives a single `kilnctl` invocation: stdout is
//! streamed line by line into the progress reporter, a deadline bounds the
//! whole run, and the child is killed when the deadline passes or the
//! operation is cancelled. Killing on cancellation is an interruption, not
//! an error; the caller distinguishes the two through the cancel token.

use std::io::{BufRead, BufReader, Read};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use camino::Utf8Path;
use serde::Deserialize;
use tracing::debug;

use super::{InstallerError, ProcessResult};
use crate::progress::PhaseProgress;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long to wait for trailing output after the child has exited. Bounded
/// because grandchildren may inherit the pipes and hold them open.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Exit code reported when the child was killed rather than exiting.
pub(super) const KILLED_EXIT_CODE: i32 = -1;

/// One installer command to run.
pub(super) struct CommandSpec<'a> {
    pub binary: &'a Utf8Path,
    pub args: &'a [&'a str],
    pub timeout: Duration,
}

impl CommandSpec<'_> {
    fn display(&self) -> String {
        let mut text = self.binary.as_str().to_owned();
        for arg in self.args {
            text.push(' ');
            text.push_str(arg);
        }
        text
    }
}

/// One line captured from a child stream.
enum StreamLine {
    Out(String),
    Err(String),
}

/// Structured progress record the installer may emit on stdout, e.g.
/// `{"percent": 40, "detail": "pulling images"}`.
#[derive(Deserialize)]
struct ProgressRecord {
    percent: u32,
    detail: Option<String>,
}

#[derive(Default)]
struct Collected {
    output: String,
    error: String,
}

impl Collected {
    fn consume(&mut self, line: StreamLine, progress: &PhaseProgress) {
        match line {
            StreamLine::Out(text) => {
                push_line(&mut self.output, &text);
                match parse_progress_record(&text) {
                    Some(record) => {
                        progress.advance(f64::from(record.percent.min(100)) / 100.0);
                        if let Some(detail) = record.detail {
                            progress.detail(&detail);
                        }
                    }
                    None => progress.detail(&text),
                }
            }
            StreamLine::Err(text) => push_line(&mut self.error, &text),
        }
    }

    fn into_result(self, exit_code: i32) -> ProcessResult {
        ProcessResult {
            exit_code,
            output: self.output,
            error: self.error,
        }
    }
}

/// Runs one installer command to completion, cancellation, or timeout.
///
/// Returns `Ok` with a killed-child result when cancelled; the caller is
/// expected to consult the cancel token before interpreting exit codes.
pub(super) fn run_command(
    spec: &CommandSpec<'_>,
    progress: &PhaseProgress,
) -> Result<ProcessResult, InstallerError> {
    if progress.is_cancelled() {
        // Cancelled before launch; report a killed result without spawning.
        return Ok(Collected::default().into_result(KILLED_EXIT_CODE));
    }
    debug!(command = %spec.display(), "launching installer");
    let mut child = Command::new(spec.binary.as_std_path())
        .args(spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| InstallerError::Launch {
            binary: spec.binary.to_owned(),
            source,
        })?;

    let (sender, receiver) = mpsc::channel();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let readers = spawn_reader("kilnctl-stdout", stdout, sender.clone(), StreamLine::Out)
        .and_then(|()| spawn_reader("kilnctl-stderr", stderr, sender, StreamLine::Err));
    if let Err(error) = readers {
        kill_and_reap(&mut child);
        return Err(error);
    }

    let mut collected = Collected::default();
    let deadline = Instant::now() + spec.timeout;
    loop {
        match receiver.recv_timeout(POLL_INTERVAL) {
            Ok(line) => {
                collected.consume(line, progress);
                while let Ok(line) = receiver.try_recv() {
                    collected.consume(line, progress);
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            // Both streams hit end of file; the child is about to exit.
            // Keep polling its status below.
            Err(RecvTimeoutError::Disconnected) => thread::sleep(POLL_INTERVAL),
        }
        if progress.is_cancelled() {
            debug!(command = %spec.display(), "cancellation requested; killing installer");
            let exit_code = kill_and_reap(&mut child);
            drain(&receiver, &mut collected, progress);
            return Ok(collected.into_result(exit_code));
        }
        match child.try_wait() {
            Ok(Some(status)) => {
                drain(&receiver, &mut collected, progress);
                let exit_code = status.code().unwrap_or(KILLED_EXIT_CODE);
                return Ok(collected.into_result(exit_code));
            }
            Ok(None) => {}
            Err(source) => {
                kill_and_reap(&mut child);
                return Err(InstallerError::Monitor { source });
            }
        }
        if Instant::now() >= deadline {
            kill_and_reap(&mut child);
            return Err(InstallerError::Timeout {
                command: spec.display(),
                timeout_secs: spec.timeout.as_secs(),
            });
        }
    }
}

/// Starts a named thread that forwards lines from `stream` into the channel.
///
/// The handle is dropped deliberately; readers detach and exit on stream end
/// of file or when the receiver goes away.
fn spawn_reader<R>(
    name: &str,
    stream: Option<R>,
    sender: Sender<StreamLine>,
    wrap: fn(String) -> StreamLine,
) -> Result<(), InstallerError>
where
    R: Read + Send + 'static,
{
    let Some(stream) = stream else {
        return Ok(());
    };
    thread::Builder::new()
        .name(name.to_owned())
        .spawn(move || {
            for line in BufReader::new(stream).lines() {
                let Ok(line) = line else {
                    break;
                };
                if sender.send(wrap(line)).is_err() {
                    break;
                }
            }
        })
        .map(drop)
        .map_err(|source| InstallerError::Monitor { source })
}

/// Kills the child if it still runs and reaps it, returning the exit code.
fn kill_and_reap(child: &mut Child) -> i32 {
    if let Err(error) = child.kill() {
        // Already exited; the subsequent wait picks up the real status.
        debug!(error = %error, "installer child kill reported an error");
    }
    child
        .wait()
        .ok()
        .and_then(|status| status.code())
        .unwrap_or(KILLED_EXIT_CODE)
}

/// Consumes trailing lines after the child has finished.
fn drain(receiver: &Receiver<StreamLine>, collected: &mut Collected, progress: &PhaseProgress) {
    let deadline = Instant::now() + DRAIN_GRACE;
    loop {
        let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
            break;
        };
        match receiver.recv_timeout(remaining.min(POLL_INTERVAL)) {
            Ok(line) => collected.consume(line, progress),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn push_line(buffer: &mut String, line: &str) {
    if !buffer.is_empty() {
        buffer.push('\n');
    }
    buffer.push_str(line);
}

fn parse_progress_record(line: &str) -> Option<ProgressRecord> {
    let trimmed = line.trim_start();
    if !trimmed.starts_with('{') {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}
