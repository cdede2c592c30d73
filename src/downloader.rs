use std::collections::VecDeque;
use std::ffi::OsString;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use log::{debug, info, trace, warn};
use thiserror::Error;
use tokio::{
    process::{Child, Command},
    sync::{
        Notify,
        mpsc::{UnboundedReceiver, UnboundedSender, error::TryRecvError, unbounded_channel},
        oneshot,
    },
};

use crate::model::{FailureReason, JobOutcome, ProgressEvent};
use crate::progress::{OutputLines, parse_progress_from_line};

/// Default number of trailing lines kept for failure reports
pub const DEFAULT_TAIL_LINES: usize = 20;

/// Starts fetcher processes and supervises them until they exit.
#[derive(Clone, Debug)]
pub struct Supervisor {
    program: OsString,
    base_args: Vec<String>,
    tail_lines: usize,
}

impl Supervisor {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            base_args: Vec::new(),
            tail_lines: DEFAULT_TAIL_LINES,
        }
    }

    /// Arguments placed before every planned vector, e.g. `-m yt_dlp` when
    /// the program is a Python interpreter.
    pub fn with_base_args(mut self, base_args: Vec<String>) -> Self {
        self.base_args = base_args;
        self
    }

    pub fn with_tail_lines(mut self, tail_lines: usize) -> Self {
        self.tail_lines = tail_lines.max(1);
        self
    }

    pub fn program(&self) -> &OsString {
        &self.program
    }

    /// Spawns the fetcher with `args` and returns at once.
    ///
    /// Must be called inside a tokio runtime. A spawn failure is not an
    /// error here: the handle yields no events and resolves to
    /// `FailureReason::SpawnFailed`.
    pub fn run(&self, args: Vec<String>) -> JobHandle {
        let (event_tx, event_rx) = unbounded_channel();
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let cancel = Arc::new(Notify::new());

        info!(
            "Starting {} {}",
            self.program.to_string_lossy(),
            self.base_args.iter().chain(&args).cloned().collect::<Vec<_>>().join(" ")
        );

        let spawned = Command::new(&self.program)
            .args(&self.base_args)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let mut pid = None;
        match spawned {
            Ok(child) => {
                pid = child.id();
                let worker = Worker {
                    events: event_tx,
                    cancel: Arc::clone(&cancel),
                    tail: VecDeque::with_capacity(self.tail_lines),
                    tail_lines: self.tail_lines,
                };
                tokio::spawn(async move {
                    let outcome = worker.supervise(child).await;
                    let _ = outcome_tx.send(outcome);
                });
            }
            Err(err) => {
                warn!(
                    "Could not start {}: {err}",
                    self.program.to_string_lossy()
                );
                let _ = outcome_tx.send(JobOutcome::Failure {
                    reason: FailureReason::SpawnFailed(err.to_string()),
                    last_lines: Vec::new(),
                });
            }
        }

        JobHandle {
            pid,
            events: event_rx,
            outcome: Some(outcome_rx),
            finished: None,
            cancel: CancelHandle(cancel),
        }
    }
}

/// Requests cancellation of one job; cheap to clone and send elsewhere.
#[derive(Clone, Debug)]
pub struct CancelHandle(Arc<Notify>);

impl CancelHandle {
    pub fn cancel(&self) {
        // notify_one stores a permit, so a request made before the worker
        // starts waiting is not lost
        self.0.notify_one();
    }
}

/// One in-flight fetcher process: its event stream and its final outcome.
#[derive(Debug)]
pub struct JobHandle {
    pid: Option<u32>,
    events: UnboundedReceiver<ProgressEvent>,
    outcome: Option<oneshot::Receiver<JobOutcome>>,
    finished: Option<JobOutcome>,
    cancel: CancelHandle,
}

impl JobHandle {
    /// OS process id, `None` when the fetcher never started.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Next event in emission order; `None` once the output is drained.
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        self.events.recv().await
    }

    /// Non-blocking variant for frame-driven callers.
    pub fn try_next_event(&mut self) -> Option<ProgressEvent> {
        match self.events.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Stops the job. Events still buffered are discarded and nothing
    /// further is delivered; the outcome resolves to `Cancelled` unless the
    /// process had already finished.
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        self.events.close();
        while self.events.try_recv().is_ok() {}
    }

    /// Cancels from another task. Events already produced stay readable.
    pub fn canceller(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Outcome once the job has finished and every event has been consumed.
    /// Returns it exactly once.
    pub fn try_outcome(&mut self) -> Option<JobOutcome> {
        if let Some(mut rx) = self.outcome.take() {
            match rx.try_recv() {
                Ok(outcome) => self.finished = Some(outcome),
                Err(oneshot::error::TryRecvError::Empty) => self.outcome = Some(rx),
                Err(oneshot::error::TryRecvError::Closed) => self.finished = Some(lost()),
            }
        }
        // the outcome is sent after the last event, so the buffer is final here
        if self.finished.is_some() && self.events.is_empty() {
            self.finished.take()
        } else {
            None
        }
    }

    /// Waits for the outcome, discarding any events not yet consumed.
    pub async fn wait(mut self) -> JobOutcome {
        self.events.close();
        if let Some(outcome) = self.finished.take() {
            return outcome;
        }
        match self.outcome.take() {
            Some(rx) => rx.await.unwrap_or_else(|_| lost()),
            None => lost(),
        }
    }
}

fn lost() -> JobOutcome {
    JobOutcome::Failure {
        reason: FailureReason::Lost,
        last_lines: Vec::new(),
    }
}

struct Worker {
    events: UnboundedSender<ProgressEvent>,
    cancel: Arc<Notify>,
    tail: VecDeque<String>,
    tail_lines: usize,
}

impl Worker {
    async fn supervise(mut self, mut child: Child) -> JobOutcome {
        let pid = child.id();
        let cancel = Arc::clone(&self.cancel);
        let (mut stdout, mut stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(out), Some(err)) => (OutputLines::new(out), OutputLines::new(err)),
            _ => {
                let _ = child.kill().await;
                return self.failure(FailureReason::Io("output pipes unavailable".into()));
            }
        };
        let (mut out_open, mut err_open) = (true, true);

        while out_open || err_open {
            let (from_stdout, line) = tokio::select! {
                biased;
                _ = cancel.notified() => return self.cancelled(child).await,
                next = stdout.next_line(), if out_open => (true, next),
                next = stderr.next_line(), if err_open => (false, next),
            };
            match line {
                Ok(Some(line)) => self.emit(line),
                Ok(None) if from_stdout => out_open = false,
                Ok(None) => err_open = false,
                Err(err) => {
                    warn!("Reading output of pid {pid:?} failed: {err}");
                    let _ = child.kill().await;
                    return self.failure(FailureReason::Io(err.to_string()));
                }
            }
        }

        let status = tokio::select! {
            biased;
            _ = cancel.notified() => return self.cancelled(child).await,
            status = child.wait() => status,
        };
        match status {
            Ok(status) => self.resolve(status),
            Err(err) => self.failure(FailureReason::Io(err.to_string())),
        }
    }

    fn emit(&mut self, line: String) {
        trace!("{line}");
        let percent = parse_progress_from_line(&line);
        if self.tail.len() == self.tail_lines {
            self.tail.pop_front();
        }
        self.tail.push_back(line.clone());
        // the receiver may be gone; keep draining so the child never
        // blocks on a full pipe
        let _ = self.events.send(ProgressEvent::RawLine(line));
        if let Some(pct) = percent {
            let _ = self.events.send(ProgressEvent::PercentUpdate(pct));
        }
    }

    fn resolve(self, status: ExitStatus) -> JobOutcome {
        if status.success() {
            info!("Fetcher finished successfully");
            return JobOutcome::Success;
        }
        let reason = match status.code() {
            Some(code) => FailureReason::Exited(code),
            None => FailureReason::Signalled,
        };
        warn!("Fetcher failed: {reason}");
        self.failure(reason)
    }

    async fn cancelled(self, mut child: Child) -> JobOutcome {
        info!("Cancelling fetcher pid {:?}", child.id());
        // kill() sends SIGKILL (TerminateProcess on Windows) and reaps
        let reason = match child.kill().await {
            Ok(()) => FailureReason::Cancelled,
            Err(err) => match child.try_wait() {
                Ok(Some(_)) => FailureReason::Cancelled,
                _ => {
                    warn!("Could not kill fetcher: {err}");
                    FailureReason::KillFailed(err.to_string())
                }
            },
        };
        self.failure(reason)
    }

    fn failure(self, reason: FailureReason) -> JobOutcome {
        debug!("Job failed ({reason}), {} trailing lines kept", self.tail.len());
        JobOutcome::Failure {
            reason,
            last_lines: self.tail.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum FetcherCheckError {
    #[error("fetcher not found or not runnable: {0}")]
    Missing(#[from] std::io::Error),
    #[error("fetcher exited with {0}")]
    Failed(ExitStatus),
}

/// Runs `<program> [base args] --version` and returns the reported version.
pub async fn check_fetcher(supervisor: &Supervisor) -> Result<String, FetcherCheckError> {
    let output = Command::new(&supervisor.program)
        .args(&supervisor.base_args)
        .arg("--version")
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await?;
    if !output.status.success() {
        return Err(FetcherCheckError::Failed(output.status));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
}
