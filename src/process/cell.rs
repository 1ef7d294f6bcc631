use crate::process::types::Status;
use chrono::{DateTime, Utc};
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use std::process::ExitStatus;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tokio::process::Child;
use tokio::sync::{mpsc, watch, Notify};
use tracing::warn;

/// Shareable handle to one launched child
///
/// The `Child` itself stays with the supervision loop; this handle only
/// carries the pid, kill and signal requests, and the loop's "reaped"
/// signal. Requests are acted on by the loop, which holds the child, so a
/// pid that has already been reaped is never signalled.
#[derive(Debug, Clone)]
pub(crate) struct RunHandle {
    pid: Option<u32>,
    kill: Arc<Notify>,
    signals: mpsc::UnboundedSender<Signal>,
    exited: watch::Receiver<bool>,
}

/// Loop-side counterpart of a [`RunHandle`]
pub(crate) struct RunControl {
    kill: Arc<Notify>,
    signals: mpsc::UnboundedReceiver<Signal>,
    exited: watch::Sender<bool>,
}

impl RunHandle {
    pub(crate) fn new(pid: Option<u32>) -> (RunHandle, RunControl) {
        let kill = Arc::new(Notify::new());
        let (signals_tx, signals_rx) = mpsc::unbounded_channel();
        let (exited_tx, exited_rx) = watch::channel(false);
        (
            RunHandle {
                pid,
                kill: Arc::clone(&kill),
                signals: signals_tx,
                exited: exited_rx,
            },
            RunControl {
                kill,
                signals: signals_rx,
                exited: exited_tx,
            },
        )
    }

    pub(crate) fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// True once the loop has reaped the child (or gone away)
    pub(crate) fn is_exited(&self) -> bool {
        *self.exited.borrow() || self.exited.has_changed().is_err()
    }

    /// Ask the owning loop to SIGKILL the child
    pub(crate) fn kill(&self) {
        self.kill.notify_one();
    }

    /// Ask the owning loop to deliver `signal` to the child
    ///
    /// Returns false when the loop no longer holds the child.
    pub(crate) fn signal(&self, signal: Signal) -> bool {
        !self.is_exited() && self.signals.send(signal).is_ok()
    }

    /// Wait until the child has been reaped
    pub(crate) async fn wait(&mut self) {
        // A dropped sender means the loop is gone, and the child with it
        let _ = self.exited.wait_for(|exited| *exited).await;
    }
}

impl RunControl {
    /// Wait for the child to exit, serving signal and kill requests meanwhile
    pub(crate) async fn wait(&mut self, child: &mut Child) -> std::io::Result<ExitStatus> {
        loop {
            tokio::select! {
                result = child.wait() => return result,
                _ = self.kill.notified() => {
                    // start_kill fails only if the child was already reaped
                    let _ = child.start_kill();
                    return child.wait().await;
                }
                Some(signal) = self.signals.recv() => deliver(child, signal),
            }
        }
    }

    pub(crate) fn mark_exited(self) {
        self.exited.send_replace(true);
    }
}

/// Send `signal` to a child that has not been waited on yet
fn deliver(child: &Child, signal: Signal) {
    // The id is cleared once the child has been reaped
    let Some(pid) = child.id() else {
        return;
    };
    if let Err(e) = nix::sys::signal::kill(Pid::from_raw(pid as i32), signal) {
        warn!("failed to send {} to pid {}: {}", signal.as_str(), pid, e);
    }
}

/// Result of the retry check made before each launch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RetryGate {
    First,
    Retry(usize),
    Exhausted,
}

/// What the loop should do after a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunOutcome {
    /// A stop claimed the run; the loop ends silently
    Stopped,
    /// The exit was not requested; back off and relaunch
    Retry,
}

#[derive(Debug, Clone)]
pub(crate) struct Snapshot {
    pub status: Status,
    pub since: Duration,
    pub retries: usize,
    pub first_started: Option<DateTime<Utc>>,
    pub pid: Option<u32>,
}

#[derive(Debug, Default)]
struct Inner {
    status: Status,
    handle: Option<RunHandle>,
    first_started: Option<DateTime<Utc>>,
    begin: Option<Instant>,
    retries: usize,
}

/// Status and child handle of one process, behind one lock
///
/// Every mutation is a single critical section so readers never see a
/// status paired with the wrong handle. The lock is never held across an
/// await point.
#[derive(Debug)]
pub(crate) struct StateCell {
    inner: RwLock<Inner>,
    notify: watch::Sender<Status>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        let (notify, _) = watch::channel(Status::Stopped);
        Self {
            inner: RwLock::new(Inner::default()),
            notify,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn set(&self, inner: &mut Inner, status: Status) {
        inner.status = status;
        self.notify.send_replace(status);
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Status> {
        self.notify.subscribe()
    }

    pub(crate) fn status(&self) -> Status {
        self.read().status
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        let inner = self.read();
        Snapshot {
            status: inner.status,
            since: inner.begin.map(|begin| begin.elapsed()).unwrap_or_default(),
            retries: inner.retries,
            first_started: inner.first_started,
            pid: inner.handle.as_ref().and_then(RunHandle::pid),
        }
    }

    /// STOPPED -> STANDBY, resetting the retry bookkeeping on success
    pub(crate) fn try_begin(&self) -> bool {
        let mut inner = self.write();
        if inner.status != Status::Stopped {
            return false;
        }
        inner.retries = 0;
        inner.first_started = None;
        self.set(&mut inner, Status::Standby);
        true
    }

    /// Compare-and-transition; returns whether the transition happened
    pub(crate) fn transition(&self, from: Status, to: Status) -> bool {
        let mut inner = self.write();
        if inner.status != from {
            return false;
        }
        self.set(&mut inner, to);
        true
    }

    pub(crate) fn retry_gate(&self, limit: usize) -> RetryGate {
        let mut inner = self.write();
        if inner.first_started.is_none() {
            inner.first_started = Some(Utc::now());
            return RetryGate::First;
        }
        if inner.retries >= limit {
            return RetryGate::Exhausted;
        }
        inner.retries += 1;
        RetryGate::Retry(inner.retries)
    }

    /// Install the freshly launched child and enter RUNNING
    pub(crate) fn begin_run(&self, handle: RunHandle) {
        let mut inner = self.write();
        if let Some(previous) = inner.handle.take() {
            if !previous.is_exited() {
                previous.kill();
            }
        }
        inner.handle = Some(handle);
        inner.begin = Some(Instant::now());
        self.set(&mut inner, Status::Running);
    }

    /// Drop the run's handle and decide between a requested stop and a retry
    pub(crate) fn finish_run(&self) -> RunOutcome {
        let mut inner = self.write();
        inner.handle = None;
        match inner.status {
            Status::Stopping | Status::Stopped => {
                self.set(&mut inner, Status::Stopped);
                RunOutcome::Stopped
            }
            _ => {
                self.set(&mut inner, Status::RetryWait);
                RunOutcome::Retry
            }
        }
    }

    /// RUNNING -> STOPPING, handing the live run to the stopper
    pub(crate) fn claim_stop(&self) -> Option<RunHandle> {
        let mut inner = self.write();
        if inner.status != Status::Running {
            return None;
        }
        let handle = inner.handle.clone()?;
        self.set(&mut inner, Status::Stopping);
        Some(handle)
    }

    /// Terminal transition of a loop that ended without a stop request
    pub(crate) fn end(&self) {
        let mut inner = self.write();
        if matches!(inner.status, Status::Standby | Status::RetryWait) {
            inner.handle = None;
            self.set(&mut inner, Status::Stopped);
        }
    }
}
