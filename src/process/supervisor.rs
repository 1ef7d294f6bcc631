use crate::config::ProcessConfig;
use crate::error::{Result, SupervisorError};
use crate::process::cell::{RetryGate, RunHandle, RunOutcome, StateCell};
use crate::process::spawner;
use crate::process::types::{ProcessInfo, Status};
use chrono::{DateTime, Utc};
use nix::sys::signal::Signal;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, info_span, warn, Instrument, Span};

/// Owns the full lifecycle of one configured process
///
/// `start` hands the process to a background supervision loop that
/// launches the child, waits for it, and relaunches it within the retry
/// budget. `stop` terminates the current run and waits until the child has
/// been reaped.
#[derive(Debug)]
pub struct ProcessSupervisor {
    name: String,
    config: Arc<ProcessConfig>,
    cell: Arc<StateCell>,
    span: Span,
}

impl ProcessSupervisor {
    /// Create a supervisor whose logs are recorded under `parent`
    pub fn new(config: ProcessConfig, parent: &Span) -> Self {
        let name = config.display_name().to_string();
        let span = info_span!(parent: parent, "process", name = %name);
        Self {
            name,
            config: Arc::new(config),
            cell: Arc::new(StateCell::new()),
            span,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    pub fn status(&self) -> Status {
        self.cell.status()
    }

    /// Time elapsed since the current (or last) run started; zero before any run
    pub fn since(&self) -> Duration {
        self.cell.snapshot().since
    }

    /// Relaunches performed since the last accepted start
    pub fn retries(&self) -> usize {
        self.cell.snapshot().retries
    }

    /// Wall-clock time of the first launch since the last accepted start
    pub fn first_started(&self) -> Option<DateTime<Utc>> {
        self.cell.snapshot().first_started
    }

    /// Consistent view of the process for status listings
    pub fn info(&self) -> ProcessInfo {
        let snapshot = self.cell.snapshot();
        ProcessInfo {
            name: self.name.clone(),
            since: snapshot.since,
            status: snapshot.status,
            retries: snapshot.retries,
            first_started: snapshot.first_started,
            pid: snapshot.pid,
        }
    }

    /// Observe every status transition
    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.cell.subscribe()
    }

    /// Start supervising the process
    ///
    /// Returns immediately with the channel on which the supervision loop
    /// reports run errors; the channel closes when the loop ends. If the
    /// process is not STOPPED, the channel carries a single
    /// [`SupervisorError::AlreadyRunning`] and is already closed.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> mpsc::Receiver<SupervisorError> {
        let (tx, rx) = mpsc::channel(1);

        if !self.cell.try_begin() {
            // The channel is empty and sized for one, so this cannot block or fail
            let _ = tx.try_send(SupervisorError::AlreadyRunning(self.name.clone()));
            return rx;
        }

        let run = SupervisionLoop {
            name: self.name.clone(),
            config: Arc::clone(&self.config),
            cell: Arc::clone(&self.cell),
            errors: tx,
        };
        tokio::spawn(run.run().instrument(self.span.clone()));

        rx
    }

    /// Stop the current run
    ///
    /// A no-op unless the process is RUNNING. Otherwise the process moves to
    /// STOPPING, the child is sent the configured stop signal (or killed
    /// right away when none is set), escalated to SIGKILL after the stop
    /// timeout, and the call returns once the child has been reaped and the
    /// process is STOPPED.
    pub async fn stop(&self) -> Result<()> {
        let Some(mut handle) = self.cell.claim_stop() else {
            return Ok(());
        };

        let timeout = self.config.stop_timeout();
        let graceful = match self.stop_signal() {
            Some(signal) if handle.signal(signal) => {
                info!(
                    parent: &self.span,
                    "stopping with {} (pid {:?})",
                    signal.as_str(),
                    handle.pid()
                );
                tokio::time::timeout(timeout, handle.wait()).await.is_ok()
            }
            _ => false,
        };

        if !graceful {
            info!(parent: &self.span, "killing (pid {:?})", handle.pid());
            handle.kill();
            if tokio::time::timeout(timeout, handle.wait()).await.is_err() {
                return Err(SupervisorError::StopError(
                    self.name.clone(),
                    "child was not reaped after kill".to_string(),
                ));
            }
        }

        // The loop normally settles STOPPED itself before signalling the exit
        self.cell.transition(Status::Stopping, Status::Stopped);
        info!(parent: &self.span, "stopped");

        Ok(())
    }

    fn stop_signal(&self) -> Option<Signal> {
        let name = self.config.stop_signal.as_deref()?;
        match parse_signal(name) {
            Ok(signal) => Some(signal),
            Err(e) => {
                warn!(parent: &self.span, "{}", e);
                None
            }
        }
    }
}

/// Map a configured signal name to a nix signal
pub fn parse_signal(signal_name: &str) -> Result<Signal> {
    match signal_name {
        "SIGTERM" => Ok(Signal::SIGTERM),
        "SIGINT" => Ok(Signal::SIGINT),
        "SIGQUIT" => Ok(Signal::SIGQUIT),
        "SIGKILL" => Ok(Signal::SIGKILL),
        "SIGHUP" => Ok(Signal::SIGHUP),
        "SIGUSR1" => Ok(Signal::SIGUSR1),
        "SIGUSR2" => Ok(Signal::SIGUSR2),
        _ => Err(SupervisorError::SignalError(format!(
            "invalid signal name: {}",
            signal_name
        ))),
    }
}

/// State moved into the background task by `start`
struct SupervisionLoop {
    name: String,
    config: Arc<ProcessConfig>,
    cell: Arc<StateCell>,
    errors: mpsc::Sender<SupervisorError>,
}

impl SupervisionLoop {
    async fn run(self) {
        loop {
            let mut command = match spawner::prepare(&self.config) {
                Ok(command) => command,
                Err(e) => {
                    self.report(e).await;
                    break;
                }
            };

            match self.cell.retry_gate(self.config.retry) {
                RetryGate::First => debug!("launching"),
                RetryGate::Retry(n) => info!("relaunching (retry {}/{})", n, self.config.retry),
                RetryGate::Exhausted => {
                    self.report(SupervisorError::RetryExhausted(
                        self.name.clone(),
                        self.config.retry,
                    ))
                    .await;
                    break;
                }
            }

            let failure = match command.spawn() {
                Ok(mut child) => {
                    let (handle, mut control) = RunHandle::new(child.id());
                    self.cell.begin_run(handle);
                    info!("running (pid {:?})", child.id());

                    let result = control.wait(&mut child).await;
                    drop(command);
                    let outcome = self.cell.finish_run();
                    control.mark_exited();

                    if outcome == RunOutcome::Stopped {
                        debug!("run ended by stop request");
                        return;
                    }
                    self.classify(result)
                }
                Err(e) => {
                    drop(command);
                    if self.cell.finish_run() == RunOutcome::Stopped {
                        return;
                    }
                    Some(SupervisorError::SpawnError(self.name.clone(), e.to_string()))
                }
            };

            if let Some(err) = failure {
                self.report(err).await;
            }

            tokio::time::sleep(self.config.interval()).await;

            if !self.cell.transition(Status::RetryWait, Status::Standby) {
                break;
            }
        }

        self.cell.end();
        debug!("supervision loop finished");
    }

    fn classify(&self, result: std::io::Result<ExitStatus>) -> Option<SupervisorError> {
        match result {
            Ok(status) if status.success() => {
                info!("exited cleanly");
                None
            }
            Ok(status) => Some(SupervisorError::AbnormalExit(
                self.name.clone(),
                status.to_string(),
            )),
            Err(e) => Some(SupervisorError::AbnormalExit(
                self.name.clone(),
                e.to_string(),
            )),
        }
    }

    async fn report(&self, err: SupervisorError) {
        // A closed receiver means nobody is listening; the loop carries on
        let _ = self.errors.send(err).await;
    }
}
