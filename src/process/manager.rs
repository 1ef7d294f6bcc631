use crate::config::{ConfigSet, ProcessConfig};
use crate::error::{Result, SupervisorError};
use crate::process::supervisor::ProcessSupervisor;
use crate::process::types::{ProcessInfo, Status};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument, Span};

/// Orchestrates every configured process
///
/// The set of processes is fixed at construction. Each started process
/// gets a monitor task that logs its errors and, once the shared shutdown
/// token fires, keeps stopping it until its supervision loop has ended.
pub struct Manager {
    procs: HashMap<String, Arc<ProcessSupervisor>>,
    order: Vec<String>,
    shutdown: Mutex<CancellationToken>,
    monitors: Mutex<JoinSet<()>>,
    span: Span,
}

impl Manager {
    /// Load processes in order, skipping any whose name was already taken
    pub fn new(configs: impl IntoIterator<Item = ProcessConfig>, span: Span) -> Self {
        let mut procs = HashMap::new();
        let mut order = Vec::new();

        for config in configs {
            let name = config.display_name().to_string();
            if procs.contains_key(&name) {
                warn!(parent: &span, "duplicate name {} load skipped", name);
                continue;
            }
            let proc = ProcessSupervisor::new(config, &span);
            procs.insert(name.clone(), Arc::new(proc));
            order.push(name);
        }

        Self {
            procs,
            order,
            shutdown: Mutex::new(CancellationToken::new()),
            monitors: Mutex::new(JoinSet::new()),
            span,
        }
    }

    pub fn from_config_set(config: &ConfigSet, span: Span) -> Self {
        Self::new(config.procs.iter().cloned(), span)
    }

    /// Process names in load order
    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ProcessSupervisor>> {
        self.procs.get(name)
    }

    fn lookup(&self, name: &str) -> Result<&Arc<ProcessSupervisor>> {
        self.procs
            .get(name)
            .ok_or_else(|| SupervisorError::UnknownProcess(name.to_string()))
    }

    fn shutdown_token(&self) -> CancellationToken {
        self.shutdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn monitors(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.monitors.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start one process and attach a monitor to it
    ///
    /// Start is called synchronously, so the process has left STOPPED by the
    /// time this returns (unless it was not STOPPED to begin with, in which
    /// case the monitor logs the rejection).
    pub fn run(&self, name: &str) -> Result<()> {
        let proc = Arc::clone(self.lookup(name)?);
        let errors = proc.start();
        let shutdown = self.shutdown_token();
        let span = tracing::info_span!(parent: &self.span, "monitor", name = %name);

        let mut monitors = self.monitors();
        while monitors.try_join_next().is_some() {}
        monitors.spawn(monitor(proc, errors, shutdown).instrument(span));

        Ok(())
    }

    /// Start every process in load order
    pub fn start_all(&self) {
        *self.shutdown.lock().unwrap_or_else(PoisonError::into_inner) = CancellationToken::new();

        for name in &self.order {
            if let Err(e) = self.run(name) {
                error!(parent: &self.span, "error {}: {}", name, e);
            }
        }
    }

    /// Stop every process and wait for all monitors to finish
    ///
    /// When this returns every process is STOPPED and no child it launched
    /// is still alive. Calling it again is harmless.
    pub async fn stop_all(&self) {
        self.shutdown_token().cancel();

        let mut monitors = std::mem::take(&mut *self.monitors());
        while let Some(result) = monitors.join_next().await {
            if let Err(e) = result {
                error!(parent: &self.span, "monitor task failed: {}", e);
            }
        }
    }

    /// Status of one process, or of all of them in load order when
    /// `target` is empty
    pub fn status(&self, target: &str) -> Result<Vec<ProcessInfo>> {
        if target.is_empty() {
            return Ok(self.order.iter().map(|name| self.procs[name].info()).collect());
        }
        Ok(vec![self.lookup(target)?.info()])
    }

    /// Start one process; a no-op unless it is STOPPED
    pub fn start(&self, target: &str) -> Result<Status> {
        self.run(target)?;
        Ok(self.lookup(target)?.status())
    }

    /// Stop one process; a no-op unless it is RUNNING
    pub async fn stop(&self, target: &str) -> Result<Status> {
        let proc = self.lookup(target)?;
        proc.stop().await?;
        Ok(proc.status())
    }
}

async fn monitor(
    proc: Arc<ProcessSupervisor>,
    mut errors: mpsc::Receiver<SupervisorError>,
    shutdown: CancellationToken,
) {
    let name = proc.name().to_string();
    info!("start: {}", name);

    loop {
        tokio::select! {
            err = errors.recv() => match err {
                Some(e) => log_error(&name, &e),
                None => {
                    info!("terminated: {}", name);
                    return;
                }
            },
            _ = shutdown.cancelled() => break,
        }
    }

    // A loop in backoff may still relaunch, so stop again on every
    // transition until the error channel closes.
    let mut status = proc.subscribe();
    loop {
        status.mark_unchanged();
        if let Err(e) = proc.stop().await {
            error!("error {}: {}", name, e);
        }

        tokio::select! {
            err = errors.recv() => match err {
                Some(e) => log_error(&name, &e),
                None => break,
            },
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    info!("terminated: {}", name);
}

fn log_error(name: &str, err: &SupervisorError) {
    error!("error {}: {}", name, err);
    if err.is_terminal() {
        debug!("{} will not be relaunched until started again", name);
    }
}

#[cfg(test)]
mod tests;
