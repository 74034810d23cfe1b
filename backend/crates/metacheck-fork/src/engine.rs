//! Chopsticks worker lifecycle.

use crate::error::ForkError;
use crate::handle::ChopsticksHandle;
use async_trait::async_trait;
use metacheck_commons::ForkParams;
use metacheck_configs::{MetacheckConfig, WorkerSettings};
use metacheck_live::{LiveError, SimulationEngine, SimulationHandle};
use parking_lot::Mutex;
use std::io::Write;
use std::net::TcpListener;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::process::{Child, Command};
use tokio::time::Instant;

const READINESS_POLL_INTERVAL: Duration = Duration::from_millis(250);
const KILL_GRACE: Duration = Duration::from_secs(5);

struct Worker {
    child: Child,
    port: u16,
    closed: Arc<AtomicBool>,
    /// Kept alive for as long as the worker may read it.
    _code_override: Option<NamedTempFile>,
}

/// Launches one Chopsticks worker process per simulation.
pub struct ChopsticksEngine {
    settings: WorkerSettings,
    request_timeout: Duration,
    workers: Mutex<Vec<Worker>>,
}

impl ChopsticksEngine {
    pub fn new(settings: WorkerSettings, request_timeout: Duration) -> Self {
        Self {
            settings,
            request_timeout,
            workers: Mutex::new(Vec::new()),
        }
    }

    pub fn from_config(config: &MetacheckConfig) -> Self {
        Self::new(config.worker.clone(), config.timeouts.request_timeout())
    }

    pub fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    /// Workers launched and not yet released.
    pub fn running_workers(&self) -> usize {
        self.workers.lock().len()
    }

    async fn launch(&self, params: &ForkParams) -> Result<ChopsticksHandle, ForkError> {
        let port = free_port(&self.settings.host)?;
        let code_override = params.wasm_override.as_deref().map(stage_override).transpose()?;
        let args = worker_args(
            &self.settings,
            params,
            port,
            code_override.as_ref().map(|file| file.path()),
        );

        log::debug!("[metacheck-fork] Launching {} {}", self.settings.command, args.join(" "));
        let mut child = Command::new(&self.settings.command)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ForkError::Spawn {
                command: self.settings.command.clone(),
                source,
            })?;

        let url = format!("ws://{}:{}", self.settings.host, port);
        match wait_until_ready(
            &mut child,
            &url,
            self.settings.startup_timeout(),
            self.request_timeout,
        )
        .await
        {
            Ok(handle) => {
                log::info!("[metacheck-fork] Worker ready at {}", url);
                self.workers.lock().push(Worker {
                    child,
                    port,
                    closed: handle.closed_flag(),
                    _code_override: code_override,
                });
                Ok(handle)
            },
            Err(e) => {
                terminate(&mut child).await;
                Err(e)
            },
        }
    }
}

#[async_trait]
impl SimulationEngine for ChopsticksEngine {
    async fn setup(&self, params: &ForkParams) -> metacheck_live::Result<Arc<dyn SimulationHandle>> {
        let handle = self.launch(params).await.map_err(LiveError::from)?;
        Ok(Arc::new(handle))
    }

    async fn release_worker(&self) {
        let finished: Vec<Worker> = {
            let mut workers = self.workers.lock();
            let (finished, running): (Vec<Worker>, Vec<Worker>) = workers
                .drain(..)
                .partition(|worker| worker.closed.load(Ordering::SeqCst));
            *workers = running;
            finished
        };

        for mut worker in finished {
            log::debug!("[metacheck-fork] Stopping worker on port {}", worker.port);
            terminate(&mut worker.child).await;
        }
    }
}

/// Command-line arguments for one worker, after the configured prefix.
pub fn worker_args(
    settings: &WorkerSettings,
    params: &ForkParams,
    port: u16,
    code_override: Option<&Path>,
) -> Vec<String> {
    let mut args = settings.args.clone();
    args.push(format!("--endpoint={}", params.endpoint));
    args.push(format!("--port={}", port));
    if let Some(block) = &params.block {
        args.push(format!("--block={}", block));
    }
    if let Some(path) = code_override {
        args.push(format!("--wasm-override={}", path.display()));
    }
    args.push(format!("--runtime-log-level={}", settings.runtime_log_level));
    args
}

fn free_port(host: &str) -> Result<u16, ForkError> {
    let listener = TcpListener::bind((host, 0)).map_err(ForkError::Port)?;
    let port = listener.local_addr().map_err(ForkError::Port)?.port();
    Ok(port)
}

fn stage_override(code: &[u8]) -> Result<NamedTempFile, ForkError> {
    let mut file = tempfile::Builder::new()
        .prefix("metacheck-override-")
        .suffix(".wasm")
        .tempfile()
        .map_err(ForkError::Override)?;
    file.write_all(code).map_err(ForkError::Override)?;
    file.flush().map_err(ForkError::Override)?;
    Ok(file)
}

async fn wait_until_ready(
    child: &mut Child,
    url: &str,
    startup_timeout: Duration,
    request_timeout: Duration,
) -> Result<ChopsticksHandle, ForkError> {
    let deadline = Instant::now() + startup_timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Err(ForkError::Exited(status.to_string())),
            Ok(None) => {},
            Err(e) => return Err(ForkError::Exited(e.to_string())),
        }

        match ChopsticksHandle::connect(url, request_timeout).await {
            Ok(handle) => return Ok(handle),
            Err(e) => log::trace!("[metacheck-fork] Worker not ready yet: {}", e),
        }

        if Instant::now() >= deadline {
            return Err(ForkError::StartupTimeout(startup_timeout));
        }
        tokio::time::sleep(READINESS_POLL_INTERVAL).await;
    }
}

async fn terminate(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        log::debug!("[metacheck-fork] Worker already stopped: {}", e);
    }
    match tokio::time::timeout(KILL_GRACE, child.wait()).await {
        Ok(Ok(status)) => log::debug!("[metacheck-fork] Worker exited with {}", status),
        Ok(Err(e)) => log::warn!("[metacheck-fork] Failed to reap worker: {}", e),
        Err(_) => log::warn!("[metacheck-fork] Worker did not exit within {:?}", KILL_GRACE),
    }
}
