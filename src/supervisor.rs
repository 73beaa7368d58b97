//! Inference server supervision: ensure running, list, kill

use crate::config::Config;
use crate::error::{GgufError, GgufResult};
use crate::health::{HealthProbe, wait_for_ready};
use crate::lock::StartLock;
use crate::process::{LaunchSpec, ProcessHandle, ProcessInspector, ServerLauncher, StopSignal};
use crate::store::Store;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Knobs for the supervisor, usually derived from [`Config`]
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub server_binary: String,
    pub port: u16,
    pub log_dir: PathBuf,
    pub lock_dir: PathBuf,
    /// Readiness checks before giving up
    pub max_ticks: u32,
    pub tick: Duration,
    /// Wait between SIGTERM and SIGKILL in `kill_all`
    pub kill_grace: Duration,
}

impl SupervisorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            server_binary: config.server_binary.clone(),
            port: config.port,
            log_dir: config.log_dir.clone(),
            lock_dir: config.lock_dir.clone(),
            max_ticks: u32::try_from(config.startup_timeout_secs).unwrap_or(u32::MAX),
            tick: Duration::from_secs(1),
            kill_grace: Duration::from_secs(config.kill_grace_secs),
        }
    }

    /// Per-slug log file for a spawned server
    pub fn log_file_for(&self, slug: &str) -> PathBuf {
        self.log_dir.join(format!("llama_server_{}.log", slug))
    }

    /// Executable name used to recognise server processes
    pub fn server_name(&self) -> String {
        Path::new(&self.server_binary)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.server_binary.clone())
    }
}

/// What `ensure_running` had to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    AlreadyRunning { pid: u32 },
    Started { pid: u32, checks: u32 },
}

/// One row of `ps`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerProcess {
    pub pid: u32,
    /// Slug of the matching record, `unknown` when none matches
    pub slug: String,
    /// Model file stem
    pub model: String,
}

/// Per-PID outcome of a kill request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KillReport {
    pub terminated: Vec<u32>,
    pub force_killed: Vec<u32>,
    pub failures: Vec<(u32, String)>,
}

impl KillReport {
    pub fn is_empty(&self) -> bool {
        self.terminated.is_empty() && self.force_killed.is_empty() && self.failures.is_empty()
    }
}

/// Starts, finds and stops inference servers
pub struct Supervisor {
    settings: SupervisorSettings,
    inspector: Arc<dyn ProcessInspector>,
    launcher: Arc<dyn ServerLauncher>,
    probe: Arc<dyn HealthProbe>,
}

impl Supervisor {
    pub fn new(
        settings: SupervisorSettings,
        inspector: Arc<dyn ProcessInspector>,
        launcher: Arc<dyn ServerLauncher>,
        probe: Arc<dyn HealthProbe>,
    ) -> Self {
        Self {
            settings,
            inspector,
            launcher,
            probe,
        }
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    /// Make sure a server for `slug` is up and answering health checks
    ///
    /// The check-then-spawn sequence runs under a per-model lock so concurrent
    /// invocations for the same model launch at most one server.
    pub async fn ensure_running(&self, store: &Store, slug: &str) -> GgufResult<EnsureOutcome> {
        let record = store.get(slug)?;
        store.touch(slug)?;

        let _lock = StartLock::acquire(&self.settings.lock_dir, slug).await?;

        if let Some(existing) = self.find_for_model(&record.file_path)? {
            tracing::info!(slug = %slug, pid = existing.pid, "Server for model is already running");
            return Ok(EnsureOutcome::AlreadyRunning { pid: existing.pid });
        }

        let spec = LaunchSpec {
            binary: self.settings.server_binary.clone(),
            model_path: record.file_path.clone(),
            port: self.settings.port,
            log_file: self.settings.log_file_for(slug),
        };

        tracing::info!(slug = %slug, "Starting server for model");
        let pid = self.launcher.launch(&spec)?;
        tracing::info!(pid = pid, log_file = ?spec.log_file, "Server started");

        let checks = wait_for_ready(self.probe.as_ref(), self.settings.max_ticks, self.settings.tick)
            .await?;

        Ok(EnsureOutcome::Started { pid, checks })
    }

    /// Server process whose command line references `model_path`
    fn find_for_model(&self, model_path: &Path) -> GgufResult<Option<ProcessHandle>> {
        let server_name = self.settings.server_name();
        let pattern = model_path.to_string_lossy();
        Ok(self
            .inspector
            .find_by_command_substring(&pattern)?
            .into_iter()
            .find(|h| h.command_line().contains(&server_name)))
    }

    fn server_processes(&self) -> GgufResult<Vec<ProcessHandle>> {
        self.inspector
            .find_by_command_substring(&self.settings.server_name())
    }

    /// Running servers with the slug of the model each one serves
    pub fn list_processes(&self, store: &Store) -> GgufResult<Vec<ServerProcess>> {
        let mut rows = Vec::new();

        for handle in self.server_processes()? {
            let Some(model_path) = handle.model_path() else {
                continue;
            };
            let file_name = model_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let model = model_path
                .file_stem()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            let slug = store
                .find_by_file_name(&file_name)?
                .map(|r| r.slug)
                .unwrap_or_else(|| "unknown".to_string());

            rows.push(ServerProcess {
                pid: handle.pid,
                slug,
                model,
            });
        }

        Ok(rows)
    }

    /// Terminate a server by PID, slug, or command-line fragment
    ///
    /// A known slug is matched through its model file path; anything else is
    /// searched for verbatim in server command lines.
    pub fn kill(&self, store: &Store, target: &str) -> GgufResult<KillReport> {
        if let Ok(raw) = target.parse::<u64>() {
            let pid = checked_pid(raw)?;
            self.inspector.signal(pid, StopSignal::Terminate)?;
            tracing::info!(pid = pid, "Process terminated");
            return Ok(KillReport {
                terminated: vec![pid],
                ..Default::default()
            });
        }

        let pattern = match store.get(target) {
            Ok(record) => record.file_path.to_string_lossy().into_owned(),
            Err(e) if e.is_not_found() => target.to_string(),
            Err(e) => return Err(e),
        };

        let server_name = self.settings.server_name();
        let matches: Vec<ProcessHandle> = self
            .inspector
            .find_by_command_substring(&pattern)?
            .into_iter()
            .filter(|h| h.command_line().contains(&server_name))
            .collect();

        if matches.is_empty() {
            return Err(GgufError::NotFound(format!(
                "no running server found for model '{}'",
                target
            )));
        }

        let mut report = KillReport::default();
        for handle in matches {
            match self.inspector.signal(handle.pid, StopSignal::Terminate) {
                Ok(()) => {
                    tracing::info!(target = %target, pid = handle.pid, "Server terminated");
                    report.terminated.push(handle.pid);
                }
                Err(e) => {
                    tracing::error!(pid = handle.pid, error = %e, "Failed to terminate process");
                    report.failures.push((handle.pid, e.to_string()));
                }
            }
        }
        Ok(report)
    }

    /// SIGTERM every server, wait the grace period, SIGKILL survivors
    pub async fn kill_all(&self) -> GgufResult<KillReport> {
        let mut report = KillReport::default();

        let initial = self.server_processes()?;
        if initial.is_empty() {
            tracing::warn!("No running server processes found");
            return Ok(report);
        }

        tracing::info!(count = initial.len(), "Killing all server processes");
        for handle in &initial {
            match self.inspector.signal(handle.pid, StopSignal::Terminate) {
                Ok(()) => report.terminated.push(handle.pid),
                Err(e) => {
                    tracing::error!(pid = handle.pid, error = %e, "Failed to terminate process");
                    report.failures.push((handle.pid, e.to_string()));
                }
            }
        }

        tokio::time::sleep(self.settings.kill_grace).await;

        // PIDs that refused SIGTERM are already reported; SIGKILL would fail the same way
        let survivors: Vec<ProcessHandle> = self
            .server_processes()?
            .into_iter()
            .filter(|h| !report.failures.iter().any(|(pid, _)| *pid == h.pid))
            .collect();
        if !survivors.is_empty() {
            tracing::warn!(
                count = survivors.len(),
                "Some processes didn't terminate cleanly, force killing"
            );
        }
        for handle in survivors {
            match self.inspector.signal(handle.pid, StopSignal::Kill) {
                Ok(()) => report.force_killed.push(handle.pid),
                Err(GgufError::NoSuchProcess(pid)) => {
                    tracing::debug!(pid = pid, "Process exited before force kill");
                }
                Err(e) => {
                    tracing::error!(pid = handle.pid, error = %e, "Failed to force kill process");
                    report.failures.push((handle.pid, e.to_string()));
                }
            }
        }

        Ok(report)
    }
}

/// A numeric kill target that names exactly one process
fn checked_pid(raw: u64) -> GgufResult<u32> {
    u32::try_from(raw)
        .ok()
        .filter(|pid| *pid > 0 && i32::try_from(*pid).is_ok())
        .ok_or_else(|| GgufError::Validation(format!("invalid PID {}", raw)))
}
