//! OS process inspection, signalling and detached server launch

use crate::error::{GgufError, GgufResult};
use std::path::PathBuf;
use std::process::Stdio;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use tokio::process::Command;

// ============================================================================
// Trait Definitions
// ============================================================================

/// A process found in the OS process table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    pub pid: u32,
    pub args: Vec<String>,
}

impl ProcessHandle {
    pub fn new(pid: u32, args: Vec<String>) -> Self {
        Self { pid, args }
    }

    /// Full command line, arguments joined by spaces
    pub fn command_line(&self) -> String {
        self.args.join(" ")
    }

    /// Model file passed with `-m` / `--model`, quotes stripped
    pub fn model_path(&self) -> Option<PathBuf> {
        let idx = self.args.iter().position(|a| a == "-m" || a == "--model")?;
        let raw = self.args.get(idx + 1)?;
        let trimmed = raw
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .unwrap_or(raw);
        Some(PathBuf::from(trimmed))
    }
}

/// Signal used to stop a server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    /// SIGTERM
    Terminate,
    /// SIGKILL
    Kill,
}

/// Read and signal the OS process table
pub trait ProcessInspector: Send + Sync {
    /// Every process whose command line contains `pattern`, ordered by PID
    fn find_by_command_substring(&self, pattern: &str) -> GgufResult<Vec<ProcessHandle>>;

    /// Deliver `signal` to `pid`
    fn signal(&self, pid: u32, signal: StopSignal) -> GgufResult<()>;
}

/// Everything needed to start one inference server
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchSpec {
    pub binary: String,
    pub model_path: PathBuf,
    pub port: u16,
    pub log_file: PathBuf,
}

impl LaunchSpec {
    pub fn args(&self) -> Vec<String> {
        vec![
            "-m".to_string(),
            self.model_path.to_string_lossy().into_owned(),
            "--port".to_string(),
            self.port.to_string(),
        ]
    }
}

/// Start an inference server without waiting for it
pub trait ServerLauncher: Send + Sync {
    /// Returns the PID of the spawned process
    fn launch(&self, spec: &LaunchSpec) -> GgufResult<u32>;
}

// ============================================================================
// Production Implementation
// ============================================================================

/// Process table access through sysinfo, signals through nix
#[derive(Debug, Default)]
pub struct SystemInspector;

impl SystemInspector {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessInspector for SystemInspector {
    fn find_by_command_substring(&self, pattern: &str) -> GgufResult<Vec<ProcessHandle>> {
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_cmd(UpdateKind::Always),
        );

        let own_pid = std::process::id();
        let mut handles: Vec<ProcessHandle> = system
            .processes()
            .iter()
            // Threads show up as tasks on Linux; only whole processes are signalled
            .filter(|(_, process)| process.thread_kind().is_none())
            .filter_map(|(pid, process)| {
                let pid = pid.as_u32();
                if pid == own_pid {
                    return None;
                }
                let mut args: Vec<String> = process
                    .cmd()
                    .iter()
                    .map(|a| a.to_string_lossy().into_owned())
                    .collect();
                if args.is_empty() {
                    args.push(process.name().to_string_lossy().into_owned());
                }
                let handle = ProcessHandle::new(pid, args);
                handle.command_line().contains(pattern).then_some(handle)
            })
            .collect();

        handles.sort_by_key(|h| h.pid);
        tracing::debug!(pattern = %pattern, found = handles.len(), "Process table scanned");
        Ok(handles)
    }

    fn signal(&self, pid: u32, signal: StopSignal) -> GgufResult<()> {
        #[cfg(unix)]
        {
            use nix::errno::Errno;
            use nix::sys::signal::{Signal, kill};
            use nix::unistd::Pid;

            let sig = match signal {
                StopSignal::Terminate => Signal::SIGTERM,
                StopSignal::Kill => Signal::SIGKILL,
            };
            // 0 and negative values address process groups, never a single server
            let raw = i32::try_from(pid)
                .ok()
                .filter(|raw| *raw > 0)
                .ok_or_else(|| GgufError::Validation(format!("invalid PID {}", pid)))?;

            kill(Pid::from_raw(raw), sig).map_err(|e| match e {
                Errno::ESRCH => GgufError::NoSuchProcess(pid),
                e => GgufError::Process(format!("failed to signal process {}: {}", pid, e)),
            })?;

            tracing::debug!(pid = pid, signal = ?sig, "Signal sent");
            Ok(())
        }

        #[cfg(not(unix))]
        {
            let _ = signal;
            Err(GgufError::Process(format!(
                "cannot signal process {}: unsupported platform",
                pid
            )))
        }
    }
}

/// Spawns the server detached with output redirected to its log file
#[derive(Debug, Default)]
pub struct SystemLauncher;

impl SystemLauncher {
    pub fn new() -> Self {
        Self
    }
}

impl ServerLauncher for SystemLauncher {
    fn launch(&self, spec: &LaunchSpec) -> GgufResult<u32> {
        if let Some(dir) = spec.log_file.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let log_file = std::fs::File::create(&spec.log_file).map_err(|e| {
            GgufError::Process(format!("creating log file {:?}: {}", spec.log_file, e))
        })?;
        let stderr_file = log_file.try_clone()?;

        let mut cmd = Command::new(&spec.binary);
        cmd.args(spec.args())
            .stdin(Stdio::null())
            .stdout(log_file)
            .stderr(stderr_file)
            .kill_on_drop(false);

        // Own process group so a Ctrl+C in the terminal does not reach the server
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd
            .spawn()
            .map_err(|e| GgufError::Process(format!("starting server {}: {}", spec.binary, e)))?;
        let pid = child
            .id()
            .ok_or_else(|| GgufError::Process("spawned server exited immediately".to_string()))?;

        tracing::info!(
            pid = pid,
            model = ?spec.model_path,
            port = spec.port,
            log_file = ?spec.log_file,
            "Inference server spawned"
        );

        // Dropping the handle leaves the server running
        drop(child);
        Ok(pid)
    }
}

// ============================================================================
// Mock Implementation for Testing
// ============================================================================


#[cfg(test)]
mod tests {
    use super::*;

    fn handle(args: &[&str]) -> ProcessHandle {
        ProcessHandle::new(42, args.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_model_path_extraction() {
        let h = handle(&["/opt/bin/llama-server", "-m", "/m/a/b.gguf", "--port", "1966"]);
        assert_eq!(h.model_path(), Some(PathBuf::from("/m/a/b.gguf")));

        let quoted = handle(&["llama-server", "--model", "\"/m/x y.gguf\""]);
        assert_eq!(quoted.model_path(), Some(PathBuf::from("/m/x y.gguf")));

        assert_eq!(handle(&["llama-server", "--port", "1"]).model_path(), None);
        assert_eq!(handle(&["llama-server", "-m"]).model_path(), None);
    }

    #[test]
    fn test_launch_args() {
        let spec = LaunchSpec {
            binary: "/opt/bin/llama-server".to_string(),
            model_path: PathBuf::from("/m/a.gguf"),
            port: 1966,
            log_file: PathBuf::from("/tmp/llama_server_a.log"),
        };
        assert_eq!(spec.args(), vec!["-m", "/m/a.gguf", "--port", "1966"]);
    }

    #[test]
    fn test_system_inspector_excludes_self() {
        let inspector = SystemInspector::new();
        let own = std::process::id();
        let found = inspector
            .find_by_command_substring("")
            .expect("process scan should succeed");
        assert!(found.iter().all(|h| h.pid != own));
    }

    #[cfg(unix)]
    #[test]
    fn test_system_inspector_refuses_group_pids() {
        let inspector = SystemInspector::new();
        for pid in [0, u32::MAX, i32::MAX as u32 + 1] {
            let err = inspector.signal(pid, StopSignal::Terminate).unwrap_err();
            assert!(matches!(err, GgufError::Validation(_)), "{pid}");
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_system_inspector_reports_missing_process() {
        // Above the default Linux pid_max, so nothing can hold it
        let pid = 4_194_304 + 17;
        let err = SystemInspector::new()
            .signal(pid, StopSignal::Kill)
            .unwrap_err();
        assert!(matches!(err, GgufError::NoSuchProcess(p) if p == pid));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_launcher_and_signal() {
        let dir = tempfile::tempdir().unwrap();
        let log_file = dir.path().join("llama_server_sleep.log");
        let spec = LaunchSpec {
            binary: "sleep".to_string(),
            model_path: PathBuf::from("30"),
            port: 1966,
            log_file: log_file.clone(),
        };

        // `sleep -m 30 --port 1966` fails fast on GNU sleep; only spawn success matters here
        let pid = SystemLauncher::new().launch(&spec).unwrap();
        assert!(pid > 0);
        assert!(log_file.exists());

        let _ = SystemInspector::new().signal(pid, StopSignal::Kill);
    }
}
