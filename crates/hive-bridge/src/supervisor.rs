//! Executor process supervision.
//!
//! Every spawned executor is recorded in a process-wide table for as long as
//! it runs. A waiter task owns the child, logs its stdout/stderr under the
//! `hive::executor` target and deregisters it on exit. [`shutdown_all`]
//! sends SIGTERM to whatever is still registered; the CLI calls it on Ctrl-C
//! and [`install_shutdown_hook`] ties it to a guard's drop.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hive_types::{ExecutorConfig, HiveError};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Log target for lines the executor writes to stdout/stderr.
pub const EXECUTOR_LOG_TARGET: &str = "hive::executor";

/// pid -> session label of every executor still running.
static PROCESSES: Mutex<BTreeMap<u32, String>> = Mutex::new(BTreeMap::new());

fn table() -> std::sync::MutexGuard<'static, BTreeMap<u32, String>> {
    PROCESSES.lock().unwrap_or_else(|e| e.into_inner())
}

/// Pids of every registered executor.
pub fn registered_pids() -> Vec<u32> {
    table().keys().copied().collect()
}

/// Send SIGTERM to every registered executor. Returns how many were
/// signalled.
pub fn shutdown_all() -> usize {
    let snapshot: Vec<(u32, String)> = table()
        .iter()
        .map(|(pid, label)| (*pid, label.clone()))
        .collect();
    let mut signalled = 0;
    for (pid, label) in snapshot {
        if send_signal(pid, Signal::SIGTERM) {
            info!(pid, session = %label, "terminated executor on shutdown");
            signalled += 1;
        }
    }
    signalled
}

/// Guard that runs [`shutdown_all`] when dropped.
#[must_use = "executors are only terminated when the guard is dropped"]
#[derive(Debug)]
pub struct ShutdownGuard {
    _private: (),
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        let count = shutdown_all();
        if count > 0 {
            debug!(count, "shutdown hook terminated executors");
        }
    }
}

/// Arrange for every still-running executor to be terminated when the
/// returned guard goes out of scope (typically at the end of `main`).
pub fn install_shutdown_hook() -> ShutdownGuard {
    ShutdownGuard { _private: () }
}

/// Returns `false` when the process is already gone or not ours to signal.
fn send_signal(pid: u32, sig: Signal) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    match signal::kill(Pid::from_raw(raw), sig) {
        Ok(()) => true,
        Err(nix::errno::Errno::ESRCH) => {
            debug!(pid, signal = ?sig, "executor already exited");
            false
        }
        Err(e) => {
            warn!(pid, signal = ?sig, error = %e, "failed to signal executor");
            false
        }
    }
}

/// Lifecycle state published by the waiter task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    /// Exit code, `None` when the process was killed by a signal.
    Exited(Option<i32>),
}

/// Handle to a spawned executor process.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    pid: u32,
    label: Arc<str>,
    state: watch::Receiver<ProcessState>,
}

impl ProcessHandle {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn state(&self) -> ProcessState {
        *self.state.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ProcessState::Running
    }

    /// Ask the executor to stop (SIGTERM).
    pub fn terminate(&self) -> bool {
        self.is_running() && send_signal(self.pid, Signal::SIGTERM)
    }

    /// Kill the executor (SIGKILL).
    pub fn kill(&self) -> bool {
        self.is_running() && send_signal(self.pid, Signal::SIGKILL)
    }

    /// Wait for the process to exit and return its exit code.
    pub async fn wait(&self) -> Option<i32> {
        let mut state = self.state.clone();
        let code = match state
            .wait_for(|s| matches!(s, ProcessState::Exited(_)))
            .await
        {
            Ok(s) => match *s {
                ProcessState::Exited(code) => code,
                ProcessState::Running => None,
            },
            // Waiter task gone without publishing; the child was dropped and killed.
            Err(_) => None,
        };
        code
    }

    /// SIGTERM, then SIGKILL if the process outlives `grace`.
    pub async fn stop(&self, grace: Duration) -> Option<i32> {
        if !self.is_running() {
            return self.wait().await;
        }
        self.terminate();
        match tokio::time::timeout(grace, self.wait()).await {
            Ok(code) => code,
            Err(_) => {
                warn!(
                    pid = self.pid,
                    session = %self.label,
                    "executor ignored SIGTERM, killing"
                );
                self.kill();
                self.wait().await
            }
        }
    }
}

/// Launch the executor for one session.
///
/// The configured arguments come first; `address` is always the last
/// positional argument.
pub fn spawn(
    config: &ExecutorConfig,
    address: &str,
    label: &str,
) -> Result<ProcessHandle, HiveError> {
    let mut command = Command::new(&config.program);
    command
        .args(&config.args)
        .arg(address)
        .envs(config.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .map_err(|e| HiveError::Spawn(format!("{}: {e}", config.program.display())))?;
    let pid = child
        .id()
        .ok_or_else(|| HiveError::Spawn("executor exited before it could be tracked".into()))?;

    let label: Arc<str> = Arc::from(label);
    table().insert(pid, label.to_string());
    info!(
        pid,
        session = %label,
        program = %config.program.display(),
        address,
        "spawned executor"
    );

    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(forward_lines(stdout, Arc::clone(&label), false));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_lines(stderr, Arc::clone(&label), true));
    }

    let (state_tx, state_rx) = watch::channel(ProcessState::Running);
    let waiter_label = Arc::clone(&label);
    tokio::spawn(async move {
        let status = child.wait().await;
        table().remove(&pid);
        let code = match status {
            Ok(status) => {
                info!(pid, session = %waiter_label, code = ?status.code(), "executor exited");
                status.code()
            }
            Err(e) => {
                warn!(pid, session = %waiter_label, error = %e, "failed to wait for executor");
                None
            }
        };
        let _ = state_tx.send(ProcessState::Exited(code));
    });

    Ok(ProcessHandle {
        pid,
        label,
        state: state_rx,
    })
}

async fn forward_lines<R>(reader: R, label: Arc<str>, stderr: bool)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if stderr => {
                warn!(target: EXECUTOR_LOG_TARGET, session = %label, "{line}");
            }
            Ok(Some(line)) => {
                info!(target: EXECUTOR_LOG_TARGET, session = %label, "{line}");
            }
            Ok(None) => break,
            Err(e) => {
                debug!(session = %label, error = %e, "executor output stream ended");
                break;
            }
        }
    }
}
