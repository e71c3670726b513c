//! Handle to the dedicated server child process.
//!
//! The [`ServerProcess`] trait decouples supervision from the real child so tests
//! can drive the controller with a scripted fake instead of spawning a server.

use std::ffi::OsStr;
use std::io::Write;
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, info, instrument, warn};
use wait_timeout::ChildExt;

/// Longest single blocking wait while holding the child lock.
const WAIT_SLICE: Duration = Duration::from_millis(100);

/// How the server process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerExit {
    /// Exit code, or `None` when the process was killed by a signal.
    pub code: Option<i32>,
}

impl ServerExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<ExitStatus> for ServerExit {
    fn from(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

/// Operations the controller needs from a running server.
pub trait ServerProcess: Send + Sync {
    /// Process id, for logging.
    fn id(&self) -> u32;

    /// Write one console command to the server's stdin.
    ///
    /// Implementations must serialize concurrent callers so lines never interleave.
    fn send_command(&self, command: &str) -> Result<()>;

    /// Non-blocking exit check.
    fn try_exit(&self) -> Result<Option<ServerExit>>;

    /// Wait up to `timeout` for the server to exit.
    fn wait_exit(&self, timeout: Duration) -> Result<Option<ServerExit>>;

    /// Kill the server if it is still running and reap it.
    ///
    /// This is the hard stop used after the grace period or on a repeated signal.
    /// The polite stop is the `quit` console command, which lets the server save;
    /// `ChildServer` sends SIGKILL on unix (`Child::kill`).
    fn terminate(&self) -> Result<()>;

    /// Liveness predicate. A server whose state cannot be queried counts as gone.
    fn has_exited(&self) -> bool {
        match self.try_exit() {
            Ok(exit) => exit.is_some(),
            Err(err) => {
                warn!(err = %format!("{err:#}"), "cannot poll server, treating it as exited");
                true
            }
        }
    }
}

/// Wire framing for a console command: the trimmed command followed by a blank line.
pub fn frame_command(command: &str) -> String {
    format!("{}\n\n", command.trim())
}

/// A spawned server process with a piped stdin.
#[derive(Debug)]
pub struct ChildServer {
    pid: u32,
    child: Mutex<Child>,
    stdin: Mutex<Option<ChildStdin>>,
}

impl ChildServer {
    /// Spawn `program` with `args`. Stdout and stderr stay attached to the terminal.
    #[instrument(skip_all, fields(program = %program.as_ref().to_string_lossy()))]
    pub fn spawn<I, S>(program: impl AsRef<OsStr>, args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(program.as_ref());
        cmd.args(args).stdin(Stdio::piped());
        // Keep terminal Ctrl-C away from the server so the controller can save first.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        debug!(command = ?cmd, "spawning server");

        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                error!(err = %e, "failed to spawn server");
                return Err(e).with_context(|| {
                    format!("spawn server {}", program.as_ref().to_string_lossy())
                });
            }
        };
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        let pid = child.id();
        info!(pid, "server started");

        Ok(Self {
            pid,
            child: Mutex::new(child),
            stdin: Mutex::new(Some(stdin)),
        })
    }

    fn child(&self) -> Result<MutexGuard<'_, Child>> {
        self.child
            .lock()
            .map_err(|_| anyhow!("server handle lock poisoned"))
    }
}

impl ServerProcess for ChildServer {
    fn id(&self) -> u32 {
        self.pid
    }

    fn send_command(&self, command: &str) -> Result<()> {
        let mut guard = self
            .stdin
            .lock()
            .map_err(|_| anyhow!("server stdin lock poisoned"))?;
        let stdin = guard
            .as_mut()
            .ok_or_else(|| anyhow!("server stdin already closed"))?;
        debug!(command = command.trim(), "sending server command");
        stdin
            .write_all(frame_command(command).as_bytes())
            .context("write server stdin")?;
        stdin.flush().context("flush server stdin")?;
        Ok(())
    }

    fn try_exit(&self) -> Result<Option<ServerExit>> {
        let status = self.child()?.try_wait().context("poll server")?;
        Ok(status.map(ServerExit::from))
    }

    fn wait_exit(&self, timeout: Duration) -> Result<Option<ServerExit>> {
        // Waits in short slices so other threads can still poll or terminate.
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let slice = remaining.min(WAIT_SLICE);
            let status = self
                .child()?
                .wait_timeout(slice)
                .context("wait for server")?;
            if let Some(status) = status {
                return Ok(Some(status.into()));
            }
            if remaining <= slice {
                return Ok(None);
            }
        }
    }

    fn terminate(&self) -> Result<()> {
        let mut child = self.child()?;
        if child.try_wait().context("poll server")?.is_some() {
            return Ok(());
        }
        warn!(pid = self.pid, "killing server");
        child.kill().context("kill server")?;
        let status = child.wait().context("wait server after kill")?;
        debug!(exit_code = ?status.code(), "server reaped");
        drop(child);

        if let Ok(mut stdin) = self.stdin.lock() {
            stdin.take();
        }
        Ok(())
    }
}
