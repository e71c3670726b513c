//! Shared session state: the running flag, the server handle, the save
//! orchestrator, and the quit path every shutdown trigger goes through.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::io::process::{ServerExit, ServerProcess};
use crate::save::{SaveOrchestrator, save_or_warn};

/// Cooperative cancellation shared by every session activity.
///
/// Starts set; once cleared it stays cleared.
#[derive(Debug, Clone)]
pub struct RunningFlag(Arc<AtomicBool>);

impl RunningFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the flag. Returns `true` for the call that actually cleared it.
    pub fn stop(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

impl Default for RunningFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of invoking the quit path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuitOutcome {
    /// This call ran the shutdown sequence.
    Completed {
        exit: Option<ServerExit>,
        /// The server ignored `quit` and had to be killed.
        forced: bool,
    },
    /// Another caller already started shutting down.
    AlreadyInProgress,
}

/// Handles shared by the dispatch loop, the autosave scheduler and the supervisor.
pub struct Controller {
    server: Arc<dyn ServerProcess>,
    saves: SaveOrchestrator,
    running: RunningFlag,
    quit_started: AtomicBool,
    grace: Duration,
}

impl Controller {
    pub fn new(
        server: Arc<dyn ServerProcess>,
        saves: SaveOrchestrator,
        running: RunningFlag,
        grace: Duration,
    ) -> Self {
        Self {
            server,
            saves,
            running,
            quit_started: AtomicBool::new(false),
            grace,
        }
    }

    pub fn server(&self) -> &dyn ServerProcess {
        self.server.as_ref()
    }

    pub fn saves(&self) -> &SaveOrchestrator {
        &self.saves
    }

    pub fn running(&self) -> &RunningFlag {
        &self.running
    }

    pub fn quit_started(&self) -> bool {
        self.quit_started.load(Ordering::SeqCst)
    }

    /// True once activities should wind down: the flag is cleared or the server is gone.
    pub fn should_stop(&self) -> bool {
        !self.running.is_running() || self.server.has_exited()
    }

    /// Save now; a save that is not confirmed in time only logs a warning.
    pub fn save(&self) -> Result<Option<PathBuf>> {
        save_or_warn(&self.saves)
    }

    /// The single shutdown sequence: final save, `quit` to the server, clear the
    /// running flag, then wait out the grace period and kill the server if needed.
    ///
    /// Only the first caller does any of this; later calls return
    /// [`QuitOutcome::AlreadyInProgress`] immediately.
    pub fn quit(&self, reason: &str) -> Result<QuitOutcome> {
        if self.quit_started.swap(true, Ordering::SeqCst) {
            debug!(reason, "quit already in progress");
            return Ok(QuitOutcome::AlreadyInProgress);
        }
        info!(reason, "shutting down server");

        if !self.server.has_exited() {
            if let Err(err) = self.save() {
                warn!(err = %format!("{err:#}"), "final save failed");
            }
            if let Err(err) = self.server.send_command("quit") {
                warn!(err = %format!("{err:#}"), "failed to send quit");
            }
        }
        self.running.stop();

        let exit = match self.server.wait_exit(self.grace) {
            Ok(exit) => exit,
            Err(err) => {
                warn!(err = %format!("{err:#}"), "failed waiting for server exit");
                None
            }
        };
        if let Some(exit) = exit {
            info!(exit_code = ?exit.code, "server exited");
            return Ok(QuitOutcome::Completed {
                exit: Some(exit),
                forced: false,
            });
        }

        warn!(
            grace_secs = self.grace.as_secs(),
            "server still running after quit, killing it"
        );
        self.server.terminate()?;
        Ok(QuitOutcome::Completed {
            exit: self.server.try_exit()?,
            forced: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeServer, fast_save_wait, session_dir_with_saves};
    use std::thread;

    fn controller(server: Arc<FakeServer>, dir: &std::path::Path) -> Controller {
        let saves = SaveOrchestrator::new(dir, server.clone(), fast_save_wait());
        Controller::new(
            server,
            saves,
            RunningFlag::new(),
            Duration::from_millis(200),
        )
    }

    #[test]
    fn running_flag_clears_once() {
        let flag = RunningFlag::new();
        let other = flag.clone();
        assert!(flag.is_running());
        assert!(other.stop());
        assert!(!other.stop());
        assert!(!flag.is_running());
    }

    #[test]
    fn quit_saves_then_quits() {
        let dir = session_dir_with_saves(&[]).expect("dir");
        let server = Arc::new(FakeServer::new());
        let controller = controller(server.clone(), dir.path());

        let outcome = controller.quit("test").expect("quit");
        assert_eq!(
            outcome,
            QuitOutcome::Completed {
                exit: Some(ServerExit { code: Some(0) }),
                forced: false
            }
        );
        assert!(!controller.running().is_running());

        let commands = server.commands();
        assert_eq!(commands.len(), 2);
        assert!(commands[0].starts_with("save "));
        assert_eq!(commands[1], "quit");
    }

    #[test]
    fn second_quit_is_a_no_op() {
        let dir = session_dir_with_saves(&[]).expect("dir");
        let server = Arc::new(FakeServer::new());
        let controller = controller(server.clone(), dir.path());

        controller.quit("first").expect("quit");
        assert_eq!(
            controller.quit("second").expect("quit"),
            QuitOutcome::AlreadyInProgress
        );
        let quits = server.commands().iter().filter(|c| *c == "quit").count();
        assert_eq!(quits, 1);
    }

    #[test]
    fn racing_quits_send_one_quit() {
        let dir = session_dir_with_saves(&[]).expect("dir");
        let server = Arc::new(FakeServer::new());
        let controller = Arc::new(controller(server.clone(), dir.path()));

        let handles: Vec<_> = (0..3)
            .map(|i| {
                let controller = controller.clone();
                thread::spawn(move || controller.quit(&format!("racer {i}")).expect("quit"))
            })
            .collect();
        let outcomes: Vec<QuitOutcome> = handles
            .into_iter()
            .map(|h| h.join().expect("join"))
            .collect();

        let completed = outcomes
            .iter()
            .filter(|o| matches!(o, QuitOutcome::Completed { .. }))
            .count();
        assert_eq!(completed, 1);
        let quits = server.commands().iter().filter(|c| *c == "quit").count();
        assert_eq!(quits, 1);
    }

    #[test]
    fn unresponsive_server_is_killed_after_grace() {
        let dir = session_dir_with_saves(&[]).expect("dir");
        let server = Arc::new(FakeServer::unresponsive());
        let controller = controller(server.clone(), dir.path());

        let outcome = controller.quit("test").expect("quit");
        assert!(matches!(outcome, QuitOutcome::Completed { forced: true, .. }));
        assert!(server.was_terminated());
    }

    #[test]
    fn quit_after_server_death_skips_commands() {
        let dir = session_dir_with_saves(&[]).expect("dir");
        let server = Arc::new(FakeServer::new());
        server.exit_with(3);
        let controller = controller(server.clone(), dir.path());

        let outcome = controller.quit("test").expect("quit");
        assert_eq!(
            outcome,
            QuitOutcome::Completed {
                exit: Some(ServerExit { code: Some(3) }),
                forced: false
            }
        );
        assert!(server.commands().is_empty());
    }
}
