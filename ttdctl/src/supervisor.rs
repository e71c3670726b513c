//! Server process supervision.
//!
//! The supervisor starts the server, runs the dispatch loop and the autosave
//! scheduler on their own threads, turns termination signals into the shared quit
//! path, and blocks until the server is gone and every activity has stopped.
//!
//! ```text
//! Starting -> Running -> Stopping -> Stopped
//! ```

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::autosave::{AutosaveSchedule, run_autosave};
use crate::controller::{Controller, QuitOutcome, RunningFlag};
use crate::core::launch::launch_args;
use crate::dispatch::{DispatchExit, run_dispatch_loop};
use crate::io::config::ControllerConfig;
use crate::io::input::{InputEvent, spawn_stdin_reader};
use crate::io::process::{ChildServer, ServerExit, ServerProcess};
use crate::io::session_link::refresh_last_link;
use crate::io::signals::{ShutdownSignal, spawn_signal_listener};
use crate::registry::CommandRegistry;
use crate::save::{SaveOrchestrator, SaveWait};
use crate::session::Session;

/// Extra time on top of the quit grace period before the supervisor kills a
/// server that is still alive after shutdown started.
const STOP_MARGIN: Duration = Duration::from_secs(5);

/// Supervisor lifecycle. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SupervisorState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl SupervisorState {
    /// Move to `next` unless that would go backwards.
    pub fn advance(&mut self, next: SupervisorState) {
        if next > *self {
            debug!(from = ?*self, to = ?next, "supervisor state");
            *self = next;
        }
    }
}

/// What ended the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Quit command, end of operator input, or a termination signal.
    Shutdown,
    /// The server exited without being asked to.
    ServerExited,
    /// A signal arrived while already shutting down and the server was killed.
    Forced,
}

/// Summary of a supervised session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorOutcome {
    pub exit: Option<ServerExit>,
    pub reason: StopReason,
    pub autosaves: u32,
    pub dispatch: Option<DispatchExit>,
}

/// Timing knobs for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorOptions {
    pub autosave: AutosaveSchedule,
    pub save_wait: SaveWait,
    pub quit_grace: Duration,
    /// Interval for the supervisor's own liveness checks.
    pub poll_interval: Duration,
}

impl SupervisorOptions {
    pub fn for_session(session: &Session, config: &ControllerConfig) -> Self {
        Self {
            autosave: AutosaveSchedule::every_minutes(session.autosave_minutes),
            save_wait: SaveWait {
                timeout: Duration::from_secs(config.save_timeout_secs),
                ..SaveWait::default()
            },
            quit_grace: Duration::from_secs(config.quit_grace_secs),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Channels connecting a session to the outside world.
pub struct SessionIo {
    /// Operator input; `None` runs the server without a console.
    pub input: Option<Receiver<InputEvent>>,
    /// Where command output (help, notices) is written.
    pub output: Box<dyn Write + Send>,
    pub signals: Receiver<ShutdownSignal>,
}

struct Workers {
    dispatch: Option<JoinHandle<Result<DispatchExit>>>,
    autosave: JoinHandle<u32>,
}

/// Run one session end to end: signals, stdin, latest-session link, server launch.
///
/// This is the only entry point the CLI needs.
#[instrument(skip_all, fields(dir = %session.dir.display()))]
pub fn run(session: &Session, options: &SupervisorOptions) -> Result<SupervisorOutcome> {
    let (signal_tx, signal_rx) = mpsc::channel();
    spawn_signal_listener(signal_tx)?;

    let input = if session.interactive {
        let (input_tx, input_rx) = mpsc::channel();
        spawn_stdin_reader(input_tx)?;
        Some(input_rx)
    } else {
        None
    };

    refresh_last_link(&session.last_link, &session.dir);

    let args = launch_args(
        session.starting_year,
        session.password.as_deref(),
        session.savegame.as_deref(),
    );
    let server = Arc::new(ChildServer::spawn(&session.server, &args)?);

    supervise(
        server,
        &session.dir,
        CommandRegistry::builtin(),
        SessionIo {
            input,
            output: Box::new(io::stdout()),
            signals: signal_rx,
        },
        options,
    )
}

/// Supervise an already started server until the session is over.
pub fn supervise(
    server: Arc<dyn ServerProcess>,
    session_dir: &Path,
    registry: CommandRegistry,
    io: SessionIo,
    options: &SupervisorOptions,
) -> Result<SupervisorOutcome> {
    let mut state = SupervisorState::Starting;
    let saves = SaveOrchestrator::new(session_dir, server.clone(), options.save_wait);
    let controller = Arc::new(Controller::new(
        server,
        saves,
        RunningFlag::new(),
        options.quit_grace,
    ));
    info!(pid = controller.server().id(), "supervising server");

    let SessionIo {
        input,
        output,
        signals,
    } = io;
    let workers = match spawn_workers(&controller, registry, input, output, options.autosave) {
        Ok(workers) => workers,
        Err(err) => {
            if let Err(term_err) = controller.server().terminate() {
                warn!(err = %format!("{term_err:#}"), "failed to terminate server");
            }
            return Err(err);
        }
    };
    state.advance(SupervisorState::Running);

    let mut reason: Option<StopReason> = None;
    let mut shutdown: Option<JoinHandle<Result<QuitOutcome>>> = None;
    let mut stopping_since: Option<Instant> = None;

    loop {
        match signals.recv_timeout(options.poll_interval) {
            Ok(ShutdownSignal(name)) => {
                if shutdown.is_some() || controller.quit_started() {
                    warn!(signal = name, "signal during shutdown, killing server");
                    reason = Some(StopReason::Forced);
                    controller.running().stop();
                    if let Err(err) = controller.server().terminate() {
                        warn!(err = %format!("{err:#}"), "failed to kill server");
                        break;
                    }
                } else {
                    info!(signal = name, "termination signal received");
                    let controller = controller.clone();
                    let handle = thread::Builder::new()
                        .name("shutdown".to_string())
                        .spawn(move || controller.quit(name))
                        .context("spawn shutdown thread")?;
                    shutdown = Some(handle);
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => thread::sleep(options.poll_interval),
        }

        let exited = controller.server().has_exited();
        if exited && controller.running().stop() {
            if controller.quit_started() {
                reason.get_or_insert(StopReason::Shutdown);
            } else {
                info!("server exited on its own");
                reason.get_or_insert(StopReason::ServerExited);
            }
        }
        if !controller.running().is_running() && state == SupervisorState::Running {
            reason.get_or_insert(StopReason::Shutdown);
            state.advance(SupervisorState::Stopping);
            stopping_since = Some(Instant::now());
        }
        if exited && !controller.running().is_running() {
            break;
        }
        if let Some(since) = stopping_since
            && since.elapsed() > options.quit_grace + STOP_MARGIN
        {
            warn!("server did not stop in time, killing it");
            if let Err(err) = controller.server().terminate() {
                warn!(err = %format!("{err:#}"), "failed to kill server");
                break;
            }
        }
    }

    let autosaves = workers
        .autosave
        .join()
        .map_err(|_| anyhow!("autosave thread panicked"))?;
    if let Some(handle) = shutdown {
        match handle.join() {
            Ok(Ok(outcome)) => debug!(?outcome, "signal shutdown finished"),
            Ok(Err(err)) => warn!(err = %format!("{err:#}"), "signal shutdown failed"),
            Err(_) => warn!("shutdown thread panicked"),
        }
    }
    let dispatch = match workers.dispatch {
        Some(handle) => Some(
            handle
                .join()
                .map_err(|_| anyhow!("dispatch thread panicked"))??,
        ),
        None => None,
    };
    state.advance(SupervisorState::Stopped);

    let exit = controller.server().try_exit()?;
    let outcome = SupervisorOutcome {
        exit,
        reason: reason.unwrap_or(StopReason::Shutdown),
        autosaves,
        dispatch,
    };
    info!(exit_code = ?exit.and_then(|e| e.code), reason = ?outcome.reason, "session finished");
    Ok(outcome)
}

fn spawn_workers(
    controller: &Arc<Controller>,
    registry: CommandRegistry,
    input: Option<Receiver<InputEvent>>,
    mut output: Box<dyn Write + Send>,
    schedule: AutosaveSchedule,
) -> Result<Workers> {
    let dispatch = match input {
        Some(input) => {
            let controller = controller.clone();
            let handle = thread::Builder::new()
                .name("dispatch".to_string())
                .spawn(move || run_dispatch_loop(&controller, &registry, &input, output.as_mut()))
                .context("spawn dispatch thread")?;
            Some(handle)
        }
        None => None,
    };

    let autosave = {
        let controller = controller.clone();
        thread::Builder::new()
            .name("autosave".to_string())
            .spawn(move || run_autosave(&controller, &schedule))
    };
    let autosave = match autosave {
        Ok(handle) => handle,
        Err(err) => {
            // The dispatch thread exits on its own once the flag clears.
            controller.running().stop();
            return Err(err).context("spawn autosave thread");
        }
    };

    Ok(Workers { dispatch, autosave })
}
