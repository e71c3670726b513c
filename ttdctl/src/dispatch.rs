//! Operator command dispatch loop.

use std::io::Write;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use crate::controller::Controller;
use crate::core::command_line::parse_line;
use crate::io::input::InputEvent;
use crate::registry::{CommandContext, CommandRegistry};

/// How often the loop re-checks the running flag while no input arrives.
pub const INPUT_POLL_INTERVAL: Duration = Duration::from_millis(200);

pub const UNKNOWN_COMMAND_NOTICE: &str = "Unknown command, use \"help\"";

/// Why the dispatch loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchExit {
    /// The running flag was cleared or the server exited.
    Stopped,
    /// Operator input ended; the quit path was invoked.
    InputClosed,
}

/// Read operator commands from `input` and run them until the session stops.
///
/// Any failure is fatal to the session: the server is terminated before the
/// error is returned.
pub fn run_dispatch_loop(
    controller: &Controller,
    registry: &CommandRegistry,
    input: &Receiver<InputEvent>,
    out: &mut dyn Write,
) -> Result<DispatchExit> {
    let result = dispatch(controller, registry, input, out);
    if let Err(err) = &result {
        error!(err = %format!("{err:#}"), "command loop failed, stopping server");
        if let Err(term_err) = controller.server().terminate() {
            warn!(err = %format!("{term_err:#}"), "failed to terminate server");
        }
    }
    result
}

fn dispatch(
    controller: &Controller,
    registry: &CommandRegistry,
    input: &Receiver<InputEvent>,
    out: &mut dyn Write,
) -> Result<DispatchExit> {
    loop {
        if controller.should_stop() {
            debug!("command loop stopping");
            return Ok(DispatchExit::Stopped);
        }
        let event = match input.recv_timeout(INPUT_POLL_INTERVAL) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => InputEvent::Closed,
        };
        match event {
            InputEvent::Line(line) => handle_line(controller, registry, &line, out)?,
            InputEvent::Closed => {
                info!("operator input closed");
                controller.quit("operator input closed")?;
                return Ok(DispatchExit::InputClosed);
            }
            InputEvent::Failed(err) => {
                return Err(anyhow::Error::new(err).context("read operator input"));
            }
        }
    }
}

/// Parse one input line and run the matching command.
pub fn handle_line(
    controller: &Controller,
    registry: &CommandRegistry,
    line: &str,
    out: &mut dyn Write,
) -> Result<()> {
    let Some(command) = parse_line(line) else {
        return Ok(());
    };
    let Some(entry) = registry.lookup(command.name) else {
        writeln!(out, "{UNKNOWN_COMMAND_NOTICE}").context("write notice")?;
        return Ok(());
    };
    debug!(command = command.name, "running command");
    let mut ctx = CommandContext {
        controller,
        registry,
        out,
    };
    (entry.handler)(&mut ctx, command.args)
        .with_context(|| format!("command `{}`", command.name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::RunningFlag;
    use crate::io::process::ServerProcess;
    use crate::save::SaveOrchestrator;
    use crate::test_support::{FakeServer, fast_save_wait, session_dir_with_saves};
    use std::sync::Arc;
    use std::sync::mpsc;

    fn controller(server: Arc<FakeServer>, dir: &std::path::Path) -> Controller {
        let saves = SaveOrchestrator::new(dir, server.clone(), fast_save_wait());
        Controller::new(
            server,
            saves,
            RunningFlag::new(),
            Duration::from_millis(100),
        )
    }

    fn line(text: &str) -> InputEvent {
        InputEvent::Line(format!("{text}\n"))
    }

    #[test]
    fn unknown_command_prints_notice_and_changes_nothing() {
        let dir = session_dir_with_saves(&[]).expect("dir");
        let server = Arc::new(FakeServer::new());
        let controller = controller(server.clone(), dir.path());
        let registry = CommandRegistry::builtin();
        let mut out = Vec::new();

        handle_line(&controller, &registry, "frobnicate now\n", &mut out).expect("line");

        assert_eq!(
            String::from_utf8(out).expect("utf8"),
            format!("{UNKNOWN_COMMAND_NOTICE}\n")
        );
        assert!(controller.running().is_running());
        assert!(!server.has_exited());
        assert!(server.commands().is_empty());
    }

    #[test]
    fn blank_lines_are_ignored() {
        let dir = session_dir_with_saves(&[]).expect("dir");
        let server = Arc::new(FakeServer::new());
        let controller = controller(server.clone(), dir.path());
        let mut out = Vec::new();

        handle_line(&controller, &CommandRegistry::builtin(), "   \n", &mut out).expect("line");
        assert!(out.is_empty());
    }

    #[test]
    fn loop_runs_commands_until_quit() {
        let dir = session_dir_with_saves(&[]).expect("dir");
        let server = Arc::new(FakeServer::new());
        let controller = controller(server.clone(), dir.path());
        let (tx, rx) = mpsc::channel();
        tx.send(line("x pause")).expect("send");
        tx.send(line("")).expect("send");
        tx.send(line("q")).expect("send");
        tx.send(line("x never sent")).expect("send");

        let mut out = Vec::new();
        let exit = run_dispatch_loop(&controller, &CommandRegistry::builtin(), &rx, &mut out)
            .expect("loop");

        assert_eq!(exit, DispatchExit::Stopped);
        let commands = server.commands();
        assert_eq!(commands[0], "pause");
        assert!(commands[1].starts_with("save "));
        assert_eq!(commands[2], "quit");
        assert_eq!(commands.len(), 3);
    }

    #[test]
    fn loop_stops_when_flag_is_cleared() {
        let dir = session_dir_with_saves(&[]).expect("dir");
        let server = Arc::new(FakeServer::new());
        let controller = controller(server, dir.path());
        let (_tx, rx) = mpsc::channel::<InputEvent>();
        controller.running().stop();

        let exit = run_dispatch_loop(&controller, &CommandRegistry::builtin(), &rx, &mut Vec::new())
            .expect("loop");
        assert_eq!(exit, DispatchExit::Stopped);
    }

    #[test]
    fn loop_stops_when_server_exits() {
        let dir = session_dir_with_saves(&[]).expect("dir");
        let server = Arc::new(FakeServer::new());
        let controller = controller(server.clone(), dir.path());
        let (_tx, rx) = mpsc::channel::<InputEvent>();
        server.exit_with(0);

        let exit = run_dispatch_loop(&controller, &CommandRegistry::builtin(), &rx, &mut Vec::new())
            .expect("loop");
        assert_eq!(exit, DispatchExit::Stopped);
    }

    #[test]
    fn closed_input_runs_the_quit_path() {
        let dir = session_dir_with_saves(&[]).expect("dir");
        let server = Arc::new(FakeServer::new());
        let controller = controller(server.clone(), dir.path());
        let (tx, rx) = mpsc::channel();
        tx.send(InputEvent::Closed).expect("send");

        let exit = run_dispatch_loop(&controller, &CommandRegistry::builtin(), &rx, &mut Vec::new())
            .expect("loop");
        assert_eq!(exit, DispatchExit::InputClosed);
        assert!(!controller.running().is_running());
        assert_eq!(server.commands().last().map(String::as_str), Some("quit"));
    }

    #[test]
    fn input_failure_terminates_the_server() {
        let dir = session_dir_with_saves(&[]).expect("dir");
        let server = Arc::new(FakeServer::new());
        let controller = controller(server.clone(), dir.path());
        let (tx, rx) = mpsc::channel();
        tx.send(InputEvent::Failed(std::io::Error::other("tty gone")))
            .expect("send");

        let err = run_dispatch_loop(&controller, &CommandRegistry::builtin(), &rx, &mut Vec::new())
            .expect_err("fatal");
        assert!(format!("{err:#}").contains("read operator input"));
        assert!(server.was_terminated());
    }
}
