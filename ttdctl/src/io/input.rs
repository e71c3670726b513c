//! Operator input: a reader thread turning stdin lines into channel events.
//!
//! Reading stdin blocks indefinitely, so it lives on its own detached thread. The
//! dispatch loop consumes events with a timeout and stays responsive to shutdown.

use std::io::{self, BufRead};
use std::sync::mpsc::Sender;
use std::thread;

use anyhow::{Context, Result};
use tracing::debug;

/// One event from the operator's input stream.
#[derive(Debug)]
pub enum InputEvent {
    /// A raw line, including its terminator.
    Line(String),
    /// End of input (Ctrl-D, closed pipe).
    Closed,
    /// The input stream failed.
    Failed(io::Error),
}

/// Forward lines from `reader` to `tx` until end of input, an error, or the
/// receiver going away.
pub fn forward_lines<R: BufRead>(mut reader: R, tx: &Sender<InputEvent>) {
    loop {
        let mut line = String::new();
        let event = match reader.read_line(&mut line) {
            Ok(0) => InputEvent::Closed,
            Ok(_) => InputEvent::Line(line),
            Err(err) => InputEvent::Failed(err),
        };
        let last = !matches!(event, InputEvent::Line(_));
        if tx.send(event).is_err() || last {
            debug!("operator input reader stopped");
            return;
        }
    }
}

/// Spawn the detached stdin reader thread.
pub fn spawn_stdin_reader(tx: Sender<InputEvent>) -> Result<()> {
    thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || forward_lines(io::stdin().lock(), &tx))
        .context("spawn stdin thread")?;
    Ok(())
}
