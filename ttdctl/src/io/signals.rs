//! Termination-signal listener.
//!
//! Signals are received on a dedicated thread running a small tokio runtime. The
//! listener only forwards a [`ShutdownSignal`] over a channel; the supervisor does
//! all actual shutdown work on ordinary threads.

use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use tracing::debug;

/// A termination request delivered by the operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownSignal(pub &'static str);

/// Install SIGTERM/SIGINT listeners and forward each delivery to `tx`.
///
/// Registration happens before this returns, so a signal sent right afterwards is
/// never lost. The listener thread ends once the receiver is dropped and another
/// signal arrives.
#[cfg(unix)]
pub fn spawn_signal_listener(tx: Sender<ShutdownSignal>) -> Result<JoinHandle<()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("build signal runtime")?;
    let (mut terminate, mut interrupt) = {
        let _guard = runtime.enter();
        (
            signal(SignalKind::terminate()).context("listen for SIGTERM")?,
            signal(SignalKind::interrupt()).context("listen for SIGINT")?,
        )
    };

    thread::Builder::new()
        .name("signals".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                loop {
                    let name = tokio::select! {
                        Some(()) = terminate.recv() => "SIGTERM",
                        Some(()) = interrupt.recv() => "SIGINT",
                        else => break,
                    };
                    debug!(signal = name, "received signal");
                    if tx.send(ShutdownSignal(name)).is_err() {
                        break;
                    }
                }
            });
        })
        .context("spawn signal thread")
}

#[cfg(not(unix))]
pub fn spawn_signal_listener(tx: Sender<ShutdownSignal>) -> Result<JoinHandle<()>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("build signal runtime")?;

    thread::Builder::new()
        .name("signals".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                while tokio::signal::ctrl_c().await.is_ok() {
                    debug!(signal = "ctrl-c", "received signal");
                    if tx.send(ShutdownSignal("ctrl-c")).is_err() {
                        break;
                    }
                }
            });
        })
        .context("spawn signal thread")
}
