//! Supervisor for a dedicated game server.
//!
//! `ttdctl` launches the server as a child process, forwards operator commands to
//! its console, keeps a pruned history of numbered savegames, autosaves on a
//! schedule and shuts the server down cleanly on `quit`, end of input or a
//! termination signal.
//!
//! - **[`core`]**: Pure logic (savegame naming, retention, command parsing,
//!   launch arguments). No I/O.
//! - **[`io`]**: Side effects (child process, filesystem, signals, stdin).
//!
//! The remaining modules wire the two together: [`save`] and [`controller`] own
//! the shared save and quit paths, [`dispatch`] and [`autosave`] are the session
//! activities, and [`supervisor`] runs them against a live server.

pub mod autosave;
pub mod controller;
pub mod core;
pub mod dispatch;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod registry;
pub mod save;
pub mod session;
pub mod supervisor;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
