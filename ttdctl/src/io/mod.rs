//! I/O helpers for the controller.

pub mod config;
pub mod game_config;
pub mod input;
pub mod process;
pub mod saves;
pub mod session_link;
pub mod signals;
