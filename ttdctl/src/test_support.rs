//! Test-only helpers: a scripted fake server and savegame directories.

use std::fs;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use tempfile::TempDir;

use crate::io::process::{ServerExit, ServerProcess};
use crate::save::SaveWait;

/// In-memory stand-in for the dedicated server.
///
/// Records every command. By default it writes `<path>.sav` when asked to save
/// and exits with code 0 on `quit`, like the real server.
#[derive(Debug)]
pub struct FakeServer {
    commands: Mutex<Vec<String>>,
    exit: Mutex<Option<ServerExit>>,
    writes_saves: bool,
    exits_on_quit: bool,
    kill_fails: bool,
    terminated: AtomicBool,
}

impl FakeServer {
    pub fn new() -> Self {
        Self {
            commands: Mutex::new(Vec::new()),
            exit: Mutex::new(None),
            writes_saves: true,
            exits_on_quit: true,
            kill_fails: false,
            terminated: AtomicBool::new(false),
        }
    }

    /// A server that accepts commands but never saves and never quits.
    pub fn unresponsive() -> Self {
        Self {
            writes_saves: false,
            exits_on_quit: false,
            ..Self::new()
        }
    }

    /// An unresponsive server whose kill always fails.
    pub fn unkillable() -> Self {
        Self {
            kill_fails: true,
            ..Self::unresponsive()
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().expect("commands lock").clone()
    }

    /// Simulate the server exiting on its own.
    pub fn exit_with(&self, code: i32) {
        self.set_exit(Some(code));
    }

    pub fn was_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    fn set_exit(&self, code: Option<i32>) {
        let mut exit = self.exit.lock().expect("exit lock");
        if exit.is_none() {
            *exit = Some(ServerExit { code });
        }
    }
}

impl Default for FakeServer {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerProcess for FakeServer {
    fn id(&self) -> u32 {
        0
    }

    fn send_command(&self, command: &str) -> Result<()> {
        if self.has_exited() {
            bail!("server stdin already closed");
        }
        let command = command.trim().to_string();
        self.commands
            .lock()
            .expect("commands lock")
            .push(command.clone());

        if self.writes_saves
            && let Some(target) = command.strip_prefix("save ")
        {
            fs::write(format!("{target}.sav"), b"fake savegame")?;
        }
        if self.exits_on_quit && command == "quit" {
            self.set_exit(Some(0));
        }
        Ok(())
    }

    fn try_exit(&self) -> Result<Option<ServerExit>> {
        Ok(*self.exit.lock().expect("exit lock"))
    }

    fn wait_exit(&self, timeout: Duration) -> Result<Option<ServerExit>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(exit) = self.try_exit()? {
                return Ok(Some(exit));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            thread::sleep(Duration::from_millis(10));
        }
    }

    fn terminate(&self) -> Result<()> {
        if self.kill_fails {
            bail!("kill refused");
        }
        self.terminated.store(true, Ordering::SeqCst);
        self.set_exit(None);
        Ok(())
    }
}

/// Short save wait so timeouts don't slow tests down.
pub fn fast_save_wait() -> SaveWait {
    SaveWait {
        poll_interval: Duration::from_millis(10),
        timeout: Duration::from_millis(150),
    }
}

/// Temp session directory pre-populated with numbered savegames.
pub fn session_dir_with_saves(indices: &[u64]) -> Result<TempDir> {
    let dir = tempfile::tempdir()?;
    for index in indices {
        let name = format!("savegame-{index}-20240101-000000.sav");
        fs::write(dir.path().join(name), b"fake savegame")?;
    }
    Ok(dir)
}
