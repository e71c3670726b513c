//! Save orchestration: index assignment, the save command, retention and the
//! bounded wait for the savegame to appear.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use chrono::Local;
use tracing::{debug, info, instrument, warn};

use crate::core::retention::prune;
use crate::core::savegame::{SAVE_EXTENSION, next_index, save_stem};
use crate::io::process::ServerProcess;
use crate::io::saves::{remove_savegames, scan_savegames};

/// How long to wait for the server to write a requested savegame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveWait {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for SaveWait {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(100),
        }
    }
}

/// The server was asked to save but the file did not show up in time.
///
/// Not fatal: callers log it and carry on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveTimeoutError {
    pub path: PathBuf,
    pub waited: Duration,
}

impl fmt::Display for SaveTimeoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "waited {}s for the server to save but {} is still missing",
            self.waited.as_secs(),
            self.path.display()
        )
    }
}

impl std::error::Error for SaveTimeoutError {}

/// The server exited while a save was being requested or written.
///
/// Not fatal either: the supervisor notices the exit and winds the session down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerGoneError {
    pub path: PathBuf,
}

impl fmt::Display for ServerGoneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "server exited before writing {}", self.path.display())
    }
}

impl std::error::Error for ServerGoneError {}

/// Issues saves for one session directory.
///
/// Each request holds an internal lock from the directory scan until the file
/// appears (or the wait times out), so concurrent callers never pick the same index.
pub struct SaveOrchestrator {
    dir: PathBuf,
    server: Arc<dyn ServerProcess>,
    wait: SaveWait,
    lock: Mutex<()>,
}

impl SaveOrchestrator {
    pub fn new(dir: impl Into<PathBuf>, server: Arc<dyn ServerProcess>, wait: SaveWait) -> Self {
        Self {
            dir: dir.into(),
            server,
            wait,
            lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Ask the server for a new savegame and prune old ones.
    ///
    /// Returns the path of the written `.sav` file. A missing file after the wait
    /// surfaces as [`SaveTimeoutError`].
    #[instrument(skip_all, fields(dir = %self.dir.display()))]
    pub fn request_save(&self) -> Result<PathBuf> {
        let _guard = self.lock.lock().map_err(|_| anyhow!("save lock poisoned"))?;

        let existing = scan_savegames(&self.dir)?;
        let next = next_index(&existing);
        let target = self.dir.join(save_stem(next, Local::now().naive_local()));
        let saved = target.with_extension(SAVE_EXTENSION);
        debug!(index = next, target = %target.display(), "requesting savegame");
        if let Err(err) = self
            .server
            .send_command(&format!("save {}", target.display()))
        {
            if self.server.has_exited() {
                return Err(ServerGoneError { path: saved }.into());
            }
            return Err(err);
        }

        let indices: BTreeSet<u64> = existing.keys().copied().collect();
        let doomed = prune(&indices, next);
        if !doomed.is_empty() {
            let removed = remove_savegames(&existing, &doomed);
            debug!(removed, "pruned old savegames");
        }

        self.wait_for(&saved)?;
        info!(path = %saved.display(), "game saved");
        Ok(saved)
    }

    fn wait_for(&self, path: &Path) -> Result<()> {
        let started = Instant::now();
        loop {
            if path.is_file() {
                return Ok(());
            }
            let waited = started.elapsed();
            if waited >= self.wait.timeout {
                return Err(SaveTimeoutError {
                    path: path.to_path_buf(),
                    waited,
                }
                .into());
            }
            if self.server.has_exited() {
                return Err(ServerGoneError {
                    path: path.to_path_buf(),
                }
                .into());
            }
            thread::sleep(self.wait.poll_interval.min(self.wait.timeout - waited));
        }
    }
}

/// Run a save, downgrading a timeout or a vanished server to a warning.
///
/// Returns `Ok(None)` when the save was requested but not confirmed on disk.
pub fn save_or_warn(saves: &SaveOrchestrator) -> Result<Option<PathBuf>> {
    match saves.request_save() {
        Ok(path) => Ok(Some(path)),
        Err(err)
            if err.downcast_ref::<SaveTimeoutError>().is_some()
                || err.downcast_ref::<ServerGoneError>().is_some() =>
        {
            warn!(err = %err, "save not confirmed");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}
