//! Server configuration (`openttd.cfg`) shuffling between the personal directory
//! and the session directory.
//!
//! The server always reads its runtime config from the personal directory. Each
//! session directory keeps its own copy so a session can be resumed with the
//! settings it was played with. Differing session copies are backed up before
//! being overwritten.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDateTime};
use tracing::{debug, info, instrument};

use crate::core::savegame::STAMP_FORMAT;

pub const CONFIG_FILE_NAME: &str = "openttd.cfg";
pub const DEFAULT_CONFIG_FILE_NAME: &str = "default.cfg";

/// The config locations involved in one session.
#[derive(Debug, Clone)]
pub struct GameConfigPaths {
    /// Config the server reads at runtime.
    pub runtime: PathBuf,
    /// Fallback template used when a session has no config yet.
    pub default: PathBuf,
    /// Per-session copy.
    pub session: PathBuf,
}

impl GameConfigPaths {
    pub fn new(personal_dir: &Path, session_dir: &Path) -> Self {
        Self {
            runtime: personal_dir.join(CONFIG_FILE_NAME),
            default: personal_dir.join(DEFAULT_CONFIG_FILE_NAME),
            session: session_dir.join(CONFIG_FILE_NAME),
        }
    }

    /// Backup path for the session copy at `at`.
    pub fn backup_path(&self, at: NaiveDateTime) -> PathBuf {
        let mut name = self.session.as_os_str().to_owned();
        name.push(format!("-{}", at.format(STAMP_FORMAT)));
        PathBuf::from(name)
    }
}

/// Pick the source config: explicit file, then the session copy, then
/// `default.cfg`, then whatever runtime config already exists.
pub fn select_source(paths: &GameConfigPaths, explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(explicit) = explicit {
        if !explicit.is_file() {
            bail!("not a configuration file: {}", explicit.display());
        }
        return Ok(explicit.to_path_buf());
    }
    let source = [&paths.session, &paths.default]
        .into_iter()
        .find(|candidate| candidate.is_file())
        .unwrap_or(&paths.runtime);
    if !source.is_file() {
        bail!(
            "could not find a suitable configuration, expected at least {}",
            source.display()
        );
    }
    Ok(source.clone())
}

/// Install the session's config as the runtime config before the server starts.
///
/// Returns the source that was used.
#[instrument(skip_all, fields(session = %paths.session.display()))]
pub fn prepare_runtime_config(paths: &GameConfigPaths, explicit: Option<&Path>) -> Result<PathBuf> {
    let source = select_source(paths, explicit)?;
    let contents =
        fs::read(&source).with_context(|| format!("read config {}", source.display()))?;

    if !same_file(&source, &paths.runtime) {
        debug!(source = %source.display(), "using as runtime config");
        write_config(&paths.runtime, &contents)?;
    }

    if !same_file(&source, &paths.session) {
        if paths.session.is_file() {
            let existing = fs::read(&paths.session)
                .with_context(|| format!("read config {}", paths.session.display()))?;
            if existing != contents {
                let backup = paths.backup_path(Local::now().naive_local());
                info!(backup = %backup.display(), "backing up session config");
                write_config(&backup, &existing)?;
            }
        }
        debug!(source = %source.display(), "copying config into session directory");
        write_config(&paths.session, &contents)?;
    }

    Ok(source)
}

/// Copy the runtime config back into the session directory after the server stops,
/// so settings changed in-game are kept with the session.
#[instrument(skip_all, fields(session = %paths.session.display()))]
pub fn persist_runtime_config(paths: &GameConfigPaths) -> Result<()> {
    if same_file(&paths.runtime, &paths.session) {
        return Ok(());
    }
    debug!(runtime = %paths.runtime.display(), "saving runtime config into session directory");
    let contents = fs::read(&paths.runtime)
        .with_context(|| format!("read config {}", paths.runtime.display()))?;
    write_config(&paths.session, &contents)
}

fn write_config(path: &Path, contents: &[u8]) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write config {}", path.display()))
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
