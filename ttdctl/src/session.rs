//! Session selection: which directory to play in and how to start the server.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::ValueEnum;
use tracing::{info, instrument, warn};

use crate::io::config::ControllerConfig;
use crate::io::game_config::{
    GameConfigPaths, persist_runtime_config, prepare_runtime_config, select_source,
};
use crate::io::saves::{latest_save_file, list_save_files};
use crate::supervisor::{self, SupervisorOptions, SupervisorOutcome};

/// Directory used when nothing is given and no previous session exists.
pub const FIRST_SESSION_DIR: &str = "game.001";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Action {
    /// Start a new game in a fresh session directory.
    Create,
    /// Resume the newest savegame of an existing session directory.
    Load,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRequest {
    pub action: Action,
    pub dir: PathBuf,
}

/// Immutable parameters of one server run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Absolute session directory.
    pub dir: PathBuf,
    pub server: OsString,
    pub autosave_minutes: u64,
    pub starting_year: Option<u32>,
    pub password: Option<String>,
    /// Savegame to resume from (`load` only).
    pub savegame: Option<PathBuf>,
    pub last_link: PathBuf,
    /// Whether operator commands are read from stdin.
    pub interactive: bool,
}

/// Per-invocation choices that are not stored in the settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchOptions {
    pub starting_year: Option<u32>,
    pub password: Option<String>,
    /// Explicit config file to install instead of the session's own.
    pub use_config: Option<PathBuf>,
    /// Allow `create` on a directory that already has savegames.
    pub force: bool,
    pub interactive: bool,
}

/// Fill in the defaults for a partial `ACTION DIR` pair.
pub fn resolve_action(
    action: Option<Action>,
    dir: Option<PathBuf>,
    last_link: &Path,
) -> Result<ActionRequest> {
    let request = match (action, dir) {
        (Some(action), Some(dir)) => ActionRequest { action, dir },
        (Some(Action::Load), None) => ActionRequest {
            action: Action::Load,
            dir: last_link.to_path_buf(),
        },
        (Some(Action::Create), None) => bail!("create requires a session directory"),
        (None, Some(dir)) => bail!(
            "missing action for {}, use `create` or `load`",
            dir.display()
        ),
        (None, None) if last_link.exists() => ActionRequest {
            action: Action::Load,
            dir: last_link.to_path_buf(),
        },
        (None, None) => ActionRequest {
            action: Action::Create,
            dir: PathBuf::from(FIRST_SESSION_DIR),
        },
    };
    Ok(request)
}

/// Validate the request and build the session. Touches nothing on disk.
pub fn build_session(
    request: &ActionRequest,
    options: &LaunchOptions,
    config: &ControllerConfig,
) -> Result<Session> {
    let (dir, savegame) = match request.action {
        Action::Create => {
            check_create_target(&request.dir, options.force)?;
            let dir = std::path::absolute(&request.dir)
                .with_context(|| format!("resolve {}", request.dir.display()))?;
            (dir, None)
        }
        Action::Load => {
            let (dir, savegame) = find_resume_save(&request.dir)?;
            (dir, Some(savegame))
        }
    };

    Ok(Session {
        dir,
        server: OsString::from(&config.server),
        autosave_minutes: config.autosave_minutes,
        starting_year: options.starting_year,
        password: options.password.clone(),
        savegame,
        last_link: config.last_link.clone(),
        interactive: options.interactive,
    })
}

fn check_create_target(dir: &Path, force: bool) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    if !dir.is_dir() {
        bail!("{} is not a directory", dir.display());
    }
    let existing = list_save_files(dir)?;
    if !existing.is_empty() && !force {
        bail!(
            "{} already contains {} savegame(s), use `load` or pass --force",
            dir.display(),
            existing.len()
        );
    }
    Ok(())
}

fn find_resume_save(dir: &Path) -> Result<(PathBuf, PathBuf)> {
    if !dir.is_dir() {
        bail!("session directory {} does not exist", dir.display());
    }
    let dir = fs::canonicalize(dir).with_context(|| format!("resolve {}", dir.display()))?;
    let Some(savegame) = latest_save_file(&dir)? else {
        bail!("no savegames to load in {}", dir.display());
    };
    Ok((dir, savegame))
}

/// Run a full session: config install, supervision, config persist.
///
/// The runtime config is copied back into the session directory even when
/// supervision fails.
#[instrument(skip_all, fields(action = ?request.action, dir = %request.dir.display()))]
pub fn run_action(
    request: &ActionRequest,
    options: &LaunchOptions,
    config: &ControllerConfig,
) -> Result<SupervisorOutcome> {
    let mut session = build_session(request, options, config)?;
    let paths = GameConfigPaths::new(&config.personal_dir, &session.dir);
    select_source(&paths, options.use_config.as_deref())?;

    if request.action == Action::Create && !session.dir.exists() {
        fs::create_dir_all(&session.dir)
            .with_context(|| format!("create session dir {}", session.dir.display()))?;
        info!(dir = %session.dir.display(), "created session directory");
    }
    session.dir = fs::canonicalize(&session.dir)
        .with_context(|| format!("resolve {}", session.dir.display()))?;
    let paths = GameConfigPaths::new(&config.personal_dir, &session.dir);
    let source = prepare_runtime_config(&paths, options.use_config.as_deref())?;
    info!(config = %source.display(), "runtime config installed");

    let result = supervisor::run(&session, &SupervisorOptions::for_session(&session, config));
    let persisted = persist_runtime_config(&paths);

    match (result, persisted) {
        (Ok(outcome), Ok(())) => Ok(outcome),
        (Ok(_), Err(err)) | (Err(err), Ok(())) => Err(err),
        (Err(err), Err(persist_err)) => {
            warn!(err = %format!("{persist_err:#}"), "failed to persist runtime config");
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::session_dir_with_saves;
    use std::thread;
    use std::time::Duration;

    fn link_in(dir: &Path) -> PathBuf {
        dir.join("game.last")
    }

    #[test]
    fn explicit_action_and_dir_are_kept() {
        let request =
            resolve_action(Some(Action::Create), Some("game.007".into()), Path::new("x"))
                .expect("resolve");
        assert_eq!(request.action, Action::Create);
        assert_eq!(request.dir, PathBuf::from("game.007"));
    }

    #[test]
    fn load_alone_uses_last_link() {
        let request =
            resolve_action(Some(Action::Load), None, Path::new("game.last")).expect("resolve");
        assert_eq!(request.dir, PathBuf::from("game.last"));
    }

    #[test]
    fn create_alone_is_a_usage_error() {
        let err = resolve_action(Some(Action::Create), None, Path::new("game.last"))
            .expect_err("usage");
        assert!(err.to_string().contains("requires a session directory"));
    }

    #[test]
    fn no_arguments_creates_first_session_without_link() {
        let temp = tempfile::tempdir().expect("tempdir");
        let request = resolve_action(None, None, &link_in(temp.path())).expect("resolve");
        assert_eq!(request.action, Action::Create);
        assert_eq!(request.dir, PathBuf::from(FIRST_SESSION_DIR));
    }

    #[test]
    fn no_arguments_loads_last_session_when_linked() {
        let temp = tempfile::tempdir().expect("tempdir");
        let link = link_in(temp.path());
        fs::create_dir(&link).expect("mkdir");
        let request = resolve_action(None, None, &link).expect("resolve");
        assert_eq!(request.action, Action::Load);
        assert_eq!(request.dir, link);
    }

    #[test]
    fn create_rejects_dir_with_saves_unless_forced() {
        let dir = session_dir_with_saves(&[1]).expect("dir");
        let request = ActionRequest {
            action: Action::Create,
            dir: dir.path().to_path_buf(),
        };
        let config = ControllerConfig::default();

        let err = build_session(&request, &LaunchOptions::default(), &config)
            .expect_err("has saves");
        assert!(err.to_string().contains("already contains 1 savegame"));

        let forced = LaunchOptions {
            force: true,
            ..LaunchOptions::default()
        };
        let session = build_session(&request, &forced, &config).expect("forced");
        assert_eq!(session.savegame, None);
    }

    #[test]
    fn create_rejects_plain_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let file = temp.path().join("game.001");
        fs::write(&file, b"").expect("write");
        let request = ActionRequest {
            action: Action::Create,
            dir: file,
        };
        let err = build_session(&request, &LaunchOptions::default(), &ControllerConfig::default())
            .expect_err("file");
        assert!(err.to_string().contains("is not a directory"));
    }

    #[test]
    fn create_accepts_missing_dir_without_creating_it() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path().join("game.002");
        let request = ActionRequest {
            action: Action::Create,
            dir: dir.clone(),
        };
        let session =
            build_session(&request, &LaunchOptions::default(), &ControllerConfig::default())
                .expect("session");
        assert_eq!(session.dir, dir);
        assert!(!dir.exists());
    }

    #[test]
    fn load_resumes_newest_save() {
        let dir = session_dir_with_saves(&[1, 2]).expect("dir");
        thread::sleep(Duration::from_millis(20));
        let newest = dir.path().join("manual.sav");
        fs::write(&newest, b"newest").expect("write");

        let request = ActionRequest {
            action: Action::Load,
            dir: dir.path().to_path_buf(),
        };
        let session =
            build_session(&request, &LaunchOptions::default(), &ControllerConfig::default())
                .expect("session");
        let expected = fs::canonicalize(&newest).expect("canonical");
        assert_eq!(session.savegame, Some(expected));
    }

    #[test]
    fn load_requires_saves() {
        let dir = session_dir_with_saves(&[]).expect("dir");
        let request = ActionRequest {
            action: Action::Load,
            dir: dir.path().to_path_buf(),
        };
        let err = build_session(&request, &LaunchOptions::default(), &ControllerConfig::default())
            .expect_err("empty");
        assert!(err.to_string().contains("no savegames"));
    }

    #[test]
    fn load_requires_existing_dir() {
        let temp = tempfile::tempdir().expect("tempdir");
        let request = ActionRequest {
            action: Action::Load,
            dir: temp.path().join("missing"),
        };
        let err = build_session(&request, &LaunchOptions::default(), &ControllerConfig::default())
            .expect_err("missing");
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn missing_config_fails_before_creating_anything() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path().join("game.003");
        let config = ControllerConfig {
            personal_dir: temp.path().join("personal"),
            ..ControllerConfig::default()
        };
        let request = ActionRequest {
            action: Action::Create,
            dir: dir.clone(),
        };
        let err = run_action(&request, &LaunchOptions::default(), &config).expect_err("config");
        assert!(format!("{err:#}").contains("suitable configuration"));
        assert!(!dir.exists());
    }
}
