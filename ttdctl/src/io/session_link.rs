//! The "latest session" symlink (`game.last` by default).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::{debug, info, warn};

/// Point `link` at `session_dir`, replacing a previous link.
///
/// Does nothing when `link` already resolves to `session_dir` (for example when
/// the session was opened through the link itself). Refuses to replace anything
/// that is not a symlink.
pub fn update_last_link(link: &Path, session_dir: &Path) -> Result<()> {
    let target = fs::canonicalize(session_dir)
        .with_context(|| format!("resolve session dir {}", session_dir.display()))?;

    if fs::canonicalize(link).is_ok_and(|current| current == target) {
        debug!(link = %link.display(), "latest-session link already current");
        return Ok(());
    }

    match fs::symlink_metadata(link) {
        Ok(meta) if meta.file_type().is_symlink() => {
            fs::remove_file(link).with_context(|| format!("remove link {}", link.display()))?;
        }
        Ok(_) => bail!("{} exists and is not a symlink", link.display()),
        Err(_) => {}
    }

    create_link(&target, link)?;
    info!(link = %link.display(), target = %target.display(), "updated latest-session link");
    Ok(())
}

#[cfg(unix)]
fn create_link(target: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link)
        .with_context(|| format!("link {} -> {}", link.display(), target.display()))
}

#[cfg(not(unix))]
fn create_link(target: &Path, link: &Path) -> Result<()> {
    warn!(
        link = %link.display(),
        target = %target.display(),
        "latest-session links are only supported on unix"
    );
    Ok(())
}

/// Best-effort variant used at startup: a broken link never blocks the server.
pub fn refresh_last_link(link: &Path, session_dir: &Path) {
    if let Err(err) = update_last_link(link, session_dir) {
        warn!(err = %format!("{err:#}"), "could not update latest-session link");
    }
}
