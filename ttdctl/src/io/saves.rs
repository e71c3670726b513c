//! Savegame discovery and removal in a session directory.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::core::savegame::{SAVE_EXTENSION, parse_index};

/// Map every numbered savegame in `dir` to its path.
///
/// Runs a full directory scan; cost grows with the number of files in `dir`.
pub fn scan_savegames(dir: &Path) -> Result<BTreeMap<u64, PathBuf>> {
    let mut saves = BTreeMap::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))? {
        let entry = entry.with_context(|| format!("read entry in {}", dir.display()))?;
        let name = entry.file_name();
        let Some(index) = name.to_str().and_then(parse_index) else {
            continue;
        };
        if let Some(previous) = saves.insert(index, entry.path()) {
            warn!(index, previous = %previous.display(), "duplicate savegame index");
        }
    }
    debug!(dir = %dir.display(), count = saves.len(), "scanned savegames");
    Ok(saves)
}

/// All `*.sav` files in `dir`, numbered or not.
pub fn list_save_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))? {
        let entry = entry.with_context(|| format!("read entry in {}", dir.display()))?;
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == SAVE_EXTENSION) && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// The most recently modified `*.sav` file in `dir`.
pub fn latest_save_file(dir: &Path) -> Result<Option<PathBuf>> {
    let mut latest: Option<(SystemTime, PathBuf)> = None;
    for path in list_save_files(dir)? {
        let modified = fs::metadata(&path)
            .and_then(|meta| meta.modified())
            .with_context(|| format!("stat {}", path.display()))?;
        if latest.as_ref().is_none_or(|(best, _)| modified >= *best) {
            latest = Some((modified, path));
        }
    }
    Ok(latest.map(|(_, path)| path))
}

/// Delete the files for `doomed` indices. Failures are logged and skipped.
///
/// Returns the number of files actually removed.
pub fn remove_savegames(saves: &BTreeMap<u64, PathBuf>, doomed: &BTreeSet<u64>) -> usize {
    let mut removed = 0;
    for index in doomed {
        let Some(path) = saves.get(index) else {
            continue;
        };
        match fs::remove_file(path) {
            Ok(()) => {
                debug!(path = %path.display(), "removed savegame");
                removed += 1;
            }
            Err(err) => warn!(path = %path.display(), err = %err, "failed to remove savegame"),
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"save").expect("write");
        path
    }

    #[test]
    fn scan_ignores_unrelated_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        touch(temp.path(), "savegame-1-20240101-000000.sav");
        touch(temp.path(), "savegame-12-20240101-001000.sav");
        touch(temp.path(), "autosave0.sav");
        touch(temp.path(), "openttd.cfg");

        let saves = scan_savegames(temp.path()).expect("scan");
        assert_eq!(saves.keys().copied().collect::<Vec<_>>(), vec![1, 12]);
        assert!(saves[&12].ends_with("savegame-12-20240101-001000.sav"));
    }

    #[test]
    fn scan_missing_dir_errors() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(scan_savegames(&temp.path().join("missing")).is_err());
    }

    #[test]
    fn lists_every_sav_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        touch(temp.path(), "autosave0.sav");
        touch(temp.path(), "savegame-2-20240101-000000.sav");
        touch(temp.path(), "notes.txt");
        assert_eq!(list_save_files(temp.path()).expect("list").len(), 2);
    }

    #[test]
    fn latest_save_prefers_newest_mtime() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert_eq!(latest_save_file(temp.path()).expect("latest"), None);

        let older = touch(temp.path(), "savegame-9-20240101-000000.sav");
        let newer = touch(temp.path(), "savegame-1-20240102-000000.sav");
        let now = SystemTime::now();
        fs::File::options()
            .write(true)
            .open(&older)
            .and_then(|f| f.set_modified(now - Duration::from_secs(3600)))
            .expect("set mtime");
        fs::File::options()
            .write(true)
            .open(&newer)
            .and_then(|f| f.set_modified(now))
            .expect("set mtime");

        assert_eq!(latest_save_file(temp.path()).expect("latest"), Some(newer));
    }

    #[test]
    fn remove_skips_missing_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let kept = touch(temp.path(), "savegame-3-20240101-000000.sav");
        let doomed = touch(temp.path(), "savegame-2-20240101-000000.sav");
        let mut saves = scan_savegames(temp.path()).expect("scan");
        saves.insert(1, temp.path().join("savegame-1-gone.sav"));

        let removed = remove_savegames(&saves, &BTreeSet::from([1, 2, 7]));
        assert_eq!(removed, 1);
        assert!(!doomed.exists());
        assert!(kept.exists());
    }
}
