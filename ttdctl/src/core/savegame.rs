//! Savegame file naming: `savegame-<index>-<YYYYMMDD-HHMMSS>.sav`.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;

/// Extension the server appends to the target it is asked to save to.
pub const SAVE_EXTENSION: &str = "sav";

/// `strftime` pattern for the timestamp part of savegame and backup names.
pub const STAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

static SAVEGAME_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^savegame-([0-9]+)-.*\.sav$").expect("savegame pattern must compile")
});

/// Extract the index from a savegame file name.
///
/// Returns `None` for names that don't follow the pattern and for index 0.
pub fn parse_index(file_name: &str) -> Option<u64> {
    let caps = SAVEGAME_NAME.captures(file_name)?;
    let index: u64 = caps[1].parse().ok()?;
    (index > 0).then_some(index)
}

/// Index to assign to the next save: one past the highest existing index.
pub fn next_index<V>(existing: &BTreeMap<u64, V>) -> u64 {
    existing
        .last_key_value()
        .map_or(1, |(index, _)| index.saturating_add(1))
}

/// Build the extension-less file stem for a save.
pub fn save_stem(index: u64, at: NaiveDateTime) -> String {
    format!("savegame-{index}-{}", at.format(STAMP_FORMAT))
}
