//! Command-line arguments for the dedicated server process.

use std::ffi::OsString;
use std::path::Path;

/// Flag that starts the server without a GUI.
pub const DEDICATED_FLAG: &str = "-D";

/// Build the server argument list (excluding the program itself).
///
/// Order is fixed: dedicated flag, starting year, password, savegame.
pub fn launch_args(
    starting_year: Option<u32>,
    password: Option<&str>,
    savegame: Option<&Path>,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![DEDICATED_FLAG.into()];
    if let Some(year) = starting_year {
        args.push("-t".into());
        args.push(year.to_string().into());
    }
    if let Some(password) = password.filter(|p| !p.is_empty()) {
        args.push("-p".into());
        args.push(password.into());
    }
    if let Some(savegame) = savegame {
        args.push("-g".into());
        args.push(savegame.as_os_str().to_owned());
    }
    args
}
