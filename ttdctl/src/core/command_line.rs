//! Parsing of operator input lines.

/// An operator line split into command name and argument text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandLine<'a> {
    pub name: &'a str,
    /// Everything after the first space, possibly empty.
    pub args: &'a str,
}

/// Split a raw input line into `name` and `args`.
///
/// Surrounding whitespace is stripped first. Returns `None` for blank lines.
pub fn parse_line(raw: &str) -> Option<CommandLine<'_>> {
    let line = raw.trim();
    if line.is_empty() {
        return None;
    }
    let (name, args) = line.split_once(' ').unwrap_or((line, ""));
    Some(CommandLine { name, args })
}
