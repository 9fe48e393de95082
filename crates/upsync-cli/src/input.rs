use eyre::{Context, Result};
use std::io::{self, BufRead, IsTerminal};
use std::path::PathBuf;

/// Read the candidate list piped on stdin. Returns an empty list when stdin
/// is a terminal.
pub fn read_stdin_list() -> Result<Vec<PathBuf>> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(Vec::new());
    }
    read_paths(stdin.lock())
}

/// One literal path per line; blank lines are ignored.
pub fn read_paths<R: BufRead>(reader: R) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for line in reader.lines() {
        let line = line.wrap_err("failed to read file list from stdin")?;
        let line = line.strip_suffix('\r').unwrap_or(&line);
        if line.is_empty() {
            continue;
        }
        paths.push(PathBuf::from(line));
    }
    Ok(paths)
}
