//! `squadrun sessions`: show what each line of the session file parses to.

use anyhow::{Context, Result};
use squadrun_core::{SessionDescriptor, SessionError, SessionSource};
use std::path::Path;

/// ANSI color codes for terminal output.
mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const DIM: &str = "\x1b[2m";
    pub const GREEN: &str = "\x1b[32m";
    pub const RED: &str = "\x1b[31m";
}

pub fn list_sessions(path: &Path, use_colors: bool) -> Result<()> {
    let entries = SessionSource::new(path)
        .entries()
        .with_context(|| format!("Failed to read session file {}", path.display()))?;

    let valid = entries.iter().filter(|(_, parsed)| parsed.is_ok()).count();
    println!(
        "{}: {valid} valid of {} non-empty line(s)",
        path.display(),
        entries.len()
    );
    for (index, parsed) in &entries {
        println!("{}", format_entry(*index, parsed, use_colors));
    }
    Ok(())
}

fn format_entry(
    index: usize,
    parsed: &Result<SessionDescriptor, SessionError>,
    use_colors: bool,
) -> String {
    let (dim, green, red, reset) = if use_colors {
        (colors::DIM, colors::GREEN, colors::RED, colors::RESET)
    } else {
        ("", "", "", "")
    };

    let label = format!("{dim}line {:>3}{reset}", index + 1);
    match parsed {
        Ok(session) => {
            let handle = session
                .user
                .username
                .as_deref()
                .map_or_else(|| session.user.display_name(), |u| format!("@{u}"));
            format!("  {label}  {green}id {}{reset}  {handle}", session.user.id)
        }
        Err(e) => format!("  {label}  {red}error: {e}{reset}"),
    }
}
