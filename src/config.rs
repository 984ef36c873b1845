//! Platform-specific config/history path resolution, with
//! `DRSH_CONFIG`/`DRSH_HISTORY` environment overrides for hermetic
//! testing, and plain-text history file load/save.
//!
//! Grounded on `examples/dumitru-stama-Bark/src/config.rs`'s
//! `config_dir`/`history_file`/`load_command_history`/
//! `save_command_history` (same env-var-first-then-platform-default
//! resolution chain), but the directory layout itself follows
//! SPEC_FULL.md §6 rather than Bark's own TOML app-config shape.

use std::path::PathBuf;

use crate::atom::{Atom, AtomTable};
use crate::env::Environment;

const CONFIG_FILE_NAME: &str = "drsh_config.drsh";
const HISTORY_FILE_NAME: &str = "drsh_history.txt";

fn platform_config_dir() -> Option<PathBuf> {
    if cfg!(target_os = "macos") {
        std::env::var_os("HOME")
            .map(|h| PathBuf::from(h).join("Library/Application Support/drsh"))
    } else if cfg!(windows) {
        std::env::var_os("LOCALAPPDATA").map(|p| PathBuf::from(p).join("drsh"))
    } else if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        Some(PathBuf::from(xdg).join("drsh"))
    } else {
        std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config/drsh"))
    }
}

fn platform_state_dir() -> Option<PathBuf> {
    if cfg!(target_os = "macos") {
        std::env::var_os("HOME")
            .map(|h| PathBuf::from(h).join("Library/Application Support/drsh"))
    } else if cfg!(windows) {
        std::env::var_os("LOCALAPPDATA").map(|p| PathBuf::from(p).join("drsh"))
    } else if let Some(xdg) = std::env::var_os("XDG_STATE_HOME") {
        Some(PathBuf::from(xdg).join("drsh"))
    } else if let Some(xdg) = std::env::var_os("XDG_DATA_HOME") {
        Some(PathBuf::from(xdg).join("drsh"))
    } else {
        std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/state/drsh"))
    }
}

/// Resolve the config file path: `DRSH_CONFIG` from the inherited
/// environment wins outright (this is the hermetic-testing override),
/// otherwise the platform default under the config directory.
pub fn config_path() -> Option<PathBuf> {
    if let Some(over) = std::env::var_os("DRSH_CONFIG") {
        return Some(PathBuf::from(over));
    }
    platform_config_dir().map(|d| d.join(CONFIG_FILE_NAME))
}

/// Resolve the history file path with the same override precedence.
pub fn history_path() -> Option<PathBuf> {
    if let Some(over) = std::env::var_os("DRSH_HISTORY") {
        return Some(PathBuf::from(over));
    }
    platform_state_dir().map(|d| d.join(HISTORY_FILE_NAME))
}

/// Record the resolved paths into the environment as `DRSH_CONFIG`/
/// `DRSH_HISTORY`, matching the reference implementation's startup
/// sequence.
pub fn publish_paths(
    env: &mut Environment,
    at: &mut AtomTable,
    config: &std::path::Path,
    history: &std::path::Path,
) {
    env.set_by_name(at, "DRSH_CONFIG", &config.to_string_lossy());
    env.set_by_name(at, "DRSH_HISTORY", &history.to_string_lossy());
}

/// Read and split a history file into atoms. Splits on NUL, LF, CR;
/// trims ASCII whitespace; drops empty lines. A missing file is
/// non-fatal and yields an empty history.
pub fn load_history(path: &std::path::Path, at: &mut AtomTable) -> Vec<Atom> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "history file not loaded");
            return Vec::new();
        }
    };
    let mut out = Vec::new();
    for chunk in bytes.split(|&b| b == 0 || b == b'\n' || b == b'\r') {
        let trimmed = trim_ascii(chunk);
        if trimmed.is_empty() {
            continue;
        }
        if let Ok(atom) = at.atomize(trimmed) {
            out.push(atom);
        }
    }
    out
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map(|i| i + 1)
        .unwrap_or(start);
    &bytes[start..end]
}

/// Append `entries` (e.g. `input.history_entries_since_start()`) to the
/// history file, creating parent directories and the file as needed.
/// Failure is swallowed — the history append on shutdown is best-effort.
pub fn save_history(path: &std::path::Path, entries: &[Atom]) {
    if entries.is_empty() {
        return;
    }
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    use std::io::Write as _;
    let file = std::fs::OpenOptions::new().create(true).append(true).open(path);
    match file {
        Ok(mut f) => {
            for atom in entries {
                let _ = f.write_all(atom.as_bytes());
                let _ = f.write_all(b"\n");
            }
            tracing::debug!(path = %path.display(), count = entries.len(), "history appended");
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to append history");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_history_splits_on_all_three_separators() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hist.txt");
        std::fs::write(&path, b"echo a\0echo b\r\necho c\n").unwrap();
        let mut at = AtomTable::new();
        let entries = load_history(&path, &mut at);
        let strs: Vec<String> = entries.iter().map(|a| a.as_str().into_owned()).collect();
        assert_eq!(strs, vec!["echo a", "echo b", "echo c"]);
    }

    #[test]
    fn load_history_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nope.txt");
        let mut at = AtomTable::new();
        assert!(load_history(&path, &mut at).is_empty());
    }

    #[test]
    fn save_history_appends_and_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/hist.txt");
        let mut at = AtomTable::new();
        let entries = vec![at.atomize(b"echo a").unwrap(), at.atomize(b"echo b").unwrap()];
        save_history(&path, &entries);
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "echo a\necho b\n");
    }

    #[test]
    fn env_override_wins_over_platform_default() {
        std::env::set_var("DRSH_CONFIG", "/tmp/custom-drsh-config");
        let path = config_path().unwrap();
        assert_eq!(path, PathBuf::from("/tmp/custom-drsh-config"));
        std::env::remove_var("DRSH_CONFIG");
    }

    #[test]
    fn trim_ascii_strips_leading_and_trailing_whitespace() {
        assert_eq!(trim_ascii(b"  hi  "), b"hi");
        assert_eq!(trim_ascii(b"   "), b"");
    }
}
