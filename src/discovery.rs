/*
 * Copyright (C) 2026 Mark Wells Dev
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! Auto-discovery of the analyzer's entry script.
//!
//! A compiled Rust binary has no runtime equivalent of "the directory this
//! module's source file lives in"; the closest analog is the directory
//! containing the running executable, so discovery walks upward from there.

use std::path::{Path, PathBuf};

const MAX_LEVELS: usize = 10;
const RELATIVE_SCRIPT: &str = "pike-scripts/analyzer.pike";

/// Locates the analyzer's entry script.
///
/// Walks upward from `anchor` (normally [`std::env::current_exe`]'s parent
/// directory) up to [`MAX_LEVELS`] levels, looking for
/// `<dir>/pike-scripts/analyzer.pike`. Falls back to a path relative to the
/// current working directory if nothing is found.
#[must_use]
pub fn discover_script_path(anchor: &Path) -> PathBuf {
    let mut dir = anchor;
    for _ in 0..MAX_LEVELS {
        let candidate = dir.join(RELATIVE_SCRIPT);
        if candidate.exists() {
            return candidate;
        }
        match dir.parent() {
            Some(parent) => dir = parent,
            None => break,
        }
    }
    PathBuf::from(RELATIVE_SCRIPT)
}

/// Returns the directory to anchor discovery from: the running executable's
/// parent directory, or the current working directory if that cannot be
/// determined.
#[must_use]
pub fn current_exe_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|path| path.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn finds_script_at_anchor() {
        let dir = tempdir().expect("tempdir");
        let script_dir = dir.path().join("pike-scripts");
        fs::create_dir_all(&script_dir).expect("create script dir");
        fs::write(script_dir.join("analyzer.pike"), "").expect("write script");

        let found = discover_script_path(dir.path());
        assert_eq!(found, script_dir.join("analyzer.pike"));
    }

    #[test]
    fn finds_script_several_levels_up() {
        let dir = tempdir().expect("tempdir");
        let script_dir = dir.path().join("pike-scripts");
        fs::create_dir_all(&script_dir).expect("create script dir");
        fs::write(script_dir.join("analyzer.pike"), "").expect("write script");

        let nested = dir.path().join("a/b/c");
        fs::create_dir_all(&nested).expect("create nested dir");

        let found = discover_script_path(&nested);
        assert_eq!(found, script_dir.join("analyzer.pike"));
    }

    #[test]
    fn falls_back_when_nothing_found() {
        let dir = tempdir().expect("tempdir");
        let found = discover_script_path(dir.path());
        assert_eq!(found, PathBuf::from(RELATIVE_SCRIPT));
    }
}
