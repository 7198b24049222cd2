// src/watch/path_utils.rs

//! Utility functions for path handling in the watcher.

use std::path::Path;

use crate::fs::glob::to_slash;

/// Convert a path into a string relative to `root`, with forward slashes.
///
/// - First we try a direct `strip_prefix(root)`.
/// - If that fails (e.g. due to symlinks or different absolute prefixes),
///   we canonicalize both paths and try again. A removed file cannot be
///   canonicalized, so its parent directory is used instead.
///
/// Returns `None` if the path cannot be related to `root`.
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    if let Ok(rel) = path.strip_prefix(root) {
        return Some(to_slash(rel));
    }

    let root_canon = root.canonicalize().ok()?;
    if let Ok(path_canon) = path.canonicalize() {
        return path_canon.strip_prefix(&root_canon).ok().map(to_slash);
    }

    let parent = path.parent()?.canonicalize().ok()?;
    let rel = parent.strip_prefix(&root_canon).ok()?;
    Some(to_slash(&rel.join(path.file_name()?)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_root_and_uses_forward_slashes() {
        assert_eq!(
            relative_str(Path::new("/p"), Path::new("/p/app/styles/main.scss")),
            Some("app/styles/main.scss".to_string())
        );
    }

    #[test]
    fn removed_file_resolves_through_its_parent() {
        let dir = tempfile::tempdir().unwrap();
        let proj = dir.path().join("proj");
        std::fs::create_dir_all(proj.join("app")).unwrap();
        let root_via_dots = proj.join("..").join("proj");
        let gone = proj.join("app").join("gone.js");
        assert_eq!(relative_str(&root_via_dots, &gone), Some("app/gone.js".to_string()));
    }
}
