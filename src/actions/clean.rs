// src/actions/clean.rs

use std::path::PathBuf;

use tracing::{debug, info};

use crate::config::ProjectPaths;
use crate::errors::Result;
use crate::fs::FileSystem;

/// Remove the staging root and everything under the output root except the
/// entries named in `paths.keep`.
///
/// Returns the removed top-level paths. Missing roots are not an error.
pub fn clean_outputs(fs: &dyn FileSystem, paths: &ProjectPaths) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();

    if fs.exists(&paths.staging) {
        fs.remove_dir_all(&paths.staging)?;
        removed.push(paths.staging.clone());
    }

    if fs.is_dir(&paths.output) {
        for entry in fs.read_dir(&paths.output)? {
            let name = entry
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if paths.keep.iter().any(|k| *k == name) {
                debug!(path = %entry.display(), "keeping");
                continue;
            }
            if fs.is_dir(&entry) {
                fs.remove_dir_all(&entry)?;
            } else {
                fs.remove_file(&entry)?;
            }
            removed.push(entry);
        }
    }

    info!(removed = removed.len(), "cleaned output directories");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    #[test]
    fn keeps_listed_entries_and_drops_staging() {
        let fs = MockFileSystem::new();
        fs.add_file("/p/.tmp/styles/main.css", "x");
        fs.add_file("/p/dist/index.html", "x");
        fs.add_file("/p/dist/scripts/main.js", "x");
        fs.add_file("/p/dist/.git/HEAD", "ref");
        let paths = ProjectPaths::conventional("/p");

        clean_outputs(&fs, &paths).unwrap();

        assert!(!fs.exists(&paths.staging));
        assert!(!fs.exists(&paths.output.join("index.html")));
        assert!(!fs.exists(&paths.output.join("scripts/main.js")));
        assert!(fs.is_file(&paths.output.join(".git/HEAD")));
    }

    #[test]
    fn missing_roots_are_fine() {
        let fs = MockFileSystem::new();
        let removed = clean_outputs(&fs, &ProjectPaths::conventional("/p")).unwrap();
        assert!(removed.is_empty());
    }
}
