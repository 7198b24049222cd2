// src/fs/glob.rs

//! Compiled include/exclude glob sets and file enumeration.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use tracing::debug;

use crate::fs::FileSystem;

const GLOB_META: &[char] = &['*', '?', '[', '{'];

/// Include globs minus exclude globs, matched against paths relative to the
/// project root (forward slashes).
#[derive(Clone)]
pub struct PatternSet {
    patterns: Vec<String>,
    include: GlobSet,
    exclude: Option<GlobSet>,
}

impl fmt::Debug for PatternSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternSet")
            .field("patterns", &self.patterns)
            .finish_non_exhaustive()
    }
}

impl PatternSet {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        let exclude = if exclude.is_empty() {
            None
        } else {
            Some(build_globset(exclude).context("building exclude globset")?)
        };
        Ok(Self {
            patterns: include.to_vec(),
            include: build_globset(include).context("building include globset")?,
            exclude,
        })
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// True if `rel_path` (e.g. `"app/styles/main.scss"`) is included and not
    /// excluded.
    pub fn matches(&self, rel_path: &str) -> bool {
        if !self.include.is_match(rel_path) {
            return false;
        }
        !self.exclude.as_ref().is_some_and(|ex| ex.is_match(rel_path))
    }

    /// Every file under `root` matching the set, as paths relative to `root`.
    ///
    /// Only the static prefix of each pattern is walked. Symlinked
    /// directories are followed, but each real directory is read once.
    pub fn collect(&self, fs: &dyn FileSystem, root: &Path) -> Result<BTreeSet<PathBuf>> {
        let mut files = BTreeSet::new();
        let mut walked: BTreeSet<PathBuf> = BTreeSet::new();
        let mut visited: HashSet<PathBuf> = HashSet::new();

        for pattern in &self.patterns {
            let start = root.join(static_prefix(pattern));
            if fs.is_file(&start) {
                self.consider(root, &start, &mut files);
                continue;
            }
            if !fs.is_dir(&start) || walked.iter().any(|w| start.starts_with(w)) {
                continue;
            }
            walked.insert(start.clone());

            let mut stack = vec![start];
            while let Some(dir) = stack.pop() {
                let real = fs.canonicalize(&dir).unwrap_or_else(|_| dir.clone());
                if !visited.insert(real) {
                    debug!(dir = %dir.display(), "directory already walked; skipping symlink");
                    continue;
                }
                for path in fs.read_dir(&dir)? {
                    if fs.is_dir(&path) {
                        stack.push(path);
                    } else if fs.is_file(&path) {
                        self.consider(root, &path, &mut files);
                    }
                }
            }
        }

        Ok(files)
    }

    fn consider(&self, root: &Path, path: &Path, files: &mut BTreeSet<PathBuf>) {
        if let Ok(rel) = path.strip_prefix(root) {
            if self.matches(&to_slash(rel)) {
                files.insert(rel.to_path_buf());
            }
        }
    }
}

/// Build a GlobSet from simple string patterns.
///
/// `*` does not cross `/`; use `**` for that.
pub fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = GlobBuilder::new(pat)
            .literal_separator(true)
            .build()
            .with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

/// Leading components of `pattern` that contain no glob syntax.
pub fn static_prefix(pattern: &str) -> PathBuf {
    Path::new(pattern)
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .take_while(|c| !c.as_os_str().to_string_lossy().contains(GLOB_META))
        .collect()
}

/// Directory input paths are made relative to: the static prefix of
/// `pattern`, or its parent when the pattern names a single file.
pub fn glob_base(pattern: &str) -> PathBuf {
    let prefix = static_prefix(pattern);
    if pattern.contains(GLOB_META) {
        prefix
    } else {
        prefix.parent().map(Path::to_path_buf).unwrap_or_default()
    }
}

/// Path with forward slashes, as matched by glob sets.
pub fn to_slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    fn set(include: &[&str], exclude: &[&str]) -> PatternSet {
        let inc: Vec<String> = include.iter().map(|s| s.to_string()).collect();
        let exc: Vec<String> = exclude.iter().map(|s| s.to_string()).collect();
        PatternSet::new(&inc, &exc).unwrap()
    }

    #[cfg(unix)]
    #[test]
    fn symlink_cycles_are_walked_once() {
        let dir = tempfile::tempdir().unwrap();
        let styles = dir.path().join("app/styles");
        std::fs::create_dir_all(styles.join("vendor")).unwrap();
        std::fs::write(styles.join("main.css"), "a{}").unwrap();
        std::fs::write(styles.join("vendor/reset.css"), "b{}").unwrap();
        std::os::unix::fs::symlink(&styles, styles.join("vendor/loop")).unwrap();

        let files = set(&["app/styles/**/*.css"], &[])
            .collect(&crate::fs::RealFileSystem, dir.path())
            .unwrap();
        assert_eq!(
            files,
            BTreeSet::from([
                PathBuf::from("app/styles/main.css"),
                PathBuf::from("app/styles/vendor/reset.css"),
            ])
        );
    }

    #[test]
    fn bases_and_prefixes() {
        assert_eq!(static_prefix("app/styles/**/*.scss"), PathBuf::from("app/styles"));
        assert_eq!(glob_base("app/styles/**/*.scss"), PathBuf::from("app/styles"));
        assert_eq!(glob_base("app/styles/main.scss"), PathBuf::from("app/styles"));
        assert_eq!(glob_base("./app/*.html"), PathBuf::from("app"));
        assert_eq!(glob_base("*.html"), PathBuf::new());
    }

    #[test]
    fn collect_walks_prefix_and_applies_excludes() {
        let fs = MockFileSystem::new();
        fs.add_file("/p/app/index.html", "x");
        fs.add_file("/p/app/about.html", "x");
        fs.add_file("/p/app/partials/nav.html", "x");
        fs.add_file("/p/app/styles/main.css", "x");
        fs.add_file("/p/dist/index.html", "x");

        let files = set(&["app/**/*.html"], &["app/partials/**"])
            .collect(&fs, Path::new("/p"))
            .unwrap();
        assert_eq!(
            files.into_iter().collect::<Vec<_>>(),
            vec![PathBuf::from("app/about.html"), PathBuf::from("app/index.html")]
        );
    }

    #[test]
    fn literal_pattern_matches_single_file() {
        let fs = MockFileSystem::new();
        fs.add_file("/p/app/styles/main.scss", "x");
        fs.add_file("/p/app/styles/other.scss", "x");
        let files = set(&["app/styles/main.scss"], &[])
            .collect(&fs, Path::new("/p"))
            .unwrap();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn single_star_stays_in_one_directory() {
        let copy = set(&["app/*"], &["app/*.html"]);
        assert!(copy.matches("app/robots.txt"));
        assert!(!copy.matches("app/index.html"));
        assert!(!copy.matches("app/scripts/main.js"));
    }

    #[test]
    fn invalid_glob_is_an_error() {
        assert!(PatternSet::new(&["app/[".to_string()], &[]).is_err());
    }
}
