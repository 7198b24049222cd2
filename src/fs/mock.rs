use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Result, anyhow};

use super::FileSystem;

#[derive(Debug, Default)]
struct MockState {
    files: BTreeMap<PathBuf, Vec<u8>>,
    dirs: BTreeSet<PathBuf>,
}

/// In-memory filesystem for tests.
///
/// Paths are normalised (`./a/b` and `a/b` are the same entry) and parent
/// directories exist implicitly once a file is added below them.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    state: Arc<Mutex<MockState>>,
}

fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let path = normalize(path.as_ref());
        let mut state = self.lock();
        let mut parent = path.parent();
        while let Some(dir) = parent {
            state.dirs.insert(dir.to_path_buf());
            parent = dir.parent();
        }
        state.files.insert(path, content.into());
    }

    /// Content of a file, if present.
    pub fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.lock().files.get(&normalize(path.as_ref())).cloned()
    }

    /// All file paths currently stored, sorted.
    pub fn file_paths(&self) -> Vec<PathBuf> {
        self.lock().files.keys().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl FileSystem for MockFileSystem {
    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let state = self.lock();
        let key = normalize(path);
        match state.files.get(&key) {
            Some(content) => Ok(content.clone()),
            None if state.dirs.contains(&key) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        let bytes = self.read(path)?;
        String::from_utf8(bytes).map_err(|e| anyhow!("Invalid UTF-8: {}", e))
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.add_file(path, contents);
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        match self.lock().files.remove(&normalize(path)) {
            Some(_) => Ok(()),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        let prefix = normalize(path);
        let mut state = self.lock();
        state.files.retain(|p, _| !p.starts_with(&prefix));
        state.dirs.retain(|p| !p.starts_with(&prefix));
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.is_file(path) || self.is_dir(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        self.lock().files.contains_key(&normalize(path))
    }

    fn is_dir(&self, path: &Path) -> bool {
        let key = normalize(path);
        key.as_os_str().is_empty() || self.lock().dirs.contains(&key)
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        if !self.is_dir(path) {
            return Err(anyhow!("Not a directory or not found: {:?}", path));
        }
        let key = normalize(path);
        let state = self.lock();
        let children = state
            .files
            .keys()
            .chain(state.dirs.iter())
            .filter(|p| p.parent() == Some(key.as_path()))
            .filter_map(|p| p.file_name())
            .map(|name| path.join(name))
            .collect();
        Ok(children)
    }

    /// No symlinks in memory: the normalized path itself.
    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        if !self.exists(path) {
            return Err(anyhow!("File not found: {:?}", path));
        }
        Ok(normalize(path))
    }
}
