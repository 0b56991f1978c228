//! Cache storage abstraction.
//!
//! A [`Cache`] is one of three shapes, each supporting the same primitive
//! operations:
//!
//! - [`Cache::Folder`]: keys are relative file paths under a root directory.
//! - [`Cache::Mapping`]: any [`Store`] (in-memory maps, custom persistence).
//! - [`Cache::Direct`]: every key is itself an absolute (or `~`-relative) file path.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::{GrazeError, Result};
use crate::exceptions::EXCEPTIONS_FILENAME;
use crate::paths::expand_home;

/// Key-value storage over string keys and byte content.
///
/// Implement this to plug a custom persistence target into [`Cache::Mapping`].
pub trait Store {
    /// Whether `key` has content.
    fn contains(&self, key: &str) -> bool;

    /// Read the content of `key`, `None` when absent.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store content under `key`, replacing any previous content.
    fn set(&mut self, key: &str, content: &[u8]) -> Result<()>;

    /// Remove `key`. Fails with [`GrazeError::NotFound`] when absent.
    fn delete(&mut self, key: &str) -> Result<()>;

    /// Iterate over all keys.
    fn keys(&self) -> Box<dyn Iterator<Item = String> + '_>;

    /// Number of entries.
    fn len(&self) -> usize {
        self.keys().count()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// When `key` was last written, if the store keeps track of it.
    fn modified(&self, _key: &str) -> Option<SystemTime> {
        None
    }
}

/// In-memory store that remembers when each entry was written.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, (Vec<u8>, SystemTime)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the write time of an entry.
    pub fn set_modified(&mut self, key: &str, at: SystemTime) -> bool {
        match self.entries.get_mut(key) {
            Some((_, modified)) => {
                *modified = at;
                true
            }
            None => false,
        }
    }
}

impl Store for MemoryStore {
    fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).map(|(content, _)| content.clone()))
    }

    fn set(&mut self, key: &str, content: &[u8]) -> Result<()> {
        self.entries
            .insert(key.to_string(), (content.to_vec(), SystemTime::now()));
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.entries
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| GrazeError::NotFound(key.to_string()))
    }

    fn keys(&self) -> Box<dyn Iterator<Item = String> + '_> {
        Box::new(self.entries.keys().cloned())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn modified(&self, key: &str) -> Option<SystemTime> {
        self.entries.get(key).map(|(_, modified)| *modified)
    }
}

macro_rules! impl_store_for_map {
    ($map:ident) => {
        impl Store for $map<String, Vec<u8>> {
            fn contains(&self, key: &str) -> bool {
                self.contains_key(key)
            }

            fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
                Ok($map::get(self, key).cloned())
            }

            fn set(&mut self, key: &str, content: &[u8]) -> Result<()> {
                self.insert(key.to_string(), content.to_vec());
                Ok(())
            }

            fn delete(&mut self, key: &str) -> Result<()> {
                self.remove(key)
                    .map(|_| ())
                    .ok_or_else(|| GrazeError::NotFound(key.to_string()))
            }

            fn keys(&self) -> Box<dyn Iterator<Item = String> + '_> {
                Box::new($map::keys(self).cloned())
            }

            fn len(&self) -> usize {
                $map::len(self)
            }
        }
    };
}

impl_store_for_map!(HashMap);
impl_store_for_map!(BTreeMap);

/// Claims every key but never reads anything back, like a folder whose files
/// vanish between the existence check and the read.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct VanishingStore;

#[cfg(test)]
impl Store for VanishingStore {
    fn contains(&self, _key: &str) -> bool {
        true
    }

    fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    fn set(&mut self, _key: &str, _content: &[u8]) -> Result<()> {
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        Err(GrazeError::NotFound(key.to_string()))
    }

    fn keys(&self) -> Box<dyn Iterator<Item = String> + '_> {
        Box::new(std::iter::empty())
    }
}

/// Where cache entries live.
pub enum Cache {
    /// A directory; keys are relative paths below it.
    Folder(PathBuf),
    /// An arbitrary key-value store.
    Mapping(Box<dyn Store>),
    /// No backend: keys are full file paths.
    Direct,
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cache::Folder(root) => f.debug_tuple("Folder").field(root).finish(),
            Cache::Mapping(store) => write!(f, "Mapping({} entries)", store.len()),
            Cache::Direct => f.write_str("Direct"),
        }
    }
}

impl Cache {
    /// A folder cache rooted at `root` (`~` is expanded).
    pub fn folder(root: impl AsRef<Path>) -> Self {
        Cache::Folder(expand_home(root))
    }

    /// A mapping cache over `store`.
    pub fn mapping(store: impl Store + 'static) -> Self {
        Cache::Mapping(Box::new(store))
    }

    /// Root directory of a folder cache.
    pub fn rootdir(&self) -> Option<&Path> {
        match self {
            Cache::Folder(root) => Some(root),
            _ => None,
        }
    }

    /// File backing `key`, for the shapes that store entries as files.
    ///
    /// Folder keys with `.` or `..` segments have no file: they would resolve
    /// outside the root.
    pub fn local_path(&self, key: &str) -> Option<PathBuf> {
        match self {
            Cache::Folder(root) => key_path(root, key),
            Cache::Mapping(_) => None,
            Cache::Direct => Some(expand_home(key)),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        match self {
            Cache::Mapping(store) => store.contains(key),
            _ => self.local_path(key).is_some_and(|path| path.is_file()),
        }
    }

    /// Read `key`. Absence is `Ok(None)`, never an error.
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self {
            Cache::Mapping(store) => store.get(key),
            _ => match self.local_path(key) {
                Some(path) => read_file(&path),
                None => Ok(None),
            },
        }
    }

    /// Write `key`, creating missing parent directories for file-backed shapes.
    pub fn set(&mut self, key: &str, content: &[u8]) -> Result<()> {
        match self {
            Cache::Mapping(store) => store.set(key, content),
            _ => match self.local_path(key) {
                Some(path) => write_file(&path, content),
                None => Err(GrazeError::UnsafeKey(key.to_string())),
            },
        }
    }

    /// Remove `key`. Fails with [`GrazeError::NotFound`] when absent.
    pub fn delete(&mut self, key: &str) -> Result<()> {
        match self {
            Cache::Mapping(store) => store.delete(key),
            _ => {
                let path = self
                    .local_path(key)
                    .ok_or_else(|| GrazeError::NotFound(key.to_string()))?;
                match fs::remove_file(&path) {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {
                        Err(GrazeError::NotFound(key.to_string()))
                    }
                    Err(e) => Err(e.into()),
                }
            }
        }
    }

    /// Iterate over native keys.
    ///
    /// The iterator reads the backend lazily, so it reflects the state at the time
    /// it is consumed. A direct cache has no key space and yields nothing.
    pub fn keys(&self) -> Box<dyn Iterator<Item = Result<String>> + '_> {
        match self {
            Cache::Folder(root) => Box::new(folder_keys(root)),
            Cache::Mapping(store) => Box::new(store.keys().map(Ok)),
            Cache::Direct => Box::new(std::iter::empty()),
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        match self {
            Cache::Mapping(store) => store.len(),
            _ => self.keys().filter(|key| key.is_ok()).count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// When `key` was last written, if known.
    pub fn modified(&self, key: &str) -> Option<SystemTime> {
        match self {
            Cache::Mapping(store) => store.modified(key),
            _ => self
                .local_path(key)
                .and_then(|path| fs::metadata(path).ok())
                .and_then(|meta| meta.modified().ok()),
        }
    }
}

/// Join a `/`-separated key onto a root directory. `None` for keys with `.` or
/// `..` segments.
fn key_path(root: &Path, key: &str) -> Option<PathBuf> {
    let mut path = root.to_path_buf();
    for segment in key.split('/').filter(|segment| !segment.is_empty()) {
        if matches!(segment, "." | "..") {
            return None;
        }
        path.push(segment);
    }
    Some(path)
}

fn folder_keys(root: &Path) -> impl Iterator<Item = Result<String>> + '_ {
    walkdir::WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(move |entry| match entry {
            Ok(entry) if entry.file_type().is_file() => {
                let relative = entry.path().strip_prefix(root).ok()?;
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                (key != EXCEPTIONS_FILENAME).then_some(Ok(key))
            }
            Ok(_) => None,
            // A root that was never created holds no entries
            Err(e) if e.depth() == 0 => None,
            Err(e) => Some(Err(GrazeError::Io(e.into()))),
        })
}

/// Read a file, mapping "not found" to `None`.
pub(crate) fn read_file(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write a file atomically, creating missing parent directories first.
pub(crate) fn write_file(path: &Path, content: &[u8]) -> Result<()> {
    let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        fs::write(path, content)?;
        return Ok(());
    };
    fs::create_dir_all(dir)?;
    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(content)?;
    temp.persist(path)?;
    Ok(())
}
