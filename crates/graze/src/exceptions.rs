//! Exceptional URLs: pre-registered URL → local file overrides.
//!
//! A folder cache may carry an `_exceptions.json` file at its root, a flat JSON
//! object mapping URLs to absolute file paths:
//!
//! ```json
//! {
//!   "http://example.com/data": "/data/already-downloaded.csv"
//! }
//! ```
//!
//! Lookups of a registered URL are served from that file and never reach the
//! source or the cache itself.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::backend::{Cache, read_file, write_file};
use crate::codec::normalize_url;
use crate::error::{GrazeError, Result};
use crate::paths::expand_home;

/// Name of the exceptions registry at the root of a folder cache.
pub const EXCEPTIONS_FILENAME: &str = "_exceptions.json";

/// Load a URL → path mapping from a JSON file.
///
/// A missing or blank file is an empty mapping.
pub fn load_exceptions(path: impl AsRef<Path>) -> Result<BTreeMap<String, String>> {
    let path = expand_home(path);
    let Some(raw) = read_file(&path)? else {
        return Ok(BTreeMap::new());
    };
    let text = String::from_utf8_lossy(&raw);
    if text.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    Ok(serde_json::from_str(&text)?)
}

/// The registry of a cache: `{root}/_exceptions.json` for folder caches, nothing
/// for other shapes.
pub fn discover_exceptions(cache: &Cache) -> Result<BTreeMap<String, String>> {
    match cache.rootdir() {
        Some(root) => load_exceptions(root.join(EXCEPTIONS_FILENAME)),
        None => Ok(BTreeMap::new()),
    }
}

/// Where a store's exceptions come from.
#[derive(Debug, Clone, Default)]
pub enum ExceptionsConfig {
    /// `_exceptions.json` at the cache root, if any.
    #[default]
    Discover,
    /// A JSON file somewhere else.
    File(PathBuf),
    /// An explicit URL → path mapping.
    Explicit(BTreeMap<String, String>),
    /// No exceptions.
    Disabled,
}

impl ExceptionsConfig {
    pub fn load(&self, cache: &Cache) -> Result<Exceptions> {
        let entries = match self {
            ExceptionsConfig::Discover => discover_exceptions(cache)?,
            ExceptionsConfig::File(path) => load_exceptions(path)?,
            ExceptionsConfig::Explicit(entries) => entries.clone(),
            ExceptionsConfig::Disabled => BTreeMap::new(),
        };
        Ok(Exceptions::new(entries))
    }
}

/// Registered URLs whose target file exists.
#[derive(Debug, Clone, Default)]
pub struct Exceptions {
    entries: BTreeMap<String, PathBuf>,
}

impl Exceptions {
    /// Keep the entries whose file exists; the others are excluded with a warning.
    pub fn new(entries: BTreeMap<String, String>) -> Self {
        let mut valid = BTreeMap::new();
        let mut missing = Vec::new();
        for (url, path) in entries {
            let path = expand_home(path);
            if path.exists() {
                valid.insert(url, path);
            } else {
                missing.push(url);
            }
        }
        if !missing.is_empty() {
            tracing::warn!(
                count = missing.len(),
                urls = ?missing,
                "excluded exceptional urls with missing files"
            );
        }
        Self { entries: valid }
    }

    /// File registered for `url`.
    pub fn path_of(&self, url: &str) -> Option<&Path> {
        self.entries
            .get(url)
            .or_else(|| self.entries.get(normalize_url(url)))
            .map(PathBuf::as_path)
    }

    pub fn contains(&self, url: &str) -> bool {
        self.path_of(url).is_some()
    }

    /// Content of the file registered for `url`, `None` for unregistered URLs.
    pub fn read(&self, url: &str) -> Option<Result<Vec<u8>>> {
        let path = self.path_of(url)?;
        Some(fs::read(path).map_err(GrazeError::from))
    }

    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Register `filepath` as the content of `url` in the registry of `rootdir`.
///
/// The file must exist; it is stored as an absolute path.
pub fn add_exception(
    rootdir: impl AsRef<Path>,
    url: &str,
    filepath: impl AsRef<Path>,
) -> Result<()> {
    let rootdir = expand_home(rootdir);
    let filepath = expand_home(filepath);
    if !filepath.exists() {
        return Err(GrazeError::NotFound(filepath.display().to_string()));
    }
    let filepath = fs::canonicalize(&filepath)?;

    let registry = rootdir.join(EXCEPTIONS_FILENAME);
    let mut entries = load_exceptions(&registry)?;
    entries.insert(url.to_string(), filepath.to_string_lossy().into_owned());

    let json = serde_json::to_string_pretty(&entries)?;
    write_file(&registry, json.as_bytes())?;
    tracing::debug!(url, registry = %registry.display(), "added exception");
    Ok(())
}

/// All registered `(url, filepath)` pairs of `rootdir`, including those whose file
/// is missing.
pub fn list_exceptions(rootdir: impl AsRef<Path>) -> Result<Vec<(String, String)>> {
    let registry = expand_home(rootdir).join(EXCEPTIONS_FILENAME);
    Ok(load_exceptions(registry)?.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryStore;

    #[test]
    fn test_load_exceptions() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ex.json");
        fs::write(
            &path,
            r#"{"http://example.com/data1": "/path/to/data1.txt", "http://example.com/data2": "/path/to/data2.txt"}"#,
        )
        .unwrap();

        let loaded = load_exceptions(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded["http://example.com/data1"], "/path/to/data1.txt");
    }

    #[test]
    fn test_load_missing_or_empty_file() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(load_exceptions(tmp.path().join("nope.json")).unwrap().is_empty());

        let empty = tmp.path().join("empty.json");
        fs::write(&empty, "  \n").unwrap();
        assert!(load_exceptions(&empty).unwrap().is_empty());
    }

    #[test]
    fn test_load_invalid_json_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.json");
        fs::write(&path, "[1, 2").unwrap();
        assert!(matches!(load_exceptions(&path), Err(GrazeError::Json(_))));
    }

    #[test]
    fn test_discover_only_for_folder_caches() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join(EXCEPTIONS_FILENAME),
            r#"{"http://example.com/data": "/path/to/data.txt"}"#,
        )
        .unwrap();

        let found = discover_exceptions(&Cache::folder(tmp.path())).unwrap();
        assert_eq!(found["http://example.com/data"], "/path/to/data.txt");

        let mapping = Cache::mapping(MemoryStore::new());
        assert!(discover_exceptions(&mapping).unwrap().is_empty());
    }

    #[test]
    fn test_missing_files_are_excluded() {
        let tmp = tempfile::tempdir().unwrap();
        let present = tmp.path().join("present.txt");
        fs::write(&present, b"exceptional data").unwrap();

        let exceptions = Exceptions::new(BTreeMap::from([
            ("url1".to_string(), present.to_string_lossy().into_owned()),
            ("url2".to_string(), "/nonexistent/file.txt".to_string()),
        ]));

        assert_eq!(exceptions.len(), 1);
        assert!(exceptions.contains("url1"));
        assert!(!exceptions.contains("url2"));
        assert_eq!(exceptions.read("url1").unwrap().unwrap(), b"exceptional data");
        assert!(exceptions.read("url2").is_none());
    }

    #[test]
    fn test_lookup_tolerates_trailing_slash() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("f");
        fs::write(&file, b"x").unwrap();
        let exceptions = Exceptions::new(BTreeMap::from([(
            "http://example.com/data".to_string(),
            file.to_string_lossy().into_owned(),
        )]));
        assert!(exceptions.contains("http://example.com/data/"));
    }

    #[test]
    fn test_add_and_list_exceptions() {
        let cache_dir = tempfile::tempdir().unwrap();
        let data_dir = tempfile::tempdir().unwrap();
        let data = data_dir.path().join("data.txt");
        fs::write(&data, b"local").unwrap();

        add_exception(cache_dir.path(), "http://example.com/b", &data).unwrap();
        add_exception(cache_dir.path(), "http://example.com/a", &data).unwrap();

        let listed = list_exceptions(cache_dir.path()).unwrap();
        let urls: Vec<&str> = listed.iter().map(|(url, _)| url.as_str()).collect();
        assert_eq!(urls, vec!["http://example.com/a", "http://example.com/b"]);
        assert_eq!(
            PathBuf::from(&listed[0].1),
            fs::canonicalize(&data).unwrap()
        );

        // Pretty printed with sorted keys
        let raw = fs::read_to_string(cache_dir.path().join(EXCEPTIONS_FILENAME)).unwrap();
        assert!(raw.find("example.com/a").unwrap() < raw.find("example.com/b").unwrap());
        assert!(raw.contains('\n'));
    }

    #[test]
    fn test_add_exception_requires_existing_file() {
        let cache_dir = tempfile::tempdir().unwrap();
        let err = add_exception(cache_dir.path(), "u", "/definitely/not/here.bin").unwrap_err();
        assert!(matches!(err, GrazeError::NotFound(_)));
        assert!(!cache_dir.path().join(EXCEPTIONS_FILENAME).exists());
    }

    #[test]
    fn test_list_without_registry_is_empty() {
        let cache_dir = tempfile::tempdir().unwrap();
        assert!(list_exceptions(cache_dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_config_sources() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("f");
        fs::write(&file, b"x").unwrap();
        let registry = tmp.path().join("elsewhere.json");
        fs::write(
            &registry,
            format!(r#"{{"u": "{}"}}"#, file.to_string_lossy().replace('\\', "\\\\")),
        )
        .unwrap();
        let cache = Cache::mapping(MemoryStore::new());

        assert!(ExceptionsConfig::File(registry).load(&cache).unwrap().contains("u"));
        assert!(ExceptionsConfig::Disabled.load(&cache).unwrap().is_empty());
        assert!(ExceptionsConfig::Discover.load(&cache).unwrap().is_empty());
    }
}
