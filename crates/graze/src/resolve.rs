//! The miss-fill algorithm.
//!
//! [`graze`] turns a URL into content: read it from the cache when present and
//! fresh, otherwise fetch it from the [`Source`], store it, and hand it back.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backend::Cache;
use crate::codec::{normalize_url, url_to_key};
use crate::error::{ConfigError, GrazeError, Result};
use crate::exceptions::{Exceptions, discover_exceptions};
use crate::paths::{MissingDirPolicy, default_cache_dir, expand_home, is_absolute_key};
use crate::refresh::Refresh;
use crate::source::Source;

/// Hook applied to a URL right before it is fetched. Its return value is the URL
/// actually requested.
pub type KeyIngress = Box<dyn Fn(&str) -> String>;

/// What a lookup hands back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grazed {
    /// The content itself.
    Content(Vec<u8>),
    /// Where the content is stored, for backends that are not files.
    Key(String),
    /// Where the content is stored on disk.
    Path(PathBuf),
}

impl Grazed {
    pub fn content(&self) -> Option<&[u8]> {
        match self {
            Grazed::Content(content) => Some(content),
            _ => None,
        }
    }

    pub fn into_content(self) -> Option<Vec<u8>> {
        match self {
            Grazed::Content(content) => Some(content),
            _ => None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Grazed::Path(path) => Some(path),
            _ => None,
        }
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            Grazed::Key(key) => Some(key),
            _ => None,
        }
    }
}

/// How the cache key of a URL is obtained.
#[derive(Default)]
pub enum CacheKeySpec {
    /// Derived from the URL with the current key layout.
    #[default]
    Derived,
    /// Used as given.
    Literal(String),
    /// Computed from the URL.
    With(Box<dyn Fn(&str) -> String>),
}

impl CacheKeySpec {
    pub fn with(f: impl Fn(&str) -> String + 'static) -> Self {
        CacheKeySpec::With(Box::new(f))
    }

    pub fn key_for(&self, url: &str) -> String {
        match self {
            CacheKeySpec::Derived => url_to_key(url),
            CacheKeySpec::Literal(key) => key.clone(),
            CacheKeySpec::With(f) => f(url),
        }
    }
}

impl From<&str> for CacheKeySpec {
    fn from(key: &str) -> Self {
        CacheKeySpec::Literal(key.to_string())
    }
}

impl From<String> for CacheKeySpec {
    fn from(key: String) -> Self {
        CacheKeySpec::Literal(key)
    }
}

impl fmt::Debug for CacheKeySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKeySpec::Derived => f.write_str("Derived"),
            CacheKeySpec::Literal(key) => f.debug_tuple("Literal").field(key).finish(),
            CacheKeySpec::With(_) => f.write_str("With(..)"),
        }
    }
}

/// Options for a single [`graze`] call.
///
/// `rootdir` and `return_filepaths` are the older spellings of `cache` and
/// `return_key`; giving both spellings of the same option is a [`ConfigError`].
#[derive(Default)]
pub struct GrazeOptions {
    /// Where entries live. Defaults to a folder cache at [`default_cache_dir`].
    pub cache: Option<Cache>,
    /// Folder cache root (older spelling of `cache`).
    pub rootdir: Option<PathBuf>,
    pub cache_key: CacheKeySpec,
    pub refresh: Option<Refresh>,
    /// Refetch entries older than this. Sugar for [`Refresh::MaxAge`].
    pub max_age: Option<Duration>,
    pub key_ingress: Option<KeyIngress>,
    /// Return where the content is stored instead of the content.
    pub return_key: Option<bool>,
    /// Older spelling of `return_key`.
    pub return_filepaths: Option<bool>,
    /// Applied to folder roots that do not exist yet.
    pub dir_policy: MissingDirPolicy,
}

impl GrazeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache(mut self, cache: Cache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn rootdir(mut self, rootdir: impl Into<PathBuf>) -> Self {
        self.rootdir = Some(rootdir.into());
        self
    }

    pub fn cache_key(mut self, cache_key: impl Into<CacheKeySpec>) -> Self {
        self.cache_key = cache_key.into();
        self
    }

    pub fn key_fn(mut self, f: impl Fn(&str) -> String + 'static) -> Self {
        self.cache_key = CacheKeySpec::with(f);
        self
    }

    pub fn refresh(mut self, refresh: impl Into<Refresh>) -> Self {
        self.refresh = Some(refresh.into());
        self
    }

    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn key_ingress(mut self, f: impl Fn(&str) -> String + 'static) -> Self {
        self.key_ingress = Some(Box::new(f));
        self
    }

    pub fn return_key(mut self, return_key: bool) -> Self {
        self.return_key = Some(return_key);
        self
    }

    pub fn return_filepaths(mut self, return_filepaths: bool) -> Self {
        self.return_filepaths = Some(return_filepaths);
        self
    }

    pub fn dir_policy(mut self, policy: MissingDirPolicy) -> Self {
        self.dir_policy = policy;
        self
    }

    /// Reject option combinations that cannot be resolved unambiguously.
    pub fn validate(&self, key: &str) -> Result<(), ConfigError> {
        if self.cache.is_some() && self.rootdir.is_some() {
            return Err(ConfigError::CacheAndRootdir);
        }
        let direct = matches!(self.cache, Some(Cache::Direct));
        let has_backend = self.rootdir.is_some() || (self.cache.is_some() && !direct);
        if has_backend && is_absolute_key(key) {
            return Err(ConfigError::AbsoluteKeyWithCache(key.to_string()));
        }
        if direct && !is_absolute_key(key) {
            return Err(ConfigError::RelativeKeyWithoutCache(key.to_string()));
        }
        if self.max_age.is_some() && self.refresh.is_some() {
            return Err(ConfigError::MaxAgeAndRefresh);
        }
        if self.return_key.is_some() && self.return_filepaths.is_some() {
            return Err(ConfigError::ReturnKeyAliases);
        }
        Ok(())
    }
}

impl fmt::Debug for GrazeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrazeOptions")
            .field("cache", &self.cache)
            .field("rootdir", &self.rootdir)
            .field("cache_key", &self.cache_key)
            .field("refresh", &self.refresh)
            .field("max_age", &self.max_age)
            .field("key_ingress", &self.key_ingress.as_ref().map(|_| ".."))
            .field("return_key", &self.return_key)
            .field("return_filepaths", &self.return_filepaths)
            .field("dir_policy", &self.dir_policy)
            .finish()
    }
}

/// Get the content of `url`, from the cache if present, else from `source`
/// (storing it for next time).
///
/// All option conflicts are reported before any file is touched or any request
/// is made. URLs registered in the `_exceptions.json` of a folder cache are
/// served from their local file and never fetched.
pub fn graze<S: Source + ?Sized>(url: &str, source: &S, opts: GrazeOptions) -> Result<Grazed> {
    let url = normalize_url(url);
    let key = opts.cache_key.key_for(url);
    opts.validate(&key)?;

    let GrazeOptions {
        cache,
        rootdir,
        refresh,
        max_age,
        key_ingress,
        return_key,
        return_filepaths,
        dir_policy,
        ..
    } = opts;

    let mut cache = match (cache, rootdir) {
        (Some(cache), _) => cache,
        (None, Some(rootdir)) => {
            let rootdir = expand_home(rootdir);
            dir_policy.ensure(&rootdir)?;
            Cache::Folder(rootdir)
        }
        (None, None) if is_absolute_key(&key) => Cache::Direct,
        (None, None) => {
            let rootdir = default_cache_dir();
            dir_policy.ensure(&rootdir)?;
            Cache::Folder(rootdir)
        }
    };
    let return_key = return_key.or(return_filepaths).unwrap_or(false);

    let exceptions = Exceptions::new(discover_exceptions(&cache)?);
    if let Some(path) = exceptions.path_of(url) {
        tracing::debug!(url, path = %path.display(), "serving exception");
        return Ok(if return_key {
            Grazed::Path(path.to_path_buf())
        } else {
            Grazed::Content(fs::read(path)?)
        });
    }

    let refresh = match max_age {
        Some(max_age) => Refresh::MaxAge(max_age),
        None => refresh.unwrap_or_default(),
    };
    let lookup = Lookup {
        url,
        key: &key,
        refresh: &refresh,
        key_ingress: key_ingress.as_deref(),
        return_key,
    };
    resolve(&lookup, &mut cache, source)
}

/// A fully configured lookup, ready to run against a cache.
#[derive(Clone, Copy)]
pub struct Lookup<'a> {
    /// Normalized URL.
    pub url: &'a str,
    pub key: &'a str,
    pub refresh: &'a Refresh,
    pub key_ingress: Option<&'a dyn Fn(&str) -> String>,
    pub return_key: bool,
}

/// Run `lookup` against `cache`, fetching from `source` on a miss or when the
/// refresh policy says so.
///
/// A hit whose read comes back empty-handed is treated as a miss.
pub fn resolve<S: Source + ?Sized>(
    lookup: &Lookup<'_>,
    cache: &mut Cache,
    source: &S,
) -> Result<Grazed> {
    let Lookup { url, key, .. } = *lookup;

    if !lookup.refresh.is_due(cache, key, url)? && cache.contains(key) {
        if lookup.return_key {
            tracing::debug!(url, key, "cache hit");
            return Ok(location(cache, key));
        }
        if let Some(content) = cache.get(key)? {
            tracing::debug!(url, key, "cache hit");
            return Ok(Grazed::Content(content));
        }
        tracing::debug!(url, key, "cache reported a hit but read nothing, refetching");
    }

    let content = fill(cache, key, url, source, lookup.key_ingress)?;
    if lookup.return_key {
        Ok(location(cache, key))
    } else {
        Ok(Grazed::Content(content))
    }
}

/// Fetch `url` and store it under `key`. Nothing is written if the fetch fails.
pub(crate) fn fill<S: Source + ?Sized>(
    cache: &mut Cache,
    key: &str,
    url: &str,
    source: &S,
    key_ingress: Option<&dyn Fn(&str) -> String>,
) -> Result<Vec<u8>> {
    let fetch_url = match key_ingress {
        Some(ingress) => ingress(url),
        None => url.to_string(),
    };
    tracing::info!(url = %fetch_url, key, "fetching");
    let content = source.fetch(&fetch_url)?;
    cache.set(key, &content)?;
    Ok(content)
}

fn location(cache: &Cache, key: &str) -> Grazed {
    match cache.local_path(key) {
        Some(path) => Grazed::Path(path),
        None => Grazed::Key(key.to_string()),
    }
}

/// Key ingress that announces the download and leaves the URL unchanged.
pub fn print_downloading_message(url: &str) -> String {
    tracing::info!(url, "the contents of this url are not cached yet, downloading");
    url.to_string()
}

/// Local file holding the content of `url` under `rootdir`, downloading it first
/// if needed.
pub fn url_to_filepath<S: Source + ?Sized>(
    url: &str,
    rootdir: impl Into<PathBuf>,
    source: &S,
) -> Result<PathBuf> {
    let opts = GrazeOptions::new().rootdir(rootdir).return_key(true);
    match graze(url, source, opts)? {
        Grazed::Path(path) => Ok(path),
        Grazed::Key(key) => Err(GrazeError::NotFound(key)),
        Grazed::Content(_) => Err(GrazeError::NotFound(url.to_string())),
    }
}
