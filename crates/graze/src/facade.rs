//! Stateful, mapping-like access to a cache.
//!
//! [`Graze`] binds a cache, a source and an exceptions registry together and
//! exposes the cache as a URL-keyed map: `get` fetches on a miss, `urls` lists the
//! URLs currently stored. [`GrazeWithDataRefresh`] adds a time-to-live with a
//! policy for refreshes that fail.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backend::Cache;
use crate::codec::{key_to_url, normalize_url, url_to_key};
use crate::error::{ConfigError, GrazeError, Result};
use crate::exceptions::{Exceptions, ExceptionsConfig};
use crate::paths::{MissingDirPolicy, default_cache_dir, expand_home};
use crate::refresh::{A_WEEK, Refresh};
use crate::resolve::{Grazed, KeyIngress, fill};
use crate::source::Source;

/// A URL-keyed view over a folder or mapping cache.
pub struct Graze {
    cache: Cache,
    source: Box<dyn Source>,
    exceptions: Exceptions,
    key_ingress: Option<KeyIngress>,
    return_filepaths: bool,
}

/// Configuration for [`Graze`].
pub struct GrazeBuilder {
    source: Box<dyn Source>,
    cache: Option<Cache>,
    rootdir: Option<PathBuf>,
    exceptions: ExceptionsConfig,
    key_ingress: Option<KeyIngress>,
    return_filepaths: bool,
    dir_policy: MissingDirPolicy,
}

impl GrazeBuilder {
    pub fn cache(mut self, cache: Cache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Use a folder cache rooted at `rootdir`.
    pub fn rootdir(mut self, rootdir: impl Into<PathBuf>) -> Self {
        self.rootdir = Some(rootdir.into());
        self
    }

    pub fn exceptions(mut self, exceptions: ExceptionsConfig) -> Self {
        self.exceptions = exceptions;
        self
    }

    pub fn key_ingress(mut self, f: impl Fn(&str) -> String + 'static) -> Self {
        self.key_ingress = Some(Box::new(f));
        self
    }

    /// Make `get` return where the content is stored instead of the content.
    pub fn return_filepaths(mut self, return_filepaths: bool) -> Self {
        self.return_filepaths = return_filepaths;
        self
    }

    pub fn dir_policy(mut self, policy: MissingDirPolicy) -> Self {
        self.dir_policy = policy;
        self
    }

    pub fn build(self) -> Result<Graze> {
        let cache = match (self.cache, self.rootdir) {
            (Some(_), Some(_)) => return Err(ConfigError::CacheAndRootdir.into()),
            (Some(Cache::Direct), None) => return Err(ConfigError::DirectCacheStore.into()),
            (Some(cache), None) => cache,
            (None, rootdir) => {
                let rootdir = rootdir.map(expand_home).unwrap_or_else(default_cache_dir);
                self.dir_policy.ensure(&rootdir)?;
                Cache::Folder(rootdir)
            }
        };
        let exceptions = self.exceptions.load(&cache)?;
        Ok(Graze {
            cache,
            source: self.source,
            exceptions,
            key_ingress: self.key_ingress,
            return_filepaths: self.return_filepaths,
        })
    }
}

impl fmt::Debug for Graze {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graze")
            .field("cache", &self.cache)
            .field("exceptions", &self.exceptions)
            .field("return_filepaths", &self.return_filepaths)
            .finish_non_exhaustive()
    }
}

impl Graze {
    pub fn builder(source: impl Source + 'static) -> GrazeBuilder {
        GrazeBuilder {
            source: Box::new(source),
            cache: None,
            rootdir: None,
            exceptions: ExceptionsConfig::default(),
            key_ingress: None,
            return_filepaths: false,
            dir_policy: MissingDirPolicy::default(),
        }
    }

    /// A folder cache at the default location.
    pub fn new(source: impl Source + 'static) -> Result<Self> {
        Self::builder(source).build()
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn exceptions(&self) -> &Exceptions {
        &self.exceptions
    }

    pub fn rootdir(&self) -> Option<&Path> {
        self.cache.rootdir()
    }

    pub fn return_filepaths(&self) -> bool {
        self.return_filepaths
    }

    pub fn set_return_filepaths(&mut self, return_filepaths: bool) {
        self.return_filepaths = return_filepaths;
    }

    /// Content of `url` (or its location, see [`GrazeBuilder::return_filepaths`]).
    ///
    /// Registered exceptions are served first. On a miss the content is fetched,
    /// stored, and read back through the cache; the fetched bytes are returned
    /// when the cache cannot hand them back.
    pub fn get(&mut self, url: &str) -> Result<Grazed> {
        if let Some(path) = self.exceptions.path_of(url) {
            tracing::debug!(url, path = %path.display(), "serving exceptional url");
            return Ok(if self.return_filepaths {
                Grazed::Path(path.to_path_buf())
            } else {
                Grazed::Content(fs::read(path)?)
            });
        }
        let url = normalize_url(url);
        let key = url_to_key(url);
        if let Some(found) = self.read(&key)? {
            return Ok(found);
        }
        let content = self.missing(url, &key)?;
        Ok(self.read(&key)?.unwrap_or(Grazed::Content(content)))
    }

    /// The bytes of `url`, whatever `return_filepaths` says.
    pub fn content(&mut self, url: &str) -> Result<Vec<u8>> {
        if let Some(content) = self.exceptions.read(url) {
            return content;
        }
        let url = normalize_url(url);
        let key = url_to_key(url);
        if let Some(content) = self.cache.get(&key)? {
            return Ok(content);
        }
        self.missing(url, &key)
    }

    /// Store `content` for `url`, replacing what was there.
    pub fn set(&mut self, url: &str, content: &[u8]) -> Result<()> {
        self.cache.set(&url_to_key(normalize_url(url)), content)
    }

    /// Remove `url` from the cache. Fails with [`GrazeError::NotFound`] when absent.
    pub fn delete(&mut self, url: &str) -> Result<()> {
        let url = normalize_url(url);
        self.cache
            .delete(&url_to_key(url))
            .map_err(|e| match e {
                GrazeError::NotFound(_) => GrazeError::NotFound(url.to_string()),
                e => e,
            })
    }

    /// Whether the cache holds `url`. Exceptions are not cache entries.
    pub fn contains(&self, url: &str) -> bool {
        self.cache.contains(&url_to_key(normalize_url(url)))
    }

    /// URLs currently stored, decoded from the cache's keys.
    ///
    /// Reads the cache lazily; each call starts a fresh pass.
    pub fn urls(&self) -> impl Iterator<Item = Result<String>> + '_ {
        self.cache
            .keys()
            .map(|key| key.and_then(|key| key_to_url(&key)))
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// File that holds (or would hold) `url`. `None` for mapping caches.
    pub fn filepath_of(&self, url: &str) -> Option<PathBuf> {
        if let Some(path) = self.exceptions.path_of(url) {
            return Some(path.to_path_buf());
        }
        self.cache.local_path(&url_to_key(normalize_url(url)))
    }

    /// Like [`Graze::filepath_of`], downloading the content first if it is not
    /// stored yet.
    pub fn filepath_of_url_downloading_if_necessary(&mut self, url: &str) -> Result<Option<PathBuf>> {
        if !self.exceptions.contains(url) && !self.contains(url) {
            let url = normalize_url(url);
            self.missing(url, &url_to_key(url))?;
        }
        Ok(self.filepath_of(url))
    }

    fn read(&self, key: &str) -> Result<Option<Grazed>> {
        if !self.cache.contains(key) {
            return Ok(None);
        }
        if self.return_filepaths {
            return Ok(Some(match self.cache.local_path(key) {
                Some(path) => Grazed::Path(path),
                None => Grazed::Key(key.to_string()),
            }));
        }
        Ok(self.cache.get(key)?.map(Grazed::Content))
    }

    fn missing(&mut self, url: &str, key: &str) -> Result<Vec<u8>> {
        fill(
            &mut self.cache,
            key,
            url,
            self.source.as_ref(),
            self.key_ingress.as_deref(),
        )
    }
}

/// What [`GrazeWithDataRefresh`] does when refreshing a stale entry fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OnError {
    /// Return the error; the stale entry stays as it is.
    Raise,
    /// Log a `StaleDataWarning` and return the stale content.
    #[default]
    Warn,
    /// Return the stale content silently.
    Ignore,
}

impl std::str::FromStr for OnError {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "raise" => Ok(OnError::Raise),
            "warn" => Ok(OnError::Warn),
            "ignore" => Ok(OnError::Ignore),
            other => Err(format!(
                "unknown error policy `{other}` (expected raise, warn or ignore)"
            )),
        }
    }
}

/// A [`Graze`] whose entries expire after `time_to_live`.
///
/// Expired entries are refetched on access. A failed refetch never loses the
/// cached content.
#[derive(Debug)]
pub struct GrazeWithDataRefresh {
    inner: Graze,
    time_to_live: Duration,
    on_error: OnError,
}

impl GrazeWithDataRefresh {
    pub fn new(inner: Graze, time_to_live: Duration, on_error: OnError) -> Self {
        Self {
            inner,
            time_to_live,
            on_error,
        }
    }

    /// One week, warn on failure.
    pub fn with_defaults(inner: Graze) -> Self {
        Self::new(inner, A_WEEK, OnError::default())
    }

    pub fn time_to_live(&self) -> Duration {
        self.time_to_live
    }

    pub fn on_error(&self) -> OnError {
        self.on_error
    }

    pub fn inner(&self) -> &Graze {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut Graze {
        &mut self.inner
    }

    pub fn into_inner(self) -> Graze {
        self.inner
    }

    pub fn get(&mut self, url: &str) -> Result<Grazed> {
        self.refresh_if_stale(url)?;
        self.inner.get(url)
    }

    pub fn content(&mut self, url: &str) -> Result<Vec<u8>> {
        self.refresh_if_stale(url)?;
        self.inner.content(url)
    }

    pub fn set(&mut self, url: &str, content: &[u8]) -> Result<()> {
        self.inner.set(url, content)
    }

    pub fn delete(&mut self, url: &str) -> Result<()> {
        self.inner.delete(url)
    }

    pub fn contains(&self, url: &str) -> bool {
        self.inner.contains(url)
    }

    pub fn urls(&self) -> impl Iterator<Item = Result<String>> + '_ {
        self.inner.urls()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn refresh_if_stale(&mut self, url: &str) -> Result<()> {
        if self.inner.exceptions.contains(url) {
            return Ok(());
        }
        let url = normalize_url(url);
        let key = url_to_key(url);
        let expired = Refresh::MaxAge(self.time_to_live);
        if !self.inner.cache.contains(&key) || !expired.is_due(&self.inner.cache, &key, url)? {
            return Ok(());
        }

        tracing::debug!(url, key = %key, ttl = ?self.time_to_live, "entry expired, refreshing");
        match self.inner.missing(url, &key) {
            Ok(_) => Ok(()),
            Err(e) => match self.on_error {
                OnError::Raise => Err(e),
                OnError::Warn => {
                    tracing::warn!(
                        url,
                        error = %e,
                        "StaleDataWarning: refresh failed, returning stale data"
                    );
                    Ok(())
                }
                OnError::Ignore => Ok(()),
            },
        }
    }
}
