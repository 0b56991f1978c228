//! Error types.

use std::io;
use std::path::PathBuf;

use crate::codec::KeyLayout;
use crate::source::FetchError;

/// Errors that can occur while resolving, storing or migrating cache entries.
#[derive(Debug, thiserror::Error)]
pub enum GrazeError {
    /// Mutually exclusive or ambiguous options. Raised before any I/O.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The source could not produce content for a URL
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Delete or read against an absent key
    #[error("Not found: {0}")]
    NotFound(String),

    /// A key that the given layout cannot decode
    #[error("Invalid cache key for layout {layout}: {key}")]
    InvalidKey { key: String, layout: KeyLayout },

    /// A key with `.` or `..` segments, which would leave the cache root
    #[error("Cache key escapes the cache root: {0}")]
    UnsafeKey(String),

    /// The cache root does not exist and the directory policy refused to create it
    #[error("Directory does not exist: {}", .0.display())]
    MissingDirectory(PathBuf),

    /// Migration was requested on a folder that already uses the current layout
    #[error("Folder already uses the current key layout: {}", .0.display())]
    AlreadyMigrated(PathBuf),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Tempfile persist error
    #[error("Failed to persist temp file: {0}")]
    TempfilePersist(#[from] tempfile::PersistError),
}

/// Option combinations that cannot be resolved unambiguously.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("`cache` and `rootdir` are mutually exclusive; specify only one")]
    CacheAndRootdir,

    #[error("cache key `{0}` is an absolute path, which cannot be combined with a cache")]
    AbsoluteKeyWithCache(String),

    #[error("cache key `{0}` is not a file path; without a cache, keys must be absolute or start with `~`")]
    RelativeKeyWithoutCache(String),

    #[error("`max_age` and `refresh` are mutually exclusive; specify only one")]
    MaxAgeAndRefresh,

    #[error("`return_key` and `return_filepaths` are aliases; specify only one")]
    ReturnKeyAliases,

    #[error("a direct-path cache has no key space of its own and cannot back a Graze store")]
    DirectCacheStore,
}

pub type Result<T, E = GrazeError> = std::result::Result<T, E>;
