//! URL-keyed, file-backed content cache.
//!
//! Give `graze` a URL and it returns the URL's content, fetching it from a
//! [`Source`] only the first time and reading the local copy afterwards.
//!
//! ```text
//! http://example.com/a/b/file.txt  ->  ~/graze/http/example.com_f/a_f/b_f/file.txt
//! ```
//!
//! # Module Organization
//!
//! - [`codec`]: URL ↔ cache key mapping and the key layout generations
//! - [`backend`]: the [`Cache`] shapes (folder, mapping, direct path)
//! - [`source`]: the [`Source`] contract, special-URL routes, the HTTP source
//! - [`resolve`]: the [`graze`] function
//! - [`facade`]: [`Graze`] and [`GrazeWithDataRefresh`]
//! - [`exceptions`], [`migration`], [`download`]: helpers around a cache folder
//!
//! # Features
//!
//! - `http` - Blocking HTTP source ([`HttpSource`], [`internet`])
//!
//! # Example
//!
//! ```
//! use graze::{Cache, GrazeOptions, MemoryStore, graze};
//! use graze::source::FetchError;
//!
//! let source = |url: &str| -> Result<Vec<u8>, FetchError> { Ok(url.as_bytes().to_vec()) };
//! let opts = GrazeOptions::new().cache(Cache::mapping(MemoryStore::new()));
//! let got = graze("https://example.com/data.csv", &source, opts).unwrap();
//! assert_eq!(got.content().unwrap(), b"https://example.com/data.csv");
//! ```

pub mod backend;
pub mod codec;
pub mod download;
pub mod error;
pub mod exceptions;
pub mod facade;
pub mod migration;
pub mod paths;
pub mod refresh;
pub mod resolve;
pub mod source;

pub use backend::{Cache, MemoryStore, Store};
pub use codec::{KeyLayout, key_to_url, normalize_url, url_to_key};
pub use download::{Download, DownloadOptions, url_to_file_download};
pub use error::{ConfigError, GrazeError, Result};
pub use exceptions::{
    EXCEPTIONS_FILENAME, Exceptions, ExceptionsConfig, add_exception, list_exceptions,
};
pub use facade::{Graze, GrazeBuilder, GrazeWithDataRefresh, OnError};
pub use migration::{MigrationReport, detect_layout, migrate_folder, migrate_key};
pub use paths::{GRAZE_DIR_ENV, MissingDirPolicy, default_cache_dir};
pub use refresh::{A_WEEK, Refresh, parse_duration};
pub use resolve::{
    CacheKeySpec, Grazed, GrazeOptions, graze, print_downloading_message, url_to_filepath,
};
#[cfg(feature = "http")]
pub use source::{HttpSource, internet};
pub use source::{FetchError, Routed, Source};
