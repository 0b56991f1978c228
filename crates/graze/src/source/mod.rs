//! Where content comes from on a cache miss.
//!
//! A [`Source`] is an opaque `url → bytes` capability. Any
//! `Fn(&str) -> Result<Vec<u8>, FetchError>` closure is a source, which keeps tests
//! and alternative origins free of network access. The default HTTP source is built
//! with the `http` feature; [`Routed`] puts a registry of special-URL handlers in
//! front of any source.

#[cfg(feature = "http")]
mod http;
mod routes;

#[cfg(feature = "http")]
pub use http::{HttpSource, internet};
pub use routes::{
    Route, Routed, dropbox_download_url, google_drive_download_url, is_dropbox_url,
    is_google_drive_url, url_with_confirmation_token,
};

use std::path::{Path, PathBuf};

use crate::backend::write_file;
use crate::error::Result;

/// Maximum number of characters of a response body kept in a [`FetchError`].
pub const PREVIEW_LEN: usize = 200;

/// Failure to obtain content for a URL.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The remote answered with a non-success status
    #[error("Fetching {url} failed with status {status}: {preview}")]
    Status {
        url: String,
        status: u16,
        preview: String,
    },

    /// The request could not be completed
    #[error("Fetching {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The remote answered, but not with usable content
    #[error("Fetching {url} failed: {reason}")]
    Rejected { url: String, reason: String },
}

impl FetchError {
    /// Build a [`FetchError::Status`], keeping a truncated preview of the body.
    pub fn status(url: impl Into<String>, status: u16, body: &[u8]) -> Self {
        FetchError::Status {
            url: url.into(),
            status,
            preview: preview(body),
        }
    }

    pub fn rejected(url: impl Into<String>, reason: impl Into<String>) -> Self {
        FetchError::Rejected {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// The URL the failed fetch was for.
    pub fn url(&self) -> &str {
        match self {
            FetchError::Status { url, .. }
            | FetchError::Transport { url, .. }
            | FetchError::Rejected { url, .. } => url,
        }
    }
}

/// Lossy, truncated rendering of a response body for diagnostics.
pub fn preview(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let mut chars = text.chars();
    let mut out: String = chars.by_ref().take(PREVIEW_LEN).collect();
    if chars.next().is_some() {
        out.push('…');
    }
    out
}

/// Origin of truth consulted when the cache misses.
pub trait Source {
    /// Fetch the full content of `url`.
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;

    /// Fetch `url` straight into `path`, returning the path written.
    ///
    /// The default buffers the content and writes it atomically once complete.
    fn fetch_to_file(&self, url: &str, path: &Path) -> Result<PathBuf> {
        let content = self.fetch(url)?;
        write_file(path, &content)?;
        Ok(path.to_path_buf())
    }
}

impl<F> Source for F
where
    F: Fn(&str) -> Result<Vec<u8>, FetchError>,
{
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_truncates() {
        let body = "x".repeat(PREVIEW_LEN + 50);
        let p = preview(body.as_bytes());
        assert_eq!(p.chars().count(), PREVIEW_LEN + 1);
        assert!(p.ends_with('…'));
        assert_eq!(preview(b"short"), "short");
    }

    #[test]
    fn test_status_error_message() {
        let err = FetchError::status("https://example.com/x", 404, b"Not Found");
        assert_eq!(err.url(), "https://example.com/x");
        assert_eq!(
            err.to_string(),
            "Fetching https://example.com/x failed with status 404: Not Found"
        );
    }

    #[test]
    fn test_closure_source_and_fetch_to_file() {
        let source = |url: &str| -> Result<Vec<u8>, FetchError> { Ok(url.as_bytes().to_vec()) };
        assert_eq!(source.fetch("abc").unwrap(), b"abc");

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sub").join("out.txt");
        let written = source.fetch_to_file("payload", &path).unwrap();
        assert_eq!(written, path);
        assert_eq!(std::fs::read(&path).unwrap(), b"payload");
    }

    #[test]
    fn test_failed_fetch_to_file_writes_nothing() {
        let source =
            |url: &str| -> Result<Vec<u8>, FetchError> { Err(FetchError::status(url, 500, b"")) };
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out.txt");
        assert!(source.fetch_to_file("u", &path).is_err());
        assert!(!path.exists());
    }
}
