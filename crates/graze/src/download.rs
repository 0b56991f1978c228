//! Downloading a URL to an explicit file, outside any cache.

use std::fs;
use std::path::{Path, PathBuf};

use crate::codec::normalize_url;
use crate::error::{GrazeError, Result};
use crate::paths::expand_home;
use crate::source::Source;

/// Options for [`url_to_file_download`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadOptions {
    /// Download even if the file already exists.
    pub overwrite: bool,
    /// Create missing parent directories.
    pub ensure_dirs: bool,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            overwrite: true,
            ensure_dirs: true,
        }
    }
}

/// A downloaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub url: String,
    pub path: PathBuf,
    pub content: Vec<u8>,
}

/// Download `url` into `path`.
///
/// With `overwrite` off an existing file is returned as is, without a request.
/// With `ensure_dirs` off a missing parent directory is an error.
pub fn url_to_file_download<S: Source + ?Sized>(
    url: &str,
    path: impl AsRef<Path>,
    source: &S,
    opts: DownloadOptions,
) -> Result<Download> {
    let url = normalize_url(url);
    let path = expand_home(path);

    if !opts.overwrite && path.is_file() {
        tracing::debug!(url, path = %path.display(), "file exists, not downloading");
        let content = fs::read(&path)?;
        return Ok(Download {
            url: url.to_string(),
            path,
            content,
        });
    }

    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty())
        && !dir.is_dir()
    {
        if !opts.ensure_dirs {
            return Err(GrazeError::MissingDirectory(dir.to_path_buf()));
        }
        fs::create_dir_all(dir)?;
    }

    let path = source.fetch_to_file(url, &path)?;
    let content = fs::read(&path)?;
    tracing::info!(url, path = %path.display(), bytes = content.len(), "downloaded");
    Ok(Download {
        url: url.to_string(),
        path,
        content,
    })
}
