//! Special-URL routes.
//!
//! Some content hosts hand out share links that do not point at the content
//! itself. A [`Routed`] source checks an ordered list of [`Route`]s before falling
//! back to its inner source; the first route whose predicate matches handles the URL
//! exclusively.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use super::{FetchError, Source};
use crate::backend::write_file;
use crate::codec::normalize_url;
use crate::error::Result;

static DROPBOX_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://www\.dropbox\.com/s/.+\?dl=(0|1)$").expect("valid dropbox pattern")
});

static GOOGLE_DRIVE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://drive\.google\.com/(file/d/|open\?id=|drive/folders/)[\w-]+")
        .expect("valid google drive pattern")
});

static GOOGLE_DRIVE_FILE_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"drive\.google\.com/file/d/([\w-]+)|drive\.google\.com/uc\?export=download&id=([\w-]+)",
    )
    .expect("valid google drive id pattern")
});

static CONFIRM_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"confirm=([0-9A-Za-z_\-]+)&").expect("valid confirmation token pattern")
});

const HTML_PREFIX: &[u8] = b"<!DOCTYPE html>";

type Predicate = Box<dyn Fn(&str) -> bool>;
type Handler = Box<dyn Fn(&str, &dyn Source) -> Result<Vec<u8>, FetchError>>;

/// A `(predicate, handler)` pair.
///
/// The handler receives the URL and the plain source it may use for the actual
/// requests.
pub struct Route {
    name: String,
    matches: Predicate,
    handler: Handler,
}

impl Route {
    pub fn new(
        name: impl Into<String>,
        matches: impl Fn(&str) -> bool + 'static,
        handler: impl Fn(&str, &dyn Source) -> Result<Vec<u8>, FetchError> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            matches: Box::new(matches),
            handler: Box::new(handler),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matches(&self, url: &str) -> bool {
        (self.matches)(url)
    }

    /// Dropbox share links, turned into direct downloads.
    pub fn dropbox() -> Self {
        Route::new("dropbox", is_dropbox_url, |url, source| {
            source.fetch(&dropbox_download_url(url))
        })
    }

    /// Google Drive file links, following the virus-scan confirmation page that
    /// large files are served behind.
    pub fn google_drive() -> Self {
        Route::new("google-drive", is_google_drive_url, fetch_from_google_drive)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route").field("name", &self.name).finish()
    }
}

/// A source with special-URL routes in front of it.
#[derive(Debug)]
pub struct Routed<S> {
    inner: S,
    routes: Vec<Route>,
}

impl<S: Source> Routed<S> {
    /// No routes: every URL goes to `inner`.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            routes: Vec::new(),
        }
    }

    /// The Dropbox and Google Drive routes.
    pub fn with_default_routes(inner: S) -> Self {
        Self::new(inner).route(Route::dropbox()).route(Route::google_drive())
    }

    /// Append a route. Earlier routes take precedence.
    pub fn route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    pub fn add_route(&mut self, route: Route) {
        self.routes.push(route);
    }

    /// Whether some route handles `url`.
    pub fn is_special_url(&self, url: &str) -> bool {
        self.route_for(url).is_some()
    }

    pub fn route_for(&self, url: &str) -> Option<&Route> {
        self.routes.iter().find(|route| route.matches(url))
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: Source> Source for Routed<S> {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let url = normalize_url(url);
        match self.route_for(url) {
            Some(route) => {
                tracing::debug!(url, route = route.name(), "using special url route");
                (route.handler)(url, &self.inner)
            }
            None => self.inner.fetch(url),
        }
    }

    fn fetch_to_file(&self, url: &str, path: &Path) -> Result<PathBuf> {
        let url = normalize_url(url);
        if self.is_special_url(url) {
            let content = self.fetch(url)?;
            write_file(path, &content)?;
            return Ok(path.to_path_buf());
        }
        self.inner.fetch_to_file(url, path)
    }
}

pub fn is_dropbox_url(url: &str) -> bool {
    DROPBOX_URL.is_match(url)
}

/// Turn a Dropbox preview link (`dl=0`) into a direct download link (`dl=1`).
pub fn dropbox_download_url(url: &str) -> String {
    match url.strip_suffix("dl=0") {
        Some(prefix) => format!("{prefix}dl=1"),
        None => url.to_string(),
    }
}

pub fn is_google_drive_url(url: &str) -> bool {
    GOOGLE_DRIVE_URL.is_match(url)
}

/// Direct download URL for a Google Drive *file* link.
///
/// Folder links and the `open?id=` form are not supported.
pub fn google_drive_download_url(url: &str) -> Option<String> {
    let captures = GOOGLE_DRIVE_FILE_ID.captures(url)?;
    let id = captures.get(1).or_else(|| captures.get(2))?.as_str();
    Some(format!("https://drive.google.com/uc?export=download&id={id}"))
}

/// Append the confirmation token found in a virus-scan warning page to `url`.
pub fn url_with_confirmation_token(url: &str, page_html: &str) -> Option<String> {
    let token = CONFIRM_TOKEN.captures(page_html)?.get(1)?.as_str();
    Some(format!("{url}&confirm={token}"))
}

fn fetch_from_google_drive(url: &str, source: &dyn Source) -> Result<Vec<u8>, FetchError> {
    let download_url = google_drive_download_url(url).ok_or_else(|| {
        FetchError::rejected(
            url,
            "only Google Drive file urls (drive.google.com/file/d/{file_id}) are supported",
        )
    })?;
    let content = source.fetch(&download_url)?;
    if !content.starts_with(HTML_PREFIX) {
        return Ok(content);
    }
    let page = String::from_utf8_lossy(&content);
    let confirmed = url_with_confirmation_token(&download_url, &page).ok_or_else(|| {
        FetchError::rejected(
            url,
            "got an html page without a virus scan confirmation token",
        )
    })?;
    source.fetch(&confirmed)
}
