//! HTTP source.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::{Client, Response};

use super::{FetchError, Routed, Source};
use crate::error::{GrazeError, Result};

/// User agent sent with every request. Some hosts refuse unknown agents.
pub const DEFAULT_USER_AGENT: &str = "Wget/1.16 (linux-gnu)";

/// Blocking HTTP GET source.
///
/// - Connect timeout: 10 seconds
/// - Request timeout: 30 seconds (configurable)
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
}

impl HttpSource {
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .map_err(|e| FetchError::Transport {
                url: String::new(),
                source: Box::new(e),
            })?;
        Ok(Self { client })
    }

    /// Use a preconfigured client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn get(&self, url: &str) -> Result<Response, FetchError> {
        let transport = |e: reqwest::Error| FetchError::Transport {
            url: url.to_string(),
            source: Box::new(e),
        };
        tracing::info!(url, "downloading");
        let response = self.client.get(url).send().map_err(transport)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.bytes().map_err(transport)?;
        Err(FetchError::status(url, status.as_u16(), &body))
    }
}

impl Source for HttpSource {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.get(url)?;
        let content = response.bytes().map_err(|e| FetchError::Transport {
            url: url.to_string(),
            source: Box::new(e),
        })?;
        Ok(content.to_vec())
    }

    /// Stream the response into a temp file next to `path`, persisting it only once
    /// the whole body has been received.
    fn fetch_to_file(&self, url: &str, path: &Path) -> Result<PathBuf> {
        let mut response = self.get(url)?;
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;
        let mut temp = tempfile::NamedTempFile::new_in(dir)?;
        response
            .copy_to(&mut temp)
            .map_err(|e| GrazeError::from(FetchError::Transport {
                url: url.to_string(),
                source: Box::new(e),
            }))?;
        temp.persist(path)?;
        Ok(path.to_path_buf())
    }
}

/// HTTP source with the default special-URL routes.
pub fn internet() -> Result<Routed<HttpSource>> {
    Ok(Routed::with_default_routes(HttpSource::new()?))
}
