//! URL ↔ cache key mapping.
//!
//! A cache key is a relative, `/`-separated path derived from a URL. The current
//! layout ([`KeyLayout::V3`]) turns the scheme separator into a folder and appends
//! [`INTERIOR_SUFFIX`] to every interior segment, so a URL that is a prefix of
//! another URL never has to be both a file and a folder:
//!
//! ```text
//! http://example.com/a/b/file.txt  ->  http/example.com_f/a_f/b_f/file.txt
//! http://example.com/a             ->  http/example.com_f/a
//! ```
//!
//! Two older layouts exist on disk and are only read by the [`crate::migration`]
//! utility, never by the resolver.

use std::fmt;

use crate::error::{GrazeError, Result};

/// Marker appended to interior path segments in the current layout.
pub const INTERIOR_SUFFIX: &str = "_f";

/// Leaf file name used by [`KeyLayout::V2`].
pub const LEGACY_CONTENT_FILENAME: &str = "grazed";

const SEPARATOR: char = '/';

const SCHEMES: [(&str, &str); 2] = [("https://", "https/"), ("http://", "http/")];

/// Generations of the URL → key mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyLayout {
    /// The URL with its scheme separator folded into a folder, nothing else.
    V1,
    /// Like `V1`, with the content stored in a `grazed` file inside the URL folder.
    V2,
    /// Interior segments carry the `_f` suffix.
    V3,
}

impl KeyLayout {
    /// Layout used by the live resolver.
    pub const CURRENT: KeyLayout = KeyLayout::V3;

    /// Compute the key for `url` in this layout.
    pub fn encode(self, url: &str) -> String {
        let url = normalize_url(url);
        match self {
            KeyLayout::V1 => fold_scheme(url),
            KeyLayout::V2 => format!("{}{SEPARATOR}{LEGACY_CONTENT_FILENAME}", fold_scheme(url)),
            KeyLayout::V3 => {
                let folded = fold_scheme(url);
                let segments: Vec<&str> = folded.split(SEPARATOR).filter(|s| !s.is_empty()).collect();
                let last = segments.len().saturating_sub(1);
                segments
                    .iter()
                    .enumerate()
                    .map(|(i, segment)| {
                        if i == 0 || i == last {
                            (*segment).to_string()
                        } else {
                            format!("{segment}{INTERIOR_SUFFIX}")
                        }
                    })
                    .collect::<Vec<_>>()
                    .join("/")
            }
        }
    }

    /// Recover the URL a key was computed from.
    pub fn decode(self, key: &str) -> Result<String> {
        let invalid = || GrazeError::InvalidKey {
            key: key.to_string(),
            layout: self,
        };
        match self {
            KeyLayout::V1 => Ok(unfold_scheme(key)),
            KeyLayout::V2 => {
                let folder = key
                    .strip_suffix(LEGACY_CONTENT_FILENAME)
                    .and_then(|rest| rest.strip_suffix(SEPARATOR))
                    .ok_or_else(invalid)?;
                Ok(unfold_scheme(folder))
            }
            KeyLayout::V3 => {
                let segments: Vec<&str> = key.split(SEPARATOR).collect();
                let last = segments.len().saturating_sub(1);
                let mut parts = Vec::with_capacity(segments.len());
                for (i, segment) in segments.iter().enumerate() {
                    if i == 0 || i == last {
                        parts.push(*segment);
                    } else {
                        parts.push(segment.strip_suffix(INTERIOR_SUFFIX).ok_or_else(invalid)?);
                    }
                }
                Ok(unfold_scheme(&parts.join("/")))
            }
        }
    }

    /// Whether `key` is well formed for this layout.
    pub fn accepts(self, key: &str) -> bool {
        self.decode(key).is_ok()
    }
}

impl fmt::Display for KeyLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeyLayout::V1 => "v1",
            KeyLayout::V2 => "v2",
            KeyLayout::V3 => "v3",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for KeyLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "v1" => Ok(KeyLayout::V1),
            "2" | "v2" => Ok(KeyLayout::V2),
            "3" | "v3" => Ok(KeyLayout::V3),
            other => Err(format!("unknown key layout `{other}` (expected v1, v2 or v3)")),
        }
    }
}

/// Trim trailing whitespace and a single trailing slash.
///
/// A trailing slash would otherwise produce a directory-shaped cache entry.
pub fn normalize_url(url: &str) -> &str {
    let url = url.trim_end();
    url.strip_suffix(SEPARATOR).unwrap_or(url)
}

/// Key of `url` in the current layout.
pub fn url_to_key(url: &str) -> String {
    KeyLayout::CURRENT.encode(url)
}

/// URL of a current-layout key.
pub fn key_to_url(key: &str) -> Result<String> {
    KeyLayout::CURRENT.decode(key)
}

fn fold_scheme(url: &str) -> String {
    for (scheme, folder) in SCHEMES {
        if let Some(rest) = url.strip_prefix(scheme) {
            return format!("{folder}{rest}");
        }
    }
    url.to_string()
}

fn unfold_scheme(key: &str) -> String {
    for (scheme, folder) in SCHEMES {
        if let Some(rest) = key.strip_prefix(folder) {
            return format!("{scheme}{rest}");
        }
    }
    key.to_string()
}
