//! Filesystem locations: the default cache root, home expansion and the
//! missing-directory policy.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{GrazeError, Result};

/// Environment variable overriding the default cache root.
pub const GRAZE_DIR_ENV: &str = "GRAZE_DIR";

/// Get the default cache directory.
///
/// `$GRAZE_DIR` if set, otherwise `~/graze`.
pub fn default_cache_dir() -> PathBuf {
    std::env::var_os(GRAZE_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            directories::BaseDirs::new()
                .map(|dirs| dirs.home_dir().to_path_buf())
                .unwrap_or_else(|| PathBuf::from("."))
                .join("graze")
        })
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match directories::BaseDirs::new() {
        Some(dirs) => dirs.home_dir().join(rest),
        None => path.to_path_buf(),
    }
}

/// Whether a cache key names a file on its own (absolute or home-relative).
pub fn is_absolute_key(key: &str) -> bool {
    key == "~" || key.starts_with("~/") || Path::new(key).is_absolute()
}

/// What to do when a cache root does not exist yet.
#[derive(Default)]
pub enum MissingDirPolicy {
    /// Create the directory (and its parents).
    #[default]
    AutoCreate,
    /// Fail with [`GrazeError::MissingDirectory`].
    Fail,
    /// Ask a callback; create the directory if it returns `true`.
    Ask(Box<dyn Fn(&Path) -> bool>),
}

impl fmt::Debug for MissingDirPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingDirPolicy::AutoCreate => f.write_str("AutoCreate"),
            MissingDirPolicy::Fail => f.write_str("Fail"),
            MissingDirPolicy::Ask(_) => f.write_str("Ask(..)"),
        }
    }
}

impl MissingDirPolicy {
    /// Make sure `dir` exists according to this policy.
    pub fn ensure(&self, dir: &Path) -> Result<()> {
        if dir.is_dir() {
            return Ok(());
        }
        let create = match self {
            MissingDirPolicy::AutoCreate => true,
            MissingDirPolicy::Fail => false,
            MissingDirPolicy::Ask(confirm) => confirm(dir),
        };
        if !create {
            return Err(GrazeError::MissingDirectory(dir.to_path_buf()));
        }
        tracing::info!(dir = %dir.display(), "creating cache directory");
        fs::create_dir_all(dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_absolute_key() {
        assert!(is_absolute_key("~/data/file.bin"));
        assert!(is_absolute_key("~"));
        #[cfg(unix)]
        assert!(is_absolute_key("/tmp/file.bin"));
        assert!(!is_absolute_key("https/example.com_f/a"));
        assert!(!is_absolute_key("~other/file"));
    }

    #[test]
    fn test_expand_home_leaves_other_paths() {
        assert_eq!(expand_home("relative/path"), PathBuf::from("relative/path"));
        let expanded = expand_home("~/graze");
        assert!(expanded.ends_with("graze"));
        if directories::BaseDirs::new().is_some() {
            assert!(!expanded.starts_with("~"));
        }
    }

    #[test]
    fn test_policy_auto_create() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested").join("root");
        MissingDirPolicy::AutoCreate.ensure(&dir).unwrap();
        assert!(dir.is_dir());
    }

    #[test]
    fn test_policy_fail_and_ask() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("root");

        let err = MissingDirPolicy::Fail.ensure(&dir).unwrap_err();
        assert!(matches!(err, GrazeError::MissingDirectory(p) if p == dir));

        let refuse = MissingDirPolicy::Ask(Box::new(|_| false));
        assert!(refuse.ensure(&dir).is_err());
        assert!(!dir.exists());

        let accept = MissingDirPolicy::Ask(Box::new(|_| true));
        accept.ensure(&dir).unwrap();
        assert!(dir.is_dir());

        // Existing directories never consult the policy
        MissingDirPolicy::Fail.ensure(&dir).unwrap();
    }
}
