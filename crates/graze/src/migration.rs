//! One-shot migration of folder caches written with an older key layout.
//!
//! Migration is never performed implicitly. [`migrate_folder`] moves the cache
//! root aside to `<root>_bak`, rewrites every entry into a fresh root under the
//! current layout, and leaves the backup in place for the user to delete.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::backend::Cache;
use crate::codec::{INTERIOR_SUFFIX, KeyLayout, LEGACY_CONTENT_FILENAME};
use crate::error::{GrazeError, Result};
use crate::exceptions::EXCEPTIONS_FILENAME;
use crate::paths::expand_home;

/// Suffix of the backup folder created next to a migrated root.
pub const BACKUP_SUFFIX: &str = "_bak";

/// Outcome of [`migrate_folder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub from: KeyLayout,
    pub to: KeyLayout,
    pub root: PathBuf,
    /// Original files, untouched.
    pub backup: PathBuf,
    /// Number of entries rewritten.
    pub migrated: usize,
}

/// Guess which layout the entries under `root` were written with.
///
/// A folder whose every entry is a `grazed` file is `V2`; one whose interior
/// segments all carry the suffix is `V3`; anything else is `V1`. An empty folder
/// counts as current.
pub fn detect_layout(root: impl AsRef<Path>) -> Result<KeyLayout> {
    let keys: Vec<String> = Cache::folder(root).keys().collect::<Result<_>>()?;
    if keys.is_empty() {
        return Ok(KeyLayout::CURRENT);
    }
    let is_v2 = keys
        .iter()
        .all(|key| key.rsplit('/').next() == Some(LEGACY_CONTENT_FILENAME));
    if is_v2 {
        return Ok(KeyLayout::V2);
    }
    let is_v3 = keys.iter().all(|key| {
        let segments: Vec<&str> = key.split('/').collect();
        segments.len() < 3
            || segments[1..segments.len() - 1]
                .iter()
                .all(|segment| segment.ends_with(INTERIOR_SUFFIX))
    });
    Ok(if is_v3 { KeyLayout::V3 } else { KeyLayout::V1 })
}

/// Translate a key between layouts.
pub fn migrate_key(key: &str, from: KeyLayout, to: KeyLayout) -> Result<String> {
    Ok(to.encode(&from.decode(key)?))
}

/// Backup location for `root`.
pub fn backup_dir(root: impl AsRef<Path>) -> PathBuf {
    // Going through components drops a trailing separator
    let root: PathBuf = root.as_ref().components().collect();
    let mut name = root.into_os_string();
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

/// Rewrite the folder cache at `root` into the current layout.
///
/// `from` is detected when not given. Every key is translated before anything on
/// disk changes, so a key that does not fit `from` aborts the migration with the
/// folder untouched. `_exceptions.json` is carried over verbatim.
pub fn migrate_folder(root: impl AsRef<Path>, from: Option<KeyLayout>) -> Result<MigrationReport> {
    let root: PathBuf = expand_home(root).components().collect();
    let from = match from {
        Some(from) => from,
        None => detect_layout(&root)?,
    };
    let to = KeyLayout::CURRENT;
    if from == to {
        return Err(GrazeError::AlreadyMigrated(root));
    }
    let backup = backup_dir(&root);
    if backup.exists() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("backup folder already exists: {}", backup.display()),
        )
        .into());
    }

    let renames = Cache::folder(&root)
        .keys()
        .map(|key| {
            let key = key?;
            let new_key = migrate_key(&key, from, to)?;
            Ok((key, new_key))
        })
        .collect::<Result<Vec<_>>>()?;

    tracing::info!(
        root = %root.display(),
        backup = %backup.display(),
        "moving cache folder to backup"
    );
    fs::rename(&root, &backup)?;
    fs::create_dir_all(&root)?;

    let old = Cache::folder(&backup);
    let mut new = Cache::folder(&root);
    for (key, new_key) in &renames {
        let content = old
            .get(key)?
            .ok_or_else(|| GrazeError::NotFound(key.clone()))?;
        new.set(new_key, &content)?;
        tracing::debug!(from = %key, to = %new_key, "migrated entry");
    }

    let exceptions = backup.join(EXCEPTIONS_FILENAME);
    if exceptions.is_file() {
        fs::copy(&exceptions, root.join(EXCEPTIONS_FILENAME))?;
    }

    tracing::info!(
        migrated = renames.len(),
        %from,
        %to,
        "migration done; delete the backup folder once everything works"
    );
    Ok(MigrationReport {
        from,
        to,
        root,
        backup,
        migrated: renames.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, key: &str, content: &[u8]) {
        let path = root.join(key);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_migrate_key() {
        assert_eq!(
            migrate_key("http/example.com/a/b/grazed", KeyLayout::V2, KeyLayout::V3).unwrap(),
            "http/example.com_f/a_f/b"
        );
        assert_eq!(
            migrate_key("https/example.com/a/b", KeyLayout::V1, KeyLayout::V3).unwrap(),
            "https/example.com_f/a_f/b"
        );
        assert!(matches!(
            migrate_key("http/example.com/a", KeyLayout::V2, KeyLayout::V3),
            Err(GrazeError::InvalidKey { layout: KeyLayout::V2, .. })
        ));
    }

    #[test]
    fn test_detect_layout() {
        let v1 = tempfile::tempdir().unwrap();
        write(v1.path(), "http/example.com/a/b", b"x");
        assert_eq!(detect_layout(v1.path()).unwrap(), KeyLayout::V1);

        let v2 = tempfile::tempdir().unwrap();
        write(v2.path(), "http/example.com/a/grazed", b"x");
        write(v2.path(), "https/other.org/grazed", b"y");
        assert_eq!(detect_layout(v2.path()).unwrap(), KeyLayout::V2);

        let v3 = tempfile::tempdir().unwrap();
        write(v3.path(), "http/example.com_f/a_f/b", b"x");
        assert_eq!(detect_layout(v3.path()).unwrap(), KeyLayout::V3);

        let empty = tempfile::tempdir().unwrap();
        assert_eq!(detect_layout(empty.path()).unwrap(), KeyLayout::V3);
    }

    #[test]
    fn test_backup_dir() {
        assert_eq!(backup_dir("/data/graze"), PathBuf::from("/data/graze_bak"));
        assert_eq!(backup_dir("/data/graze/"), PathBuf::from("/data/graze_bak"));
    }

    #[test]
    fn test_migrate_v2_folder() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("graze");
        write(&root, "http/example.com/a/b/grazed", b"content b");
        write(&root, "https/example.com/grazed", b"content root");
        fs::write(root.join(EXCEPTIONS_FILENAME), r#"{"u": "/p"}"#).unwrap();

        let report = migrate_folder(&root, None).unwrap();

        assert_eq!(report.from, KeyLayout::V2);
        assert_eq!(report.migrated, 2);
        assert_eq!(report.backup, tmp.path().join("graze_bak"));
        assert_eq!(
            fs::read(root.join("http/example.com_f/a_f/b")).unwrap(),
            b"content b"
        );
        assert_eq!(
            fs::read(root.join("https/example.com")).unwrap(),
            b"content root"
        );
        assert_eq!(
            fs::read_to_string(root.join(EXCEPTIONS_FILENAME)).unwrap(),
            r#"{"u": "/p"}"#
        );
        // Backup left in place
        assert!(report.backup.join("http/example.com/a/b/grazed").is_file());
        assert_eq!(detect_layout(&root).unwrap(), KeyLayout::V3);
    }

    #[test]
    fn test_migrate_v1_folder_explicitly() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("cache");
        write(&root, "http/example.com/x/y.csv", b"csv");

        let report = migrate_folder(&root, Some(KeyLayout::V1)).unwrap();
        assert_eq!(report.migrated, 1);
        assert!(root.join("http/example.com_f/x_f/y.csv").is_file());
    }

    #[test]
    fn test_refuses_current_layout() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "http/example.com_f/a", b"x");
        let err = migrate_folder(tmp.path(), None).unwrap_err();
        assert!(matches!(err, GrazeError::AlreadyMigrated(_)));
        assert!(tmp.path().join("http/example.com_f/a").is_file());
    }

    #[test]
    fn test_invalid_key_leaves_folder_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("graze");
        write(&root, "http/example.com/a/grazed", b"ok");
        write(&root, "http/example.com/stray", b"not v2");

        let err = migrate_folder(&root, Some(KeyLayout::V2)).unwrap_err();
        assert!(matches!(err, GrazeError::InvalidKey { .. }));
        assert!(root.join("http/example.com/stray").is_file());
        assert!(!backup_dir(&root).exists());
    }
}
