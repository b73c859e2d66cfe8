//! Sidecar naming and the filesystem primitives the ledger walks with.
//!
//! `<path>.backup` holds pre-modify content, `<path>.deleted-backup` holds
//! pre-delete content, and `<path>.modified` parks post-modification content
//! while changes are hidden. Anything reconstructing a session from disk has
//! to recognise exactly these suffixes.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::LedgerError;

pub const BACKUP_SUFFIX: &str = ".backup";
pub const DELETED_BACKUP_SUFFIX: &str = ".deleted-backup";
pub const MODIFIED_SUFFIX: &str = ".modified";

const SIDECAR_SUFFIXES: [&str; 3] = [BACKUP_SUFFIX, DELETED_BACKUP_SUFFIX, MODIFIED_SUFFIX];

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw = OsString::from(path.as_os_str());
    raw.push(suffix);
    PathBuf::from(raw)
}

pub fn backup_path_for(path: &Path) -> PathBuf {
    with_suffix(path, BACKUP_SUFFIX)
}

pub fn deleted_backup_path_for(path: &Path) -> PathBuf {
    with_suffix(path, DELETED_BACKUP_SUFFIX)
}

pub fn modified_path_for(path: &Path) -> PathBuf {
    with_suffix(path, MODIFIED_SUFFIX)
}

/// Every sidecar a session could leave behind for `path`.
pub fn sidecar_paths_for(path: &Path) -> [PathBuf; 4] {
    let backup = backup_path_for(path);
    [
        modified_path_for(&backup),
        backup,
        deleted_backup_path_for(path),
        modified_path_for(path),
    ]
}

pub fn is_sidecar_path(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| SIDECAR_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)))
}

pub(crate) async fn copy_file(from: &Path, to: &Path) -> Result<(), LedgerError> {
    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|error| LedgerError::io("create directory", parent, error))?;
    }
    tokio::fs::copy(from, to)
        .await
        .map_err(|error| LedgerError::io("copy", from, error))?;
    Ok(())
}

pub(crate) async fn rename_file(from: &Path, to: &Path) -> Result<(), LedgerError> {
    tokio::fs::rename(from, to)
        .await
        .map_err(|error| LedgerError::io("rename", from, error))
}

/// Renames `from` onto `to`; a missing `from` is not an error.
pub(crate) async fn rename_if_exists(from: &Path, to: &Path) -> Result<bool, LedgerError> {
    match tokio::fs::rename(from, to).await {
        Ok(()) => Ok(true),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(false),
        Err(error) => Err(LedgerError::io("rename", from, error)),
    }
}

pub(crate) async fn remove_if_exists(path: &Path) -> Result<bool, LedgerError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(false),
        Err(error) => Err(LedgerError::io("remove", path, error)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sidecar_names_append_to_full_file_name() {
        let path = Path::new("/work/src/main.rs");
        assert_eq!(backup_path_for(path), Path::new("/work/src/main.rs.backup"));
        assert_eq!(
            deleted_backup_path_for(path),
            Path::new("/work/src/main.rs.deleted-backup")
        );
        assert_eq!(
            modified_path_for(&backup_path_for(path)),
            Path::new("/work/src/main.rs.backup.modified")
        );
    }

    #[test]
    fn every_sidecar_of_a_path_is_listed() {
        let names: Vec<PathBuf> = sidecar_paths_for(Path::new("a.txt")).into_iter().collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("a.txt.backup.modified"),
                PathBuf::from("a.txt.backup"),
                PathBuf::from("a.txt.deleted-backup"),
                PathBuf::from("a.txt.modified"),
            ]
        );
        assert!(names.iter().all(|name| is_sidecar_path(name)));
    }

    #[test]
    fn sidecar_detection_matches_only_known_suffixes() {
        assert!(is_sidecar_path(Path::new("a.txt.backup")));
        assert!(is_sidecar_path(Path::new("dir/a.txt.deleted-backup")));
        assert!(is_sidecar_path(Path::new("a.txt.modified")));
        assert!(!is_sidecar_path(Path::new("backup.txt")));
        assert!(!is_sidecar_path(Path::new("a.txt")));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn missing_sources_are_tolerated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("missing.txt");
        assert!(!remove_if_exists(&missing).await.expect("remove should not fail"));
        assert!(
            !rename_if_exists(&missing, &dir.path().join("other.txt"))
                .await
                .expect("rename should not fail")
        );
    }
}
