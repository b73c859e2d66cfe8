//! Ledger bookkeeping for mutating tools.
//!
//! A path is backed up at most once per session. Later mutations of an
//! already-tracked path reuse its record, reclassifying it when the net
//! effect changes (modify then delete becomes delete, delete then write
//! becomes modify, create then delete disappears).
//!
//! A path enters the ledger only when none of its sidecars exist yet. A
//! leftover sidecar belongs to an earlier session, or to the user, and
//! backing up over it would destroy the only copy of that content.

use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::{
    ChangeKind, ChangeLedger, ToolError, backup_path_for, deleted_backup_path_for,
    sidecar_paths_for,
};

enum WritePlan {
    AlreadyTracked,
    Reclassify { id: String },
    Fresh { backup: Option<PathBuf> },
}

pub(super) fn ensure_visible(ledger: &ChangeLedger, display: &str) -> Result<(), ToolError> {
    if ledger.is_visible() {
        Ok(())
    } else {
        Err(ToolError::ChangesHidden(display.to_string()))
    }
}

pub(super) async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|metadata| metadata.is_file())
        .unwrap_or(false)
}

pub(super) async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// Creates the missing ancestors of `path` and returns them, outermost first.
async fn ensure_parent(path: &Path) -> Result<Vec<PathBuf>, ToolError> {
    let Some(parent) = path.parent() else {
        return Ok(Vec::new());
    };
    let mut missing = Vec::new();
    for ancestor in parent.ancestors() {
        if ancestor.as_os_str().is_empty() || exists(ancestor).await {
            break;
        }
        missing.push(ancestor.to_path_buf());
    }
    if missing.is_empty() {
        return Ok(missing);
    }
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|error| ToolError::io("create directory", parent, error))?;
    missing.reverse();
    Ok(missing)
}

/// Refuses a path that is not tracked yet but already has a sidecar on disk.
pub(super) async fn ensure_trackable(ledger: &ChangeLedger, path: &Path) -> Result<(), ToolError> {
    if ledger.find(path).is_some() {
        return Ok(());
    }
    for sidecar in sidecar_paths_for(path) {
        if exists(&sidecar).await {
            return Err(ToolError::StaleSidecar(sidecar));
        }
    }
    Ok(())
}

/// Runs `mutation`, which leaves `path` holding new content, with the backup
/// and ledger record the single-backup contract calls for. Parent
/// directories exist by the time `mutation` runs. Returns what the ledger now
/// says about `path`.
pub(super) async fn tracked_write<T, F>(
    ledger: &mut ChangeLedger,
    path: &Path,
    mutation: F,
) -> Result<(T, ChangeKind), ToolError>
where
    F: Future<Output = Result<T, ToolError>>,
{
    let plan = prepare_write(ledger, path).await?;
    let created = ensure_parent(path).await?;
    ledger.note_created_directories(created);
    match mutation.await {
        Ok(value) => Ok((value, commit_write(ledger, plan, path))),
        Err(error) => {
            // A half-applied write still needs its original to be recoverable.
            let keep = match &plan {
                WritePlan::Fresh { backup: Some(_) } => true,
                WritePlan::AlreadyTracked => false,
                _ => exists(path).await,
            };
            if keep {
                commit_write(ledger, plan, path);
            }
            Err(error)
        }
    }
}

async fn prepare_write(ledger: &ChangeLedger, path: &Path) -> Result<WritePlan, ToolError> {
    if let Some(existing) = ledger.find(path) {
        return Ok(match existing.kind {
            ChangeKind::Create | ChangeKind::Modify => WritePlan::AlreadyTracked,
            ChangeKind::Delete => WritePlan::Reclassify {
                id: existing.id.clone(),
            },
        });
    }
    ensure_trackable(ledger, path).await?;

    if is_file(path).await {
        let backup = backup_path_for(path);
        tokio::fs::copy(path, &backup)
            .await
            .map_err(|error| ToolError::io("back up", path, error))?;
        debug!(path = %path.display(), backup = %backup.display(), "backed up file");
        Ok(WritePlan::Fresh {
            backup: Some(backup),
        })
    } else {
        Ok(WritePlan::Fresh { backup: None })
    }
}

fn commit_write(ledger: &mut ChangeLedger, plan: WritePlan, path: &Path) -> ChangeKind {
    match plan {
        WritePlan::AlreadyTracked => ledger
            .find(path)
            .map(|change| change.kind)
            .unwrap_or(ChangeKind::Modify),
        WritePlan::Reclassify { id } => {
            ledger.reclassify(&id, ChangeKind::Modify);
            ChangeKind::Modify
        }
        WritePlan::Fresh {
            backup: Some(backup),
        } => ledger.record(ChangeKind::Modify, path, Some(backup)).kind,
        WritePlan::Fresh { backup: None } => ledger.record(ChangeKind::Create, path, None).kind,
    }
}

/// Removes `path` and updates the ledger. The caller has already checked
/// that `path` is an existing regular file.
pub(super) async fn tracked_delete(
    ledger: &mut ChangeLedger,
    path: &Path,
) -> Result<Option<ChangeKind>, ToolError> {
    let existing = ledger
        .find(path)
        .map(|change| (change.id.clone(), change.kind));

    match existing {
        Some((id, ChangeKind::Create)) => {
            remove(path).await?;
            ledger.forget(&id);
            Ok(None)
        }
        Some((id, ChangeKind::Modify | ChangeKind::Delete)) => {
            remove(path).await?;
            ledger.reclassify(&id, ChangeKind::Delete);
            Ok(Some(ChangeKind::Delete))
        }
        None => {
            ensure_trackable(ledger, path).await?;
            let backup = deleted_backup_path_for(path);
            tokio::fs::copy(path, &backup)
                .await
                .map_err(|error| ToolError::io("back up", path, error))?;
            if let Err(error) = remove(path).await {
                let _ = tokio::fs::remove_file(&backup).await;
                return Err(error);
            }
            ledger.record(ChangeKind::Delete, path, Some(backup));
            Ok(Some(ChangeKind::Delete))
        }
    }
}

async fn remove(path: &Path) -> Result<(), ToolError> {
    tokio::fs::remove_file(path)
        .await
        .map_err(|error| ToolError::io("delete", path, error))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn try_write(
        ledger: &mut ChangeLedger,
        path: &Path,
        content: &'static str,
    ) -> Result<ChangeKind, ToolError> {
        let (_, kind) = tracked_write(ledger, path, async move {
            tokio::fs::write(path, content)
                .await
                .map_err(|error| ToolError::io("write", path, error))
        })
        .await?;
        Ok(kind)
    }

    async fn write(ledger: &mut ChangeLedger, path: &Path, content: &'static str) -> ChangeKind {
        try_write(ledger, path, content).await.expect("tracked write")
    }

    #[tokio::test(flavor = "current_thread")]
    async fn first_write_backs_up_once_and_later_writes_reuse_it() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "orig").expect("seed");
        let mut ledger = ChangeLedger::new();

        assert_eq!(write(&mut ledger, &path, "one").await, ChangeKind::Modify);
        assert_eq!(write(&mut ledger, &path, "two").await, ChangeKind::Modify);

        assert_eq!(ledger.len(), 1);
        assert_eq!(
            std::fs::read_to_string(backup_path_for(&path)).expect("backup"),
            "orig"
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn create_then_modify_stays_create() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("new.txt");
        let mut ledger = ChangeLedger::new();

        assert_eq!(write(&mut ledger, &path, "one").await, ChangeKind::Create);
        assert_eq!(write(&mut ledger, &path, "two").await, ChangeKind::Create);
        assert_eq!(ledger.len(), 1);
        assert!(!backup_path_for(&path).exists());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn create_then_delete_drops_the_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("new.txt");
        let mut ledger = ChangeLedger::new();
        write(&mut ledger, &path, "temp").await;

        let kind = tracked_delete(&mut ledger, &path).await.expect("delete");
        assert_eq!(kind, None);
        assert!(ledger.is_empty());
        assert!(!deleted_backup_path_for(&path).exists());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn modify_then_delete_keeps_original_backup() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "orig").expect("seed");
        let mut ledger = ChangeLedger::new();
        write(&mut ledger, &path, "edited").await;

        tracked_delete(&mut ledger, &path).await.expect("delete");
        let record = ledger.find(&path).expect("record").clone();
        assert_eq!(record.kind, ChangeKind::Delete);
        assert_eq!(record.backup_path, Some(backup_path_for(&path)));
        assert!(!deleted_backup_path_for(&path).exists());

        ledger.reject().await;
        assert_eq!(std::fs::read_to_string(&path).expect("restored"), "orig");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn delete_then_write_becomes_modify() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "orig").expect("seed");
        let mut ledger = ChangeLedger::new();

        tracked_delete(&mut ledger, &path).await.expect("delete");
        assert_eq!(write(&mut ledger, &path, "reborn").await, ChangeKind::Modify);
        assert_eq!(ledger.len(), 1);

        ledger.reject().await;
        assert_eq!(std::fs::read_to_string(&path).expect("restored"), "orig");
        assert!(!deleted_backup_path_for(&path).exists());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn failed_fresh_create_leaves_no_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("never.txt");
        let mut ledger = ChangeLedger::new();

        let result: Result<((), ChangeKind), ToolError> = tracked_write(&mut ledger, &path, async {
            Err(ToolError::Execution("disk full".to_string()))
        })
        .await;
        assert!(result.is_err());
        assert!(ledger.is_empty());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn kept_backup_from_an_earlier_session_is_never_overwritten() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "orig").expect("seed");

        let mut first = ChangeLedger::new();
        write(&mut first, &path, "v1").await;
        drop(first);

        let mut second = ChangeLedger::new();
        let error = try_write(&mut second, &path, "v2")
            .await
            .expect_err("stale backup should block tracking");
        assert!(matches!(error, ToolError::StaleSidecar(ref sidecar) if *sidecar == backup_path_for(&path)));
        assert!(second.is_empty());
        assert_eq!(std::fs::read_to_string(&path).expect("current"), "v1");
        assert_eq!(
            std::fs::read_to_string(backup_path_for(&path)).expect("backup"),
            "orig"
        );

        let error = tracked_delete(&mut second, &path)
            .await
            .expect_err("stale backup should block deletion too");
        assert!(matches!(error, ToolError::StaleSidecar(_)));
        assert!(path.exists());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn user_file_with_a_sidecar_name_survives_an_edit() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings");
        std::fs::write(&path, "live").expect("seed");
        std::fs::write(backup_path_for(&path), "user's own snapshot").expect("seed");
        let mut ledger = ChangeLedger::new();

        assert!(matches!(
            try_write(&mut ledger, &path, "edited").await,
            Err(ToolError::StaleSidecar(_))
        ));
        ledger.validate().await;

        assert_eq!(std::fs::read_to_string(&path).expect("settings"), "live");
        assert_eq!(
            std::fs::read_to_string(backup_path_for(&path)).expect("user backup"),
            "user's own snapshot"
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn parked_creation_blocks_a_fresh_create() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("new.txt");
        std::fs::write(crate::modified_path_for(&path), "parked").expect("seed");
        let mut ledger = ChangeLedger::new();

        assert!(matches!(
            try_write(&mut ledger, &path, "fresh").await,
            Err(ToolError::StaleSidecar(_))
        ));
        assert!(!path.exists());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn created_parents_are_noted_outermost_first() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("a/b/c.txt");
        let mut ledger = ChangeLedger::new();

        write(&mut ledger, &path, "deep").await;
        assert_eq!(
            ledger.created_directories(),
            &[dir.path().join("a"), dir.path().join("a/b")]
        );

        write(&mut ledger, &dir.path().join("a/d.txt"), "shallow").await;
        assert_eq!(ledger.created_directories().len(), 2);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn hidden_ledger_blocks_mutation() {
        let mut ledger = ChangeLedger::new();
        assert!(ensure_visible(&ledger, "a.txt").is_ok());
        ledger.toggle(false).await;
        assert!(matches!(
            ensure_visible(&ledger, "a.txt"),
            Err(ToolError::ChangesHidden(_))
        ));
    }
}
