//! Transactional file-change ledger.
//!
//! Every tracked mutation leaves one [`PendingChange`] plus, for modify and
//! delete, a backup file holding the exact pre-mutation bytes. The ledger can
//! hide the changes (working tree shows originals, modifications parked in
//! `.modified` siblings), show them again, commit them, or roll them back.
//! Ledger-wide operations never stop at the first failing record; failures
//! are logged and returned in a [`LedgerReport`].

mod session;
mod sidecar;

pub use session::ChangeSession;
pub use sidecar::{
    BACKUP_SUFFIX, DELETED_BACKUP_SUFFIX, MODIFIED_SUFFIX, backup_path_for,
    deleted_backup_path_for, is_sidecar_path, modified_path_for, sidecar_paths_for,
};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::LedgerError;
use sidecar::{copy_file, remove_if_exists, rename_file, rename_if_exists};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Create,
    Modify,
    Delete,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingChange {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub file_path: PathBuf,
    pub backup_path: Option<PathBuf>,
    /// Milliseconds since the Unix epoch; ordering and diagnostics only.
    pub timestamp_ms: u64,
}

pub trait PendingChangesObserver: Send + Sync {
    fn on_pending_changes(&self, changes: &[PendingChange]);
}

impl<F> PendingChangesObserver for F
where
    F: Fn(&[PendingChange]) + Send + Sync,
{
    fn on_pending_changes(&self, changes: &[PendingChange]) {
        self(changes);
    }
}

pub type SharedPendingChangesObserver = Arc<dyn PendingChangesObserver>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RecordFailure {
    pub change_id: String,
    pub file_path: PathBuf,
    pub message: String,
}

/// Outcome of a ledger-wide operation. The operation itself always succeeds;
/// `failures` lists the records that could not be processed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LedgerReport {
    pub records: usize,
    pub failures: Vec<RecordFailure>,
}

impl LedgerReport {
    fn new(records: usize) -> Self {
        Self {
            records,
            failures: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn absorb(&mut self, operation: &str, change: &PendingChange, result: Result<(), LedgerError>) {
        if let Err(error) = result {
            warn!(
                operation,
                change_id = %change.id,
                path = %change.file_path.display(),
                error = %error,
                "pending change could not be processed; continuing"
            );
            self.failures.push(RecordFailure {
                change_id: change.id.clone(),
                file_path: change.file_path.clone(),
                message: error.to_string(),
            });
        }
    }
}

pub struct ChangeLedger {
    records: Vec<PendingChange>,
    /// Directories the session created, in creation order.
    created_directories: Vec<PathBuf>,
    changes_visible: bool,
    observer: Option<SharedPendingChangesObserver>,
}

impl Default for ChangeLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeLedger {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            created_directories: Vec::new(),
            changes_visible: true,
            observer: None,
        }
    }

    pub fn set_observer(&mut self, observer: Option<SharedPendingChangesObserver>) {
        self.observer = observer;
    }

    /// Appends a record. No deduplication happens here: callers own the
    /// one-backup-per-path contract.
    pub fn record(
        &mut self,
        kind: ChangeKind,
        file_path: impl Into<PathBuf>,
        backup_path: Option<PathBuf>,
    ) -> PendingChange {
        let change = PendingChange {
            id: Uuid::new_v4().to_string(),
            kind,
            file_path: file_path.into(),
            backup_path,
            timestamp_ms: current_timestamp_ms(),
        };
        debug!(
            change_id = %change.id,
            kind = ?change.kind,
            path = %change.file_path.display(),
            "recorded pending change"
        );
        self.records.push(change.clone());
        self.notify();
        change
    }

    pub fn list(&self) -> Vec<PendingChange> {
        self.records.clone()
    }

    pub fn records(&self) -> &[PendingChange] {
        &self.records
    }

    /// Most recent record tracking `path`.
    pub fn find(&self, path: &Path) -> Option<&PendingChange> {
        self.records
            .iter()
            .rev()
            .find(|change| change.file_path == path)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_visible(&self) -> bool {
        self.changes_visible
    }

    /// Remembers directories made to hold a tracked file, so rejecting the
    /// session can remove them again.
    pub fn note_created_directories(&mut self, directories: impl IntoIterator<Item = PathBuf>) {
        for directory in directories {
            if !self.created_directories.contains(&directory) {
                self.created_directories.push(directory);
            }
        }
    }

    pub fn created_directories(&self) -> &[PathBuf] {
        &self.created_directories
    }

    pub(crate) fn reclassify(&mut self, id: &str, kind: ChangeKind) -> bool {
        let Some(change) = self.records.iter_mut().find(|change| change.id == id) else {
            return false;
        };
        debug!(change_id = id, from = ?change.kind, to = ?kind, "reclassified pending change");
        change.kind = kind;
        self.notify();
        true
    }

    pub(crate) fn forget(&mut self, id: &str) -> Option<PendingChange> {
        let index = self.records.iter().position(|change| change.id == id)?;
        let removed = self.records.remove(index);
        debug!(change_id = id, "dropped pending change");
        self.notify();
        Some(removed)
    }

    /// Shows (`true`) or hides (`false`) the tracked modifications. Asking for
    /// the current state touches nothing.
    pub async fn toggle(&mut self, visible: bool) -> LedgerReport {
        if visible == self.changes_visible {
            return LedgerReport::default();
        }

        let mut report = LedgerReport::new(self.records.len());
        for change in &self.records {
            let result = if visible {
                reveal(change).await
            } else {
                conceal(change).await
            };
            report.absorb("toggle", change, result);
        }
        self.changes_visible = visible;
        info!(
            visible,
            records = report.records,
            failures = report.failures.len(),
            "toggled pending changes"
        );
        report
    }

    /// Commits every change: the working tree keeps the modifications and all
    /// backups and parked copies are removed.
    pub async fn validate(&mut self) -> LedgerReport {
        let mut report = LedgerReport::new(self.records.len());
        if !self.changes_visible {
            report.failures.extend(self.toggle(true).await.failures);
        }
        for change in &self.records {
            report.absorb("validate", change, commit(change).await);
        }
        info!(
            records = report.records,
            failures = report.failures.len(),
            "validated pending changes"
        );
        self.drain();
        report
    }

    /// Rolls every change back to the content captured before the session
    /// first touched each file.
    pub async fn reject(&mut self) -> LedgerReport {
        let mut report = LedgerReport::new(self.records.len());
        let hidden = !self.changes_visible;
        for change in &self.records {
            let result = if hidden {
                discard_parked(change).await
            } else {
                restore(change).await
            };
            report.absorb("reject", change, result);
        }
        remove_created_directories(&self.created_directories).await;
        info!(
            records = report.records,
            failures = report.failures.len(),
            hidden,
            "rejected pending changes"
        );
        self.drain();
        report
    }

    /// Forgets every record without touching the filesystem.
    pub fn clear(&mut self) {
        self.drain();
    }

    fn drain(&mut self) {
        self.records.clear();
        self.created_directories.clear();
        self.changes_visible = true;
        self.notify();
    }

    fn notify(&self) {
        if let Some(observer) = self.observer.as_ref() {
            observer.on_pending_changes(&self.records);
        }
    }
}

fn require_backup(change: &PendingChange) -> Result<&Path, LedgerError> {
    change
        .backup_path
        .as_deref()
        .ok_or_else(|| LedgerError::MissingBackup(change.id.clone()))
}

async fn conceal(change: &PendingChange) -> Result<(), LedgerError> {
    match change.kind {
        ChangeKind::Modify => {
            let backup = require_backup(change)?;
            copy_file(&change.file_path, &modified_path_for(backup)).await?;
            copy_file(backup, &change.file_path).await
        }
        ChangeKind::Create => {
            rename_file(&change.file_path, &modified_path_for(&change.file_path)).await
        }
        ChangeKind::Delete => copy_file(require_backup(change)?, &change.file_path).await,
    }
}

async fn reveal(change: &PendingChange) -> Result<(), LedgerError> {
    match change.kind {
        ChangeKind::Modify => {
            let backup = require_backup(change)?;
            rename_if_exists(&modified_path_for(backup), &change.file_path).await?;
        }
        ChangeKind::Create => {
            rename_if_exists(&modified_path_for(&change.file_path), &change.file_path).await?;
        }
        ChangeKind::Delete => {
            remove_if_exists(&change.file_path).await?;
        }
    }
    Ok(())
}

async fn commit(change: &PendingChange) -> Result<(), LedgerError> {
    if let Some(backup) = change.backup_path.as_deref() {
        remove_if_exists(backup).await?;
        remove_if_exists(&modified_path_for(backup)).await?;
    }
    if change.kind == ChangeKind::Create {
        remove_if_exists(&modified_path_for(&change.file_path)).await?;
    }
    Ok(())
}

/// Reject while hidden: the working tree already shows originals, so only
/// sidecars go.
async fn discard_parked(change: &PendingChange) -> Result<(), LedgerError> {
    match change.kind {
        ChangeKind::Create => {
            remove_if_exists(&modified_path_for(&change.file_path)).await?;
        }
        ChangeKind::Modify | ChangeKind::Delete => {
            let backup = require_backup(change)?;
            remove_if_exists(backup).await?;
            remove_if_exists(&modified_path_for(backup)).await?;
        }
    }
    Ok(())
}

/// Reject while visible. The backup is removed only after the original is
/// back in place.
async fn restore(change: &PendingChange) -> Result<(), LedgerError> {
    match change.kind {
        ChangeKind::Create => {
            remove_if_exists(&change.file_path).await?;
        }
        ChangeKind::Modify | ChangeKind::Delete => {
            let backup = require_backup(change)?;
            copy_file(backup, &change.file_path).await?;
            remove_if_exists(backup).await?;
            remove_if_exists(&modified_path_for(backup)).await?;
        }
    }
    Ok(())
}

/// Newest first, so nested directories go before their parents. A directory
/// that is no longer empty holds something the session did not track and
/// stays.
async fn remove_created_directories(directories: &[PathBuf]) {
    for directory in directories.iter().rev() {
        if let Err(error) = tokio::fs::remove_dir(directory).await {
            debug!(
                path = %directory.display(),
                error = %error,
                "created directory left in place"
            );
        }
    }
}

fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
