use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{ChangeKind, ChangeLedger, LedgerReport, PendingChange, SharedPendingChangesObserver};

/// Handle to one editing session's ledger.
///
/// Clones share the same records and visibility flag. Every ledger-wide
/// operation holds the lock for its whole walk, so tools and the
/// toggle/validate/reject entry points never interleave.
#[derive(Clone)]
pub struct ChangeSession {
    id: String,
    ledger: Arc<Mutex<ChangeLedger>>,
}

impl Default for ChangeSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            ledger: Arc::new(Mutex::new(ChangeLedger::new())),
        }
    }

    pub fn with_observer(observer: SharedPendingChangesObserver) -> Self {
        let mut ledger = ChangeLedger::new();
        ledger.set_observer(Some(observer));
        Self {
            id: Uuid::new_v4().to_string(),
            ledger: Arc::new(Mutex::new(ledger)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn lock(&self) -> MutexGuard<'_, ChangeLedger> {
        self.ledger.lock().await
    }

    pub async fn set_observer(&self, observer: Option<SharedPendingChangesObserver>) {
        self.lock().await.set_observer(observer);
    }

    pub async fn record(
        &self,
        kind: ChangeKind,
        file_path: impl Into<PathBuf>,
        backup_path: Option<PathBuf>,
    ) -> PendingChange {
        self.lock().await.record(kind, file_path, backup_path)
    }

    pub async fn list(&self) -> Vec<PendingChange> {
        self.lock().await.list()
    }

    pub async fn is_visible(&self) -> bool {
        self.lock().await.is_visible()
    }

    pub async fn toggle(&self, visible: bool) -> LedgerReport {
        self.lock().await.toggle(visible).await
    }

    pub async fn validate(&self) -> LedgerReport {
        self.lock().await.validate().await
    }

    pub async fn reject(&self) -> LedgerReport {
        self.lock().await.reject().await
    }

    pub async fn clear(&self) {
        self.lock().await.clear();
    }
}
