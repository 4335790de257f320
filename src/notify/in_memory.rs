use super::*;
use anyhow::bail;
use parking_lot::{RwLock, RwLockReadGuard};
use std::sync::atomic::{AtomicBool, Ordering};

/// Records every notification in order.
///
/// Useful for unit-tests. Can be switched into a failing mode to check
/// that publishers swallow delivery errors.
#[derive(Debug, Default)]
pub struct InMemoryNotifier {
    log: RwLock<Vec<Notification>>,
    failing: AtomicBool,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Vec<Notification>> {
        self.log.read()
    }

    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.log.write())
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl Notifier for InMemoryNotifier {
    fn notify(&self, lot_id: LotIdRef, action: ChangeAction) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("notification channel unavailable");
        }
        self.log.write().push(Notification {
            lot_id: lot_id.to_owned(),
            action,
        });
        Ok(())
    }
}
