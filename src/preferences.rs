//! Account preference collaborator consumed by the broker.

use std::sync::{Mutex, MutexGuard};

/// Read side of the wallet's account selection.
///
/// `eth_accounts` answers from this seam without touching the gateway; an
/// empty selection yields `[]`, never an error.
pub trait AccountPreferences: Send + Sync {
    fn selected_account(&self) -> Option<String>;
}

#[derive(Default)]
pub struct MemoryAccountPreferences {
    account: Mutex<Option<String>>,
}

impl MemoryAccountPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(account: impl Into<String>) -> Self {
        Self {
            account: Mutex::new(Some(account.into())),
        }
    }

    pub fn select(&self, account: impl Into<String>) {
        *self.lock() = Some(account.into());
    }

    pub fn clear(&self) {
        *self.lock() = None;
    }

    fn lock(&self) -> MutexGuard<'_, Option<String>> {
        self.account
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl AccountPreferences for MemoryAccountPreferences {
    fn selected_account(&self) -> Option<String> {
        self.lock().clone()
    }
}
