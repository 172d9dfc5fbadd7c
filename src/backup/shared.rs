//! Process-wide backup manager.
//!
//! The first call to [`shared`] creates a manager with the default
//! configuration. [`initialize_shared`] with a configuration builds and
//! initializes a fresh manager, then swaps it in; handles obtained earlier
//! keep pointing at the previous instance.

use super::{BackupConfig, BackupManager};
use crate::error::Result;
use std::sync::{Arc, PoisonError, RwLock};

static SHARED: RwLock<Option<Arc<BackupManager>>> = RwLock::new(None);

/// The shared manager, created with [`BackupConfig::default`] on first use.
#[must_use]
pub fn shared() -> Arc<BackupManager> {
    if let Some(manager) = SHARED.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
        return Arc::clone(manager);
    }

    let mut slot = SHARED.write().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(slot.get_or_insert_with(|| Arc::new(BackupManager::new(BackupConfig::default()))))
}

/// Initialize the shared manager.
///
/// Without a configuration the current shared instance is initialized in
/// place. With one, a new instance is built and initialized, and becomes the
/// shared instance only if that succeeds.
///
/// # Errors
///
/// Returns the error from [`BackupManager::initialize`].
pub fn initialize_shared(config: Option<BackupConfig>) -> Result<Arc<BackupManager>> {
    let Some(config) = config else {
        let manager = shared();
        manager.initialize()?;
        return Ok(manager);
    };

    let manager = Arc::new(BackupManager::new(config));
    manager.initialize()?;
    *SHARED.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&manager));
    Ok(manager)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // One test owns the global so parallel tests never race on it
    #[test]
    fn test_shared_instance_lifecycle() {
        let first = shared();
        assert!(Arc::ptr_eq(&first, &shared()));

        let temp = TempDir::new().unwrap();
        let config = BackupConfig::new(temp.path().join("backups")).with_max_backups(2);
        let replaced = initialize_shared(Some(config.clone())).unwrap();

        assert!(replaced.is_initialized());
        assert!(Arc::ptr_eq(&replaced, &shared()));
        assert!(!Arc::ptr_eq(&first, &replaced));
        assert_eq!(shared().config(), &config);

        // No config: re-initializes whatever is shared now
        let again = initialize_shared(None).unwrap();
        assert!(Arc::ptr_eq(&again, &replaced));

        // A failed replacement leaves the current instance in place
        let blocker = temp.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        assert!(initialize_shared(Some(BackupConfig::new(blocker.join("backups")))).is_err());
        assert!(Arc::ptr_eq(&shared(), &replaced));
    }
}
