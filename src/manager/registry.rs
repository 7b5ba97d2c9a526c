//! Process-wide slot for the running [`PrManager`].
//!
//! The manager is constructed explicitly and handed to [`init`]; anything that
//! needs it later calls [`get`], or [`start`] to begin polling. [`teardown`]
//! stops it and empties the slot.

use std::sync::Mutex;

use super::PrManager;
use crate::errors::ManagerError;

static SLOT: Mutex<Option<PrManager>> = Mutex::new(None);

/// Register `manager`. Fails if one is already registered.
pub fn init(manager: PrManager) -> Result<(), ManagerError> {
    let mut slot = SLOT.lock().unwrap_or_else(|e| e.into_inner());
    if slot.is_some() {
        return Err(ManagerError::AlreadyRegistered);
    }
    *slot = Some(manager);
    tracing::debug!("PR manager registered");
    Ok(())
}

pub fn get() -> Result<PrManager, ManagerError> {
    SLOT.lock()
        .unwrap_or_else(|e| e.into_inner())
        .clone()
        .ok_or(ManagerError::NotRegistered)
}

/// Start polling on the registered manager. `Ok(false)` means it could not start.
pub fn start() -> Result<bool, ManagerError> {
    Ok(get()?.start())
}

/// Stop and unregister the manager. Returns whether one was registered.
pub fn teardown() -> bool {
    let manager = SLOT.lock().unwrap_or_else(|e| e.into_inner()).take();
    match manager {
        Some(manager) => {
            manager.stop();
            tracing::debug!("PR manager torn down");
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::EventSink;
    use crate::manager::{GitHubPrFetcher, PrManager};
    use std::sync::Arc;
    use std::time::Duration;

    // The slot is process-global, so the whole lifecycle lives in one test.
    #[tokio::test]
    async fn test_registry_lifecycle() {
        assert!(!teardown());
        assert!(matches!(get(), Err(ManagerError::NotRegistered)));
        assert!(matches!(start(), Err(ManagerError::NotRegistered)));

        let (sink, _rx) = EventSink::channel();
        let manager = PrManager::new(
            Arc::new(GitHubPrFetcher::new("http://127.0.0.1:9", None)),
            Duration::from_secs(60),
            sink,
        );
        init(manager.clone()).unwrap();
        assert!(matches!(init(manager.clone()), Err(ManagerError::AlreadyRegistered)));

        let registered = get().unwrap();
        registered.add_task("t1", "https://github.com/o/r/pull/1").unwrap();
        assert_eq!(manager.list_tasks().len(), 1);

        assert!(start().unwrap());
        assert!(manager.is_running());
        assert!(teardown());
        assert!(!manager.is_running());
        assert!(matches!(get(), Err(ManagerError::NotRegistered)));

        init(manager).unwrap();
        assert!(teardown());
    }
}
