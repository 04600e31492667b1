//! Commit scope around the persistence of a single chunk.
//!
//! The chunk-oriented step opens a [`CommitScope`] right before handing a
//! chunk to its writer and closes it right after. The scope is released on
//! every exit path: dropping it without calling [`CommitScope::commit`] rolls
//! the transaction back.

use log::{debug, warn};

use crate::error::BatchError;

/// A transactional resource a step can commit or roll back chunk by chunk.
pub trait TransactionManager {
    fn begin(&self) -> Result<(), BatchError>;

    fn commit(&self) -> Result<(), BatchError>;

    fn rollback(&self) -> Result<(), BatchError>;
}

/// Transaction manager for writers without transactional resources
/// (loggers, in-memory collectors).
#[derive(Default)]
pub struct ResourcelessTransactionManager;

impl TransactionManager for ResourcelessTransactionManager {
    fn begin(&self) -> Result<(), BatchError> {
        Ok(())
    }

    fn commit(&self) -> Result<(), BatchError> {
        Ok(())
    }

    fn rollback(&self) -> Result<(), BatchError> {
        Ok(())
    }
}

pub(crate) static RESOURCELESS: ResourcelessTransactionManager = ResourcelessTransactionManager;

/// An open transaction. Ends with exactly one commit or rollback.
pub struct CommitScope<'a> {
    manager: &'a dyn TransactionManager,
    active: bool,
}

impl<'a> CommitScope<'a> {
    pub fn begin(manager: &'a dyn TransactionManager) -> Result<Self, BatchError> {
        manager.begin()?;
        debug!("Commit scope opened");
        Ok(Self {
            manager,
            active: true,
        })
    }

    pub fn commit(mut self) -> Result<(), BatchError> {
        self.active = false;
        let result = self.manager.commit();
        if result.is_err() {
            // A failed commit leaves nothing applied; make sure the resource is released.
            if let Err(error) = self.manager.rollback() {
                warn!("Rollback after failed commit also failed: {}", error);
            }
        }
        result
    }

    pub fn rollback(mut self) -> Result<(), BatchError> {
        self.active = false;
        self.manager.rollback()
    }
}

impl Drop for CommitScope<'_> {
    fn drop(&mut self) {
        if self.active {
            debug!("Commit scope dropped while active, rolling back");
            if let Err(error) = self.manager.rollback() {
                warn!("Rollback failed: {}", error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    #[derive(Default)]
    struct RecordingManager {
        calls: RefCell<Vec<&'static str>>,
        fail_commit: bool,
    }

    impl TransactionManager for RecordingManager {
        fn begin(&self) -> Result<(), BatchError> {
            self.calls.borrow_mut().push("begin");
            Ok(())
        }

        fn commit(&self) -> Result<(), BatchError> {
            self.calls.borrow_mut().push("commit");
            if self.fail_commit {
                Err(BatchError::ItemWriter("commit refused".to_string()))
            } else {
                Ok(())
            }
        }

        fn rollback(&self) -> Result<(), BatchError> {
            self.calls.borrow_mut().push("rollback");
            Ok(())
        }
    }

    #[test]
    fn commit_ends_the_scope() {
        let manager = RecordingManager::default();

        let scope = CommitScope::begin(&manager).unwrap();
        scope.commit().unwrap();

        assert_eq!(*manager.calls.borrow(), vec!["begin", "commit"]);
    }

    #[test]
    fn dropping_an_active_scope_rolls_back() {
        let manager = RecordingManager::default();

        {
            let _scope = CommitScope::begin(&manager).unwrap();
        }

        assert_eq!(*manager.calls.borrow(), vec!["begin", "rollback"]);
    }

    #[test]
    fn explicit_rollback_is_not_repeated_on_drop() {
        let manager = RecordingManager::default();

        let scope = CommitScope::begin(&manager).unwrap();
        scope.rollback().unwrap();

        assert_eq!(*manager.calls.borrow(), vec!["begin", "rollback"]);
    }

    #[test]
    fn failed_commit_releases_the_resource() {
        let manager = RecordingManager {
            fail_commit: true,
            ..Default::default()
        };

        let scope = CommitScope::begin(&manager).unwrap();
        let result = scope.commit();

        assert!(result.is_err());
        assert_eq!(*manager.calls.borrow(), vec!["begin", "commit", "rollback"]);
    }
}
