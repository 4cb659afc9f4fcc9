//! Explicit transactions and savepoint guards.
//!
//! A [`Transaction`] tracks its own lifecycle so the engine-level
//! transaction can never be finished twice, and so an abandoned handle
//! rolls back automatically on drop. [`SavepointGuard`] provides the same
//! drop discipline for nested savepoints, which the orchestrator wraps
//! around multi-statement read-modify-write operations.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

use crate::backend::StorageEngine;
use crate::error::Result;

static SAVEPOINT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Lifecycle states of a [`Transaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Open,
    Committed,
    RolledBack,
}

/// An open engine-level transaction.
///
/// Exactly one of [`commit`](Transaction::commit) or
/// [`rollback`](Transaction::rollback) takes effect; calling either again
/// afterwards is a no-op. Dropping an open transaction rolls it back.
#[derive(Debug)]
pub struct Transaction<E: StorageEngine> {
    engine: Arc<E>,
    state: TransactionState,
}

impl<E: StorageEngine> Transaction<E> {
    /// Begins an engine transaction and returns the handle guarding it.
    pub fn begin(engine: Arc<E>) -> Result<Self> {
        engine.begin_transaction()?;
        debug!("transaction opened");
        Ok(Self { engine, state: TransactionState::Open })
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Commits the transaction. No-op if already finished.
    pub fn commit(&mut self) -> Result<()> {
        if self.state != TransactionState::Open {
            return Ok(());
        }
        self.engine.commit_transaction()?;
        self.state = TransactionState::Committed;
        debug!("transaction committed");
        Ok(())
    }

    /// Rolls the transaction back. No-op if already finished.
    pub fn rollback(&mut self) -> Result<()> {
        if self.state != TransactionState::Open {
            return Ok(());
        }
        self.engine.rollback_transaction()?;
        self.state = TransactionState::RolledBack;
        debug!("transaction rolled back");
        Ok(())
    }
}

impl<E: StorageEngine> Drop for Transaction<E> {
    fn drop(&mut self) {
        if self.state == TransactionState::Open {
            if let Err(err) = self.engine.rollback_transaction() {
                error!(error = %err, "rollback on drop failed");
            }
            self.state = TransactionState::RolledBack;
        }
    }
}

/// A named savepoint released on success and rolled back on drop.
#[derive(Debug)]
pub struct SavepointGuard<'a, E: StorageEngine> {
    engine: &'a E,
    name: String,
    active: bool,
}

impl<'a, E: StorageEngine> SavepointGuard<'a, E> {
    /// Opens a savepoint with a process-unique name.
    pub fn begin(engine: &'a E) -> Result<Self> {
        let name = format!("sp_{}", SAVEPOINT_COUNTER.fetch_add(1, Ordering::Relaxed));
        engine.begin_savepoint(&name)?;
        Ok(Self { engine, name, active: true })
    }

    /// Releases the savepoint, folding its changes into the enclosing
    /// transaction (or committing them when none is open).
    pub fn release(mut self) -> Result<()> {
        self.active = false;
        self.engine.release_savepoint(&self.name)
    }

    /// Rolls back to the savepoint and releases it.
    pub fn rollback(mut self) -> Result<()> {
        self.active = false;
        self.engine.rollback_savepoint(&self.name)?;
        self.engine.release_savepoint(&self.name)
    }
}

impl<E: StorageEngine> Drop for SavepointGuard<'_, E> {
    fn drop(&mut self) {
        if self.active {
            if let Err(err) = self
                .engine
                .rollback_savepoint(&self.name)
                .and_then(|()| self.engine.release_savepoint(&self.name))
            {
                error!(savepoint = %self.name, error = %err, "savepoint rollback on drop failed");
            }
        }
    }
}
