// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>
//
// This file is part of LindaSpace.
//
// LindaSpace is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// LindaSpace is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with LindaSpace. If not, see <https://www.gnu.org/licenses/>.

//! Two-phase transaction handle.
//!
//! A transaction remembers which Spaces it has touched and broadcasts
//! `commit` or `rollback` to each. It holds weak references only: the
//! registry and the application own the Spaces, the transaction owns nothing
//! but its identifier and enrolment set. A Space keeps its per-transaction
//! overlay stores keyed by this identifier.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::debug;
use ulid::Ulid;

use crate::error::{SpaceError, SpaceResult};
use crate::space::Space;

/// A shared handle over an in-flight two-phase transaction.
///
/// Enrolment happens implicitly on the first `put`/`take`/`get` that names
/// this transaction in a Space. The handle must not be used after `commit`
/// or `rollback`; reuse surfaces [`SpaceError::TransactionFinished`].
pub struct Transaction {
    id: Ulid,
    spaces: Mutex<Vec<Weak<Space>>>,
    finished: AtomicBool,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl Transaction {
    /// Create a new open transaction.
    pub fn new() -> Self {
        Transaction {
            id: Ulid::new(),
            spaces: Mutex::new(Vec::new()),
            finished: AtomicBool::new(false),
        }
    }

    /// Unique transaction identifier.
    pub fn id(&self) -> Ulid {
        self.id
    }

    /// True after commit or rollback.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Commit this transaction in every enrolled Space.
    ///
    /// Staged `put`s become visible to all readers (waking matching
    /// waiters); tuples consumed by `take` are gone for good.
    ///
    /// ## Errors
    /// [`SpaceError::TransactionFinished`] when already committed or rolled
    /// back.
    pub async fn commit(&self) -> SpaceResult<()> {
        self.finish()?;
        debug!(txn = %self.id, "committing transaction");
        for space in self.enrolled() {
            space.commit(self).await;
        }
        Ok(())
    }

    /// Roll back this transaction in every enrolled Space.
    ///
    /// Staged `put`s vanish; tuples consumed by `take` reappear as if never
    /// taken.
    ///
    /// ## Errors
    /// [`SpaceError::TransactionFinished`] when already committed or rolled
    /// back.
    pub async fn rollback(&self) -> SpaceResult<()> {
        self.finish()?;
        debug!(txn = %self.id, "rolling back transaction");
        for space in self.enrolled() {
            space.rollback(self).await;
        }
        Ok(())
    }

    /// Flip the finished flag exactly once.
    fn finish(&self) -> SpaceResult<()> {
        self.finished
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| SpaceError::TransactionFinished(self.id.to_string()))?;
        Ok(())
    }

    pub(crate) fn ensure_open(&self) -> SpaceResult<()> {
        if self.is_finished() {
            return Err(SpaceError::TransactionFinished(self.id.to_string()));
        }
        Ok(())
    }

    /// Remember a Space this transaction has touched. Idempotent.
    pub(crate) fn enroll(&self, space: &Weak<Space>) {
        let mut spaces = self
            .spaces
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !spaces.iter().any(|known| Weak::ptr_eq(known, space)) {
            spaces.push(space.clone());
        }
    }

    /// Enrolled Spaces that are still alive.
    fn enrolled(&self) -> Vec<Arc<Space>> {
        let spaces = self
            .spaces
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        spaces.iter().filter_map(Weak::upgrade).collect()
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_commit_twice_is_misuse() {
        let txn = Transaction::new();
        txn.commit().await.unwrap();
        assert!(matches!(
            txn.commit().await,
            Err(SpaceError::TransactionFinished(_))
        ));
    }

    #[tokio::test]
    async fn test_rollback_after_commit_is_misuse() {
        let txn = Transaction::new();
        txn.commit().await.unwrap();
        assert!(txn.is_finished());
        assert!(matches!(
            txn.rollback().await,
            Err(SpaceError::TransactionFinished(_))
        ));
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(Transaction::new().id(), Transaction::new().id());
    }
}
