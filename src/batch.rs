//! # Batch Controller
//!
//! Groups workspace calls into one atomic transaction.
//!
//! ```text
//!            begin_batch()              end_batch(true)
//!   Idle ───────────────────► Batching ───────────────► Committing ──► Idle
//!     ▲                          │
//!     │        end_batch(false)  │
//!     └──────── RollingBack ◄────┘
//! ```
//!
//! While a batch is open, every workspace call must come from the thread that
//! opened it. The workspace checks this on each statement in debug builds.
//!
//! ## Rust Pattern: Guard With Explicit Finish
//!
//! [`Batch`] borrows the workspace mutably, so nothing else can touch it while
//! the batch is open. `commit()` and `rollback()` consume the guard; if it is
//! dropped without either (an early `?` return, a panic), the batch rolls back.

use std::ops::{Deref, DerefMut};
use std::thread::{self, ThreadId};

use tracing::{debug, warn};

use crate::store::Store;
use crate::workspace::Workspace;
use crate::Result;

/// Where the controller is in its transaction lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BatchState {
    Idle,
    Batching { owner: ThreadId },
    Committing,
    RollingBack,
}

#[derive(Debug)]
pub(crate) struct BatchController {
    state: BatchState,
}

impl BatchController {
    pub fn new() -> Self {
        Self {
            state: BatchState::Idle,
        }
    }

    pub fn is_batching(&self) -> bool {
        matches!(self.state, BatchState::Batching { .. })
    }

    /// Opens a transaction on `store`.
    ///
    /// # Panics
    ///
    /// If a batch is already open. Nesting is a caller bug.
    pub fn begin(&mut self, store: &Store) -> Result<()> {
        assert!(
            self.state == BatchState::Idle,
            "begin_batch called while a batch is already open"
        );
        store.begin()?;
        self.state = BatchState::Batching {
            owner: thread::current().id(),
        };
        debug!("batch opened");
        Ok(())
    }

    /// Commits (`commit == true`) or rolls back the open batch.
    ///
    /// The controller is back in `Idle` afterwards whatever the outcome. If
    /// COMMIT itself fails the transaction is rolled back before the error is
    /// returned, so no partial batch survives.
    ///
    /// # Panics
    ///
    /// If no batch is open.
    pub fn end(&mut self, store: &Store, commit: bool) -> Result<()> {
        let BatchState::Batching { owner } = self.state else {
            panic!("end_batch called without an open batch");
        };
        debug_assert_eq!(
            owner,
            thread::current().id(),
            "batch must end on the thread that opened it"
        );

        let result = if commit {
            self.state = BatchState::Committing;
            store.commit().inspect_err(|e| {
                warn!(error = %e, "batch commit failed, rolling back");
                if let Err(e) = store.rollback() {
                    warn!(error = %e, "rollback after failed commit also failed");
                }
            })
        } else {
            self.state = BatchState::RollingBack;
            store.rollback()
        };

        self.state = BatchState::Idle;
        debug!(commit, ok = result.is_ok(), "batch closed");
        result
    }

    /// Debug-build check that the caller is on the batch's owning thread.
    pub fn check_affinity(&self) {
        if let BatchState::Batching { owner } = self.state {
            debug_assert_eq!(
                owner,
                thread::current().id(),
                "workspace used from a thread other than the one that opened the batch"
            );
        }
    }
}

// =============================================================================
// Scoped Guard
// =============================================================================

/// An open batch on a [`Workspace`].
///
/// Dereferences to the workspace, so every operation is available on the
/// guard. Rolls back on drop unless [`commit`](Batch::commit) was called.
///
/// ```no_run
/// use spatialcalc::{Coord, WorkspaceBuilder};
///
/// # fn main() -> spatialcalc::Result<()> {
/// let mut ws = WorkspaceBuilder::new().in_memory().build()?;
/// let mut batch = ws.batch()?;
/// batch.create_point(&Coord::xy(1.0, 2.0))?;
/// batch.create_point(&Coord::xy(3.0, 4.0))?;
/// batch.commit()?;
/// assert_eq!(ws.geometry_count()?, 2);
/// # Ok(())
/// # }
/// ```
#[must_use = "a batch rolls back when dropped; call commit() to keep its changes"]
pub struct Batch<'w> {
    workspace: &'w mut Workspace,
    finished: bool,
}

impl<'w> Batch<'w> {
    pub(crate) fn new(workspace: &'w mut Workspace) -> Self {
        Self {
            workspace,
            finished: false,
        }
    }

    /// Makes every change in the batch visible.
    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        self.workspace.end_batch(true)
    }

    /// Discards every change in the batch.
    pub fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.workspace.end_batch(false)
    }
}

impl Deref for Batch<'_> {
    type Target = Workspace;

    fn deref(&self) -> &Workspace {
        self.workspace
    }
}

impl DerefMut for Batch<'_> {
    fn deref_mut(&mut self) -> &mut Workspace {
        self.workspace
    }
}

impl Drop for Batch<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        warn!("batch dropped without commit, rolling back");
        if let Err(e) = self.workspace.end_batch(false) {
            warn!(error = %e, "rollback of dropped batch failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Dimension, Srid};

    fn store() -> Store {
        Store::open_in_memory(Dimension::Xy, Srid::WGS84).expect("should open store")
    }

    fn count(store: &Store) -> i64 {
        store
            .connection()
            .query_row("SELECT COUNT(*) FROM Calculator", [], |row| row.get(0))
            .expect("should count")
    }

    fn insert(store: &Store) {
        store
            .connection()
            .execute("INSERT INTO Calculator (geom) VALUES (MakePoint(0, 0, 4326))", [])
            .expect("should insert");
    }

    #[test]
    fn test_commit_keeps_rows() {
        let store = store();
        let mut batch = BatchController::new();

        batch.begin(&store).expect("should begin");
        assert!(batch.is_batching());
        insert(&store);
        insert(&store);
        batch.end(&store, true).expect("should commit");

        assert!(!batch.is_batching());
        assert_eq!(count(&store), 2);
    }

    #[test]
    fn test_rollback_discards_rows() {
        let store = store();
        let mut batch = BatchController::new();
        insert(&store);

        batch.begin(&store).expect("should begin");
        insert(&store);
        batch.end(&store, false).expect("should roll back");

        assert_eq!(count(&store), 1);
        assert_eq!(batch.state, BatchState::Idle);
    }

    #[test]
    #[should_panic(expected = "already open")]
    fn test_nested_begin_panics() {
        let store = store();
        let mut batch = BatchController::new();
        batch.begin(&store).expect("should begin");
        let _ = batch.begin(&store);
    }

    #[test]
    #[should_panic(expected = "without an open batch")]
    fn test_end_without_begin_panics() {
        let store = store();
        let mut batch = BatchController::new();
        let _ = batch.end(&store, true);
    }
}
