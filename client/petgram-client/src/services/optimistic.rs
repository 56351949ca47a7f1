//! Snapshot-and-rollback for optimistic local updates

use tokio::sync::watch;

/// How an inline mutation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The gateway accepted the change; the optimistic state stands
    Confirmed,
    /// The gateway rejected the change; local state was restored
    RolledBack,
    /// Nothing to do (e.g. blank comment); no request was issued
    Ignored,
}

/// The value a piece of local state held before an optimistic change.
///
/// Restoring is literal: `rollback` writes the captured value back, it does
/// not attempt to invert the change.
#[derive(Debug, Clone)]
#[must_use = "an optimistic change must be committed or rolled back"]
pub struct Optimistic<T> {
    snapshot: T,
}

impl<T: Clone> Optimistic<T> {
    /// Capture `state`, then mutate it with `change`
    pub fn apply<F>(state: &mut T, change: F) -> Self
    where
        F: FnOnce(&mut T),
    {
        let snapshot = state.clone();
        change(state);
        Self { snapshot }
    }

    /// Same as [`Optimistic::apply`] for state published through a watch
    /// channel. Subscribers observe the change immediately.
    pub fn apply_watch<F>(state: &watch::Sender<T>, change: F) -> Self
    where
        F: FnOnce(&mut T),
    {
        let snapshot = state.borrow().clone();
        state.send_modify(change);
        Self { snapshot }
    }

    pub fn snapshot(&self) -> &T {
        &self.snapshot
    }

    pub fn rollback(self, state: &mut T) {
        *state = self.snapshot;
    }

    pub fn rollback_watch(self, state: &watch::Sender<T>) {
        state.send_replace(self.snapshot);
    }

    /// Keep the optimistic state and drop the snapshot
    pub fn commit(self) {}
}
