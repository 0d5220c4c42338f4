//! Debug-only reentrancy detection for table operations.
//!
//! Table operations call back into user code (hash, equality and disposer
//! callbacks) while chains are being walked or relinked. A callback that
//! reaches the same table again would observe a half-updated chain, so in
//! debug builds every operation marks itself active and a nested entry
//! panics naming both operations. Release builds carry no state.

use core::cell::Cell;
use core::marker::PhantomData;

/// Tracks the operation currently running on one table.
#[derive(Debug)]
pub(crate) struct OperationTracker {
    #[cfg(debug_assertions)]
    active: Cell<Option<&'static str>>,
    // Tables are single-owner, single-threaded.
    _nosend: PhantomData<*mut ()>,
}

impl OperationTracker {
    pub(crate) const fn new() -> Self {
        Self {
            #[cfg(debug_assertions)]
            active: Cell::new(None),
            _nosend: PhantomData,
        }
    }

    /// Mark `op` as running until the returned guard drops.
    ///
    /// Panics in debug builds if another operation is already running.
    #[inline]
    pub(crate) fn enter(&self, op: &'static str) -> ActiveOperation<'_> {
        #[cfg(debug_assertions)]
        {
            if let Some(outer) = self.active.get() {
                panic!("reentrant call: ChainedTable::{op} invoked while ChainedTable::{outer} is in progress");
            }
            self.active.set(Some(op));
            ActiveOperation { tracker: self }
        }

        #[cfg(not(debug_assertions))]
        {
            let _ = op;
            ActiveOperation { _z: PhantomData }
        }
    }
}

impl Default for OperationTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard returned by [`OperationTracker::enter`].
pub(crate) struct ActiveOperation<'a> {
    #[cfg(debug_assertions)]
    tracker: &'a OperationTracker,
    #[cfg(not(debug_assertions))]
    _z: PhantomData<&'a ()>,
}

impl Drop for ActiveOperation<'_> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        {
            debug_assert!(self.tracker.active.get().is_some());
            self.tracker.active.set(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::OperationTracker;

    #[test]
    fn sequential_operations_are_allowed() {
        let t = OperationTracker::new();
        {
            let _g = t.enter("insert");
        }
        let _g = t.enter("lookup");
    }

    #[cfg(debug_assertions)]
    #[test]
    fn nested_operation_panics_with_both_names() {
        let t = OperationTracker::new();
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _outer = t.enter("remove");
            let _inner = t.enter("lookup");
        }));
        let payload = res.expect_err("nested entry must panic in debug builds");
        let msg = payload
            .downcast_ref::<String>()
            .cloned()
            .unwrap_or_default();
        assert!(msg.contains("ChainedTable::lookup"), "{msg}");
        assert!(msg.contains("ChainedTable::remove"), "{msg}");
    }

    #[cfg(not(debug_assertions))]
    #[test]
    fn nested_operation_is_noop_in_release() {
        let t = OperationTracker::new();
        let _outer = t.enter("remove");
        let _inner = t.enter("lookup");
    }
}
