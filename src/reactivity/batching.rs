// ============================================================================
// reactive-graph-core - Batch Controller
// Opens/closes logical transactions; drains reactions and unobservations
// ============================================================================
//
// RAII guard pattern: entering is a plain call, exiting happens in `Drop`
// so a panic inside the batched closure still restores depth and flushes
// pending work.
// ============================================================================

use std::rc::{Rc, Weak};

use crate::core::constants::DEFAULT_REACTION_REENTRANCY_LIMIT;
use crate::core::context::with_context;
use crate::core::types::{Derivation, Observable};
use crate::reactivity::guard::check_reentrant_reaction_budget;
use crate::reactivity::tracking::untracked_start;

// =============================================================================
// BATCH
// =============================================================================

pub fn start_batch() {
    with_context(|ctx| ctx.enter_batch());
}

/// Close one level of batch nesting; at depth zero, drains pending
/// reactions and then pending unobservations.
pub fn end_batch() {
    let depth = with_context(|ctx| ctx.exit_batch());
    if depth == 0 {
        run_reactions();
        drain_pending_unobservations();
    }
}

/// Run `f` inside a batch. Reactions scheduled during `f` run once `f`
/// returns and the outermost batch closes, even if nested batches were
/// opened and closed within `f`.
pub fn batch<T>(f: impl FnOnce() -> T) -> T {
    start_batch();

    struct BatchGuard;
    impl Drop for BatchGuard {
        fn drop(&mut self) {
            end_batch();
        }
    }

    let _guard = BatchGuard;
    f()
}

/// Read without creating dependencies. Panic-safe: the tracking slot is
/// restored by `Drop` even if `f` unwinds.
pub fn untracked<T>(f: impl FnOnce() -> T) -> T {
    let previous = untracked_start();

    struct UntrackGuard(Option<Weak<dyn Derivation>>);
    impl Drop for UntrackGuard {
        fn drop(&mut self) {
            crate::reactivity::tracking::untracked_end(self.0.take());
        }
    }

    let _guard = UntrackGuard(previous);
    f()
}

// =============================================================================
// REACTION DRAIN
// =============================================================================

/// Drain `pendingReactions` FIFO. Reactions that schedule themselves again
/// during the drain (e.g. a self-retriggering reaction) are appended and
/// drained in the same pass, bounded by `DEFAULT_REACTION_REENTRANCY_LIMIT`
/// outer-loop iterations.
fn run_reactions() {
    let already_running = with_context(|ctx| ctx.set_running_reactions(true));
    if already_running {
        // A nested call from inside a reaction's own batch close; the
        // outer call owns the drain loop.
        return;
    }

    let mut iterations: u32 = 0;
    loop {
        let pending = with_context(|ctx| ctx.take_pending_reactions());
        if pending.is_empty() {
            break;
        }

        iterations += 1;
        check_reentrant_reaction_budget(iterations, DEFAULT_REACTION_REENTRANCY_LIMIT);

        for weak in pending {
            if let Some(reaction) = weak.upgrade() {
                reaction.run_as_reaction();
            }
        }
    }

    with_context(|ctx| ctx.set_running_reactions(false));
}

// =============================================================================
// UNOBSERVATION DRAIN
// =============================================================================

/// Drain `pendingUnobservations`: any observable still at zero observers
/// fires `on_become_unobserved` exactly once. `on_become_unobserved` may
/// enqueue further entries (a computed clearing its own `observing` can
/// unobserve its dependencies), so the drain re-checks until empty or until
/// a fixed reentrancy budget is reached (P7: at-most-once per batch is still
/// guaranteed by the `is_pending_unobservation` flag, cleared right before
/// the hook runs).
fn drain_pending_unobservations() {
    let mut iterations: u32 = 0;
    loop {
        let pending: Vec<Weak<dyn Observable>> =
            with_context(|ctx| ctx.take_pending_unobservations());
        if pending.is_empty() {
            break;
        }

        iterations += 1;
        check_reentrant_reaction_budget(iterations, DEFAULT_REACTION_REENTRANCY_LIMIT);

        for weak in pending {
            if let Some(obs) = weak.upgrade() {
                obs.set_pending_unobservation(false);
                if obs.observer_count() == 0 {
                    let obs: Rc<dyn Observable> = obs;
                    untracked(|| obs.on_become_unobserved());
                }
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
