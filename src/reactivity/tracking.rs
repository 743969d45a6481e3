// ============================================================================
// reactive-graph-core - Dependency Tracking
// The tracking primitive and the three-pass dependency-rebinding diff
// ============================================================================
//
// Iterative, collect-then-mutate, borrow-safe throughout:
// `track_derived_function` runs a derivation's body under the tracking slot
// and captures user panics instead of letting them corrupt the graph;
// `bind_dependencies` diffs the freshly-collected `new_observing` against the
// previous `observing` using each observable's scratch `diff_value` field.
// ============================================================================

use std::panic::AssertUnwindSafe;
use std::rc::{Rc, Weak};

use crate::core::constants::*;
use crate::core::context::with_context;
use crate::core::types::{Derivation, Observable};
use crate::errors::{CaughtException, TrackedOutcome};
use crate::reactivity::{batching, propagation};

// =============================================================================
// REPORT OBSERVED / REPORT CHANGED
// =============================================================================

/// Record a read of `obs`. The only place a dependency edge is proposed.
/// Called by every observable's `get`/`with`.
pub fn report_observed(obs: &Rc<dyn Observable>) {
    with_context(|ctx| {
        if ctx.is_untracking() {
            return;
        }
        match ctx.tracking_derivation() {
            Some(derivation) => {
                if obs.last_accessed_by() != derivation.run_id() {
                    obs.set_last_accessed_by(derivation.run_id());
                    derivation.push_new_observing(obs.clone());
                }
            }
            None => {
                if obs.observer_count() == 0 {
                    queue_for_unobservation(obs);
                }
            }
        }
    });
}

/// Announce that `obs` changed. Opens a batch if none is already open, then
/// runs `propagate_changed`, which must run inside a batch.
pub fn report_changed(obs: &Rc<dyn Observable>) {
    let opened = !with_context(|ctx| ctx.is_batching());
    if opened {
        batching::start_batch();
    }
    propagation::propagate_changed(obs);
    if opened {
        batching::end_batch();
    }
}

// =============================================================================
// UNOBSERVATION QUEUE
// =============================================================================

/// Queue `obs` for an end-of-batch unobservation check, unless it's already
/// queued (idempotent — this is what keeps invariant I7).
pub fn queue_for_unobservation(obs: &Rc<dyn Observable>) {
    if obs.is_pending_unobservation() {
        return;
    }
    obs.set_pending_unobservation(true);
    with_context(|ctx| ctx.schedule_unobservation(Rc::downgrade(obs)));
}

// =============================================================================
// OBSERVER EDGE MAINTENANCE
// =============================================================================

fn add_observer(obs: &Rc<dyn Observable>, d: &Rc<dyn Derivation>) {
    obs.add_observer(d.clone());
}

/// Swap-remove `d` from `obs`'s observer list; if that empties it, queue it
/// for unobservation.
fn remove_observer(obs: &Rc<dyn Observable>, d: &Rc<dyn Derivation>) {
    obs.remove_observer(d);
    if obs.observer_count() == 0 {
        queue_for_unobservation(obs);
    }
}

/// Detach `d` from every observable it currently depends on, and empty its
/// `observing`. Used by a computed's `on_become_unobserved` and by reaction
/// disposal.
pub fn clear_observing(d: &Rc<dyn Derivation>) {
    for i in 0..d.observing_len() {
        let obs = d.observing_at(i);
        remove_observer(&obs, d);
    }
    d.clear_observing();
}

/// Force `d` and every observable it currently observes back to
/// `UP_TO_DATE`. Used at the start of `track_derived_function` (keeps I3
/// tight going into a run) and by `should_compute`'s successful
/// `POSSIBLY_STALE` confirmation.
pub fn change_dependencies_state_to_0(d: &Rc<dyn Derivation>) {
    if d.dependencies_state() == UP_TO_DATE {
        return;
    }
    d.set_dependencies_state(UP_TO_DATE);
    for i in 0..d.observing_len() {
        d.observing_at(i).set_lowest_observer_state(UP_TO_DATE);
    }
}

// =============================================================================
// SHOULD COMPUTE
// =============================================================================

/// Decide whether `d` needs to re-run its tracked function before its
/// cached output (a computed's value, a reaction's side effect) can be
/// trusted. Shared by `ComputedValue<T>` and
/// `Reaction`, since the `POSSIBLY_STALE` confirmation walk is identical for
/// both — it only ever needs the side effect on `dependencies_state`, never
/// a concrete return value, which is exactly why `Derivation::confirm` stays
/// type-erased.
pub fn should_compute(d: &Rc<dyn Derivation>) -> bool {
    match d.dependencies_state() {
        UP_TO_DATE => false,
        NOT_TRACKING | STALE => true,
        POSSIBLY_STALE => {
            let settled = batching::untracked(|| {
                for i in 0..d.observing_len() {
                    let obs = d.observing_at(i);
                    if let Some(dep) = obs.as_derivation() {
                        // Force the dependency to confirm itself; if it
                        // recomputes and propagates a real change, this
                        // derivation's own dependencies_state is pushed to
                        // STALE by that cascade.
                        dep.confirm();
                        if d.dependencies_state() == STALE {
                            return false;
                        }
                    }
                }
                true
            });

            if settled {
                change_dependencies_state_to_0(d);
                false
            } else {
                true
            }
        }
        _ => true,
    }
}

// =============================================================================
// TRACK DERIVED FUNCTION
// =============================================================================

/// Run `f` with `d` on the tracking slot, capturing panics instead of
/// letting them corrupt the graph. Dependency bookkeeping
/// (`bind_dependencies`) always completes, even if `f` panicked.
pub fn track_derived_function<T>(d: &Rc<dyn Derivation>, f: impl FnOnce() -> T) -> TrackedOutcome<T> {
    change_dependencies_state_to_0(d);

    let capacity_hint = d.observing_len() + NEW_OBSERVING_CAPACITY_SLACK;
    d.reset_new_observing(capacity_hint);

    let run_id = with_context(|ctx| ctx.next_run_id());
    d.set_run_id(run_id);

    let previous = with_context(|ctx| ctx.set_tracking_derivation(Some(Rc::downgrade(d))));

    let result = std::panic::catch_unwind(AssertUnwindSafe(f));

    with_context(|ctx| {
        ctx.set_tracking_derivation(previous);
    });

    bind_dependencies(d);

    match result {
        Ok(value) => TrackedOutcome::Value(value),
        Err(payload) => TrackedOutcome::Caught(CaughtException::from_panic_payload(payload)),
    }
}

// =============================================================================
// BIND DEPENDENCIES — the three-pass diff
// =============================================================================

/// Diff `d.new_observing` (collected during the just-finished run) against
/// `d.observing` (the previous run's set), using each observable's scratch
/// `diff_value` field, then commit the result as the new `observing`.
///
/// Three passes over `diff_value`:
///
/// - **A (dedup new)**: compact `new_observing` to first-occurrence order,
///   marking each unique observable's `diff_value = 1`.
/// - **B (drop dead edges)**: walk the previous `observing` back-to-front;
///   anything still at `diff_value == 0` (not seen in pass A) is detached.
///   Every entry's `diff_value` is reset to 0 regardless, which is what lets
///   pass C tell "freshly added" apart from "already an observer".
/// - **C (add new edges)**: walk the compacted new set back-to-front;
///   anything still at `diff_value == 1` (pass B didn't touch it, so it
///   wasn't in the old set) is a fresh edge.
pub fn bind_dependencies(d: &Rc<dyn Derivation>) {
    let unbound = d.new_observing_len();
    let mut write_cursor = 0usize;
    for read in 0..unbound {
        let obs = d.new_observing_at(read);
        if obs.diff_value() == 0 {
            obs.set_diff_value(1);
            if write_cursor != read {
                d.set_new_observing_at(write_cursor, obs);
            }
            write_cursor += 1;
        }
    }
    d.truncate_new_observing(write_cursor);

    for i in (0..d.observing_len()).rev() {
        let obs = d.observing_at(i);
        if obs.diff_value() == 0 {
            remove_observer(&obs, d);
        }
        obs.set_diff_value(0);
    }

    for i in (0..d.new_observing_len()).rev() {
        let obs = d.new_observing_at(i);
        if obs.diff_value() == 1 {
            obs.set_diff_value(0);
            add_observer(&obs, d);
        }
    }

    d.commit_observing();
}

// =============================================================================
// UNTRACKED SCOPE
// =============================================================================

/// Save-and-null the tracking slot. Returns the previous value to pass to
/// `untracked_end`.
pub fn untracked_start() -> Option<Weak<dyn Derivation>> {
    with_context(|ctx| {
        ctx.enter_untracked();
        ctx.set_tracking_derivation(None)
    })
}

/// Restore the tracking slot saved by `untracked_start`.
pub fn untracked_end(previous: Option<Weak<dyn Derivation>>) {
    with_context(|ctx| {
        ctx.exit_untracked();
        ctx.set_tracking_derivation(previous);
    });
}

// =============================================================================
// TESTS
// =============================================================================
