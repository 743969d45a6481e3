// ============================================================================
// reactive-graph-core
// The dependency-tracking graph and propagation core of a transparent
// functional-reactive state engine
// ============================================================================
//
// Four pieces wire together into the bipartite observable/derivation graph:
//
// - `core` — the type-erased `Observable`/`Derivation` traits, the
//   thread-local `GlobalState`, and the staleness-level constants.
// - `reactivity` — the algorithms that operate on that graph: dependency
//   tracking and rebinding, the three propagation functions, the batch
//   controller, and the state-mutation guard rails.
// - `primitives` — the four concrete node kinds built on top: `Atom`,
//   `ObservableValue<T>`, `ComputedValue<T>`, `Reaction`.
// - `errors` — the `GraphError`/`CaughtException` split described below.
//
// Observable containers, action-wrapper syntax, and decorator sugar are
// external collaborators this crate does not implement — only their
// contracts (`report_observed`/`report_changed`, `start_batch`/`end_batch`,
// `allow_state_changes`) are exposed for them to call into.
// ============================================================================

pub mod core;
pub mod errors;
pub mod primitives;
pub mod reactivity;

// Re-export core items at the crate root for ergonomic access.
pub use crate::core::constants::{self, state_name, NOT_TRACKING, POSSIBLY_STALE, STALE, UP_TO_DATE};
pub use crate::core::context::{is_batching, is_tracking, is_untracking, with_context};
pub use crate::core::types::{Derivation, Observable};
pub use errors::{CaughtException, GraphError, TrackedOutcome};

// Re-export the four primitives and their top-level constructors.
pub use primitives::{
    atom, autorun, autorun_with_error_handler, computed, observable, observable_named, reaction,
    Atom, Change, ChangeType, ComputedValue, ObservableValue, Reaction,
};

// Re-export the tracking/propagation/batching surface collaborators call into.
pub use reactivity::batching::{batch, untracked};
pub use reactivity::equality::{always_equals, deep_equals, equals, never_equals, EqualsFn};
pub use reactivity::tracking::{report_changed, report_observed};

/// Run `f` with state mutation permitted, inside a batch: opens/closes the
/// batch and flips the "state modifications allowed" flag around the call.
/// The contract, not the syntax sugar (decorators, automatic binding)
/// belongs to this core; this is the minimal composition of `batch` and
/// `allow_state_changes` collaborators build on top of.
pub fn action<T>(f: impl FnOnce() -> T) -> T {
    let previous = with_context(|ctx| ctx.set_allow_state_changes(true));
    struct RestoreGuard(bool);
    impl Drop for RestoreGuard {
        fn drop(&mut self) {
            with_context(|ctx| ctx.set_allow_state_changes(self.0));
        }
    }
    let _guard = RestoreGuard(previous);
    batch(f)
}

// =============================================================================
// TESTS
// =============================================================================
