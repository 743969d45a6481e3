// ============================================================================
// reactive-graph-core - Constants
// Derivation staleness levels and tuning constants for the reactive graph
// ============================================================================

// =============================================================================
// DERIVATION STATE
// =============================================================================
//
// A four-valued staleness enumeration with a strict ordering: lower means
// fresher. Plain ordered integers rather than bitmask flags, because the
// propagation algorithms in `reactivity::propagation` compare states with
// `<`/`==` (e.g. "only downgrade from UP_TO_DATE"), which a bitmask would
// make awkward to express faithfully.
// =============================================================================

/// The derivation holds no meaningful observing set: never run, or torn down.
pub const NOT_TRACKING: i8 = -1;

/// Every observed dependency is current.
pub const UP_TO_DATE: i8 = 0;

/// A transitive computed dependency may have changed; must confirm before use.
pub const POSSIBLY_STALE: i8 = 1;

/// A direct (shallow) dependency changed; recompute on next use.
pub const STALE: i8 = 2;

/// Human-readable name for a derivation state, used in diagnostics.
pub fn state_name(state: i8) -> &'static str {
    match state {
        NOT_TRACKING => "NOT_TRACKING",
        UP_TO_DATE => "UP_TO_DATE",
        POSSIBLY_STALE => "POSSIBLY_STALE",
        STALE => "STALE",
        _ => "UNKNOWN",
    }
}

// =============================================================================
// TUNING CONSTANTS
// =============================================================================

/// Number of outer drain-loop iterations in `run_reactions` before a
/// self-retriggering reaction chain is declared cyclic and reported as a
/// fatal diagnostic. The reference implementation uses 100.
pub const DEFAULT_REACTION_REENTRANCY_LIMIT: u32 = 100;

/// Extra capacity reserved on top of the previous `observing` length when
/// allocating a derivation's `newObserving` scratch buffer for a fresh run.
pub const NEW_OBSERVING_CAPACITY_SLACK: usize = 100;

// =============================================================================
// TESTS
// =============================================================================
