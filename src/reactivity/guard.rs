// ============================================================================
// reactive-graph-core - Guard Rails
// Invariant checks: no state mutation while tracking, reentrancy budgets
// ============================================================================
//
// Raises a structured `GraphError` instead of a bare `panic!` so callers
// get a loggable, descriptive error when an invariant is violated.
// ============================================================================

use crate::core::context::with_context;
use crate::errors::GraphError;

/// Raise `GraphError::StateModificationDenied` if writes are currently
/// disallowed (inside a derivation's tracked run, outside an action).
pub fn check_if_state_modifications_are_allowed(what: &str) {
    let allowed = with_context(|ctx| ctx.allow_state_changes());
    if !allowed {
        GraphError::StateModificationDenied(what.to_string()).raise();
    }
}

/// Raise `GraphError::CyclicReactions` if the reaction drain loop has spun
/// past its reentrancy budget without settling.
pub fn check_reentrant_reaction_budget(iterations: u32, limit: u32) {
    if iterations > limit {
        GraphError::CyclicReactions(limit).raise();
    }
}
