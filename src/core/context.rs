// ============================================================================
// reactive-graph-core - Global State
// Thread-local state shared by every observable and derivation
// ============================================================================
//
// A single struct behind `thread_local!`, accessed via `with_context`,
// carrying the fields: `tracking_derivation`, `run_id`, `in_batch`,
// `pending_reactions`, `pending_unobservations`, `allow_state_changes`,
// `is_running_reactions`.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use super::types::{Derivation, Observable};

// =============================================================================
// GLOBAL STATE
// =============================================================================

/// Thread-local state for one reactive graph. There is exactly one tracking
/// slot: at most one derivation runs at a time (the graph is single-threaded
/// cooperative), so a single `Option` suffices — no stack is
/// needed because a derivation that reads another derivation's value does
/// so through that derivation's own tracked run, not by nesting this slot.
pub struct GlobalState {
    /// The derivation currently collecting dependencies, if any.
    pub tracking_derivation: RefCell<Option<Weak<dyn Derivation>>>,

    /// How many nested `untracked` scopes are currently open. While this is
    /// nonzero, reads do not report themselves to `tracking_derivation` even
    /// though a derivation may be "active" around the untracked block.
    pub untracked_depth: Cell<u32>,

    /// Monotonically increasing counter; a fresh value is assigned each time
    /// a derivation starts tracking, and stamped onto every observable it
    /// reads (`last_accessed_by`) to detect which dependencies survived a
    /// rebinding pass.
    pub run_id: Cell<u64>,

    /// Current batch nesting depth; reactions only run when this returns to
    /// zero.
    pub in_batch: Cell<u32>,

    /// Reactions scheduled to run when the outermost batch closes. Stored
    /// weak: a reaction that was dropped before the batch closes is simply
    /// skipped, it does not keep the reaction alive.
    pub pending_reactions: RefCell<Vec<Weak<dyn Derivation>>>,

    /// Observables that lost their last observer during the current batch
    /// and are waiting for batch-close confirmation that they stay
    /// unobserved (an observer could be re-added before the batch ends).
    pub pending_unobservations: RefCell<Vec<Weak<dyn Observable>>>,

    /// Whether writes to observable state are currently permitted. False
    /// while a derivation's tracked function is executing outside of an
    /// `action`.
    pub allow_state_changes: Cell<bool>,

    /// Reentrancy guard for `run_reactions`: true while the pending-reaction
    /// drain loop is executing, used to detect a reaction scheduling itself
    /// into an already-draining queue.
    pub is_running_reactions: Cell<bool>,
}

impl GlobalState {
    pub fn new() -> Self {
        Self {
            tracking_derivation: RefCell::new(None),
            untracked_depth: Cell::new(0),
            run_id: Cell::new(0),
            in_batch: Cell::new(0),
            pending_reactions: RefCell::new(Vec::new()),
            pending_unobservations: RefCell::new(Vec::new()),
            allow_state_changes: Cell::new(true),
            is_running_reactions: Cell::new(false),
        }
    }

    // =========================================================================
    // TRACKING DERIVATION
    // =========================================================================

    pub fn set_tracking_derivation(
        &self,
        derivation: Option<Weak<dyn Derivation>>,
    ) -> Option<Weak<dyn Derivation>> {
        self.tracking_derivation.replace(derivation)
    }

    pub fn tracking_derivation(&self) -> Option<Rc<dyn Derivation>> {
        self.tracking_derivation
            .borrow()
            .as_ref()
            .and_then(Weak::upgrade)
    }

    pub fn has_tracking_derivation(&self) -> bool {
        self.tracking_derivation.borrow().is_some()
    }

    // =========================================================================
    // UNTRACKED SCOPES
    // =========================================================================

    pub fn enter_untracked(&self) -> u32 {
        let depth = self.untracked_depth.get() + 1;
        self.untracked_depth.set(depth);
        depth
    }

    pub fn exit_untracked(&self) -> u32 {
        let depth = self.untracked_depth.get().saturating_sub(1);
        self.untracked_depth.set(depth);
        depth
    }

    pub fn is_untracking(&self) -> bool {
        self.untracked_depth.get() > 0
    }

    // =========================================================================
    // RUN ID
    // =========================================================================

    /// Allocate a fresh run id, used both as a derivation's `runId` for one
    /// tracked execution and as the `lastAccessedBy` stamp on every
    /// observable it reads.
    pub fn next_run_id(&self) -> u64 {
        let id = self.run_id.get() + 1;
        self.run_id.set(id);
        id
    }

    // =========================================================================
    // BATCHING
    // =========================================================================

    pub fn enter_batch(&self) -> u32 {
        let depth = self.in_batch.get() + 1;
        self.in_batch.set(depth);
        depth
    }

    pub fn exit_batch(&self) -> u32 {
        let depth = self.in_batch.get().saturating_sub(1);
        self.in_batch.set(depth);
        depth
    }

    pub fn is_batching(&self) -> bool {
        self.in_batch.get() > 0
    }

    pub fn schedule_reaction(&self, reaction: Weak<dyn Derivation>) {
        self.pending_reactions.borrow_mut().push(reaction);
    }

    pub fn take_pending_reactions(&self) -> Vec<Weak<dyn Derivation>> {
        self.pending_reactions.replace(Vec::new())
    }

    pub fn has_pending_reactions(&self) -> bool {
        !self.pending_reactions.borrow().is_empty()
    }

    pub fn schedule_unobservation(&self, observable: Weak<dyn Observable>) {
        self.pending_unobservations.borrow_mut().push(observable);
    }

    pub fn take_pending_unobservations(&self) -> Vec<Weak<dyn Observable>> {
        self.pending_unobservations.replace(Vec::new())
    }

    // =========================================================================
    // STATE-CHANGE PERMISSION
    // =========================================================================

    pub fn set_allow_state_changes(&self, value: bool) -> bool {
        self.allow_state_changes.replace(value)
    }

    pub fn allow_state_changes(&self) -> bool {
        self.allow_state_changes.get()
    }

    // =========================================================================
    // REACTION-DRAIN REENTRANCY
    // =========================================================================

    pub fn set_running_reactions(&self, value: bool) -> bool {
        self.is_running_reactions.replace(value)
    }

    pub fn is_running_reactions(&self) -> bool {
        self.is_running_reactions.get()
    }
}

impl Default for GlobalState {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// THREAD-LOCAL ACCESS
// =============================================================================

thread_local! {
    static CONTEXT: GlobalState = GlobalState::new();
}

/// Access the thread-local graph state.
pub fn with_context<R>(f: impl FnOnce(&GlobalState) -> R) -> R {
    CONTEXT.with(f)
}

// =============================================================================
// CONVENIENCE FUNCTIONS
// =============================================================================

/// True when a derivation is actively collecting dependencies (i.e. a read
/// right now would be tracked).
pub fn is_tracking() -> bool {
    with_context(|ctx| ctx.has_tracking_derivation() && !ctx.is_untracking())
}

pub fn is_untracking() -> bool {
    with_context(|ctx| ctx.is_untracking())
}

pub fn is_batching() -> bool {
    with_context(|ctx| ctx.is_batching())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_defaults() {
        with_context(|ctx| {
            assert_eq!(ctx.run_id.get(), 0);
            assert!(!ctx.has_tracking_derivation());
            assert!(!ctx.is_untracking());
            assert_eq!(ctx.in_batch.get(), 0);
            assert!(ctx.allow_state_changes());
            assert!(!ctx.is_running_reactions());
        });
    }

    #[test]
    fn run_id_increases_monotonically() {
        with_context(|ctx| {
            let a = ctx.next_run_id();
            let b = ctx.next_run_id();
            assert!(b > a);
        });
    }

    #[test]
    fn batch_depth_nests() {
        with_context(|ctx| {
            assert!(!ctx.is_batching());
            assert_eq!(ctx.enter_batch(), 1);
            assert_eq!(ctx.enter_batch(), 2);
            assert!(ctx.is_batching());
            assert_eq!(ctx.exit_batch(), 1);
            assert_eq!(ctx.exit_batch(), 0);
            assert!(!ctx.is_batching());
        });
    }

    #[test]
    fn untracked_depth_nests() {
        with_context(|ctx| {
            assert!(!ctx.is_untracking());
            ctx.enter_untracked();
            ctx.enter_untracked();
            assert!(ctx.is_untracking());
            ctx.exit_untracked();
            assert!(ctx.is_untracking());
            ctx.exit_untracked();
            assert!(!ctx.is_untracking());
        });
    }

    #[test]
    fn convenience_functions_report_no_tracking_initially() {
        assert!(!is_tracking());
        assert!(!is_untracking());
        assert!(!is_batching());
    }
}
