// ============================================================================
// reactive-graph-core - Type Definitions
// Type-erased traits and shared bookkeeping for the bipartite reactive graph
// ============================================================================
//
// Two type-erased traits enabling heterogeneous storage in
// `Vec<Rc<dyn Trait>>`:
//
// - `Observable` (the "source" side): observers, observersIndex,
//   lowestObserverState, lastAccessedBy, diffValue, isPendingUnobservation.
// - `Derivation` (the "reaction" side): observing, newObserving,
//   dependenciesState, runId, unboundDepsCount.
//
// `ObserverList` and `ObservableCore`/`DerivationCore` are plain (non-trait)
// helper structs that `ObservableValue<T>`, `ComputedValue<T>`, `Atom`, and
// `Reaction` embed and delegate to, implementing their trait by delegation.
// ============================================================================

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use super::constants::*;

// =============================================================================
// TYPE-ERASED TRAITS
// =============================================================================

/// Type-erased interface for the "can be depended on" side of the graph.
///
/// Implemented by `Atom`, `ObservableValue<T>`, and `ComputedValue<T>`.
pub trait Observable: Any {
    fn name(&self) -> &str;

    fn lowest_observer_state(&self) -> i8;
    fn set_lowest_observer_state(&self, state: i8);

    fn last_accessed_by(&self) -> u64;
    fn set_last_accessed_by(&self, run_id: u64);

    /// Scratch field used only during a derivation's dependency rebinding;
    /// 0 when not in a rebinding pass.
    fn diff_value(&self) -> u8;
    fn set_diff_value(&self, value: u8);

    fn is_pending_unobservation(&self) -> bool;
    fn set_pending_unobservation(&self, value: bool);

    fn observer_count(&self) -> usize;
    fn add_observer(&self, derivation: Rc<dyn Derivation>);
    fn remove_observer(&self, derivation: &Rc<dyn Derivation>);
    fn for_each_observer(&self, f: &mut dyn FnMut(&Rc<dyn Derivation>));

    /// Called when the last observer leaves and the closing batch confirms
    /// it stays unobserved. A no-op default for atoms/values with nothing
    /// to tear down; computeds override it to clear their cached value.
    fn on_become_unobserved(&self) {}

    fn as_any(&self) -> &dyn Any;

    /// `Some` if this observable is also a derivation (i.e. a computed
    /// value). `None` for atoms and observable values. Used by the
    /// `POSSIBLY_STALE` confirmation walk in `should_compute`.
    fn as_derivation(&self) -> Option<Rc<dyn Derivation>> {
        None
    }
}

/// Type-erased interface for the "depends on observables" side of the graph.
///
/// Implemented by `ComputedValue<T>` and `Reaction`.
pub trait Derivation: Any {
    fn name(&self) -> &str;

    fn dependencies_state(&self) -> i8;
    fn set_dependencies_state(&self, state: i8);

    /// Monotonically increasing, process-wide; assigned each time the
    /// derivation starts tracking.
    fn run_id(&self) -> u64;
    fn set_run_id(&self, id: u64);

    fn observing_len(&self) -> usize;
    fn observing_at(&self, index: usize) -> Rc<dyn Observable>;
    fn clear_observing(&self);

    // --- `newObserving` scratch buffer, written during a run ---
    fn new_observing_len(&self) -> usize;
    fn new_observing_at(&self, index: usize) -> Rc<dyn Observable>;
    fn push_new_observing(&self, obs: Rc<dyn Observable>);
    fn set_new_observing_at(&self, index: usize, obs: Rc<dyn Observable>);
    fn truncate_new_observing(&self, len: usize);
    fn reset_new_observing(&self, capacity_hint: usize);

    /// Replace `observing` with the deduped, truncated contents of
    /// `newObserving`, then clear the scratch buffer — the last step of
    /// `bind_dependencies`.
    fn commit_observing(&self);

    /// Used by computeds to propagate `POSSIBLY_STALE` to their own
    /// observers, by reactions to enqueue themselves onto the pending
    /// reactions queue.
    fn on_become_stale(&self);

    /// Execute this derivation's reaction body if it is a `Reaction`; a
    /// no-op for computeds, which are pulled lazily via `get()` instead.
    /// Called by `run_reactions` when draining the pending queue.
    fn run_as_reaction(&self) {}

    /// Force this derivation to confirm itself if it is a `ComputedValue`
    /// (recomputing when `should_compute` says so); a no-op for reactions.
    /// Called by a dependent computed's `should_compute` during its
    /// `POSSIBLY_STALE` confirmation walk — the walk only needs the side
    /// effect on `dependencies_state`, never the produced value, so this
    /// stays type-erased rather than routing through `get::<T>()`.
    fn confirm(&self) {}

    fn as_any(&self) -> &dyn Any;

    /// `Some` if this derivation is also an observable (i.e. a computed
    /// value). `None` for reactions. Lets propagation cascade through
    /// computed dependents uniformly.
    fn as_observable(&self) -> Option<Rc<dyn Observable>> {
        None
    }
}

// =============================================================================
// OBSERVER LIST
// =============================================================================

/// The ordered, duplicate-free sequence of derivations observing one
/// observable, plus the sparse index used to remove an entry in O(1).
///
/// Index 0 is never stored in the map — an optimization for the common case
/// of a single observer; removal falls back to a linear scan only in that
/// one case.
pub struct ObserverList {
    observers: RefCell<Vec<Rc<dyn Derivation>>>,
    index: RefCell<HashMap<usize, usize>>,
}

impl ObserverList {
    pub fn new() -> Self {
        Self {
            observers: RefCell::new(Vec::new()),
            index: RefCell::new(HashMap::new()),
        }
    }

    fn ptr_of(d: &Rc<dyn Derivation>) -> usize {
        Rc::as_ptr(d) as *const () as usize
    }

    pub fn len(&self) -> usize {
        self.observers.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a new observer. Caller is responsible for not adding the same
    /// derivation twice; `bind_dependencies` only calls this for freshly
    /// added edges.
    pub fn add(&self, derivation: Rc<dyn Derivation>) {
        let mut observers = self.observers.borrow_mut();
        let idx = observers.len();
        let ptr = Self::ptr_of(&derivation);
        observers.push(derivation);
        if idx > 0 {
            self.index.borrow_mut().insert(ptr, idx);
        }
    }

    /// Remove an observer via swap-with-last, keeping `observers` gap-free
    /// in O(1).
    pub fn remove(&self, derivation: &Rc<dyn Derivation>) {
        let ptr = Self::ptr_of(derivation);
        let mut observers = self.observers.borrow_mut();
        let len = observers.len();
        if len == 0 {
            return;
        }

        let mut idx = self.index.borrow_mut().remove(&ptr).unwrap_or(0);
        if !Rc::ptr_eq(&observers[idx], derivation) {
            // Only reachable if the index map and the caller disagree.
            idx = observers
                .iter()
                .position(|o| Rc::ptr_eq(o, derivation))
                .unwrap_or(idx);
        }

        let last = len - 1;
        if idx != last {
            observers.swap(idx, last);
            let moved_ptr = Self::ptr_of(&observers[idx]);
            if idx > 0 {
                self.index.borrow_mut().insert(moved_ptr, idx);
            } else {
                self.index.borrow_mut().remove(&moved_ptr);
            }
        }
        observers.pop();
    }

    /// Iterate a snapshot of the current observers. Cloning the `Rc`s up
    /// front — rather than iterating the live `RefCell` borrow — means the
    /// callback is free to mutate the graph, including removing itself from
    /// this very list, without a `RefCell` panic.
    pub fn for_each(&self, f: &mut dyn FnMut(&Rc<dyn Derivation>)) {
        let snapshot: Vec<Rc<dyn Derivation>> = self.observers.borrow().clone();
        for d in &snapshot {
            f(d);
        }
    }
}

impl Default for ObserverList {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// OBSERVABLE CORE
// =============================================================================

/// The fields every `Observable` implementor needs. A plain struct, not a
/// trait default, since trait objects can't carry state — concrete types
/// embed one of these and delegate their trait methods to it, the way the
/// teacher's `SourceInner<T>` embeds a `flags: Cell<u32>`.
pub struct ObservableCore {
    name: String,
    observers: ObserverList,
    lowest_observer_state: Cell<i8>,
    last_accessed_by: Cell<u64>,
    diff_value: Cell<u8>,
    is_pending_unobservation: Cell<bool>,
}

impl ObservableCore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            observers: ObserverList::new(),
            lowest_observer_state: Cell::new(UP_TO_DATE),
            last_accessed_by: Cell::new(0),
            diff_value: Cell::new(0),
            is_pending_unobservation: Cell::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lowest_observer_state(&self) -> i8 {
        self.lowest_observer_state.get()
    }

    pub fn set_lowest_observer_state(&self, state: i8) {
        self.lowest_observer_state.set(state);
    }

    pub fn last_accessed_by(&self) -> u64 {
        self.last_accessed_by.get()
    }

    pub fn set_last_accessed_by(&self, run_id: u64) {
        self.last_accessed_by.set(run_id);
    }

    pub fn diff_value(&self) -> u8 {
        self.diff_value.get()
    }

    pub fn set_diff_value(&self, value: u8) {
        self.diff_value.set(value);
    }

    pub fn is_pending_unobservation(&self) -> bool {
        self.is_pending_unobservation.get()
    }

    pub fn set_pending_unobservation(&self, value: bool) {
        self.is_pending_unobservation.set(value);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    pub fn add_observer(&self, derivation: Rc<dyn Derivation>) {
        self.observers.add(derivation);
    }

    pub fn remove_observer(&self, derivation: &Rc<dyn Derivation>) {
        self.observers.remove(derivation);
    }

    pub fn for_each_observer(&self, f: &mut dyn FnMut(&Rc<dyn Derivation>)) {
        self.observers.for_each(f);
    }
}

// =============================================================================
// DERIVATION CORE
// =============================================================================

/// The fields every `Derivation` implementor needs.
pub struct DerivationCore {
    name: String,
    observing: RefCell<Vec<Rc<dyn Observable>>>,
    new_observing: RefCell<Vec<Rc<dyn Observable>>>,
    dependencies_state: Cell<i8>,
    run_id: Cell<u64>,
}

impl DerivationCore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            observing: RefCell::new(Vec::new()),
            new_observing: RefCell::new(Vec::new()),
            dependencies_state: Cell::new(NOT_TRACKING),
            run_id: Cell::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dependencies_state(&self) -> i8 {
        self.dependencies_state.get()
    }

    pub fn set_dependencies_state(&self, state: i8) {
        self.dependencies_state.set(state);
    }

    pub fn run_id(&self) -> u64 {
        self.run_id.get()
    }

    pub fn set_run_id(&self, id: u64) {
        self.run_id.set(id);
    }

    pub fn observing_len(&self) -> usize {
        self.observing.borrow().len()
    }

    pub fn observing_at(&self, index: usize) -> Rc<dyn Observable> {
        self.observing.borrow()[index].clone()
    }

    pub fn clear_observing(&self) {
        self.observing.borrow_mut().clear();
    }

    pub fn new_observing_len(&self) -> usize {
        self.new_observing.borrow().len()
    }

    pub fn new_observing_at(&self, index: usize) -> Rc<dyn Observable> {
        self.new_observing.borrow()[index].clone()
    }

    pub fn push_new_observing(&self, obs: Rc<dyn Observable>) {
        self.new_observing.borrow_mut().push(obs);
    }

    pub fn set_new_observing_at(&self, index: usize, obs: Rc<dyn Observable>) {
        self.new_observing.borrow_mut()[index] = obs;
    }

    pub fn truncate_new_observing(&self, len: usize) {
        self.new_observing.borrow_mut().truncate(len);
    }

    pub fn reset_new_observing(&self, capacity_hint: usize) {
        let mut new_observing = self.new_observing.borrow_mut();
        new_observing.clear();
        new_observing.reserve(capacity_hint);
    }

    pub fn commit_observing(&self) {
        let committed = self.new_observing.borrow_mut().split_off(0);
        *self.observing.borrow_mut() = committed;
    }
}

// =============================================================================
// TESTS
// =============================================================================
