// ============================================================================
// reactive-graph-core - Atom
// The minimal observable node external containers attach to
// ============================================================================
//
// A thin public wrapper around an `Rc`-held inner struct, trimmed to
// exactly two operations: `reportObserved`/`reportChanged`. An atom carries
// no value of its own — `ObservableValue<T>` and `ComputedValue<T>` embed
// one the same way a container would.
// ============================================================================

use std::any::Any;
use std::rc::Rc;

use crate::core::types::{Derivation, Observable, ObservableCore};
use crate::reactivity::tracking::{report_changed, report_observed};

// =============================================================================
// ATOM INNER
// =============================================================================

struct AtomInner {
    core: ObservableCore,
}

impl Observable for AtomInner {
    fn name(&self) -> &str {
        self.core.name()
    }
    fn lowest_observer_state(&self) -> i8 {
        self.core.lowest_observer_state()
    }
    fn set_lowest_observer_state(&self, state: i8) {
        self.core.set_lowest_observer_state(state)
    }
    fn last_accessed_by(&self) -> u64 {
        self.core.last_accessed_by()
    }
    fn set_last_accessed_by(&self, run_id: u64) {
        self.core.set_last_accessed_by(run_id)
    }
    fn diff_value(&self) -> u8 {
        self.core.diff_value()
    }
    fn set_diff_value(&self, value: u8) {
        self.core.set_diff_value(value)
    }
    fn is_pending_unobservation(&self) -> bool {
        self.core.is_pending_unobservation()
    }
    fn set_pending_unobservation(&self, value: bool) {
        self.core.set_pending_unobservation(value)
    }
    fn observer_count(&self) -> usize {
        self.core.observer_count()
    }
    fn add_observer(&self, derivation: Rc<dyn Derivation>) {
        self.core.add_observer(derivation)
    }
    fn remove_observer(&self, derivation: &Rc<dyn Derivation>) {
        self.core.remove_observer(derivation)
    }
    fn for_each_observer(&self, f: &mut dyn FnMut(&Rc<dyn Derivation>)) {
        self.core.for_each_observer(f)
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

// =============================================================================
// ATOM - public handle
// =============================================================================

/// The smallest observable: a leaf in the dependency graph with no value of
/// its own. External containers (a custom collection, a resource handle)
/// attach one to get `reportObserved`/`reportChanged` for free.
#[derive(Clone)]
pub struct Atom {
    inner: Rc<AtomInner>,
}

impl Atom {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(AtomInner {
                core: ObservableCore::new(name),
            }),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.core.name()
    }

    /// Record a read of this atom against the currently tracking derivation,
    /// if any. The only place a dependency edge onto this atom is proposed.
    pub fn report_observed(&self) {
        report_observed(&self.as_observable());
    }

    /// Announce that the value this atom represents changed. Opens a batch
    /// if one isn't already open.
    pub fn report_changed(&self) {
        report_changed(&self.as_observable());
    }

    pub fn as_observable(&self) -> Rc<dyn Observable> {
        self.inner.clone()
    }
}

impl std::fmt::Debug for Atom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Atom").field("name", &self.name()).finish()
    }
}

/// Create a standalone atom.
pub fn atom(name: impl Into<String>) -> Atom {
    Atom::new(name)
}

// =============================================================================
// TESTS
// =============================================================================
