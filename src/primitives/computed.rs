// ============================================================================
// reactive-graph-core - Computed Value
// A lazily-evaluated derivation that is also an observable
// ============================================================================
//
// One inner struct implements both the Observable and Derivation trait
// sides via a `self_ref: RefCell<Weak<Self>>`, using the exact
// `shouldCompute`/`POSSIBLY_STALE`-confirmation algorithm for deciding when
// a recompute is actually warranted, rather than a write-version cascade.
// ============================================================================

use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::core::constants::*;
use crate::core::context::with_context;
use crate::core::types::{Derivation, DerivationCore, Observable, ObservableCore};
use crate::errors::{CaughtException, TrackedOutcome};
use crate::reactivity::equality::{equals, EqualsFn};
use crate::reactivity::propagation::{propagate_change_confirmed, propagate_maybe_changed};
use crate::reactivity::tracking::{clear_observing, should_compute, track_derived_function};

// =============================================================================
// COMPUTED VALUE INNER
// =============================================================================

/// What `get()` returns for one completed run: either a usable value or a
/// caught user-function panic, re-raised on every subsequent `get()` until
/// a dependency change lets the getter succeed.
enum Cached<T> {
    Value(T),
    Caught(CaughtException),
}

struct ComputedValueInner<T> {
    observable: ObservableCore,
    derivation: DerivationCore,
    getter: RefCell<Box<dyn Fn() -> T>>,
    equals: EqualsFn<T>,
    cached: RefCell<Option<Cached<T>>>,
    self_ref: RefCell<Weak<ComputedValueInner<T>>>,
}

impl<T: 'static> ComputedValueInner<T> {
    fn as_observable_rc(&self) -> Rc<dyn Observable> {
        self.self_ref
            .borrow()
            .upgrade()
            .expect("self_ref always set immediately after construction")
    }

    fn as_derivation_rc(&self) -> Rc<dyn Derivation> {
        self.self_ref
            .borrow()
            .upgrade()
            .expect("self_ref always set immediately after construction")
    }

    /// The core recomputation step: run the getter under tracking, compare
    /// against the cached value, and commit only if it actually differs.
    ///
    /// State mutation is disallowed for the duration of the getter, the same
    /// way `notify_write` treats any write made while a derivation is
    /// tracking as a guard violation: a computed's getter must be pure, and
    /// writing to an observable from inside one should panic rather than
    /// silently succeed.
    fn recompute(&self) {
        let d = self.as_derivation_rc();
        let getter = self.getter.borrow();

        let previous = with_context(|ctx| ctx.set_allow_state_changes(false));
        struct RestoreGuard(bool);
        impl Drop for RestoreGuard {
            fn drop(&mut self) {
                with_context(|ctx| ctx.set_allow_state_changes(self.0));
            }
        }
        let _guard = RestoreGuard(previous);

        let outcome = track_derived_function(&d, || (getter)());

        let new_cached = match outcome {
            TrackedOutcome::Value(v) => Cached::Value(v),
            TrackedOutcome::Caught(e) => Cached::Caught(e),
        };

        let changed = match (&*self.cached.borrow(), &new_cached) {
            (Some(Cached::Value(old)), Cached::Value(new)) => !(self.equals)(old, new),
            // A caught exception always counts as a change from whatever was
            // cached before, and vice versa — the state genuinely differs.
            _ => true,
        };

        *self.cached.borrow_mut() = Some(new_cached);

        if changed {
            propagate_change_confirmed(&self.as_observable_rc());
        } else {
            // Value unchanged: tell observers this branch of the graph
            // settled back to current without needing to re-run them.
            self.as_observable_rc().set_lowest_observer_state(UP_TO_DATE);
        }
    }

    /// Decides whether a recompute is actually warranted, shared with
    /// `Reaction` via `reactivity::tracking::should_compute`.
    fn should_compute(&self) -> bool {
        should_compute(&self.as_derivation_rc())
    }
}

impl<T: 'static> Observable for ComputedValueInner<T> {
    fn name(&self) -> &str {
        self.observable.name()
    }
    fn lowest_observer_state(&self) -> i8 {
        self.observable.lowest_observer_state()
    }
    fn set_lowest_observer_state(&self, state: i8) {
        self.observable.set_lowest_observer_state(state)
    }
    fn last_accessed_by(&self) -> u64 {
        self.observable.last_accessed_by()
    }
    fn set_last_accessed_by(&self, run_id: u64) {
        self.observable.set_last_accessed_by(run_id)
    }
    fn diff_value(&self) -> u8 {
        self.observable.diff_value()
    }
    fn set_diff_value(&self, value: u8) {
        self.observable.set_diff_value(value)
    }
    fn is_pending_unobservation(&self) -> bool {
        self.observable.is_pending_unobservation()
    }
    fn set_pending_unobservation(&self, value: bool) {
        self.observable.set_pending_unobservation(value)
    }
    fn observer_count(&self) -> usize {
        self.observable.observer_count()
    }
    fn add_observer(&self, derivation: Rc<dyn Derivation>) {
        self.observable.add_observer(derivation)
    }
    fn remove_observer(&self, derivation: &Rc<dyn Derivation>) {
        self.observable.remove_observer(derivation)
    }
    fn for_each_observer(&self, f: &mut dyn FnMut(&Rc<dyn Derivation>)) {
        self.observable.for_each_observer(f)
    }

    /// Fires when the last observer goes away: drop the cached value and
    /// every dependency edge, so the next `get()` retracks from scratch.
    fn on_become_unobserved(&self) {
        let d = self.as_derivation_rc();
        clear_observing(&d);
        self.derivation.set_dependencies_state(NOT_TRACKING);
        *self.cached.borrow_mut() = None;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_derivation(&self) -> Option<Rc<dyn Derivation>> {
        Some(self.as_derivation_rc())
    }
}

impl<T: 'static> Derivation for ComputedValueInner<T> {
    fn name(&self) -> &str {
        self.derivation.name()
    }
    fn dependencies_state(&self) -> i8 {
        self.derivation.dependencies_state()
    }
    fn set_dependencies_state(&self, state: i8) {
        self.derivation.set_dependencies_state(state)
    }
    fn run_id(&self) -> u64 {
        self.derivation.run_id()
    }
    fn set_run_id(&self, id: u64) {
        self.derivation.set_run_id(id)
    }
    fn observing_len(&self) -> usize {
        self.derivation.observing_len()
    }
    fn observing_at(&self, index: usize) -> Rc<dyn Observable> {
        self.derivation.observing_at(index)
    }
    fn clear_observing(&self) {
        self.derivation.clear_observing()
    }
    fn new_observing_len(&self) -> usize {
        self.derivation.new_observing_len()
    }
    fn new_observing_at(&self, index: usize) -> Rc<dyn Observable> {
        self.derivation.new_observing_at(index)
    }
    fn push_new_observing(&self, obs: Rc<dyn Observable>) {
        self.derivation.push_new_observing(obs)
    }
    fn set_new_observing_at(&self, index: usize, obs: Rc<dyn Observable>) {
        self.derivation.set_new_observing_at(index, obs)
    }
    fn truncate_new_observing(&self, len: usize) {
        self.derivation.truncate_new_observing(len)
    }
    fn reset_new_observing(&self, capacity_hint: usize) {
        self.derivation.reset_new_observing(capacity_hint)
    }
    fn commit_observing(&self) {
        self.derivation.commit_observing()
    }

    /// Rides `POSSIBLY_STALE` downstream in O(depth); no recomputation here.
    fn on_become_stale(&self) {
        propagate_maybe_changed(&self.as_observable_rc());
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_observable(&self) -> Option<Rc<dyn Observable>> {
        Some(self.as_observable_rc())
    }

    /// Called during a confirmation walk when a dependent needs this
    /// computed's current value: recompute if still warranted.
    fn confirm(&self) {
        if self.should_compute() {
            self.recompute();
        }
    }
}

// =============================================================================
// COMPUTED VALUE - public handle
// =============================================================================

/// A memoized derivation that is also an observable.
#[derive(Clone)]
pub struct ComputedValue<T> {
    inner: Rc<ComputedValueInner<T>>,
}

impl<T: Clone + 'static> ComputedValue<T> {
    pub fn new(name: impl Into<String>, getter: impl Fn() -> T + 'static) -> Self
    where
        T: PartialEq,
    {
        Self::build(name, getter, equals)
    }

    pub fn new_with_equals(
        name: impl Into<String>,
        getter: impl Fn() -> T + 'static,
        equals: EqualsFn<T>,
    ) -> Self {
        Self::build(name, getter, equals)
    }

    fn build(name: impl Into<String>, getter: impl Fn() -> T + 'static, equals: EqualsFn<T>) -> Self {
        let name = name.into();
        let inner = Rc::new(ComputedValueInner {
            observable: ObservableCore::new(name.clone()),
            derivation: DerivationCore::new(name),
            getter: RefCell::new(Box::new(getter)),
            equals,
            cached: RefCell::new(None),
            self_ref: RefCell::new(Weak::new()),
        });
        *inner.self_ref.borrow_mut() = Rc::downgrade(&inner);
        Self { inner }
    }

    pub fn name(&self) -> &str {
        self.inner.observable.name()
    }

    pub fn as_observable(&self) -> Rc<dyn Observable> {
        self.inner.clone()
    }

    pub fn as_derivation(&self) -> Rc<dyn Derivation> {
        self.inner.clone()
    }

    /// Read the computed value, recomputing first if `should_compute` says
    /// the cache can no longer be trusted. Re-raises a caught getter panic.
    pub fn get(&self) -> T {
        if self.inner.should_compute() || self.inner.cached.borrow().is_none() {
            self.inner.recompute();
        }
        crate::reactivity::tracking::report_observed(&self.as_observable());
        match self.inner.cached.borrow().as_ref().expect("recompute always populates cached") {
            Cached::Value(v) => v.clone(),
            Cached::Caught(e) => e.rethrow(),
        }
    }
}

/// Create a computed value with default (`PartialEq`) equality.
pub fn computed<T, F>(getter: F) -> ComputedValue<T>
where
    T: Clone + PartialEq + 'static,
    F: Fn() -> T + 'static,
{
    ComputedValue::new("computed", getter)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::observable_value::observable;
    use std::cell::Cell as StdCell;

    #[test]
    fn computed_caches_and_recomputes_on_dependency_change() {
        let calls = Rc::new(StdCell::new(0));
        let a = observable(1);

        let a2 = a.clone();
        let calls2 = calls.clone();
        let c = computed(move || {
            calls2.set(calls2.get() + 1);
            a2.get() * 2
        });

        assert_eq!(c.get(), 2);
        assert_eq!(calls.get(), 1);

        assert_eq!(c.get(), 2); // cached, no recompute
        assert_eq!(calls.get(), 1);

        a.set(5);
        assert_eq!(c.get(), 10);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn computed_diamond_recomputes_once_per_shared_root_change() {
        let a = observable(1);
        let calls_d = Rc::new(StdCell::new(0));

        let a1 = a.clone();
        let b = computed(move || a1.get() + 10);
        let a2 = a.clone();
        let c = computed(move || a2.get() * 10);

        let b2 = b.clone();
        let c2 = c.clone();
        let calls_d2 = calls_d.clone();
        let d = computed(move || {
            calls_d2.set(calls_d2.get() + 1);
            b2.get() + c2.get()
        });

        assert_eq!(d.get(), 21);
        assert_eq!(calls_d.get(), 1);

        a.set(2);
        assert_eq!(d.get(), 32);
        assert_eq!(calls_d.get(), 2);
    }

    #[test]
    fn exception_in_getter_is_caught_and_rethrown_on_get() {
        let a = observable(1);
        let a2 = a.clone();
        let c = computed(move || {
            if a2.get() < 0 {
                panic!("negative");
            }
            a2.get()
        });

        assert_eq!(c.get(), 1);
        a.set(-1);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| c.get()));
        assert!(result.is_err());

        a.set(7);
        assert_eq!(c.get(), 7);
    }

    #[test]
    fn on_become_unobserved_clears_cache_and_dependencies() {
        let a = observable(1);
        let a2 = a.clone();
        let c = computed(move || a2.get() * 2);

        assert_eq!(c.get(), 2);
        assert_eq!(a.observer_count(), 1);

        c.as_observable().on_become_unobserved();
        assert_eq!(a.observer_count(), 0);
    }
}
