// ============================================================================
// reactive-graph-core - Propagation Algorithms
// The three staleness-propagation algorithms driven by a write or a confirm
// ============================================================================
//
// Kept as three distinct functions on purpose: an atom write, a computed's
// confirmed change, and a computed's "might have changed" each cascade
// differently, and folding them into one function is where dirty-checking
// models tend to under- or over-fire.
// ============================================================================

use std::rc::Rc;

use crate::core::constants::*;
use crate::core::types::Observable;

/// An atom (or observable value) changed. Every direct observer becomes
/// `STALE`; computed observers that were previously confirmed current get
/// their `on_become_stale` hook fired once before the downgrade.
pub fn propagate_changed(obs: &Rc<dyn Observable>) {
    if obs.lowest_observer_state() == STALE {
        return;
    }
    obs.set_lowest_observer_state(STALE);

    obs.for_each_observer(&mut |d| {
        if d.dependencies_state() == UP_TO_DATE {
            d.on_become_stale();
        }
        d.set_dependencies_state(STALE);
    });
}

/// A computed just finished recomputing and its value actually changed.
/// Mirrors `propagate_changed` for direct observers, except for one subtlety:
/// an observer caught mid-`UP_TO_DATE` (i.e. it is itself the derivation
/// currently confirming this very computed, re-entrantly) has
/// `obs.lowestObserverState` raised back to `UP_TO_DATE` instead of staying
/// at `STALE`, so a self-rerunning computed chain doesn't lock the floor at
/// `STALE` forever. See `self_rerunning_computed_keeps_lowest_observer_state_unlocked`
/// in `tests/propagation_open_question.rs`.
pub fn propagate_change_confirmed(obs: &Rc<dyn Observable>) {
    if obs.lowest_observer_state() == STALE {
        return;
    }
    obs.set_lowest_observer_state(STALE);

    obs.for_each_observer(&mut |d| {
        let state = d.dependencies_state();
        if state == POSSIBLY_STALE {
            d.set_dependencies_state(STALE);
        } else if state == UP_TO_DATE {
            obs.set_lowest_observer_state(UP_TO_DATE);
        }
    });
}

/// A computed's dependency changed but hasn't been confirmed to actually
/// differ yet. Downgrades only observers that were fully `UP_TO_DATE` to
/// `POSSIBLY_STALE`, and lets `on_become_stale` cascade the same downgrade
/// further downstream — this is how `POSSIBLY_STALE` rides O(depth) without
/// forcing any recomputation.
pub fn propagate_maybe_changed(obs: &Rc<dyn Observable>) {
    if obs.lowest_observer_state() != UP_TO_DATE {
        return;
    }
    obs.set_lowest_observer_state(POSSIBLY_STALE);

    obs.for_each_observer(&mut |d| {
        if d.dependencies_state() == UP_TO_DATE {
            d.set_dependencies_state(POSSIBLY_STALE);
            d.on_become_stale();
        }
    });
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{DerivationCore, Derivation, ObservableCore};
    use std::any::Any;
    use std::cell::Cell;

    struct StubObservable(ObservableCore);

    impl StubObservable {
        fn new(name: &str) -> Rc<Self> {
            Rc::new(Self(ObservableCore::new(name)))
        }
    }

    impl Observable for StubObservable {
        fn name(&self) -> &str {
            self.0.name()
        }
        fn lowest_observer_state(&self) -> i8 {
            self.0.lowest_observer_state()
        }
        fn set_lowest_observer_state(&self, state: i8) {
            self.0.set_lowest_observer_state(state)
        }
        fn last_accessed_by(&self) -> u64 {
            self.0.last_accessed_by()
        }
        fn set_last_accessed_by(&self, run_id: u64) {
            self.0.set_last_accessed_by(run_id)
        }
        fn diff_value(&self) -> u8 {
            self.0.diff_value()
        }
        fn set_diff_value(&self, value: u8) {
            self.0.set_diff_value(value)
        }
        fn is_pending_unobservation(&self) -> bool {
            self.0.is_pending_unobservation()
        }
        fn set_pending_unobservation(&self, value: bool) {
            self.0.set_pending_unobservation(value)
        }
        fn observer_count(&self) -> usize {
            self.0.observer_count()
        }
        fn add_observer(&self, derivation: Rc<dyn Derivation>) {
            self.0.add_observer(derivation)
        }
        fn remove_observer(&self, derivation: &Rc<dyn Derivation>) {
            self.0.remove_observer(derivation)
        }
        fn for_each_observer(&self, f: &mut dyn FnMut(&Rc<dyn Derivation>)) {
            self.0.for_each_observer(f)
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct StubDerivation {
        core: DerivationCore,
        stale_calls: Cell<u32>,
    }

    impl StubDerivation {
        fn new(name: &str) -> Rc<Self> {
            Rc::new(Self {
                core: DerivationCore::new(name),
                stale_calls: Cell::new(0),
            })
        }
    }

    impl Derivation for StubDerivation {
        fn name(&self) -> &str {
            self.core.name()
        }
        fn dependencies_state(&self) -> i8 {
            self.core.dependencies_state()
        }
        fn set_dependencies_state(&self, state: i8) {
            self.core.set_dependencies_state(state)
        }
        fn run_id(&self) -> u64 {
            self.core.run_id()
        }
        fn set_run_id(&self, id: u64) {
            self.core.set_run_id(id)
        }
        fn observing_len(&self) -> usize {
            self.core.observing_len()
        }
        fn observing_at(&self, index: usize) -> Rc<dyn Observable> {
            self.core.observing_at(index)
        }
        fn clear_observing(&self) {
            self.core.clear_observing()
        }
        fn new_observing_len(&self) -> usize {
            self.core.new_observing_len()
        }
        fn new_observing_at(&self, index: usize) -> Rc<dyn Observable> {
            self.core.new_observing_at(index)
        }
        fn push_new_observing(&self, obs: Rc<dyn Observable>) {
            self.core.push_new_observing(obs)
        }
        fn set_new_observing_at(&self, index: usize, obs: Rc<dyn Observable>) {
            self.core.set_new_observing_at(index, obs)
        }
        fn truncate_new_observing(&self, len: usize) {
            self.core.truncate_new_observing(len)
        }
        fn reset_new_observing(&self, capacity_hint: usize) {
            self.core.reset_new_observing(capacity_hint)
        }
        fn commit_observing(&self) {
            self.core.commit_observing()
        }
        fn on_become_stale(&self) {
            self.stale_calls.set(self.stale_calls.get() + 1);
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn propagate_changed_marks_up_to_date_observers_stale_and_fires_hook() {
        let obs: Rc<dyn Observable> = StubObservable::new("a");
        let d = StubDerivation::new("d");
        obs.add_observer(d.clone());
        d.set_dependencies_state(UP_TO_DATE);

        propagate_changed(&obs);

        assert_eq!(obs.lowest_observer_state(), STALE);
        assert_eq!(d.dependencies_state(), STALE);
        assert_eq!(d.stale_calls.get(), 1);
    }

    #[test]
    fn propagate_changed_is_idempotent_once_stale() {
        let obs: Rc<dyn Observable> = StubObservable::new("a");
        let d = StubDerivation::new("d");
        obs.add_observer(d.clone());

        propagate_changed(&obs);
        d.stale_calls.set(0);
        d.set_dependencies_state(UP_TO_DATE);

        // lowest_observer_state is already STALE: second call is a no-op.
        propagate_changed(&obs);
        assert_eq!(d.stale_calls.get(), 0);
        assert_eq!(d.dependencies_state(), UP_TO_DATE);
    }

    #[test]
    fn propagate_maybe_changed_downgrades_only_up_to_date_observers() {
        let obs: Rc<dyn Observable> = StubObservable::new("a");
        let up_to_date = StubDerivation::new("u");
        let already_stale = StubDerivation::new("s");
        up_to_date.set_dependencies_state(UP_TO_DATE);
        already_stale.set_dependencies_state(STALE);
        obs.add_observer(up_to_date.clone());
        obs.add_observer(already_stale.clone());

        propagate_maybe_changed(&obs);

        assert_eq!(obs.lowest_observer_state(), POSSIBLY_STALE);
        assert_eq!(up_to_date.dependencies_state(), POSSIBLY_STALE);
        assert_eq!(up_to_date.stale_calls.get(), 1);
        assert_eq!(already_stale.dependencies_state(), STALE);
        assert_eq!(already_stale.stale_calls.get(), 0);
    }

    #[test]
    fn propagate_change_confirmed_reopens_lowest_observer_state_for_self_tracking_observer() {
        let obs: Rc<dyn Observable> = StubObservable::new("a");
        let self_tracking = StubDerivation::new("self");
        self_tracking.set_dependencies_state(UP_TO_DATE);
        obs.add_observer(self_tracking.clone());

        propagate_change_confirmed(&obs);

        // The open-question behavior: lowestObserverState ends back at
        // UP_TO_DATE, not STALE, because the lone observer was itself
        // UP_TO_DATE (re-entrantly tracking this confirmation).
        assert_eq!(obs.lowest_observer_state(), UP_TO_DATE);
    }

    #[test]
    fn propagate_change_confirmed_promotes_possibly_stale_to_stale() {
        let obs: Rc<dyn Observable> = StubObservable::new("a");
        let d = StubDerivation::new("d");
        d.set_dependencies_state(POSSIBLY_STALE);
        obs.add_observer(d.clone());

        propagate_change_confirmed(&obs);

        assert_eq!(d.dependencies_state(), STALE);
        assert_eq!(obs.lowest_observer_state(), STALE);
    }
}
