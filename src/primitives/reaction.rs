// ============================================================================
// reactive-graph-core - Reaction
// An eager derivation with a user effect, drained at batch close
// ============================================================================
//
// A thin public wrapper around an `Rc`-held inner struct with a `self_weak`
// back-reference, run through a dedicated `run`/`schedule` pair of methods.
// A reaction is a flat leaf node: it has no parent/child relationship to
// other reactions, it is only ever an observer, never observed.
// ============================================================================

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::core::constants::*;
use crate::core::context::with_context;
use crate::core::types::{Derivation, DerivationCore, Observable};
use crate::errors::{CaughtException, TrackedOutcome};
use crate::reactivity::batching;
use crate::reactivity::tracking::{clear_observing, should_compute, track_derived_function};

// =============================================================================
// REACTION INNER
// =============================================================================

struct ReactionInner {
    derivation: DerivationCore,
    effect: RefCell<Box<dyn FnMut()>>,
    on_error: RefCell<Option<Box<dyn Fn(&CaughtException)>>>,
    self_ref: RefCell<Weak<ReactionInner>>,

    /// Guards `schedule_reaction` against double-enqueueing: pushes onto
    /// the queue idempotently, guarded by this flag. Cleared right before
    /// the reaction actually runs, so a reaction that retriggers itself
    /// from inside its own run gets re-enqueued.
    is_scheduled: Cell<bool>,

    /// Set by `dispose`. Makes disposal idempotent and turns any queued
    /// re-entry (this reaction was already sitting in the pending-reactions
    /// queue when disposed) into a no-op.
    is_disposed: Cell<bool>,
}

impl ReactionInner {
    fn as_derivation_rc(&self) -> Rc<dyn Derivation> {
        self.self_ref
            .borrow()
            .upgrade()
            .expect("self_ref always set immediately after construction")
    }

    /// Enqueue for the next drain, and if no batch is currently open,
    /// open-then-close one to flush immediately.
    fn schedule(&self) {
        if self.is_disposed.get() {
            return;
        }
        if self.is_scheduled.replace(true) {
            return;
        }
        with_context(|ctx| ctx.schedule_reaction(Rc::downgrade(&self.as_derivation_rc())));

        if !with_context(|ctx| ctx.is_batching()) {
            batching::start_batch();
            batching::end_batch();
        }
    }

    /// Open a batch, run the tracked effect if `should_compute` says the
    /// last run is no longer trustworthy, close the batch.
    fn run(&self) {
        if self.is_disposed.get() {
            return;
        }
        self.is_scheduled.set(false);

        batching::batch(|| {
            let d = self.as_derivation_rc();
            if !should_compute(&d) {
                return;
            }

            let outcome = track_derived_function(&d, || {
                (self.effect.borrow_mut())();
            });

            if let TrackedOutcome::Caught(exception) = outcome {
                match self.on_error.borrow().as_ref() {
                    Some(handler) => handler(&exception),
                    None => default_error_handler(self.derivation.name(), &exception),
                }
            }
        });
    }

    /// Remove as observer from every dependency, drop to `NOT_TRACKING`,
    /// mark disposed. Idempotent.
    fn dispose(&self) {
        if self.is_disposed.replace(true) {
            return;
        }
        let d = self.as_derivation_rc();
        clear_observing(&d);
        self.derivation.set_dependencies_state(NOT_TRACKING);
    }
}

/// The default error surface when a reaction is built without an explicit
/// handler: log and move on, never panic the batch-close the reaction ran
/// inside of — a user-function exception must never corrupt the graph.
fn default_error_handler(name: &str, exception: &CaughtException) {
    #[cfg(feature = "tracing")]
    tracing::error!(reaction = name, error = %exception, "reaction effect panicked");
    #[cfg(not(feature = "tracing"))]
    let _ = (name, exception);
}

impl Derivation for ReactionInner {
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

    /// Reactions are leaf observers — they do not propagate further, only
    /// enqueue themselves.
    fn on_become_stale(&self) {
        self.schedule();
    }

    fn run_as_reaction(&self) {
        self.run();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// =============================================================================
// REACTION - public handle
// =============================================================================

/// An eager derivation with a side-effecting body. Runs once at construction
/// and again every time a dependency change is confirmed, drained at the
/// close of the outermost batch.
#[derive(Clone)]
pub struct Reaction {
    inner: Rc<ReactionInner>,
}

impl Reaction {
    /// Build and immediately run `effect` once to establish its initial
    /// dependency set, with the default (log-and-continue) error handler.
    pub fn new(name: impl Into<String>, effect: impl FnMut() + 'static) -> Self {
        Self::build(name, effect, None)
    }

    /// Build with an explicit handler for exceptions the effect body raises.
    pub fn new_with_error_handler(
        name: impl Into<String>,
        effect: impl FnMut() + 'static,
        on_error: impl Fn(&CaughtException) + 'static,
    ) -> Self {
        Self::build(name, effect, Some(Box::new(on_error)))
    }

    fn build(
        name: impl Into<String>,
        effect: impl FnMut() + 'static,
        on_error: Option<Box<dyn Fn(&CaughtException)>>,
    ) -> Self {
        let inner = Rc::new(ReactionInner {
            derivation: DerivationCore::new(name),
            effect: RefCell::new(Box::new(effect)),
            on_error: RefCell::new(on_error),
            self_ref: RefCell::new(Weak::new()),
            is_scheduled: Cell::new(false),
            is_disposed: Cell::new(false),
        });
        *inner.self_ref.borrow_mut() = Rc::downgrade(&inner);

        let reaction = Self { inner };
        reaction.inner.run();
        reaction
    }

    pub fn name(&self) -> &str {
        self.inner.derivation.name()
    }

    pub fn as_derivation(&self) -> Rc<dyn Derivation> {
        self.inner.clone()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed.get()
    }

    /// Tear down: detach from every dependency, mark disposed. Idempotent;
    /// safe to call from inside the reaction's own effect body.
    pub fn dispose(&self) {
        self.inner.dispose();
    }
}

impl std::fmt::Debug for Reaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reaction")
            .field("name", &self.name())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Create and immediately run a named reaction.
pub fn reaction(name: impl Into<String>, effect: impl FnMut() + 'static) -> Reaction {
    Reaction::new(name, effect)
}

/// Create and immediately run a reaction.
pub fn autorun(effect: impl FnMut() + 'static) -> Reaction {
    Reaction::new("autorun", effect)
}

/// Create and immediately run a named reaction with an explicit error
/// handler for panics raised by the effect body.
pub fn autorun_with_error_handler(
    name: impl Into<String>,
    effect: impl FnMut() + 'static,
    on_error: impl Fn(&CaughtException) + 'static,
) -> Reaction {
    Reaction::new_with_error_handler(name, effect, on_error)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::computed::computed;
    use crate::primitives::observable_value::observable;
    use crate::reactivity::batching::batch;
    use std::cell::RefCell as StdRefCell;

    #[test]
    fn reaction_runs_once_on_construction() {
        let runs = Rc::new(StdRefCell::new(Vec::new()));
        let a = observable(1);
        let a2 = a.clone();
        let runs2 = runs.clone();
        let _r = autorun(move || runs2.borrow_mut().push(a2.get()));
        assert_eq!(*runs.borrow(), vec![1]);
    }

    #[test]
    fn reaction_reruns_once_per_confirmed_change() {
        let runs = Rc::new(StdRefCell::new(Vec::new()));
        let a = observable(1);
        let a2 = a.clone();
        let runs2 = runs.clone();
        let _r = autorun(move || runs2.borrow_mut().push(a2.get()));

        a.set(2);
        a.set(3);
        assert_eq!(*runs.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn reaction_is_batch_atomic_across_nested_batches() {
        let runs = Rc::new(StdRefCell::new(0));
        let a = observable(1);
        let b = observable(10);

        let a2 = a.clone();
        let b2 = b.clone();
        let runs2 = runs.clone();
        let _r = autorun(move || {
            runs2.set(runs2.get() + 1);
            let _ = (a2.get(), b2.get());
        });
        assert_eq!(runs.get(), 1);

        batch(|| {
            a.set(2);
            batch(|| {
                b.set(20);
            });
            // Inner batch closed, but the reaction must not have run yet —
            // the outer batch is still open.
            assert_eq!(runs.get(), 1);
        });
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn diamond_dependency_reaction_fires_exactly_once() {
        let a = observable(1);
        let b = observable(1);
        let a1 = a.clone();
        let b1 = b.clone();
        let c = computed(move || a1.get() + b1.get());
        let c2 = c.clone();
        let d = computed(move || c2.get() * 2);

        let runs = Rc::new(StdRefCell::new(0));
        let last = Rc::new(StdRefCell::new(0));
        let d2 = d.clone();
        let runs2 = runs.clone();
        let last2 = last.clone();
        let _r = autorun(move || {
            runs2.set(runs2.get() + 1);
            *last2.borrow_mut() = d2.get();
        });
        assert_eq!(*last.borrow(), 4);
        assert_eq!(runs.get(), 1);

        a.set(2);
        assert_eq!(*last.borrow(), 6);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn dispose_detaches_from_all_dependencies() {
        let a = observable(1);
        let a2 = a.clone();
        let r = autorun(move || {
            a2.get();
        });
        assert_eq!(a.observer_count(), 1);

        r.dispose();
        assert_eq!(a.observer_count(), 0);
        assert!(r.is_disposed());

        // Disposing twice is a no-op, not a panic.
        r.dispose();
    }

    #[test]
    fn disposed_reaction_does_not_rerun_on_further_writes() {
        let runs = Rc::new(StdRefCell::new(0));
        let a = observable(1);
        let a2 = a.clone();
        let runs2 = runs.clone();
        let r = autorun(move || {
            runs2.set(runs2.get() + 1);
            a2.get();
        });
        assert_eq!(runs.get(), 1);

        r.dispose();
        a.set(2);
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn panicking_effect_is_caught_and_does_not_abort_the_batch() {
        let a = observable(1);
        let a2 = a.clone();
        let saw_error = Rc::new(StdRefCell::new(None));
        let saw_error2 = saw_error.clone();
        let _r = autorun_with_error_handler(
            "boom-reaction",
            move || {
                if a2.get() < 0 {
                    panic!("negative");
                }
            },
            move |e| *saw_error2.borrow_mut() = Some(e.message().to_string()),
        );

        a.set(-1);
        assert_eq!(saw_error.borrow().as_deref(), Some("negative"));
    }
}
