// ============================================================================
// reactive-graph-core - Observable Value
// A single reactive cell with an interceptor/listener pipeline
// ============================================================================
//
// An `Rc`-wrapped inner cell with an `EqualsFn<T>` short-circuit and
// `get`/`with`/`set`/`update` accessors, plus an interceptor chain, listener
// chain, and enhancer hook layered on top of the plain cell.
// ============================================================================

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use crate::core::types::{Derivation, Observable, ObservableCore};
use crate::reactivity::batching::untracked;
use crate::reactivity::equality::{equals, EqualsFn};
use crate::reactivity::guard::check_if_state_modifications_are_allowed;
use crate::reactivity::tracking::{report_changed, report_observed};

// =============================================================================
// CHANGE / INTERCEPTOR / LISTENER
// =============================================================================

/// The kind of mutation a `Change` describes. Always `Update` for a scalar
/// observable value — `Add`/`Delete`/`Splice` belong to the container layer
/// this crate's Non-goals exclude.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Update,
}

/// Describes one proposed or committed mutation, passed through the
/// interceptor chain and then (read-only) to the listener chain.
#[derive(Debug, Clone)]
pub struct Change<T> {
    pub change_type: ChangeType,
    pub old_value: Option<T>,
    pub new_value: T,
}

type Interceptor<T> = Box<dyn Fn(Change<T>) -> Option<Change<T>>>;
type Listener<T> = Box<dyn Fn(&Change<T>)>;

/// An ordered chain of interceptors run under an untracked scope before a
/// write commits. The first interceptor to return `None` cancels the write;
/// any interceptor may also return a modified `Change`.
struct InterceptorChain<T>(RefCell<Vec<Interceptor<T>>>);

impl<T> InterceptorChain<T> {
    fn new() -> Self {
        Self(RefCell::new(Vec::new()))
    }

    fn push(&self, f: Interceptor<T>) {
        self.0.borrow_mut().push(f);
    }

    /// Run the chain under an untracked scope. `None` means the write was
    /// cancelled by some interceptor.
    fn run(&self, change: Change<T>) -> Option<Change<T>> {
        untracked(|| {
            let mut current = Some(change);
            for interceptor in self.0.borrow().iter() {
                match current {
                    Some(c) => current = interceptor(c),
                    None => break,
                }
            }
            current
        })
    }
}

/// An ordered chain of listeners run synchronously after a committed write,
/// also under an untracked scope, in registration order.
struct ListenerChain<T>(RefCell<Vec<Listener<T>>>);

impl<T> ListenerChain<T> {
    fn new() -> Self {
        Self(RefCell::new(Vec::new()))
    }

    fn push(&self, f: Listener<T>) {
        self.0.borrow_mut().push(f);
    }

    fn run(&self, change: &Change<T>) {
        untracked(|| {
            for listener in self.0.borrow().iter() {
                listener(change);
            }
        });
    }
}

/// Returned by the "prepare new value" step of `set`: either a value that
/// differs from the current one, or the distinguished sentinel meaning
/// nothing should change. Modeled as an enum rather than a magic value, so
/// `set` never mistakes a legitimately-equal new value for "unchanged"
/// through pointer tricks.
pub enum SetOutcome<T> {
    Changed(T),
    Unchanged,
}

// =============================================================================
// OBSERVABLE VALUE INNER
// =============================================================================

struct ObservableValueInner<T> {
    core: ObservableCore,
    value: RefCell<T>,
    equals: EqualsFn<T>,
    enhancer: Option<Box<dyn Fn(T, Option<&T>) -> T>>,
    interceptors: InterceptorChain<T>,
    listeners: ListenerChain<T>,
}

impl<T: 'static> Observable for ObservableValueInner<T> {
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
// OBSERVABLE VALUE - public handle
// =============================================================================

/// A single reactive cell. Holds a value of type `T`, a short-circuiting
/// equality check, an optional enhancer applied to every incoming write,
/// and interceptor/listener chains.
#[derive(Clone)]
pub struct ObservableValue<T> {
    inner: Rc<ObservableValueInner<T>>,
}

impl<T: 'static> ObservableValue<T> {
    pub fn new(name: impl Into<String>, value: T) -> Self
    where
        T: PartialEq,
    {
        Self::build(name, value, equals, None)
    }

    pub fn new_with_equals(name: impl Into<String>, value: T, equals: EqualsFn<T>) -> Self {
        Self::build(name, value, equals, None)
    }

    pub fn new_with_enhancer(
        name: impl Into<String>,
        value: T,
        equals: EqualsFn<T>,
        enhancer: Box<dyn Fn(T, Option<&T>) -> T>,
    ) -> Self {
        Self::build(name, value, equals, Some(enhancer))
    }

    fn build(
        name: impl Into<String>,
        value: T,
        equals: EqualsFn<T>,
        enhancer: Option<Box<dyn Fn(T, Option<&T>) -> T>>,
    ) -> Self {
        Self {
            inner: Rc::new(ObservableValueInner {
                core: ObservableCore::new(name),
                value: RefCell::new(value),
                equals,
                enhancer,
                interceptors: InterceptorChain::new(),
                listeners: ListenerChain::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.core.name()
    }

    /// Number of derivations currently observing this value. Mainly useful
    /// for diagnostics and tests exercising unobservation.
    pub fn observer_count(&self) -> usize {
        self.inner.core.observer_count()
    }

    fn as_observable(&self) -> Rc<dyn Observable> {
        self.inner.clone()
    }

    /// Register an interceptor. Run under an untracked scope before every
    /// write; the first one to return `None` cancels the write.
    pub fn intercept(&self, f: impl Fn(Change<T>) -> Option<Change<T>> + 'static) {
        self.inner.interceptors.push(Box::new(f));
    }

    /// Register a change listener. Run, under an untracked scope, after
    /// every committed write, in registration order.
    pub fn observe(&self, f: impl Fn(&Change<T>) + 'static) {
        self.inner.listeners.push(Box::new(f));
    }

    /// Get the current value (cloning). Reports a read against the
    /// currently tracking derivation, if any.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        report_observed(&self.as_observable());
        self.inner.value.borrow().clone()
    }

    /// Read without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        report_observed(&self.as_observable());
        f(&self.inner.value.borrow())
    }

    /// Run the interceptor chain and enhancer, then the equality
    /// short-circuit, without committing anything. Returns
    /// `SetOutcome::Unchanged` rather than reusing the old value as a
    /// sentinel, so a write that legitimately lands back on an equal value
    /// is never confused with a cancelled one.
    fn prepare_new_value(&self, old_value: &T, new_value: T) -> Option<SetOutcome<T>>
    where
        T: Clone,
    {
        let change = Change {
            change_type: ChangeType::Update,
            old_value: Some(old_value.clone()),
            new_value,
        };

        let change = self.inner.interceptors.run(change)?;

        let enhanced = match &self.inner.enhancer {
            Some(enhancer) => enhancer(change.new_value, Some(old_value)),
            None => change.new_value,
        };

        if (self.inner.equals)(old_value, &enhanced) {
            Some(SetOutcome::Unchanged)
        } else {
            Some(SetOutcome::Changed(enhanced))
        }
    }

    /// Set a new value, running the full pipeline: permission check,
    /// interceptors, enhancer, equality short-circuit, commit + propagate,
    /// then listeners.
    pub fn set(&self, new_value: T)
    where
        T: Clone,
    {
        check_if_state_modifications_are_allowed(self.name());

        let old_value = self.inner.value.borrow().clone();

        let enhanced = match self.prepare_new_value(&old_value, new_value) {
            None => return,                        // cancelled by an interceptor
            Some(SetOutcome::Unchanged) => return,
            Some(SetOutcome::Changed(v)) => v,
        };

        *self.inner.value.borrow_mut() = enhanced.clone();
        report_changed(&self.as_observable());

        let committed = Change {
            change_type: ChangeType::Update,
            old_value: Some(old_value),
            new_value: enhanced,
        };
        self.inner.listeners.run(&committed);
    }

    /// Update the value in place via a closure, then run the same
    /// equality/propagation pipeline as `set`.
    pub fn update(&self, f: impl FnOnce(&mut T))
    where
        T: Clone,
    {
        let mut next = self.inner.value.borrow().clone();
        f(&mut next);
        self.set(next);
    }
}

impl<T: std::fmt::Debug + Clone + 'static> std::fmt::Debug for ObservableValue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservableValue")
            .field("name", &self.name())
            .field("value", &self.get())
            .finish()
    }
}

/// Create an observable value with default (`PartialEq`) equality.
pub fn observable<T: PartialEq + 'static>(value: T) -> ObservableValue<T> {
    ObservableValue::new("observable", value)
}

/// Create a named observable value with default equality.
pub fn observable_named<T: PartialEq + 'static>(name: impl Into<String>, value: T) -> ObservableValue<T> {
    ObservableValue::new(name, value)
}

// =============================================================================
// TESTS
// =============================================================================
