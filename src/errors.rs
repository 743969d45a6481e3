// ============================================================================
// reactive-graph-core - Error Types
// Invariant violations and the user-exception capture sentinel
// ============================================================================
//
// Two distinct error families:
//
// - `GraphError` covers invariant violations: the graph's own contract was
//   broken (state mutated during tracking, a cyclic reaction loop). These
//   are fatal: logged via `tracing::error!` where the `tracing` feature is
//   enabled, then raised as a panic, because recovery is not attempted and
//   state remains consistent only up to the point of detection.
// - `CaughtException` covers *user*-function panics captured during
//   `track_derived_function`. These are not `std::error::Error` values at
//   all: they are a sentinel stored in place of a computed's value and
//   re-raised on `.get()`. Tracking bookkeeping completes regardless.
// ============================================================================

use std::fmt;
use std::rc::Rc;

/// An invariant violation inside the reactive graph itself.
///
/// Raising one of these means the caller broke a contract the graph
/// requires to stay consistent (e.g. writing to a signal from inside a
/// derivation). These are always fatal — see the module docs above.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("state modifications are not allowed inside a derivation (attempted on {0})")]
    StateModificationDenied(String),

    #[error("cyclic reaction loop: exceeded reentrancy budget of {0} drain iterations")]
    CyclicReactions(u32),

    /// Never raised in this crate. The "truthy but missing `type` field"
    /// shape this names only exists in a dynamically-typed interceptor
    /// return value; `Interceptor<T> = Box<dyn Fn(Change<T>) -> Option<Change<T>>>`
    /// already makes that case statically unrepresentable — an interceptor
    /// either returns a well-formed `Change<T>` or `None`, there is no third,
    /// malformed shape to reject at runtime. Kept as a variant so a future
    /// interceptor API that accepts a looser return type has somewhere to
    /// surface this violation.
    #[error("interceptor returned a truthy value with no `type` field")]
    InvalidInterceptorReturn,
}

impl GraphError {
    /// Log (if the `tracing` feature is enabled) and panic.
    ///
    /// Centralizing this means every invariant-violation call site gets the
    /// same fatal-with-diagnostic behavior.
    #[track_caller]
    pub fn raise(self) -> ! {
        #[cfg(feature = "tracing")]
        tracing::error!(error = %self, "reactive graph invariant violated");

        panic!("{self}");
    }
}

/// A user-function panic captured during `track_derived_function`.
///
/// Stored in place of a computed value's output, or surfaced through a
/// reaction's error handling, without corrupting the dependency graph: the
/// derivation that caught it still completes its bookkeeping (its
/// `observing` set is still rebound from whatever it read before panicking).
#[derive(Clone)]
pub struct CaughtException {
    message: Rc<str>,
}

impl CaughtException {
    pub fn new(message: impl Into<Rc<str>>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Capture a panic payload produced by `std::panic::catch_unwind`.
    pub fn from_panic_payload(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message: String = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "derivation function panicked with a non-string payload".to_string()
        };
        Self::new(message)
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Re-raise as a panic, the same way a repeated `.get()` on a computed
    /// that previously panicked keeps surfacing that same failure.
    pub fn rethrow(&self) -> ! {
        panic!("{}", self.message);
    }
}

impl fmt::Debug for CaughtException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaughtException")
            .field("message", &self.message)
            .finish()
    }
}

impl fmt::Display for CaughtException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "caught exception: {}", self.message)
    }
}

/// The outcome of running a derivation's tracked function: either the
/// produced value, or a caught user-function panic.
pub enum TrackedOutcome<T> {
    Value(T),
    Caught(CaughtException),
}
