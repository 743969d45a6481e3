// ============================================================================
// reactive-graph-core - Primitives Module
// The four node kinds built on the traits in `core::types`: Atom,
// ObservableValue, ComputedValue, Reaction
// ============================================================================

pub mod atom;
pub mod computed;
pub mod observable_value;
pub mod reaction;

pub use atom::{atom, Atom};
pub use computed::{computed, ComputedValue};
pub use observable_value::{observable, observable_named, Change, ChangeType, ObservableValue};
pub use reaction::{autorun, autorun_with_error_handler, reaction, Reaction};
