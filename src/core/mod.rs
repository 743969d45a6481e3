// ============================================================================
// reactive-graph-core - Core Module
// Fundamental types, traits, and context for the reactive graph
// ============================================================================

pub mod constants;
pub mod context;
pub mod types;

// Re-export commonly used items
pub use constants::*;
pub use context::{with_context, GlobalState, is_batching, is_tracking, is_untracking};
pub use types::{Derivation, DerivationCore, Observable, ObservableCore, ObserverList};
