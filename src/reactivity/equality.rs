// ============================================================================
// reactive-graph-core - Equality Helpers
// The small equality toolkit the core itself needs, not a general modifier
// ============================================================================
//
// Deliberately small: NaN-safe float helpers, shallow-vec/slice comparisons,
// and field-path comparisons belong to a container/enhancer layer this
// crate doesn't implement (observable containers are out of scope here).
// What remains is exactly what `ObservableValue::set`'s short-circuit and
// `ComputedValue`'s structural-comparison option need.
// ============================================================================

/// An equality function pluggable into an `ObservableValue<T>` or
/// `ComputedValue<T>`.
pub type EqualsFn<T> = fn(&T, &T) -> bool;

/// Default strict equality, used unless a computed opts into structural
/// comparison.
pub fn equals<T: PartialEq>(a: &T, b: &T) -> bool {
    a == b
}

/// Structural (deep) equality. For Rust this coincides with `PartialEq` —
/// `#[derive(PartialEq)]` already recurses — so this exists only to name
/// the `compareStructural` option for computed values explicitly.
pub fn deep_equals<T: PartialEq>(a: &T, b: &T) -> bool {
    a == b
}

/// Never equal — forces recomputation/propagation on every write.
pub fn never_equals<T>(_a: &T, _b: &T) -> bool {
    false
}

/// Always equal — a value that never propagates once set.
pub fn always_equals<T>(_a: &T, _b: &T) -> bool {
    true
}

pub fn default_equals_fn<T: PartialEq + 'static>() -> EqualsFn<T> {
    equals
}

pub fn never_equals_fn<T: 'static>() -> EqualsFn<T> {
    never_equals
}

pub fn always_equals_fn<T: 'static>() -> EqualsFn<T> {
    always_equals
}
