//! The BMG type lattice: scalar and matrix types, the `sup` operator, value
//! classification, and the `Requirement` abstraction used on graph edges.
//!
//! Grounded on `bmg_types.py` in the original Bean Machine Graph compiler:
//! a finite-height lattice with `Malformed` at the top and `Bottom` at the
//! foot, `Tensor` marking anything BMG cannot represent, and nine "element
//! kinds" (`R`, `R+`, `R-`, `P`, `S`, `N`, `B`, `OH`, `Z`) that parameterize
//! matrix types. A scalar and its 1x1 matrix are the same `Type` value.

mod num;
mod table;

pub use num::Num;

use std::sync::{Mutex, OnceLock};

use thiserror::Error;

/// The nine element kinds that parameterize a matrix type. Ordered to match
/// the rows/columns of the supremum table in `table.rs`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    Real,
    PositiveReal,
    NegativeReal,
    Probability,
    Simplex,
    Natural,
    Boolean,
    OneHot,
    Zero,
}

impl Kind {
    const ALL: [Kind; 9] = [
        Kind::Real,
        Kind::PositiveReal,
        Kind::NegativeReal,
        Kind::Probability,
        Kind::Simplex,
        Kind::Natural,
        Kind::Boolean,
        Kind::OneHot,
        Kind::Zero,
    ];

    fn index(self) -> usize {
        Self::ALL.iter().position(|k| *k == self).expect("exhaustive")
    }

    /// Short name, matching `BMGElementType.short_name` in the original.
    pub fn short_name(self) -> &'static str {
        match self {
            Kind::Real => "R",
            Kind::PositiveReal => "R+",
            Kind::NegativeReal => "R-",
            Kind::Probability => "P",
            Kind::Simplex => "S",
            Kind::Natural => "N",
            Kind::Boolean => "B",
            Kind::OneHot => "OH",
            Kind::Zero => "Z",
        }
    }
}

/// Errors that can arise while constructing a lattice type. These are
/// programmer errors in the builder, not end-user surface errors.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TypeError {
    #[error("matrix dimensions must be >= 1, got ({rows}, {cols})")]
    InvalidDimensions { rows: u32, cols: u32 },
}

/// A type in the BMG lattice. `Matrix` covers every scalar and matrix type;
/// a "scalar" is simply a `Matrix` with `rows == cols == 1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Matrix { kind: Kind, rows: u32, cols: u32 },
    /// Rank > 2, or otherwise unrepresentable in BMG's 2-D matrix types.
    Tensor,
    /// The lattice top: no more specific valid type could be found.
    Malformed,
    /// The lattice infimum; used only as the fold seed for `sup_all`.
    Bottom,
}

impl Type {
    pub fn matrix(kind: Kind, rows: u32, cols: u32) -> Result<Type, TypeError> {
        if rows == 0 || cols == 0 {
            return Err(TypeError::InvalidDimensions { rows, cols });
        }
        Ok(Type::Matrix { kind, rows, cols })
    }

    /// Scalar alias: the 1x1 matrix of the given kind.
    pub fn scalar(kind: Kind) -> Type {
        Type::Matrix { kind, rows: 1, cols: 1 }
    }

    pub const BOOLEAN: Type = Type::Matrix { kind: Kind::Boolean, rows: 1, cols: 1 };
    pub const NATURAL: Type = Type::Matrix { kind: Kind::Natural, rows: 1, cols: 1 };
    pub const PROBABILITY: Type = Type::Matrix { kind: Kind::Probability, rows: 1, cols: 1 };
    pub const POSITIVE_REAL: Type = Type::Matrix { kind: Kind::PositiveReal, rows: 1, cols: 1 };
    pub const NEGATIVE_REAL: Type = Type::Matrix { kind: Kind::NegativeReal, rows: 1, cols: 1 };
    pub const REAL: Type = Type::Matrix { kind: Kind::Real, rows: 1, cols: 1 };
    pub const ONE: Type = Type::Matrix { kind: Kind::OneHot, rows: 1, cols: 1 };
    pub const ZERO: Type = Type::Matrix { kind: Kind::Zero, rows: 1, cols: 1 };

    pub fn is_matrix(self) -> bool {
        matches!(self, Type::Matrix { .. })
    }

    pub fn dims(self) -> Option<(u32, u32)> {
        match self {
            Type::Matrix { rows, cols, .. } => Some((rows, cols)),
            _ => None,
        }
    }

    pub fn kind(self) -> Option<Kind> {
        match self {
            Type::Matrix { kind, .. } => Some(kind),
            _ => None,
        }
    }

    /// True for the five lattice-internal marker kinds that must never reach
    /// the runtime binding as a node's final `graph_type`.
    pub fn is_analysis_only(self) -> bool {
        match self {
            Type::Tensor | Type::Malformed | Type::Bottom => true,
            Type::Matrix { kind, .. } => matches!(kind, Kind::OneHot | Kind::Zero),
        }
    }

    /// Rebuild this matrix type at different dimensions, keeping its kind.
    /// Mirrors `BMGMatrixType.with_dimensions` in the original.
    pub fn with_dimensions(self, rows: u32, cols: u32) -> Type {
        match self {
            Type::Matrix { kind, .. } => Type::Matrix { kind, rows, cols },
            other => other,
        }
    }
}

/// Smallest type greater than or equal to both `t` and `u`.
///
/// Rule order is significant: self-equality, bottom-absorption,
/// malformed-absorption, tensor-absorption, shape mismatch, then the
/// element-kind lookup table.
pub fn sup(t: Type, u: Type) -> Type {
    if t == u {
        return t;
    }
    if t == Type::Bottom {
        return u;
    }
    if u == Type::Bottom {
        return t;
    }
    if t == Type::Malformed || u == Type::Malformed {
        return Type::Malformed;
    }
    if t == Type::Tensor || u == Type::Tensor {
        return Type::Tensor;
    }
    let (Type::Matrix { kind: tk, rows: tr, cols: tc }, Type::Matrix { kind: uk, rows: ur, cols: uc }) =
        (t, u)
    else {
        unreachable!("Tensor/Malformed/Bottom are handled above");
    };
    if tr != ur || tc != uc {
        return Type::Tensor;
    }
    let kind = table::sup_kind(tk, uk);
    Type::Matrix { kind, rows: tr, cols: tc }
}

/// Folds `sup` across any number of types, starting from `Bottom`.
pub fn sup_all(types: impl IntoIterator<Item = Type>) -> Type {
    types.into_iter().fold(Type::Bottom, sup)
}

/// A requirement on a graph edge: the producer's `graph_type` must either
/// equal the required type exactly, or be convertible (via `sup`) to it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Requirement {
    Exact(Type),
    UpperBound(Type),
}

impl Requirement {
    /// The type named by this requirement, regardless of exactness.
    pub fn bound(self) -> Type {
        match self {
            Requirement::Exact(t) => t,
            Requirement::UpperBound(t) => t,
        }
    }

    pub fn upper_bound(self) -> Requirement {
        Requirement::UpperBound(self.bound())
    }
}

/// Does `t` satisfy requirement `r`?
pub fn meets(t: Type, r: Requirement) -> bool {
    if t == Type::Malformed {
        return false;
    }
    match r {
        Requirement::Exact(u) => t == u,
        Requirement::UpperBound(u) => sup(t, u) == u,
    }
}

/// A literal value, as seen by the classifier. `Scalar` covers booleans and
/// numbers (the original treats Python `bool`/`int`/`float` uniformly by
/// falling through to the float case); `Matrix` carries a flattened,
/// row-major payload with an explicit shape so that rank > 2 can be
/// recognized as `Tensor` without materializing anything.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    Real(f64),
    Matrix { shape: Vec<u32>, data: Vec<f64> },
}

const SIMPLEX_PRECISION: f64 = 1e-10;

/// Classifies a scalar float the way the original's `type_of_value` does
/// for the `float` branch: integral values fall through to the int rules,
/// otherwise dispatch on sign/range.
fn type_of_scalar(v: f64) -> Type {
    if v == v.trunc() && v.is_finite() {
        let i = v as i64;
        return match i {
            0 => Type::ZERO,
            1 => Type::ONE,
            n if n >= 2 => Type::NATURAL,
            _ => Type::NEGATIVE_REAL,
        };
    }
    if v >= 0.0 {
        if v <= 1.0 {
            Type::PROBABILITY
        } else {
            Type::POSITIVE_REAL
        }
    } else {
        Type::NEGATIVE_REAL
    }
}

/// Classifies any literal value, returning the smallest lattice type it
/// fits into. Grounded on `bmg_types.py::type_of_value` /
/// `_type_of_matrix`.
pub fn type_of_value(v: &Value) -> Type {
    match v {
        Value::Bool(b) => {
            if *b {
                Type::ONE
            } else {
                Type::ZERO
            }
        }
        Value::Real(x) => type_of_scalar(*x),
        Value::Matrix { shape, data } => type_of_matrix(shape, data),
    }
}

/// Classifies a flattened matrix literal. `shape` may have any rank;
/// a single element always degenerates to the scalar classification
/// regardless of rank (mirrors `v.numel() == 1` in the original).
pub fn type_of_matrix(shape: &[u32], data: &[f64]) -> Type {
    if data.len() == 1 {
        return type_of_scalar(data[0]);
    }
    if shape.len() > 2 {
        return Type::Tensor;
    }
    // A 1-D shape broadcasts as a single row, matching the original's
    // `r = 1 if dimensions == 1 else shape[0]` convention.
    let (rows, cols) = match shape {
        [] => (1, data.len() as u32),
        [c] => (1, *c),
        [r, c] => (*r, *c),
        _ => unreachable!("checked above"),
    };

    let elementwise = sup_all(data.iter().map(|x| type_of_scalar(*x)));
    let Type::Matrix { kind: elem_kind, .. } = elementwise else {
        unreachable!("type_of_scalar always returns a 1x1 matrix type")
    };

    match elem_kind {
        Kind::Real | Kind::PositiveReal | Kind::NegativeReal | Kind::Natural => {
            Type::Matrix { kind: elem_kind, rows, cols }
        }
        Kind::Boolean | Kind::Zero | Kind::OneHot | Kind::Probability => {
            let sums_to_one = data
                .chunks(cols as usize)
                .map(|row| row.iter().sum::<f64>())
                .all(|s| (s - 1.0).abs() <= SIMPLEX_PRECISION);
            if sums_to_one {
                if elem_kind == Kind::Probability {
                    Type::Matrix { kind: Kind::Simplex, rows, cols }
                } else {
                    Type::Matrix { kind: Kind::OneHot, rows, cols }
                }
            } else if elem_kind == Kind::Probability {
                Type::Matrix { kind: Kind::Probability, rows, cols }
            } else if elem_kind == Kind::Zero {
                Type::Matrix { kind: Kind::Zero, rows, cols }
            } else {
                Type::Matrix { kind: Kind::Boolean, rows, cols }
            }
        }
        Kind::Simplex => unreachable!("a single element is never classified Simplex"),
    }
}

/// Process-wide intern table for `Type`s, giving handle/identity equality
/// to otherwise-structurally-equal types. `Type` itself already has value
/// equality and is `Copy`, so this layer exists to demonstrate and
/// exercise the intern discipline without changing correctness: two
/// `TypeId`s are equal iff the types they resolve to are equal, and the
/// reverse lookup always returns the same handle for the same type.
///
/// Modeled on the same "arena of small handles" idiom used for the graph
/// builder (§4.3): a lock is taken only when a type is first seen, and
/// lookups of an already-interned type only need a read lock.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);

#[derive(Default)]
struct Interner {
    by_type: std::collections::HashMap<Type, TypeId>,
    types: Vec<Type>,
}

fn interner() -> &'static Mutex<Interner> {
    static INTERNER: OnceLock<Mutex<Interner>> = OnceLock::new();
    INTERNER.get_or_init(|| Mutex::new(Interner::default()))
}

/// Interns `t`, returning a handle that is identity-equal (by `TypeId`) to
/// any previously returned handle for an equal `t`.
pub fn intern(t: Type) -> TypeId {
    let mut interner = interner().lock().expect("type interner poisoned");
    if let Some(id) = interner.by_type.get(&t) {
        return *id;
    }
    let id = TypeId(interner.types.len() as u32);
    interner.types.push(t);
    interner.by_type.insert(t, id);
    id
}

/// Resolves a handle back to its `Type`.
pub fn resolve(id: TypeId) -> Type {
    let interner = interner().lock().expect("type interner poisoned");
    interner.types[id.0 as usize]
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn sup_is_commutative_and_associative() {
        let all = [
            Type::REAL,
            Type::POSITIVE_REAL,
            Type::NEGATIVE_REAL,
            Type::PROBABILITY,
            Type::NATURAL,
            Type::BOOLEAN,
            Type::ONE,
            Type::ZERO,
            Type::scalar(Kind::Simplex),
            Type::Tensor,
            Type::Malformed,
            Type::Bottom,
        ];
        for &t in &all {
            for &u in &all {
                assert_eq!(sup(t, u), sup(u, t), "commutative: {t:?} {u:?}");
                for &v in &all {
                    assert_eq!(
                        sup(t, sup(u, v)),
                        sup(sup(t, u), v),
                        "associative: {t:?} {u:?} {v:?}"
                    );
                }
            }
            assert_eq!(sup(t, Type::Bottom), t);
            assert_eq!(sup(t, Type::Malformed), Type::Malformed);
        }
    }

    #[test_case(Type::PROBABILITY, Type::PROBABILITY => true)]
    #[test_case(Type::NATURAL, Type::PROBABILITY => false)]
    fn meets_exact(t: Type, u: Type) -> bool {
        meets(t, Requirement::Exact(u))
    }

    #[test]
    fn meets_upper_bound_iff_sup_equals_bound() {
        let pairs = [
            (Type::NATURAL, Type::POSITIVE_REAL),
            (Type::POSITIVE_REAL, Type::NATURAL),
            (Type::BOOLEAN, Type::PROBABILITY),
        ];
        for (t, u) in pairs {
            assert_eq!(
                meets(t, Requirement::UpperBound(u)),
                sup(t, u) == u,
                "{t:?} upper-bound {u:?}"
            );
        }
    }

    #[test]
    fn malformed_meets_nothing() {
        assert!(!meets(Type::Malformed, Requirement::UpperBound(Type::Tensor)));
        assert!(!meets(Type::Malformed, Requirement::Exact(Type::Malformed)));
    }

    #[test]
    fn interning_is_identity_stable() {
        let a = intern(Type::Matrix { kind: Kind::Real, rows: 3, cols: 3 });
        let b = intern(Type::Matrix { kind: Kind::Real, rows: 3, cols: 3 });
        assert_eq!(a, b);
        assert_eq!(resolve(a), Type::Matrix { kind: Kind::Real, rows: 3, cols: 3 });
    }

    #[test]
    fn two_by_three_one_hot_literal_classifies_as_one_hot_matrix() {
        // [[0,1,0],[0,0,1]] -- every row one-hot, and sums to 1.
        let shape = [2, 3];
        let data = [0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        assert_eq!(
            type_of_matrix(&shape, &data),
            Type::Matrix { kind: Kind::OneHot, rows: 2, cols: 3 }
        );
    }

    #[test]
    fn zero_dimension_matrix_is_an_error() {
        assert_eq!(
            Type::matrix(Kind::Real, 0, 2),
            Err(TypeError::InvalidDimensions { rows: 0, cols: 2 })
        );
    }
}
