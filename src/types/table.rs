//! The 9x9 element-kind supremum table, generated once as a `const` array
//! rather than re-derived per call. Every entry is filled in directly
//! from `bmg_types.py`'s
//! `_lookup_table`, including both orderings of each pair, so `sup_kind`
//! never needs a "try the other order" branch.

use super::Kind;

const N: usize = 9;

// Row/column order matches `Kind::ALL`: R, R+, R-, P, S, N, B, OH, Z.
const TABLE: [[Kind; N]; N] = {
    use Kind::*;
    [
        // R
        [Real, Real, Real, Real, Real, Real, Real, Real, Real],
        // R+
        [Real, PositiveReal, Real, PositiveReal, PositiveReal, PositiveReal, PositiveReal, PositiveReal, PositiveReal],
        // R-
        [Real, Real, NegativeReal, Real, Real, Real, Real, Real, NegativeReal],
        // P
        [Real, PositiveReal, Real, Probability, Probability, PositiveReal, Probability, Probability, Probability],
        // S
        [Real, PositiveReal, Real, Probability, Simplex, PositiveReal, PositiveReal, Simplex, Real],
        // N
        [Real, PositiveReal, Real, PositiveReal, PositiveReal, Natural, Natural, Natural, Natural],
        // B
        [Real, PositiveReal, Real, Probability, PositiveReal, Natural, Boolean, Boolean, Boolean],
        // OH
        [Real, PositiveReal, Real, Probability, Simplex, Natural, Boolean, OneHot, Boolean],
        // Z
        [Real, PositiveReal, NegativeReal, Probability, Real, Natural, Boolean, Boolean, Zero],
    ]
};

/// Looks up the element-kind supremum of `a` and `b`. Only called once `a
/// != b` and neither is a marker kind reachable from `Type::sup`'s earlier
/// branches -- this table only needs to resolve genuine element-kind pairs.
pub fn sup_kind(a: Kind, b: Kind) -> Kind {
    TABLE[a.index()][b.index()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_symmetric() {
        for &a in &Kind::ALL {
            for &b in &Kind::ALL {
                assert_eq!(
                    sup_kind(a, b),
                    sup_kind(b, a),
                    "sup_kind not symmetric for ({a:?}, {b:?})"
                );
            }
        }
    }

    #[test]
    fn self_entries_are_identity() {
        for &a in &Kind::ALL {
            assert_eq!(sup_kind(a, a), a);
        }
    }
}
