//! A float newtype that is `Eq + Hash`, so that constant node payloads can
//! participate in the graph builder's structural dedup key. Modeled on
//! `utils::F32`, used inside `LookupOp` payloads
//! (`circuit/ops/lookup.rs`) for the same reason: enum variants that carry
//! a float still need to be usable as a `HashMap` key.

use std::fmt;

#[derive(Clone, Copy, Debug, Default)]
pub struct Num(f64);

impl Num {
    pub fn new(value: f64) -> Self {
        Num(value)
    }

    pub fn get(self) -> f64 {
        self.0
    }
}

impl PartialEq for Num {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for Num {}

impl std::hash::Hash for Num {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl fmt::Display for Num {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<f64> for Num {
    fn from(value: f64) -> Self {
        Num(value)
    }
}

impl From<Num> for f64 {
    fn from(value: Num) -> Self {
        value.0
    }
}
