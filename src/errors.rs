//! Error and diagnostic types (component E): builder-time validation
//! errors, the fixer's accumulated violation report, and emission errors.
//!
//! Grounded on `tensor::TensorError` (`tensor/mod.rs`) for
//! the `thiserror` derive style, and on `fix_requirements.py`'s habit of
//! collecting every unfixable problem into an `ErrorReport` instead of
//! raising on the first one.

use thiserror::Error;

use crate::node::Handle;
use crate::types::{Requirement, Type};

/// Raised by `Graph::add_*` constant factories when a literal does not
/// belong to the type it is declared at. These are input-validation
/// errors, not lattice-internal invariant violations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GraphError {
    #[error("probability literal {0} is outside [0, 1]")]
    ProbabilityOutOfRange(f64),
    #[error("positive-real literal {0} is not > 0")]
    NotPositive(f64),
    #[error("negative-real literal {0} is not < 0")]
    NotNegative(f64),
    #[error("tensor constant shape {shape:?} does not match {len} data elements")]
    ShapeMismatch { shape: Vec<u32>, len: usize },
}

/// A single node whose requirements the fixer could not satisfy. Carries
/// enough context (`node`, `edge`, `found`, `required`) to be rendered as
/// a diagnostic table row, mirroring `ErrorReport`'s per-problem entries
/// in the original.
#[derive(Clone, Debug, PartialEq, tabled::Tabled)]
pub struct Violation {
    pub node: Handle,
    #[tabled(rename = "label")]
    pub node_label: String,
    pub edge: &'static str,
    #[tabled(display_with = "display_type")]
    pub found: Type,
    #[tabled(display_with = "display_requirement")]
    pub required: Requirement,
}

fn display_type(t: &Type) -> String {
    format!("{t:?}")
}

fn display_requirement(r: &Requirement) -> String {
    match r {
        Requirement::Exact(t) => format!("= {t:?}"),
        Requirement::UpperBound(t) => format!("<= {t:?}"),
    }
}

/// The accumulated result of a fixer pass: every requirement that could
/// not be met after every available repair was tried. Mirrors
/// `ErrorReport.raise_user_errors` in the original, minus the "raise an
/// exception" step -- callers decide what to do with a non-empty report.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ErrorReport {
    pub violations: Vec<Violation>,
}

impl ErrorReport {
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn push(&mut self, violation: Violation) {
        self.violations.push(violation);
    }
}

impl std::fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.violations.is_empty() {
            return write!(f, "no violations");
        }
        write!(f, "{}", tabled::Table::new(&self.violations))
    }
}

/// Raised by `emit` (component F) when the fixed graph still contains
/// something the runtime binding cannot represent.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EmitError {
    #[error("node {0} ({1}) is still malformed after the requirements pass")]
    StillMalformed(Handle, String),
    #[error("node {0} ({1}) has an analysis-only type and cannot be emitted")]
    AnalysisOnlyType(Handle, String),
    #[error("node {0} is a Map/Index placeholder and has no runtime representation")]
    UnsupportedPlaceholder(Handle),
    #[error("graph has unresolved violations: {0}")]
    UnresolvedViolations(ErrorReport),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_report_is_ok() {
        assert!(ErrorReport::default().is_ok());
    }

    #[test]
    fn pushed_violation_makes_report_not_ok() {
        let mut report = ErrorReport::default();
        report.push(Violation {
            node: 3,
            node_label: "+".to_string(),
            edge: "left",
            found: Type::NATURAL,
            required: Requirement::Exact(Type::PROBABILITY),
        });
        assert!(!report.is_ok());
    }
}
