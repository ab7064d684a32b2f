//! IR node variants (component B): constants, distributions, operators,
//! samples, observations, and queries.
//!
//! Grounded on `bm_graph_builder.py`'s `BMGNode` hierarchy (`BooleanNode`,
//! `RealNode`, `BernoulliNode`, `AdditionNode`, `MultiplicationNode`,
//! `UnaryOperatorNode` and its children, `SampleNode`, `Observation`,
//! `Query`), reworked as a tagged enum instead of a class hierarchy with
//! abstract `label()` /
//! `_add_to_graph()` methods, so the node catalogue is statically
//! enumerable and every node-shape computation (`graph_type`, `inf_type`,
//! per-edge `Requirement`s) is a match on the tag rather than a virtual
//! call.

use crate::types::{Type, Value};

/// An index into the graph builder's node arena. Cheap to copy; never
/// dereferenced except through a `Graph`.
pub type Handle = usize;

/// Distribution node kinds that can appear as the operand of `Sample`.
/// Mirrors the subset of `DistributionType` the original builder emits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DistributionKind {
    Bernoulli,
    Beta,
    Binomial,
}

impl DistributionKind {
    pub fn label(self) -> &'static str {
        match self {
            DistributionKind::Bernoulli => "Bernoulli",
            DistributionKind::Beta => "Beta",
            DistributionKind::Binomial => "Binomial",
        }
    }
}

/// Operator node kinds, mirroring `OperatorType` in the original builder
/// (arithmetic, the explicit coercions, control flow, and `Sample`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperatorKind {
    Add,
    Mul,
    Pow,
    Negate,
    Exp,
    Log,
    ToReal,
    ToPositiveReal,
    ToProbability,
    IfThenElse,
    Sample,
}

impl OperatorKind {
    pub fn label(self) -> &'static str {
        match self {
            OperatorKind::Add => "+",
            OperatorKind::Mul => "*",
            OperatorKind::Pow => "**",
            OperatorKind::Negate => "-",
            OperatorKind::Exp => "Exp",
            OperatorKind::Log => "Log",
            OperatorKind::ToReal => "ToReal",
            OperatorKind::ToPositiveReal => "ToPositiveReal",
            OperatorKind::ToProbability => "ToProbability",
            OperatorKind::IfThenElse => "IfThenElse",
            OperatorKind::Sample => "Sample",
        }
    }
}

/// A single IR node. Every variant's edges, per-edge requirement, and
/// type-computation rule live in `graph.rs`, which has the arena context
/// (other nodes' current types) that those computations need.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    /// A literal. `declared_type` is the type the node was constructed at
    /// (what the builder's `add_boolean`/`add_real`/... factory, or the
    /// fixer's `add_constant_of_type`/`add_constant_of_matrix_type`, asked
    /// for); it is the node's `graph_type` regardless of `value`. The
    /// `inf_type` is separately computed from `value` by `type_of_value`.
    Constant { value: Value, declared_type: Type },
    Bernoulli { prob: Handle },
    Beta { alpha: Handle, beta: Handle },
    Binomial { n: Handle, p: Handle },
    Add { left: Handle, right: Handle },
    Mul { left: Handle, right: Handle },
    Pow { base: Handle, exponent: Handle },
    Negate { operand: Handle },
    Exp { operand: Handle },
    Log { operand: Handle },
    ToReal { operand: Handle },
    ToPositiveReal { operand: Handle },
    ToProbability { operand: Handle },
    IfThenElse { cond: Handle, consequence: Handle, alternative: Handle },
    Sample { distribution: Handle },
    /// Placeholder for future extension; the fixer passes it through
    /// unchanged and the emitter rejects it.
    Map { entries: Vec<Handle> },
    /// Deprecated placeholder, kept only so the fixer/emitter have
    /// something to pass-through/reject.
    Index { map: Handle, index: Handle },
    Observation { sample: Handle, value: Handle },
    Query { operator: Handle },
}

impl Node {
    /// Short label for diagnostics and the `--format table` CLI output.
    pub fn label(&self) -> String {
        match self {
            Node::Constant { value, declared_type } => format!("{:?}={value:?}", declared_type),
            Node::Bernoulli { .. } => "Bernoulli".to_string(),
            Node::Beta { .. } => "Beta".to_string(),
            Node::Binomial { .. } => "Binomial".to_string(),
            Node::Add { .. } => "+".to_string(),
            Node::Mul { .. } => "*".to_string(),
            Node::Pow { .. } => "**".to_string(),
            Node::Negate { .. } => "-".to_string(),
            Node::Exp { .. } => "Exp".to_string(),
            Node::Log { .. } => "Log".to_string(),
            Node::ToReal { .. } => "ToReal".to_string(),
            Node::ToPositiveReal { .. } => "ToPositiveReal".to_string(),
            Node::ToProbability { .. } => "ToProbability".to_string(),
            Node::IfThenElse { .. } => "IfThenElse".to_string(),
            Node::Sample { .. } => "Sample".to_string(),
            Node::Map { .. } => "Map".to_string(),
            Node::Index { .. } => "Index".to_string(),
            Node::Observation { .. } => "Observation".to_string(),
            Node::Query { .. } => "Query".to_string(),
        }
    }

    /// Static per-edge labels, in input order. Used for diagnostics
    /// (`Violation::edge_label`) the way `get_edge_labels` is in the
    /// original.
    pub fn edge_labels(&self) -> &'static [&'static str] {
        match self {
            Node::Constant { .. } => &[],
            Node::Bernoulli { .. } => &["probability"],
            Node::Beta { .. } => &["alpha", "beta"],
            Node::Binomial { .. } => &["n", "probability"],
            Node::Add { .. } | Node::Mul { .. } => &["left", "right"],
            Node::Pow { .. } => &["base", "exponent"],
            Node::Negate { .. } | Node::Exp { .. } | Node::Log { .. } => &["operand"],
            Node::ToReal { .. } | Node::ToPositiveReal { .. } | Node::ToProbability { .. } => {
                &["operand"]
            }
            Node::IfThenElse { .. } => &["condition", "consequence", "alternative"],
            Node::Sample { .. } => &["distribution"],
            Node::Map { .. } => &[],
            Node::Index { .. } => &["map", "index"],
            Node::Observation { .. } => &["operand", "value"],
            Node::Query { .. } => &["operator"],
        }
    }

    /// This node's input edges, in declaration order.
    pub fn inputs(&self) -> Vec<Handle> {
        match self {
            Node::Constant { .. } => vec![],
            Node::Bernoulli { prob } => vec![*prob],
            Node::Beta { alpha, beta } => vec![*alpha, *beta],
            Node::Binomial { n, p } => vec![*n, *p],
            Node::Add { left, right } | Node::Mul { left, right } => vec![*left, *right],
            Node::Pow { base, exponent } => vec![*base, *exponent],
            Node::Negate { operand }
            | Node::Exp { operand }
            | Node::Log { operand }
            | Node::ToReal { operand }
            | Node::ToPositiveReal { operand }
            | Node::ToProbability { operand } => vec![*operand],
            Node::IfThenElse { cond, consequence, alternative } => {
                vec![*cond, *consequence, *alternative]
            }
            Node::Sample { distribution } => vec![*distribution],
            Node::Map { entries } => entries.clone(),
            Node::Index { map, index } => vec![*map, *index],
            Node::Observation { sample, value } => vec![*sample, *value],
            Node::Query { operator } => vec![*operator],
        }
    }

    /// Replaces the `i`th input handle. Used only by the fixer: mutation
    /// after insertion is restricted to this single-slot replacement.
    pub fn set_input(&mut self, i: usize, new_handle: Handle) {
        let slot = match self {
            Node::Constant { .. } => panic!("constant nodes have no inputs"),
            Node::Bernoulli { prob } => [prob].into_iter().nth(i),
            Node::Beta { alpha, beta } => [alpha, beta].into_iter().nth(i),
            Node::Binomial { n, p } => [n, p].into_iter().nth(i),
            Node::Add { left, right } | Node::Mul { left, right } => {
                [left, right].into_iter().nth(i)
            }
            Node::Pow { base, exponent } => [base, exponent].into_iter().nth(i),
            Node::Negate { operand }
            | Node::Exp { operand }
            | Node::Log { operand }
            | Node::ToReal { operand }
            | Node::ToPositiveReal { operand }
            | Node::ToProbability { operand } => [operand].into_iter().nth(i),
            Node::IfThenElse { cond, consequence, alternative } => {
                [cond, consequence, alternative].into_iter().nth(i)
            }
            Node::Sample { distribution } => [distribution].into_iter().nth(i),
            Node::Map { entries } => entries.get_mut(i),
            Node::Index { map, index } => [map, index].into_iter().nth(i),
            Node::Observation { sample, value } => [sample, value].into_iter().nth(i),
            Node::Query { operator } => [operator].into_iter().nth(i),
        };
        *slot.expect("edge index in range") = new_handle;
    }

    /// Every input slot, mutable, in declaration order. Used by the graph
    /// builder to redirect edges wholesale when the fixer splices in a
    /// repair subgraph for an entire malformed node (as opposed to
    /// `set_input`'s single-slot replacement for a single operand).
    pub fn inputs_mut(&mut self) -> Vec<&mut Handle> {
        match self {
            Node::Constant { .. } => vec![],
            Node::Bernoulli { prob } => vec![prob],
            Node::Beta { alpha, beta } => vec![alpha, beta],
            Node::Binomial { n, p } => vec![n, p],
            Node::Add { left, right } | Node::Mul { left, right } => vec![left, right],
            Node::Pow { base, exponent } => vec![base, exponent],
            Node::Negate { operand }
            | Node::Exp { operand }
            | Node::Log { operand }
            | Node::ToReal { operand }
            | Node::ToPositiveReal { operand }
            | Node::ToProbability { operand } => vec![operand],
            Node::IfThenElse { cond, consequence, alternative } => {
                vec![cond, consequence, alternative]
            }
            Node::Sample { distribution } => vec![distribution],
            Node::Map { entries } => entries.iter_mut().collect(),
            Node::Index { map, index } => vec![map, index],
            Node::Observation { sample, value } => vec![sample, value],
            Node::Query { operator } => vec![operator],
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Node::Observation { .. } | Node::Query { .. })
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Node::Constant { .. })
    }

    pub fn is_distribution(&self) -> bool {
        matches!(self, Node::Bernoulli { .. } | Node::Beta { .. } | Node::Binomial { .. })
    }

    pub fn is_map(&self) -> bool {
        matches!(self, Node::Map { .. })
    }

    pub fn distribution_kind(&self) -> Option<DistributionKind> {
        match self {
            Node::Bernoulli { .. } => Some(DistributionKind::Bernoulli),
            Node::Beta { .. } => Some(DistributionKind::Beta),
            Node::Binomial { .. } => Some(DistributionKind::Binomial),
            _ => None,
        }
    }

    pub fn operator_kind(&self) -> Option<OperatorKind> {
        match self {
            Node::Add { .. } => Some(OperatorKind::Add),
            Node::Mul { .. } => Some(OperatorKind::Mul),
            Node::Pow { .. } => Some(OperatorKind::Pow),
            Node::Negate { .. } => Some(OperatorKind::Negate),
            Node::Exp { .. } => Some(OperatorKind::Exp),
            Node::Log { .. } => Some(OperatorKind::Log),
            Node::ToReal { .. } => Some(OperatorKind::ToReal),
            Node::ToPositiveReal { .. } => Some(OperatorKind::ToPositiveReal),
            Node::ToProbability { .. } => Some(OperatorKind::ToProbability),
            Node::IfThenElse { .. } => Some(OperatorKind::IfThenElse),
            Node::Sample { .. } => Some(OperatorKind::Sample),
            _ => None,
        }
    }
}
