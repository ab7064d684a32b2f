//! The graph builder (component C): an arena of [`Node`]s addressed by
//! small integer [`Handle`]s, with structural dedup and the per-node
//! `graph_type` / `inf_type` / `requirements` computations the fixer
//! needs to find and repair a malformed edge.
//!
//! Grounded on `bm_graph_builder.py`'s `BMGraphBuilder`: `add_node`
//! dedups by identity and preserves "children before parents"; here the
//! same invariant holds for free, because a `Handle` can only be obtained
//! by a prior `add_*` call, so there is no way to reference a node that
//! is not already in the arena.

use std::collections::HashMap;

use log::trace;
use tabled::Tabled;

use crate::errors::GraphError;
use crate::node::{Handle, Node};
use crate::types::{sup, sup_all, Kind, Num, Requirement, Type, Value};

/// The structural dedup key: variant discriminant, input
/// handles, and (for constants) the value's bit pattern, so `f64: !Eq`
/// never blocks `HashMap` usage and `-0.0` / distinct `NaN`s are not
/// silently merged.
#[derive(Clone, PartialEq, Eq, Hash)]
enum DedupKey {
    Constant { declared_type: Type, payload: ConstantPayload },
    Bernoulli(Handle),
    Beta(Handle, Handle),
    Binomial(Handle, Handle),
    Add(Handle, Handle),
    Mul(Handle, Handle),
    Pow(Handle, Handle),
    Negate(Handle),
    Exp(Handle),
    Log(Handle),
    ToReal(Handle),
    ToPositiveReal(Handle),
    ToProbability(Handle),
    IfThenElse(Handle, Handle, Handle),
    Sample(Handle),
}

#[derive(Clone, PartialEq, Eq, Hash)]
enum ConstantPayload {
    Scalar(Num),
    Matrix(Vec<u32>, Vec<Num>),
}

fn dedup_key(node: &Node) -> Option<DedupKey> {
    Some(match node {
        Node::Constant { value, declared_type } => DedupKey::Constant {
            declared_type: *declared_type,
            payload: match value {
                Value::Bool(b) => ConstantPayload::Scalar(Num::new(if *b { 1.0 } else { 0.0 })),
                Value::Real(x) => ConstantPayload::Scalar(Num::new(*x)),
                Value::Matrix { shape, data } => ConstantPayload::Matrix(
                    shape.clone(),
                    data.iter().copied().map(Num::new).collect(),
                ),
            },
        },
        Node::Bernoulli { prob } => DedupKey::Bernoulli(*prob),
        Node::Beta { alpha, beta } => DedupKey::Beta(*alpha, *beta),
        Node::Binomial { n, p } => DedupKey::Binomial(*n, *p),
        Node::Add { left, right } => DedupKey::Add(*left, *right),
        Node::Mul { left, right } => DedupKey::Mul(*left, *right),
        Node::Pow { base, exponent } => DedupKey::Pow(*base, *exponent),
        Node::Negate { operand } => DedupKey::Negate(*operand),
        Node::Exp { operand } => DedupKey::Exp(*operand),
        Node::Log { operand } => DedupKey::Log(*operand),
        Node::ToReal { operand } => DedupKey::ToReal(*operand),
        Node::ToPositiveReal { operand } => DedupKey::ToPositiveReal(*operand),
        Node::ToProbability { operand } => DedupKey::ToProbability(*operand),
        Node::IfThenElse { cond, consequence, alternative } => {
            DedupKey::IfThenElse(*cond, *consequence, *alternative)
        }
        Node::Sample { distribution } => DedupKey::Sample(*distribution),
        // Map, Index, Observation, Query are never shared: each call site
        // means something distinct (a fresh placeholder, or a fresh
        // terminal command), so we always insert a new node for them.
        Node::Map { .. } | Node::Index { .. } | Node::Observation { .. } | Node::Query { .. } => {
            return None
        }
    })
}

/// The content-addressed, topologically-ordered node arena.
#[derive(Default)]
pub struct Graph {
    nodes: Vec<Node>,
    dedup: HashMap<DedupKey, Handle>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, h: Handle) -> &Node {
        &self.nodes[h]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle, &Node)> {
        self.nodes.iter().enumerate()
    }

    fn assert_producer(&self, h: Handle) {
        assert!(
            !self.nodes[h].is_terminal(),
            "unexpected graph topology: node {h} ({}) is an observation or query \
             and can never be used as an input",
            self.nodes[h].label()
        );
    }

    fn push(&mut self, node: Node) -> Handle {
        let h = self.nodes.len();
        trace!("insert node {h}: {}", node.label());
        self.nodes.push(node);
        h
    }

    fn insert(&mut self, node: Node) -> Handle {
        for input in node.inputs() {
            self.assert_producer(input);
        }
        match dedup_key(&node) {
            Some(key) => {
                if let Some(&existing) = self.dedup.get(&key) {
                    return existing;
                }
                let h = self.push(node);
                self.dedup.insert(key, h);
                h
            }
            None => self.push(node),
        }
    }

    // -- constant factories ------------------------------------------------

    pub fn add_boolean(&mut self, value: bool) -> Handle {
        self.insert(Node::Constant { value: Value::Bool(value), declared_type: Type::BOOLEAN })
    }

    pub fn add_natural(&mut self, value: u64) -> Handle {
        self.insert(Node::Constant {
            value: Value::Real(value as f64),
            declared_type: Type::NATURAL,
        })
    }

    pub fn add_real(&mut self, value: f64) -> Handle {
        self.insert(Node::Constant { value: Value::Real(value), declared_type: Type::REAL })
    }

    pub fn add_probability(&mut self, value: f64) -> Result<Handle, GraphError> {
        if !(0.0..=1.0).contains(&value) {
            return Err(GraphError::ProbabilityOutOfRange(value));
        }
        Ok(self.insert(Node::Constant {
            value: Value::Real(value),
            declared_type: Type::PROBABILITY,
        }))
    }

    pub fn add_positive_real(&mut self, value: f64) -> Result<Handle, GraphError> {
        if !(value > 0.0) {
            return Err(GraphError::NotPositive(value));
        }
        Ok(self.insert(Node::Constant {
            value: Value::Real(value),
            declared_type: Type::POSITIVE_REAL,
        }))
    }

    pub fn add_negative_real(&mut self, value: f64) -> Result<Handle, GraphError> {
        if !(value < 0.0) {
            return Err(GraphError::NotNegative(value));
        }
        Ok(self.insert(Node::Constant {
            value: Value::Real(value),
            declared_type: Type::NEGATIVE_REAL,
        }))
    }

    pub fn add_tensor_constant(
        &mut self,
        shape: Vec<u32>,
        data: Vec<f64>,
    ) -> Result<Handle, GraphError> {
        let expected: u64 = shape.iter().map(|d| *d as u64).product();
        if expected != data.len() as u64 {
            return Err(GraphError::ShapeMismatch { shape, len: data.len() });
        }
        let declared_type = crate::types::type_of_matrix(&shape, &data);
        Ok(self.insert(Node::Constant { value: Value::Matrix { shape, data }, declared_type }))
    }

    /// Synthesizes a constant of exactly `ty` carrying `value`, used by the
    /// fixer to convert a producer that can't otherwise meet a requirement.
    /// Mirrors `BMGraphBuilder.add_constant_of_type`. `ty` must be a 1x1 matrix
    /// type (a scalar).
    pub fn add_constant_of_type(&mut self, value: f64, ty: Type) -> Handle {
        debug_assert_eq!(ty.dims(), Some((1, 1)), "add_constant_of_type wants a scalar type");
        self.insert(Node::Constant { value: Value::Real(value), declared_type: ty })
    }

    /// As `add_constant_of_type`, but for matrix-typed constants. Mirrors
    /// `BMGraphBuilder.add_constant_of_matrix_type`.
    pub fn add_constant_of_matrix_type(&mut self, value: Value, ty: Type) -> Handle {
        debug_assert!(ty.is_matrix(), "add_constant_of_matrix_type wants a matrix type");
        self.insert(Node::Constant { value, declared_type: ty })
    }

    // -- distribution factories --------------------------------------------

    pub fn add_bernoulli(&mut self, prob: Handle) -> Handle {
        self.insert(Node::Bernoulli { prob })
    }

    pub fn add_beta(&mut self, alpha: Handle, beta: Handle) -> Handle {
        self.insert(Node::Beta { alpha, beta })
    }

    pub fn add_binomial(&mut self, n: Handle, p: Handle) -> Handle {
        self.insert(Node::Binomial { n, p })
    }

    // -- operator factories -------------------------------------------------

    pub fn add_add(&mut self, left: Handle, right: Handle) -> Handle {
        self.insert(Node::Add { left, right })
    }

    pub fn add_mul(&mut self, left: Handle, right: Handle) -> Handle {
        self.insert(Node::Mul { left, right })
    }

    pub fn add_pow(&mut self, base: Handle, exponent: Handle) -> Handle {
        self.insert(Node::Pow { base, exponent })
    }

    pub fn add_negate(&mut self, operand: Handle) -> Handle {
        self.insert(Node::Negate { operand })
    }

    pub fn add_exp(&mut self, operand: Handle) -> Handle {
        self.insert(Node::Exp { operand })
    }

    pub fn add_log(&mut self, operand: Handle) -> Handle {
        self.insert(Node::Log { operand })
    }

    pub fn add_to_real(&mut self, operand: Handle) -> Handle {
        self.insert(Node::ToReal { operand })
    }

    pub fn add_to_positive_real(&mut self, operand: Handle) -> Handle {
        self.insert(Node::ToPositiveReal { operand })
    }

    pub fn add_to_probability(&mut self, operand: Handle) -> Handle {
        self.insert(Node::ToProbability { operand })
    }

    pub fn add_if_then_else(&mut self, cond: Handle, consequence: Handle, alternative: Handle) -> Handle {
        self.insert(Node::IfThenElse { cond, consequence, alternative })
    }

    pub fn add_sample(&mut self, distribution: Handle) -> Handle {
        self.insert(Node::Sample { distribution })
    }

    // -- placeholders ---------------------------------------------------------

    pub fn add_map(&mut self, entries: Vec<Handle>) -> Handle {
        self.insert(Node::Map { entries })
    }

    pub fn add_index(&mut self, map: Handle, index: Handle) -> Handle {
        self.insert(Node::Index { map, index })
    }

    // -- terminals ------------------------------------------------------------

    pub fn add_observation(&mut self, sample: Handle, value: Handle) -> Handle {
        self.push(Node::Observation { sample, value })
    }

    pub fn add_query(&mut self, operator: Handle) -> Handle {
        self.push(Node::Query { operator })
    }

    /// Overwrites a single input slot of an already-inserted node. The
    /// fixer's only mutation primitive for a single operand.
    pub fn node_mut_set_input(&mut self, consumer: Handle, edge_index: usize, new_input: Handle) {
        self.nodes[consumer].set_input(edge_index, new_input);
    }

    /// Redirects every edge currently pointing at `old` to point at `new`
    /// instead. Used when the fixer splices a whole repair subgraph in
    /// for a node whose own shape was malformed (`Mul` -> `IfThenElse`,
    /// `Pow` -> `IfThenElse`), rather than just one of its operands.
    pub fn replace_node_in_place(&mut self, old: Handle, new: Handle) {
        for node in &mut self.nodes {
            for slot in node.inputs_mut() {
                if *slot == old {
                    *slot = new;
                }
            }
        }
    }

    // -- type computation -------------------------------------------------------

    /// The type this node currently has, given its inputs' current types;
    /// `Type::Malformed` if no legal type exists.
    pub fn graph_type(&self, h: Handle) -> Type {
        match self.node(h) {
            Node::Constant { declared_type, .. } => *declared_type,

            Node::Bernoulli { .. } => Type::BOOLEAN,
            Node::Beta { .. } => Type::PROBABILITY,
            Node::Binomial { .. } => Type::NATURAL,

            Node::Add { left, right } => self.binary_numeric_graph_type(*left, *right),
            Node::Mul { left, right } => self.binary_numeric_graph_type(*left, *right),

            Node::Pow { base, exponent } => {
                let bt = self.graph_type(*base);
                let et = self.graph_type(*exponent);
                if bt == Type::Malformed || et == Type::BOOLEAN {
                    Type::Malformed
                } else {
                    bt
                }
            }

            Node::Negate { operand } => match self.graph_type(*operand).kind() {
                Some(Kind::PositiveReal) => Type::NEGATIVE_REAL,
                Some(Kind::NegativeReal) => Type::POSITIVE_REAL,
                Some(Kind::Real) => Type::REAL,
                _ => Type::Malformed,
            },

            Node::Exp { operand } => {
                if self.graph_type(*operand) == Type::REAL {
                    Type::POSITIVE_REAL
                } else {
                    Type::Malformed
                }
            }
            Node::Log { operand } => {
                if self.graph_type(*operand) == Type::POSITIVE_REAL {
                    Type::REAL
                } else {
                    Type::Malformed
                }
            }
            Node::ToReal { .. } => Type::REAL,
            Node::ToPositiveReal { .. } => Type::POSITIVE_REAL,
            Node::ToProbability { .. } => Type::PROBABILITY,

            Node::IfThenElse { cond, consequence, alternative } => {
                let ct = self.graph_type(*cond);
                let tt = self.graph_type(*consequence);
                let ft = self.graph_type(*alternative);
                if ct == Type::BOOLEAN && tt == ft {
                    tt
                } else {
                    Type::Malformed
                }
            }

            Node::Sample { distribution } => self.graph_type(*distribution),

            Node::Map { entries } => sup_all(entries.iter().map(|e| self.graph_type(*e))),
            Node::Index { .. } => Type::Malformed,

            Node::Observation { .. } | Node::Query { .. } => Type::Malformed,
        }
    }

    /// The smallest type this node could be converted to.
    pub fn inf_type(&self, h: Handle) -> Type {
        match self.node(h) {
            Node::Constant { value, .. } => crate::types::type_of_value(value),

            Node::Bernoulli { .. } => Type::BOOLEAN,
            Node::Beta { .. } => Type::PROBABILITY,
            Node::Binomial { .. } => Type::NATURAL,

            Node::Add { left, right } => self.binary_numeric_inf_type(*left, *right, Type::POSITIVE_REAL),
            Node::Mul { left, right } => self.binary_numeric_inf_type(*left, *right, Type::PROBABILITY),

            // Pow's inf type passes the base straight through: the
            // operator never changes the operand's "value family", only
            // its exponent determines whether the node is malformed.
            Node::Pow { base, .. } => self.inf_type(*base),

            Node::Negate { operand } => match self.inf_type(*operand).kind() {
                Some(Kind::PositiveReal) => Type::NEGATIVE_REAL,
                Some(Kind::NegativeReal) => Type::POSITIVE_REAL,
                Some(Kind::Real) => Type::REAL,
                _ => Type::REAL,
            },
            Node::Exp { .. } => Type::POSITIVE_REAL,
            Node::Log { .. } => Type::REAL,
            Node::ToReal { .. } => Type::REAL,
            Node::ToPositiveReal { .. } => Type::POSITIVE_REAL,
            Node::ToProbability { .. } => Type::PROBABILITY,

            Node::IfThenElse { consequence, alternative, .. } => {
                sup(self.inf_type(*consequence), self.inf_type(*alternative))
            }

            Node::Sample { distribution } => self.inf_type(*distribution),

            Node::Map { entries } => sup_all(entries.iter().map(|e| self.inf_type(*e))),
            Node::Index { .. } => Type::Malformed,

            Node::Observation { .. } | Node::Query { .. } => Type::Malformed,
        }
    }

    /// `Add`/`Mul` share a shape: each operand's requirement either
    /// coordinates to a common promoted type, or -- when exactly one
    /// operand's `inf_type` is `Boolean` -- is left as each operand's own
    /// `inf_type`, so a genuine "indicator times value" multiplication
    /// stays malformed until the dedicated repair in `fixer.rs` turns it
    /// into an `IfThenElse`.
    ///
    /// This resolves an ambiguity in the single stated formula
    /// ("s = max(sup(left.inf_type, right.inf_type), Probability)" for
    /// both operators): followed literally for a `Boolean`/`Natural` pair
    /// it would implicitly-convert both operands to `PositiveReal` and
    /// never produce the `IfThenElse` that an indicator-times-value
    /// multiplication requires.
    /// The asymmetric-Boolean carve-out below is what makes that scenario
    /// (and the "at least one operand must be bool" reasoning in
    /// `fix_requirements.py::_convert_malformed_multiplication`) hold;
    /// see `DESIGN.md`.
    fn binary_numeric_inf_type(&self, left: Handle, right: Handle, floor: Type) -> Type {
        let li = self.inf_type(left);
        let ri = self.inf_type(right);
        if (li == Type::BOOLEAN) ^ (ri == Type::BOOLEAN) {
            sup(li, ri)
        } else {
            sup(sup(li, ri), floor)
        }
    }

    fn binary_numeric_graph_type(&self, left: Handle, right: Handle) -> Type {
        let lt = self.graph_type(left);
        let rt = self.graph_type(right);
        if lt == rt {
            lt
        } else {
            Type::Malformed
        }
    }

    // -- per-edge requirements ---------------------------------------------------

    /// The `Requirement` for each of `h`'s input edges, given the current
    /// (possibly not-yet-fixed) types of its inputs.
    pub fn requirements(&self, h: Handle) -> Vec<Requirement> {
        match self.node(h) {
            Node::Constant { .. } => vec![],

            Node::Bernoulli { .. } => vec![Requirement::Exact(Type::PROBABILITY)],
            Node::Beta { .. } => {
                vec![Requirement::Exact(Type::POSITIVE_REAL), Requirement::Exact(Type::POSITIVE_REAL)]
            }
            Node::Binomial { .. } => {
                vec![Requirement::Exact(Type::NATURAL), Requirement::Exact(Type::PROBABILITY)]
            }

            Node::Add { left, right } => self.binary_numeric_requirements(*left, *right, Type::POSITIVE_REAL),
            Node::Mul { left, right } => self.binary_numeric_requirements(*left, *right, Type::PROBABILITY),

            Node::Pow { base, exponent } => {
                vec![Requirement::Exact(self.inf_type(*base)), Requirement::Exact(self.inf_type(*exponent))]
            }

            Node::Negate { operand } => {
                let it = self.inf_type(*operand);
                let s = match it.kind() {
                    Some(Kind::Real | Kind::PositiveReal | Kind::NegativeReal) => it,
                    _ => sup(it, Type::REAL),
                };
                vec![Requirement::Exact(s)]
            }
            Node::Exp { .. } => vec![Requirement::Exact(Type::REAL)],
            Node::Log { .. } => vec![Requirement::Exact(Type::POSITIVE_REAL)],
            Node::ToReal { .. } => vec![Requirement::UpperBound(Type::REAL)],
            Node::ToPositiveReal { .. } => vec![Requirement::UpperBound(Type::POSITIVE_REAL)],
            Node::ToProbability { .. } => vec![Requirement::UpperBound(Type::REAL)],

            Node::IfThenElse { consequence, alternative, .. } => {
                let t = sup(self.inf_type(*consequence), self.inf_type(*alternative));
                vec![Requirement::Exact(Type::BOOLEAN), Requirement::Exact(t), Requirement::Exact(t)]
            }

            Node::Sample { distribution } => vec![Requirement::Exact(self.inf_type(*distribution))],

            Node::Map { entries } => {
                entries.iter().map(|e| Requirement::Exact(self.inf_type(*e))).collect()
            }
            Node::Index { map, .. } => {
                vec![Requirement::Exact(self.inf_type(*map)), Requirement::Exact(Type::NATURAL)]
            }

            Node::Observation { sample, .. } => {
                let t = self.graph_type(*sample);
                vec![Requirement::Exact(t), Requirement::Exact(t)]
            }
            Node::Query { operator } => vec![Requirement::Exact(self.inf_type(*operator))],
        }
    }

    fn binary_numeric_requirements(&self, left: Handle, right: Handle, floor: Type) -> Vec<Requirement> {
        let li = self.inf_type(left);
        let ri = self.inf_type(right);
        if (li == Type::BOOLEAN) ^ (ri == Type::BOOLEAN) {
            vec![Requirement::Exact(li), Requirement::Exact(ri)]
        } else {
            let s = sup(sup(li, ri), floor);
            vec![Requirement::Exact(s), Requirement::Exact(s)]
        }
    }
}

/// A display row for the CLI's `--format table` output and for ad hoc
/// debugging. Mirrors `Node<F>` deriving `Tabled` directly elsewhere in this corpus;
/// here the row is a separate projection because `graph_type`/`inf_type`
/// are computed against the whole arena rather than stored per node.
#[derive(Clone, Debug, Tabled)]
pub struct NodeRow {
    pub handle: Handle,
    pub label: String,
    #[tabled(display_with = "display_type")]
    pub graph_type: Type,
    #[tabled(display_with = "display_type")]
    pub inf_type: Type,
}

fn display_type(t: &Type) -> String {
    format!("{t:?}")
}

impl NodeRow {
    pub fn new(graph: &Graph, h: Handle, node: &Node) -> Self {
        NodeRow {
            handle: h,
            label: node.label(),
            graph_type: graph.graph_type(h),
            inf_type: graph.inf_type(h),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_shares_equal_constants_and_operators() {
        let mut g = Graph::new();
        let a = g.add_real(1.5);
        let b = g.add_real(1.5);
        assert_eq!(a, b);

        let s1 = g.add_add(a, a);
        let s2 = g.add_add(a, a);
        assert_eq!(s1, s2);
    }

    #[test]
    fn negative_zero_and_distinct_nans_do_not_merge() {
        let mut g = Graph::new();
        let pos_zero = g.add_real(0.0);
        let neg_zero = g.add_real(-0.0);
        assert_ne!(pos_zero, neg_zero);
    }

    #[test]
    fn children_precede_parents() {
        let mut g = Graph::new();
        let a = g.add_real(1.0);
        let b = g.add_real(2.0);
        let s = g.add_add(a, b);
        assert!(a < s);
        assert!(b < s);
    }

    #[test]
    #[should_panic(expected = "observation or query")]
    fn observation_as_input_is_an_assertion_failure() {
        let mut g = Graph::new();
        let p = g.add_probability(0.5).unwrap();
        let dist = g.add_bernoulli(p);
        let sample = g.add_sample(dist);
        let obs = g.add_observation(sample, g.add_boolean(true));
        // Using a terminal node as an operand is a programmer error.
        g.add_negate(obs);
    }
}
