//! The runtime binding (component F): the boundary between the fixed IR
//! and whatever concrete graph-evaluation backend consumes it.
//!
//! Grounded on the separation between `graph::model::Model`
//! (the IR) and its `circuit::GraphCircuit` consumer: the core crate
//! never knows the concrete backend type, only a trait it implements.
//! Here `GraphRuntime` plays that role -- legitimately a trait object
//! (`&mut dyn GraphRuntime`), unlike `Node`, because it is an external
//! collaborator whose concrete type genuinely varies by embedder, not an
//! internal node-dispatch mechanism this crate otherwise avoids.

use crate::errors::EmitError;
use crate::graph::Graph;
use crate::node::{DistributionKind, Handle, Node, OperatorKind};
use crate::types::{Type, Value};

/// An opaque identifier a [`GraphRuntime`] assigns to each node it
/// accepts. Emission threads these through so that an edge in the BMG IR
/// becomes an edge in the runtime's own representation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RuntimeId(pub u64);

/// The value carried by a constant node, as handed to the runtime.
/// Distinct alias from [`crate::types::Value`] at the same underlying
/// type, marking the boundary where an IR-internal type crosses into
/// the runtime's representation.
pub type RuntimeValue = Value;

/// The operations a concrete backend must support to receive an emitted
/// graph, mirroring the shape of BMG's own `add_*` C++ API that the
/// original Python builder calls through pybind11 (`to_bmg` in
/// `bm_graph_builder.py`). Distributions and operators are each
/// represented by their tag plus already-resolved input ids, rather than
/// one method per node kind, so a binding crate implements one match
/// over `DistributionKind`/`OperatorKind` instead of fifteen methods.
pub trait GraphRuntime {
    fn add_constant(&mut self, value: RuntimeValue) -> RuntimeId;
    fn add_distribution(&mut self, kind: DistributionKind, sample_type: Type, inputs: &[RuntimeId]) -> RuntimeId;
    fn add_operator(&mut self, kind: OperatorKind, inputs: &[RuntimeId]) -> RuntimeId;
    fn observe(&mut self, sample: RuntimeId, value: RuntimeId);
    fn query(&mut self, operator: RuntimeId);
}

/// Walks `graph` in handle order (already topological) and replays every
/// node onto `runtime`. Refuses to start if `report` is non-empty and
/// fails fast on the first node the runtime cannot accept: a
/// still-`Malformed` node, an analysis-only type reaching the boundary,
/// or an un-lowered `Map`/`Index` placeholder.
pub fn emit(
    graph: &Graph,
    report: &crate::errors::ErrorReport,
    runtime: &mut dyn GraphRuntime,
) -> Result<Vec<RuntimeId>, EmitError> {
    if !report.is_ok() {
        return Err(EmitError::UnresolvedViolations(report.clone()));
    }

    let mut ids: Vec<Option<RuntimeId>> = vec![None; graph.len()];
    for (h, node) in graph.iter() {
        let id = emit_node(graph, runtime, h, node, &ids)?;
        ids[h] = id;
    }
    Ok(ids.into_iter().map(|id| id.unwrap_or(RuntimeId(0))).collect())
}

fn get(ids: &[Option<RuntimeId>], h: Handle) -> RuntimeId {
    ids[h].expect("inputs are emitted before their consumers")
}

fn emit_node(
    graph: &Graph,
    runtime: &mut dyn GraphRuntime,
    h: Handle,
    node: &Node,
    ids: &[Option<RuntimeId>],
) -> Result<Option<RuntimeId>, EmitError> {
    if matches!(node, Node::Map { .. } | Node::Index { .. }) {
        return Err(EmitError::UnsupportedPlaceholder(h));
    }

    if !matches!(node, Node::Observation { .. } | Node::Query { .. }) {
        let ty = graph.graph_type(h);
        if ty == Type::Malformed {
            return Err(EmitError::StillMalformed(h, node.label()));
        }
        if ty.is_analysis_only() {
            return Err(EmitError::AnalysisOnlyType(h, node.label()));
        }
    }

    if let Some(kind) = node.distribution_kind() {
        let inputs: Vec<RuntimeId> = node.inputs().iter().map(|i| get(ids, *i)).collect();
        return Ok(Some(runtime.add_distribution(kind, graph.graph_type(h), &inputs)));
    }
    if let Some(kind) = node.operator_kind() {
        let inputs: Vec<RuntimeId> = node.inputs().iter().map(|i| get(ids, *i)).collect();
        return Ok(Some(runtime.add_operator(kind, &inputs)));
    }

    Ok(Some(match node {
        Node::Constant { value, .. } => runtime.add_constant(value.clone()),
        Node::Observation { sample, value } => {
            runtime.observe(get(ids, *sample), get(ids, *value));
            return Ok(None);
        }
        Node::Query { operator } => {
            runtime.query(get(ids, *operator));
            return Ok(None);
        }
        Node::Map { .. } | Node::Index { .. } => unreachable!("rejected above"),
        _ => unreachable!("every remaining node kind is a distribution or operator"),
    }))
}

/// A `GraphRuntime` test double that records every call it receives,
/// instead of talking to a real backend. Mirrors the lightweight test
/// mocks elsewhere in this crate's corpus: cheap to construct, lets assertions inspect
/// exactly what emission produced.
#[derive(Default, Debug)]
pub struct RecordingRuntime {
    pub next_id: u64,
    pub calls: Vec<String>,
    pub observations: Vec<(RuntimeId, RuntimeId)>,
    pub queries: Vec<RuntimeId>,
}

impl RecordingRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&mut self) -> RuntimeId {
        let id = RuntimeId(self.next_id);
        self.next_id += 1;
        id
    }
}

impl GraphRuntime for RecordingRuntime {
    fn add_constant(&mut self, value: RuntimeValue) -> RuntimeId {
        self.calls.push(format!("constant({value:?})"));
        self.next()
    }

    fn add_distribution(&mut self, kind: DistributionKind, sample_type: Type, inputs: &[RuntimeId]) -> RuntimeId {
        self.calls.push(format!("distribution({}, {sample_type:?}, {inputs:?})", kind.label()));
        self.next()
    }

    fn add_operator(&mut self, kind: OperatorKind, inputs: &[RuntimeId]) -> RuntimeId {
        self.calls.push(format!("operator({}, {inputs:?})", kind.label()));
        self.next()
    }

    fn observe(&mut self, sample: RuntimeId, value: RuntimeId) {
        self.observations.push((sample, value));
    }

    fn query(&mut self, operator: RuntimeId) {
        self.queries.push(operator);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorReport;
    use crate::fixer::fix_problems;

    #[test]
    fn emits_a_well_typed_graph_in_topological_order() {
        let mut g = Graph::new();
        let p = g.add_probability(0.4).unwrap();
        let dist = g.add_bernoulli(p);
        let sample = g.add_sample(dist);
        g.add_query(sample);
        let report = fix_problems(&mut g);
        assert!(report.is_ok());

        let mut rt = RecordingRuntime::new();
        let ids = emit(&g, &report, &mut rt).unwrap();
        assert_eq!(ids.len(), g.len());
        assert_eq!(rt.queries.len(), 1);
    }

    #[test]
    fn nonempty_report_refuses_to_emit() {
        let mut g = Graph::new();
        g.add_query(g.add_boolean(true));
        let mut report = ErrorReport::default();
        report.push(crate::errors::Violation {
            node: 0,
            node_label: "Boolean".to_string(),
            edge: "operand",
            found: Type::BOOLEAN,
            required: crate::types::Requirement::Exact(Type::REAL),
        });
        let mut rt = RecordingRuntime::new();
        let err = emit(&g, &report, &mut rt).unwrap_err();
        assert!(matches!(err, EmitError::UnresolvedViolations(_)));
    }

    #[test]
    fn still_malformed_node_fails_emission() {
        let mut g = Graph::new();
        let b = g.add_boolean(true);
        // force a genuinely unrepairable shape without running the fixer:
        // Pow with a Boolean exponent.
        let pow = g.add_pow(b, b);
        g.add_query(pow);
        let mut rt = RecordingRuntime::new();
        let err = emit(&g, &ErrorReport::default(), &mut rt).unwrap_err();
        assert!(matches!(err, EmitError::StillMalformed(_, _)));
    }

    #[test]
    fn map_node_is_rejected_at_emission() {
        let mut g = Graph::new();
        let a = g.add_real(1.0);
        let m = g.add_map(vec![a]);
        g.add_query(m);
        let mut rt = RecordingRuntime::new();
        let err = emit(&g, &ErrorReport::default(), &mut rt).unwrap_err();
        assert!(matches!(err, EmitError::UnsupportedPlaceholder(_)));
    }
}
