//! The requirements-fixing pass (component D): the whole-graph rewrite
//! that inserts coercion subgraphs where a cheap one exists and records a
//! [`Violation`] where none does.
//!
//! Grounded directly on `fix_requirements.py`'s `RequirementsFixer`: the
//! same dispatch shape (`meet_requirement` branching on whether the
//! producer is a constant, a distribution, a `Map`, or an operator), the
//! same malformed-multiplication/malformed-power special cases, and the
//! same "never abort, always accumulate" control flow (`fix_problems`
//! walks every node exactly once, in insertion order, which is already a
//! topological order because `Graph::insert` can only reference existing
//! handles).

use itertools::izip;

use crate::errors::{ErrorReport, Violation};
use crate::graph::Graph;
use crate::node::{Handle, Node};
use crate::types::{meets, sup, Requirement, Type, Value};

/// Runs the fixer over every node currently in `graph`, mutating edges in
/// place to insert coercions, and returns every requirement that could
/// not be met. Idempotent: running it twice on an already-fixed graph
/// produces an empty report and no further mutation.
pub fn fix_problems(graph: &mut Graph) -> ErrorReport {
    let mut report = ErrorReport::default();
    // Snapshot the handle range up front: a fixer step can append new
    // coercion nodes, and those new nodes are already well-typed by
    // construction, so they never need to be visited themselves.
    let len = graph.len();
    for h in 0..len {
        fix_node(graph, h, &mut report);
    }
    report
}

fn fix_node(graph: &mut Graph, h: Handle, report: &mut ErrorReport) {
    if graph.node(h).is_constant() {
        // Constants have no inputs; nothing to fix.
        return;
    }
    if let Node::Map { .. } = graph.node(h) {
        fix_edges(graph, h, report);
        return;
    }

    // Operator-specific malformed-shape repairs, tried before the
    // generic per-edge pass: these rewrite the node's own shape by
    // splicing in an `IfThenElse`, not just an operand.
    if matches!(graph.node(h), Node::Mul { .. }) && graph.graph_type(h) == Type::Malformed {
        if convert_malformed_multiplication(graph, h) {
            return;
        }
    }
    if matches!(graph.node(h), Node::Pow { .. }) && graph.graph_type(h) == Type::Malformed {
        if convert_malformed_power(graph, h, report) {
            return;
        }
    }

    fix_edges(graph, h, report);
}

/// Walks `h`'s current input list against `graph.requirements(h)` and
/// meets each one independently. This is the generic path used by every
/// node kind except the two malformed-shape special cases above.
fn fix_edges(graph: &mut Graph, h: Handle, report: &mut ErrorReport) {
    let requirements = graph.requirements(h);
    let inputs = graph.node(h).inputs();
    let edge_labels = graph.node(h).edge_labels();
    for (i, (input, requirement)) in izip!(inputs.iter(), requirements.iter()).enumerate() {
        meet_requirement(graph, h, i, *input, *requirement, edge_labels.get(i).copied().unwrap_or("?"), report);
    }
}

/// Attempts to make `input` (the `i`th operand of `consumer`) satisfy
/// `requirement`, rewriting `consumer`'s edge in place if a coercion
/// exists, or recording a [`Violation`] if not. Mirrors
/// `meet_requirement`'s top-level dispatch in the original.
fn meet_requirement(
    graph: &mut Graph,
    consumer: Handle,
    edge_index: usize,
    input: Handle,
    requirement: Requirement,
    edge_label: &'static str,
    report: &mut ErrorReport,
) {
    let current = graph.graph_type(input);
    if meets(current, requirement) {
        return;
    }

    let replacement = if graph.node(input).is_constant() {
        meet_constant_requirement(graph, input, requirement)
    } else if graph.node(input).is_distribution() {
        // Distributions are never coerced: their sample type is fixed by
        // the distribution kind alone, so a distribution
        // that doesn't already meet its consumer's requirement cannot be
        // repaired by inserting an operator above it.
        None
    } else {
        meet_operator_requirement(graph, input, requirement)
    };

    match replacement {
        Some(new_input) => graph.node_mut_set_input(consumer, edge_index, new_input),
        None => report.push(Violation {
            node: consumer,
            node_label: graph.node(consumer).label(),
            edge: edge_label,
            found: current,
            required: requirement,
        }),
    }
}

/// Repairs a constant that does not meet `requirement` by reinterpreting
/// its literal value at the required type, rather than inserting an
/// operator above it, mirroring `_meet_constant_requirement`. Always
/// succeeds for `Exact`/`UpperBound`
/// requirements whose bound is a concrete scalar or matrix type; fails
/// only for a `Tensor` bound, which no constant can be re-typed to meet
/// meaningfully.
fn meet_constant_requirement(graph: &mut Graph, constant: Handle, requirement: Requirement) -> Option<Handle> {
    let bound = requirement.bound();
    let Type::Matrix { rows, cols, .. } = bound else {
        // `Tensor`/`Malformed` bounds: no concrete constant can be built
        // at those types, so leave the requirement unmet.
        return None;
    };
    let Node::Constant { value, .. } = graph.node(constant).clone() else {
        unreachable!("caller checked is_constant");
    };
    match &value {
        Value::Matrix { data, .. } => {
            if data.len() as u64 != rows as u64 * cols as u64 {
                // The constant's actual shape can't be reinterpreted at
                // `bound`'s dimensions (e.g. forcing a multi-element
                // tensor into a scalar requirement).
                return None;
            }
            Some(graph.add_constant_of_matrix_type(value, bound))
        }
        Value::Bool(b) => Some(graph.add_constant_of_type(if *b { 1.0 } else { 0.0 }, bound)),
        Value::Real(x) => Some(graph.add_constant_of_type(*x, bound)),
    }
}

/// Repairs an operator-producer that does not meet `requirement` by
/// inserting the cheapest applicable coercion operator above it.
/// Mirrors `_meet_operator_requirement`'s table of legal single-step
/// conversions.
fn meet_operator_requirement(graph: &mut Graph, operand: Handle, requirement: Requirement) -> Option<Handle> {
    let it = graph.inf_type(operand);
    let bound = requirement.bound();

    match requirement {
        Requirement::Exact(target) => {
            if let Some(coerced) = insert_coercion(graph, operand, it, target) {
                return Some(coerced);
            }
            None
        }
        Requirement::UpperBound(target) => {
            if sup(it, target) != target {
                return None;
            }
            // The smallest valid choice is the node's own inf_type, not
            // the bound itself: `current` (graph_type) is what tells us
            // whether a node is already needed, e.g. it is itself
            // Malformed.
            let current = graph.graph_type(operand);
            insert_coercion(graph, operand, current, it).or({
                if can_force_to_probability(it, bound) {
                    Some(graph.add_to_probability(operand))
                } else {
                    None
                }
            })
        }
    }
}

/// Inserts the single coercion operator, if any, that turns `from` into
/// exactly `to`. Returns `None` if `from == to` already (the caller
/// handles that via `meets` and never reaches here) or if no direct
/// coercion exists, in which case the caller may still try
/// `can_force_to_probability` for an `UpperBound`.
fn insert_coercion(graph: &mut Graph, operand: Handle, from: Type, to: Type) -> Option<Handle> {
    if from == to {
        return Some(operand);
    }
    // A Boolean-ish producer feeding an edge that wants Natural or
    // Probability exactly: `IfThenElse(operand, 1, 0)` at the required
    // type, rather than a Violation. Mirrors `_convert_node`'s
    // `NaturalNode`/`ProbabilityNode` branch over a Boolean operand.
    if matches!(to, Type::NATURAL | Type::PROBABILITY) && meets(from, Requirement::UpperBound(Type::BOOLEAN)) {
        let one = graph.add_constant_of_type(1.0, to);
        let zero = graph.add_constant_of_type(0.0, to);
        return Some(graph.add_if_then_else(operand, one, zero));
    }
    match to {
        Type::REAL => Some(graph.add_to_real(operand)),
        Type::POSITIVE_REAL => Some(graph.add_to_positive_real(operand)),
        Type::PROBABILITY => {
            if can_force_to_probability(from, to) {
                Some(graph.add_to_probability(operand))
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Whether `ToProbability` is a legal coercion from `from`. Mirrors
/// `_can_force_to_prob` in the original: legal only from `Real` or
/// `PositiveReal`.
fn can_force_to_probability(from: Type, _to: Type) -> bool {
    matches!(from, Type::REAL | Type::POSITIVE_REAL)
}

/// Rewrites a malformed `Mul` (one operand `Boolean`, the other not) into
/// `IfThenElse(bool_operand, other_operand, 0)`, the single repair
/// `fix_requirements.py::_convert_malformed_multiplication` performs
/// before falling back to a `Violation`. Returns `false` (leaving the
/// node for the generic per-edge pass) if the node does not have this
/// exact "indicator times value" shape.
fn convert_malformed_multiplication(graph: &mut Graph, h: Handle) -> bool {
    let Node::Mul { left, right } = *graph.node(h) else {
        return false;
    };
    let lt = graph.inf_type(left);
    let rt = graph.inf_type(right);
    let (bool_operand, other, other_type) = if lt == Type::BOOLEAN && rt != Type::BOOLEAN {
        (left, right, rt)
    } else if rt == Type::BOOLEAN && lt != Type::BOOLEAN {
        (right, left, lt)
    } else {
        return false;
    };
    let zero = graph.add_constant_of_type(0.0, other_type);
    let replacement = graph.add_if_then_else(bool_operand, other, zero);
    graph.replace_node_in_place(h, replacement);
    true
}

/// Rewrites a malformed `Pow` (a `Boolean` exponent) into
/// `IfThenElse(exponent, base, 1)`, the single repair
/// `fix_requirements.py::_convert_malformed_power` performs: the only way
/// a `Pow` can be malformed is a `Boolean` exponent (by topological order
/// the base is already well-typed), so this always succeeds. Returns
/// `true` once the node has been spliced away.
fn convert_malformed_power(graph: &mut Graph, h: Handle, _report: &mut ErrorReport) -> bool {
    let Node::Pow { base, exponent } = *graph.node(h) else {
        return false;
    };
    let base_type = graph.graph_type(base);
    let one = graph.add_constant_of_type(1.0, base_type);
    let replacement = graph.add_if_then_else(exponent, base, one);
    graph.replace_node_in_place(h, replacement);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_well_typed_graph_has_no_violations() {
        let mut g = Graph::new();
        let p = g.add_probability(0.3).unwrap();
        let dist = g.add_bernoulli(p);
        let sample = g.add_sample(dist);
        g.add_query(sample);
        let report = fix_problems(&mut g);
        assert!(report.is_ok());
    }

    #[test]
    fn boolean_times_natural_becomes_if_then_else() {
        let mut g = Graph::new();
        let b = g.add_boolean(true);
        let n = g.add_natural(3);
        let product = g.add_mul(b, n);
        let query = g.add_query(product);
        let report = fix_problems(&mut g);
        assert!(report.is_ok());
        // the query's operand edge has been redirected away from the
        // malformed `Mul` to the spliced-in `IfThenElse` repair.
        let Node::Query { operator } = *g.node(query) else { unreachable!() };
        assert_ne!(operator, product);
        assert!(matches!(g.node(operator), Node::IfThenElse { .. }));
    }

    #[test]
    fn bernoulli_of_sum_of_probabilities_promotes_to_positive_real_then_forces() {
        let mut g = Graph::new();
        let p1 = g.add_probability(0.2).unwrap();
        let p2 = g.add_probability(0.3).unwrap();
        let sum = g.add_add(p1, p2);
        let dist = g.add_bernoulli(sum);
        g.add_sample(dist);
        let report = fix_problems(&mut g);
        assert!(report.is_ok());
        assert_eq!(g.graph_type(sum), Type::POSITIVE_REAL);
    }

    #[test]
    fn power_with_boolean_exponent_becomes_if_then_else() {
        // Pow(SampleBeta, SampleBernoulli): a Boolean exponent.
        let mut g = Graph::new();
        let alpha = g.add_positive_real(2.0).unwrap();
        let beta_param = g.add_positive_real(3.0).unwrap();
        let beta_dist = g.add_beta(alpha, beta_param);
        let base = g.add_sample(beta_dist);

        let p = g.add_probability(0.4).unwrap();
        let bernoulli = g.add_bernoulli(p);
        let exponent = g.add_sample(bernoulli);

        let power = g.add_pow(base, exponent);
        let query = g.add_query(power);
        let report = fix_problems(&mut g);
        assert!(report.is_ok());

        let Node::Query { operator } = *g.node(query) else { unreachable!() };
        assert_ne!(operator, power);
        let Node::IfThenElse { cond, consequence, alternative } = *g.node(operator) else {
            panic!("expected the power to have been rewritten to an if-then-else")
        };
        assert_eq!(cond, exponent);
        assert_eq!(consequence, base);
        assert_eq!(g.graph_type(alternative), Type::PROBABILITY);
        assert_eq!(g.graph_type(operator), Type::PROBABILITY);
    }

    #[test]
    fn boolean_sample_feeding_a_natural_edge_becomes_if_then_else() {
        // Sample(Bernoulli) (graph_type/inf_type Boolean) feeding
        // Binomial's `n` edge (Exact(Natural)).
        let mut g = Graph::new();
        let p = g.add_probability(0.5).unwrap();
        let bernoulli = g.add_bernoulli(p);
        let indicator = g.add_sample(bernoulli);

        let p2 = g.add_probability(0.3).unwrap();
        let binomial = g.add_binomial(indicator, p2);
        g.add_sample(binomial);

        let report = fix_problems(&mut g);
        assert!(report.is_ok());

        let Node::Binomial { n, .. } = *g.node(binomial) else { unreachable!() };
        assert_ne!(n, indicator);
        let Node::IfThenElse { cond, consequence, alternative } = *g.node(n) else {
            panic!("expected the Boolean sample to have been wrapped in an if-then-else")
        };
        assert_eq!(cond, indicator);
        assert_eq!(g.graph_type(consequence), Type::NATURAL);
        assert_eq!(g.graph_type(alternative), Type::NATURAL);
        assert_eq!(g.graph_type(n), Type::NATURAL);
    }

    #[test]
    fn natural_operator_cannot_be_force_clamped_to_probability() {
        // A Sample(Binomial) (graph_type/inf_type Natural) feeding a
        // Bernoulli's probability edge (Exact(Probability)) is not within
        // `can_force_to_probability`'s restricted {Real, PositiveReal}
        // range, so it is reported rather than silently clamped.
        let mut g = Graph::new();
        let n = g.add_natural(2);
        let p = g.add_probability(0.4).unwrap();
        let binomial = g.add_binomial(n, p);
        let count = g.add_sample(binomial);

        let bernoulli = g.add_bernoulli(count);
        g.add_sample(bernoulli);

        let report = fix_problems(&mut g);
        assert!(!report.is_ok());
        assert_eq!(report.violations[0].node_label, "Bernoulli");
        assert_eq!(report.violations[0].found, Type::NATURAL);
        assert_eq!(report.violations[0].required, Requirement::Exact(Type::PROBABILITY));
    }

    #[test]
    fn unsatisfiable_requirement_is_reported_not_panicked() {
        let mut g = Graph::new();
        let t = g.add_tensor_constant(vec![2, 2, 2], vec![0.0; 8]).unwrap();
        let dist_prob = g.add_bernoulli(t);
        g.add_sample(dist_prob);
        let report = fix_problems(&mut g);
        assert!(!report.is_ok());
    }

    #[test]
    fn constant_reinterpreted_at_required_type_with_no_coercion_node() {
        // A Natural(3) constant feeding an
        // edge that requires Exact(Real) (here, `Exp`'s operand) is
        // replaced by a Real(3.0) constant directly -- no `ToReal`
        // operator is inserted.
        let mut g = Graph::new();
        let n = g.add_natural(3);
        let e = g.add_exp(n);
        g.add_query(e);
        let report = fix_problems(&mut g);
        assert!(report.is_ok());

        let Node::Exp { operand } = *g.node(e) else { unreachable!() };
        assert_ne!(operand, n);
        assert!(matches!(g.node(operand), Node::Constant { declared_type, .. } if *declared_type == Type::REAL));
    }

    #[test]
    fn tensor_demanded_as_probability_is_a_single_violation() {
        let mut g = Graph::new();
        let t = g.add_tensor_constant(vec![2, 2, 2], vec![0.0; 8]).unwrap();
        let dist = g.add_bernoulli(t);
        g.add_sample(dist);
        let report = fix_problems(&mut g);
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].node_label, "Bernoulli");
        assert_eq!(report.violations[0].required, Requirement::Exact(Type::PROBABILITY));
    }

    #[test]
    fn fixing_twice_is_idempotent() {
        let mut g = Graph::new();
        let p1 = g.add_probability(0.2).unwrap();
        let p2 = g.add_probability(0.3).unwrap();
        let sum = g.add_add(p1, p2);
        let dist = g.add_bernoulli(sum);
        g.add_sample(dist);

        let first = fix_problems(&mut g);
        let len_after_first = g.len();
        let second = fix_problems(&mut g);

        assert_eq!(first, second);
        assert_eq!(g.len(), len_after_first, "re-fixing must not append new nodes");
    }

    #[test]
    fn topological_order_holds_before_and_after_fixing() {
        let mut g = Graph::new();
        let b = g.add_boolean(true);
        let n = g.add_natural(3);
        let product = g.add_mul(b, n);
        g.add_query(product);

        for (h, node) in g.iter() {
            for input in node.inputs() {
                assert!(input < h, "node {h} has an input {input} that does not precede it");
            }
        }
        fix_problems(&mut g);
        for (h, node) in g.iter() {
            for input in node.inputs() {
                assert!(input < h, "node {h} has an input {input} that does not precede it after fixing");
            }
        }
    }
}
