use std::collections::HashSet;

use petgraph::stable_graph::{EdgeIndex, NodeIndex};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::Direction;

use crate::error::EngineError;

use super::types::{Graph, NodeKind, Port};

/// Validate a built graph in place, recording identified back-edges.
///
/// Checks, in order: kind-specific port legality, self-loops, the
/// generalized acyclicity rule (cycles only through `loop` vertices), and
/// sink reachability.
pub fn validate_graph(graph: &mut Graph) -> Result<(), EngineError> {
    if graph.inner.node_count() == 0 {
        return Err(EngineError::InvalidGraph("graph has no nodes".into()));
    }

    check_port_legality(graph)?;
    check_self_loops(graph)?;

    let back_edges = identify_back_edges(graph);
    check_acyclic_without(graph, &back_edges)?;
    graph.back_edges = back_edges;

    check_loop_bodies(graph)?;
    check_sink_reachability(graph)?;
    Ok(())
}

fn check_port_legality(graph: &Graph) -> Result<(), EngineError> {
    for edge in graph.inner.edge_references() {
        let source = graph
            .inner
            .node_weight(edge.source())
            .expect("edge source exists");
        let legal = match source.kind {
            NodeKind::Condition => matches!(
                edge.weight().source_port,
                Some(Port::True) | Some(Port::False)
            ),
            NodeKind::Loop => matches!(
                edge.weight().source_port,
                Some(Port::Loop) | Some(Port::Done)
            ),
            _ => edge.weight().source_port.is_none(),
        };
        if !legal {
            return Err(EngineError::InvalidGraph(format!(
                "edge '{}' uses port {:?}, not legal for {} vertex '{}'",
                edge.weight().id,
                edge.weight().source_port.map(|p| p.as_str()),
                source.kind.as_str(),
                source.id
            )));
        }
    }
    Ok(())
}

fn check_self_loops(graph: &Graph) -> Result<(), EngineError> {
    for edge in graph.inner.edge_references() {
        if edge.source() == edge.target() {
            return Err(EngineError::InvalidGraph(format!(
                "self-loop edge '{}' on vertex '{}'",
                edge.weight().id,
                edge.weight().source
            )));
        }
    }
    Ok(())
}

/// An edge (s -> L) is a back-edge when L is a `loop` vertex and s is
/// reachable from L without traversing any edge into L itself.
fn identify_back_edges(graph: &Graph) -> HashSet<EdgeIndex> {
    let mut back = HashSet::new();
    for loop_ix in graph.inner.node_indices() {
        let Some(node) = graph.inner.node_weight(loop_ix) else {
            continue;
        };
        if node.kind != NodeKind::Loop {
            continue;
        }
        let reachable = forward_reachable(graph, loop_ix);
        for edge in graph.inner.edges_directed(loop_ix, Direction::Incoming) {
            if reachable.contains(&edge.source()) {
                back.insert(edge.id());
            }
        }
    }
    back
}

fn forward_reachable(graph: &Graph, from: NodeIndex) -> HashSet<NodeIndex> {
    let mut seen = HashSet::new();
    let mut stack = vec![from];
    while let Some(ix) = stack.pop() {
        for edge in graph.inner.edges_directed(ix, Direction::Outgoing) {
            // Edges into the loop vertex itself are back-edge candidates,
            // not forward paths.
            if edge.target() == from {
                continue;
            }
            if seen.insert(edge.target()) {
                stack.push(edge.target());
            }
        }
    }
    seen
}

fn check_acyclic_without(graph: &Graph, back_edges: &HashSet<EdgeIndex>) -> Result<(), EngineError> {
    // Kahn's algorithm over the forward edges only.
    let mut in_degree: std::collections::HashMap<NodeIndex, usize> = graph
        .inner
        .node_indices()
        .map(|ix| (ix, 0))
        .collect();
    for edge in graph.inner.edge_references() {
        if back_edges.contains(&edge.id()) {
            continue;
        }
        *in_degree.get_mut(&edge.target()).expect("node known") += 1;
    }

    let mut queue: Vec<NodeIndex> = in_degree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(ix, _)| *ix)
        .collect();
    let mut visited = 0usize;
    while let Some(ix) = queue.pop() {
        visited += 1;
        for edge in graph.inner.edges_directed(ix, Direction::Outgoing) {
            if back_edges.contains(&edge.id()) {
                continue;
            }
            let d = in_degree.get_mut(&edge.target()).expect("node known");
            *d -= 1;
            if *d == 0 {
                queue.push(edge.target());
            }
        }
    }

    if visited != graph.inner.node_count() {
        return Err(EngineError::InvalidGraph(
            "cycle not passing through a loop vertex".into(),
        ));
    }
    Ok(())
}

/// Every loop vertex needs an iteration body to hand payloads back;
/// a loop with no `loop`-port edge would stall the run.
fn check_loop_bodies(graph: &Graph) -> Result<(), EngineError> {
    for ix in graph.inner.node_indices() {
        let Some(node) = graph.inner.node_weight(ix) else {
            continue;
        };
        if node.kind != NodeKind::Loop {
            continue;
        }
        let has_body = graph
            .inner
            .edges_directed(ix, Direction::Outgoing)
            .any(|e| e.weight().source_port == Some(Port::Loop));
        if !has_body {
            return Err(EngineError::InvalidGraph(format!(
                "loop vertex '{}' has no outgoing 'loop' edge",
                node.id
            )));
        }
    }
    Ok(())
}

fn check_sink_reachability(graph: &Graph) -> Result<(), EngineError> {
    let sources: Vec<NodeIndex> = graph
        .inner
        .node_indices()
        .filter(|ix| {
            graph
                .inner
                .edges_directed(*ix, Direction::Incoming)
                .next()
                .is_none()
        })
        .collect();
    if sources.is_empty() {
        return Err(EngineError::InvalidGraph(
            "no source vertex (every vertex has inbound edges)".into(),
        ));
    }

    let mut seen: HashSet<NodeIndex> = sources.iter().copied().collect();
    let mut stack = sources;
    while let Some(ix) = stack.pop() {
        let is_sink = graph
            .inner
            .edges_directed(ix, Direction::Outgoing)
            .next()
            .is_none();
        if is_sink {
            return Ok(());
        }
        for edge in graph.inner.edges_directed(ix, Direction::Outgoing) {
            if seen.insert(edge.target()) {
                stack.push(edge.target());
            }
        }
    }
    Err(EngineError::InvalidGraph(
        "no sink reachable from any source".into(),
    ))
}
