// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::collections::HashMap;

use crate::edge::{BoundEdge, Edge};
use crate::error::GraphError;
use crate::graph::{Graph, Node, NodeId};

/// The result of [`compile`]: a topologically-ordered [`Graph`] plus a
/// lookup from declared name to [`NodeId`] for every node, not only the
/// outputs — used by callers that need to feed a leaf by name.
#[derive(Debug)]
pub struct Compiled {
    pub graph: Graph,
    pub names: HashMap<Box<str>, NodeId>,
}

/// Compiles a set of bound edges plus declared leaf names into a static,
/// topologically-ordered [`Graph`].
///
/// Every name appearing as a `BoundEdge` output must be unique; every name
/// that is not a declared leaf and not produced by some edge is reported
/// as [`GraphError::UnreachableInput`] once referenced. Cycles are
/// detected via DFS over the name graph and reported with the full path.
pub fn compile(
    leaves: Vec<String>,
    edges: Vec<BoundEdge>,
    outputs: Vec<String>,
) -> Result<Compiled, GraphError> {
    let mut producer_index: HashMap<Box<str>, usize> = HashMap::new();
    for (idx, edge) in edges.iter().enumerate() {
        if producer_index.insert(edge.output_name.clone(), idx).is_some() {
            return Err(GraphError::MultiParent {
                node: edge.output_name.to_string(),
            });
        }
    }
    for leaf in &leaves {
        if producer_index.contains_key(leaf.as_str()) {
            return Err(GraphError::NameCollision { name: leaf.clone() });
        }
    }

    // Topologically order every name reachable from the requested outputs,
    // detecting cycles as we go.
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        Visiting,
        Done,
    }
    let mut marks: HashMap<Box<str>, Mark> = HashMap::new();
    let mut order: Vec<Box<str>> = Vec::new();
    let mut stack: Vec<Box<str>> = Vec::new();

    fn visit(
        name: &str,
        leaves: &[String],
        edges: &[BoundEdge],
        producer_index: &HashMap<Box<str>, usize>,
        marks: &mut HashMap<Box<str>, Mark>,
        order: &mut Vec<Box<str>>,
        stack: &mut Vec<Box<str>>,
    ) -> Result<(), GraphError> {
        match marks.get(name) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let mut path: Vec<String> = stack.iter().map(|s| s.to_string()).collect();
                path.push(name.to_string());
                return Err(GraphError::Cycle { path });
            }
            None => {}
        }

        if leaves.iter().any(|l| l == name) {
            marks.insert(name.into(), Mark::Done);
            order.push(name.into());
            return Ok(());
        }

        let Some(&idx) = producer_index.get(name) else {
            return Err(GraphError::UnreachableInput {
                output: name.to_string(),
            });
        };

        marks.insert(name.into(), Mark::Visiting);
        stack.push(name.into());
        for parent in edges[idx].input_names.iter() {
            visit(parent, leaves, edges, producer_index, marks, order, stack)?;
        }
        stack.pop();
        marks.insert(name.into(), Mark::Done);
        order.push(name.into());
        Ok(())
    }

    for output in &outputs {
        visit(
            output,
            &leaves,
            &edges,
            &producer_index,
            &mut marks,
            &mut order,
            &mut stack,
        )?;
    }

    let mut edge_slots: Vec<Option<BoundEdge>> = edges.into_iter().map(Some).collect();
    let mut names: HashMap<Box<str>, NodeId> = HashMap::new();
    let mut nodes: Vec<Node> = Vec::with_capacity(order.len());
    for name in order {
        let id = NodeId(nodes.len() as u32);
        let node = match producer_index.get(&name) {
            None => Node::Leaf { name: name.clone() },
            Some(&idx) => {
                let bound = edge_slots[idx].take().expect("each output produced once");
                let parents = bound
                    .input_names
                    .iter()
                    .map(|parent| names[parent])
                    .collect();
                Node::Produced {
                    name: Some(name.clone()),
                    edge: bound.edge,
                    parents,
                }
            }
        };
        names.insert(name.clone(), id);
        nodes.push(node);
    }

    for (idx, node) in nodes.iter().enumerate() {
        if let Node::Produced {
            edge: Edge::Cache(inner, allow_impure),
            ..
        } = node
        {
            if inner.is_impure() && !allow_impure {
                return Err(GraphError::CacheOverImpure {
                    node: node_label(node, idx),
                });
            }
        }
    }

    let mut impure_memo: HashMap<NodeId, bool> = HashMap::new();
    for (idx, node) in nodes.iter().enumerate() {
        if let Node::Produced {
            edge: Edge::Filter(_),
            parents,
            ..
        } = node
        {
            let predicate_parents = &parents[..parents.len().saturating_sub(1)];
            if predicate_parents
                .iter()
                .any(|&p| depends_on_impure(&nodes, p, &mut impure_memo))
            {
                return Err(GraphError::ImpureInFilter {
                    node: node_label(node, idx),
                });
            }
        }
    }

    let output_ids = outputs
        .iter()
        .map(|name| (name.clone().into_boxed_str(), names[name.as_str()]))
        .collect();

    Ok(Compiled {
        graph: Graph {
            nodes,
            outputs: output_ids,
        },
        names,
    })
}

fn node_label(node: &Node, idx: usize) -> String {
    node.name().map(str::to_owned).unwrap_or_else(|| format!("#{idx}"))
}

/// `true` if `id`'s own edge, or any of its transitive parents' edges, is
/// [`Edge::is_impure`].
fn depends_on_impure(nodes: &[Node], id: NodeId, memo: &mut HashMap<NodeId, bool>) -> bool {
    if let Some(&cached) = memo.get(&id) {
        return cached;
    }
    let result = match &nodes[id.as_u32() as usize] {
        Node::Leaf { .. } => false,
        Node::Produced { edge, parents, .. } => {
            edge.is_impure() || parents.iter().any(|&p| depends_on_impure(nodes, p, memo))
        }
    };
    memo.insert(id, result);
    result
}
