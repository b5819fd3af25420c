// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use strata_graph::{BoundEdge, Capability, Edge, JoinMode, Selector};

use crate::bag::EdgesBag;
use crate::context::Context;
use crate::error::AlgebraError;

/// Chains `prev` into `cur`: names `prev` produces that `cur` also
/// declares as inputs are connected directly (the compiled graph already
/// treats a name as produced exactly once, so no extra edge is needed);
/// `prev`'s remaining outputs are forwarded into the new bag's outputs
/// when marked virtual or persistent; `cur`'s remaining inputs become the
/// new bag's inputs. Outputs whose dependency closure can no longer reach
/// a declared input (because the input that used to supply it was
/// shadowed rather than forwarded) are silently dropped, matching the
/// reference engine's "drop outputs with missing essential inputs" rule.
pub fn chain(prev: &EdgesBag, cur: &EdgesBag) -> Result<EdgesBag, AlgebraError> {
    let shared: HashSet<String> = prev
        .outputs
        .iter()
        .filter(|o| cur.inputs.contains(o))
        .cloned()
        .collect();

    for name in &cur.inputs {
        if shared.contains(name) {
            continue;
        }
        if prev.outputs.contains(name)
            && !prev.virtual_names.contains(name)
            && !prev.persistent_names.contains(name)
            && !cur.optional_names.contains(name)
        {
            return Err(AlgebraError::NotForwarded { name: name.clone() });
        }
    }

    let mut edges = prev.edges.clone();
    edges.extend(cur.edges.iter().cloned());

    let mut new_inputs = prev.inputs.clone();
    for name in &cur.inputs {
        if !shared.contains(name) && !new_inputs.contains(name) {
            new_inputs.push(name.clone());
        }
    }

    let mut new_outputs = cur.outputs.clone();
    for name in &prev.outputs {
        if shared.contains(name) || new_outputs.contains(name) {
            continue;
        }
        if prev.virtual_names.contains(name) || prev.persistent_names.contains(name) {
            new_outputs.push(name.clone());
        }
    }

    let new_virtual: HashSet<String> = prev
        .virtual_names
        .intersection(&cur.virtual_names)
        .cloned()
        .collect();
    let new_persistent: HashSet<String> = prev
        .persistent_names
        .union(&cur.persistent_names)
        .cloned()
        .collect();
    let new_optional: HashSet<String> = prev
        .optional_names
        .intersection(&cur.optional_names)
        .cloned()
        .collect();
    let context = Context::chain(prev.context.clone(), cur.context.clone());

    let final_outputs: Vec<String> = new_outputs
        .into_iter()
        .filter(|name| is_reachable(name, &new_inputs, &edges))
        .collect();

    EdgesBag::new(
        new_inputs,
        final_outputs,
        edges,
        new_virtual,
        new_persistent,
        new_optional,
        context,
    )
}

fn is_reachable(name: &str, inputs: &[String], edges: &[BoundEdge]) -> bool {
    if inputs.iter().any(|i| i == name) {
        return true;
    }
    let Some(edge) = edges.iter().find(|e| &*e.output_name == name) else {
        return false;
    };
    edge.input_names
        .iter()
        .all(|parent| is_reachable(parent, inputs, edges))
}

/// Renames every node a branch produces (but not its declared inputs, which
/// stay addressable under their shared top-level name) under a
/// branch-specific prefix, so two branches built the same way — the normal
/// case for [`merge`] — don't collide when their edges are concatenated
/// into one graph. Returns the renamed edges plus each original output
/// name's new, branch-local name.
fn branch_local(branch: &EdgesBag, index: usize) -> (Vec<BoundEdge>, HashMap<String, String>) {
    let qualify = |name: &str| -> String {
        if branch.inputs.iter().any(|i| i == name) {
            name.to_owned()
        } else {
            format!("$merge.branch{index}${name}")
        }
    };
    let edges = branch
        .edges
        .iter()
        .map(|e| {
            BoundEdge::new(
                e.edge.clone(),
                e.input_names.iter().map(|n| qualify(n)).collect::<Vec<_>>(),
                qualify(&e.output_name),
            )
        })
        .collect();
    let local_outputs = branch
        .outputs
        .iter()
        .map(|o| (o.clone(), qualify(o)))
        .collect();
    (edges, local_outputs)
}

/// Routes between `branches` by an index produced by `selector` over
/// `selector_inputs`. Every branch must declare the same output names;
/// each merged output carries whichever branch the selector picked for
/// that call.
pub fn merge(
    branches: Vec<EdgesBag>,
    selector: Arc<dyn Selector>,
    selector_inputs: Vec<String>,
) -> Result<EdgesBag, AlgebraError> {
    let Some(first) = branches.first() else {
        return EdgesBag::new(
            Vec::new(),
            Vec::new(),
            Vec::new(),
            HashSet::new(),
            HashSet::new(),
            HashSet::new(),
            Context::Identity,
        );
    };
    let output_names = first.outputs.clone();

    let mut inputs: Vec<String> = Vec::new();
    let mut edges: Vec<BoundEdge> = Vec::new();
    let mut branch_outputs: Vec<HashMap<String, String>> = Vec::with_capacity(branches.len());
    for (i, branch) in branches.iter().enumerate() {
        for input in &branch.inputs {
            if !inputs.contains(input) {
                inputs.push(input.clone());
            }
        }
        let (local_edges, local_outputs) = branch_local(branch, i);
        edges.extend(local_edges);
        branch_outputs.push(local_outputs);
    }
    for input in &selector_inputs {
        if !inputs.contains(input) {
            inputs.push(input.clone());
        }
    }

    let index_node = "$merge.index".to_owned();
    edges.push(BoundEdge::new(
        Edge::Switch(selector),
        selector_inputs,
        index_node.clone(),
    ));

    let mut outputs = Vec::new();
    for name in &output_names {
        let mut branch_gated = Vec::with_capacity(branches.len());
        for i in 0..branches.len() {
            let Some(local_name) = branch_outputs[i].get(name) else {
                continue;
            };
            let equals_i = named_index_guard(&index_node, i);
            let gated = format!("$merge.{name}@{i}");
            edges.push(BoundEdge::new(
                Edge::Filter(equals_i),
                vec![index_node.clone(), local_name.clone()],
                gated.clone(),
            ));
            branch_gated.push(gated);
        }
        let merged = name.clone();
        edges.push(BoundEdge::new(Edge::Projection, branch_gated, merged.clone()));
        outputs.push(merged);
    }

    EdgesBag::new(
        inputs,
        outputs,
        edges,
        HashSet::new(),
        HashSet::new(),
        HashSet::new(),
        Context::Identity,
    )
}

/// As [`merge`], but statically enforcing the id-property requirement: every
/// branch must expose `id_property` among its outputs, and every pair of
/// branches' declared id sets must be disjoint. The id sets themselves are
/// supplied by the caller (they describe which keys a branch's source
/// covers, known before any data is read) rather than derived from the
/// graph, since the bag alone carries no notion of row identity.
pub fn merge_with_ids(
    branches: Vec<(EdgesBag, HashSet<String>)>,
    id_property: &str,
    selector: Arc<dyn Selector>,
    selector_inputs: Vec<String>,
) -> Result<EdgesBag, AlgebraError> {
    for (bag, _) in &branches {
        if !bag.outputs.iter().any(|o| o == id_property) {
            return Err(AlgebraError::MissingIdProperty {
                name: id_property.to_owned(),
            });
        }
    }
    for i in 0..branches.len() {
        for j in (i + 1)..branches.len() {
            if let Some(id) = branches[i].1.intersection(&branches[j].1).next() {
                return Err(AlgebraError::Conflict {
                    key: id.clone(),
                    field: id_property.to_owned(),
                });
            }
        }
    }
    let bags = branches.into_iter().map(|(bag, _)| bag).collect();
    merge(bags, selector, selector_inputs)
}

fn named_index_guard(index_node: &str, branch: usize) -> Arc<dyn Capability> {
    strata_graph::named(&format!("{index_node}==[{branch}]"), move |args| {
        let matched = args[0]
            .downcast_ref::<usize>()
            .copied()
            .map(|idx| idx == branch)
            .unwrap_or(false);
        strata_graph::Value::new(matched)
    })
}

/// Wraps `inner`'s `value_output` so it only passes through when
/// `predicate` (applied to `predicate_inputs`) returns `true`.
pub fn filter(
    inner: &EdgesBag,
    predicate: Arc<dyn Capability>,
    predicate_inputs: Vec<String>,
    value_output: &str,
) -> Result<EdgesBag, AlgebraError> {
    let mut bag = inner.clone();
    let mut args = predicate_inputs;
    args.push(value_output.to_owned());
    let filtered = format!("{value_output}.filtered");
    bag.edges.push(BoundEdge::new(Edge::Filter(predicate), args, filtered.clone()));
    bag.outputs.retain(|o| o != value_output);
    bag.outputs.push(filtered);
    bag.normalize()?;
    Ok(bag)
}

/// Groups `inner`'s `key_output`/`value_output` pair into a single
/// grouped output, replacing both in the bag's output list.
pub fn group_by(
    inner: &EdgesBag,
    key_output: &str,
    value_output: &str,
    grouped_output: &str,
) -> Result<EdgesBag, AlgebraError> {
    let mut bag = inner.clone();
    bag.edges.push(BoundEdge::new(
        Edge::Group,
        vec![key_output.to_owned(), value_output.to_owned()],
        grouped_output.to_owned(),
    ));
    bag.outputs.retain(|o| o != key_output && o != value_output);
    bag.outputs.push(grouped_output.to_owned());
    bag.normalize()?;
    Ok(bag)
}

/// Joins `left`'s `(left_key, left_value)` pair against `right`'s
/// `(right_key, right_value)` pair under `mode`, producing `joined_output`
/// in a new combined bag.
///
/// Unlike [`merge`], `join`'s two sides are concatenated without renaming:
/// this assumes `left` and `right` are independently built bags, the
/// normal case for a join (two different streams, not two copies of the
/// same shape). If both sides happen to come from the same bag, or from a
/// helper that produces the same internal node names on both sides,
/// [`EdgesBag::freeze`] one side first to avoid a node-name collision at
/// compile time.
pub fn join(
    left: &EdgesBag,
    left_key: &str,
    left_value: &str,
    right: &EdgesBag,
    right_key: &str,
    right_value: &str,
    mode: JoinMode,
    joined_output: &str,
) -> Result<EdgesBag, AlgebraError> {
    let left_fields: HashSet<&str> = left
        .outputs
        .iter()
        .map(String::as_str)
        .filter(|o| *o != left_key && *o != left_value)
        .collect();
    let right_fields: HashSet<&str> = right
        .outputs
        .iter()
        .map(String::as_str)
        .filter(|o| *o != right_key && *o != right_value)
        .collect();
    if let Some(field) = left_fields.intersection(&right_fields).next() {
        return Err(AlgebraError::Conflict {
            key: joined_output.to_owned(),
            field: (*field).to_owned(),
        });
    }

    let mut inputs = left.inputs.clone();
    for input in &right.inputs {
        if !inputs.contains(input) {
            inputs.push(input.clone());
        }
    }
    let mut edges = left.edges.clone();
    edges.extend(right.edges.iter().cloned());
    edges.push(BoundEdge::new(
        Edge::Join(mode),
        vec![
            left_key.to_owned(),
            left_value.to_owned(),
            right_key.to_owned(),
            right_value.to_owned(),
        ],
        joined_output.to_owned(),
    ));

    let mut outputs: Vec<String> = left
        .outputs
        .iter()
        .chain(right.outputs.iter())
        .filter(|o| {
            *o != left_key && *o != left_value && *o != right_key && *o != right_value
        })
        .cloned()
        .collect();
    outputs.push(joined_output.to_owned());

    let virtual_names: HashSet<String> = left
        .virtual_names
        .intersection(&right.virtual_names)
        .cloned()
        .collect();
    let persistent_names: HashSet<String> = left
        .persistent_names
        .union(&right.persistent_names)
        .cloned()
        .collect();
    let optional_names: HashSet<String> = left
        .optional_names
        .intersection(&right.optional_names)
        .cloned()
        .collect();

    EdgesBag::new(
        inputs,
        outputs,
        edges,
        virtual_names,
        persistent_names,
        optional_names,
        Context::Identity,
    )
}

/// Splits `inner`'s `source_output` into named parts via `splitter`,
/// replacing `source_output` with `parts_output` (a `Vec<(String,
/// Value)>`, see [`strata_graph::Edge::Split`]) in the bag's outputs.
pub fn split(
    inner: &EdgesBag,
    splitter: Arc<dyn Capability>,
    source_output: &str,
    parts_output: &str,
) -> Result<EdgesBag, AlgebraError> {
    let mut bag = inner.clone();
    bag.edges.push(BoundEdge::new(
        Edge::Split(splitter),
        vec![source_output.to_owned()],
        parts_output.to_owned(),
    ));
    bag.outputs.retain(|o| o != source_output);
    bag.outputs.push(parts_output.to_owned());
    bag.normalize()?;
    Ok(bag)
}

/// Projects `field` out of `parts_output` (a [`Edge::Split`] result),
/// adding it to the bag's outputs under `field_output`.
pub fn item(
    inner: &EdgesBag,
    parts_output: &str,
    field: &str,
    field_output: &str,
) -> Result<EdgesBag, AlgebraError> {
    let mut bag = inner.clone();
    bag.edges.push(BoundEdge::new(
        Edge::Item(field.into()),
        vec![parts_output.to_owned()],
        field_output.to_owned(),
    ));
    if !bag.outputs.contains(&field_output.to_owned()) {
        bag.outputs.push(field_output.to_owned());
    }
    bag.normalize()?;
    Ok(bag)
}
