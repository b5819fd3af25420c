// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The recursive hash-and-value evaluator.
//!
//! A node's hash and its value are resolved together, lazily, starting
//! from the requested outputs: [`Vm::hash_of`] recurses into a node's
//! parents only as far as it needs to (most edges only need their
//! parents' hashes), except [`crate::Edge::HashBarrier`], whose hash is a
//! function of its own produced *value* and so pulls [`Vm::value_of`] in
//! to materialize that parent eagerly. [`crate::Edge::Cache`] checks the
//! backend for a hash hit before recursing into its parents' values at
//! all, short-circuiting however large a subtree fed it.
//! [`ExpirationTable`] drops each memoized value the moment its last
//! statically-known consumer has read it, bounding memory to the graph's
//! live frontier rather than its full size; hashes are cheap enough to
//! keep for the whole run.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use strata_hash::HashValue;

use crate::edge::Edge;
use crate::graph::{Graph, Node, NodeId};
use crate::value::Value;

/// A reference-counted memo table: each entry is dropped once the number
/// of reads matching its statically-known use count have happened.
pub struct ExpirationTable<V> {
    remaining: HashMap<NodeId, usize>,
    values: HashMap<NodeId, V>,
}

impl<V> Default for ExpirationTable<V> {
    fn default() -> Self {
        Self {
            remaining: HashMap::new(),
            values: HashMap::new(),
        }
    }
}

impl<V: Clone> ExpirationTable<V> {
    fn set(&mut self, id: NodeId, value: V) {
        if self.remaining.get(&id).copied().unwrap_or(0) == 0 {
            // Nobody will ever read this (e.g. not reachable from any
            // requested output); don't bother storing it.
            return;
        }
        self.values.insert(id, value);
    }

    fn get(&mut self, id: NodeId) -> Option<V> {
        let value = self.values.get(&id).cloned()?;
        if let Some(count) = self.remaining.get_mut(&id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.values.remove(&id);
                self.remaining.remove(&id);
            }
        }
        Some(value)
    }

    fn contains(&self, id: NodeId) -> bool {
        self.values.contains_key(&id)
    }
}

/// Encodes and decodes graph [`Value`]s to the bytes a
/// [`strata_cache::CacheBackend`] stores, so [`crate::Edge::Cache`] nodes
/// can round-trip through a backend without the VM knowing the concrete
/// payload type flowing through a particular graph.
pub trait ValueCodec {
    fn encode(&self, value: &Value) -> Option<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> Option<Value>;
}

/// A backend consulted by [`crate::Edge::Cache`] nodes during evaluation.
/// Kept separate from [`strata_cache::CacheBackend`] so this crate does
/// not need to depend on `strata_cache`'s reservation protocol;
/// [`strata`] (the facade crate) provides the adapter between the two.
///
/// Takes the whole [`HashValue`], not just its digest, so a backend that
/// checks for digest collisions has [`HashValue::canonical_bytes`] to
/// compare against.
pub trait CacheLookup {
    fn get(&self, hash: &HashValue) -> Option<Vec<u8>>;
    fn put(&self, hash: &HashValue, bytes: Vec<u8>);
}

/// Evaluates a single compiled [`Graph`], once per [`Vm::run`] call.
pub struct Vm<'g> {
    graph: &'g Graph,
    call_counter: AtomicU64,
}

impl<'g> Vm<'g> {
    pub fn new(graph: &'g Graph) -> Self {
        Self {
            graph,
            call_counter: AtomicU64::new(0),
        }
    }

    /// Resolves every requested output's value, returning them by name.
    ///
    /// `leaves` supplies each declared leaf's value and its already-known
    /// [`HashValue`] (the engine never inspects a leaf's payload to derive
    /// its hash — the caller, who knows how to canonicalize it, does).
    ///
    /// Each call gets a fresh nonce folded into every [`crate::Edge::Impure`]
    /// node's hash, so two reads of the same impure node within this one
    /// call agree (and so correctly short-circuit at a downstream
    /// [`crate::Edge::Cache`] reached twice in the same run) while two
    /// separate `run` calls never do.
    pub fn run(
        &self,
        leaves: &HashMap<Box<str>, (Value, HashValue)>,
        cache: Option<(&dyn CacheLookup, &dyn ValueCodec)>,
    ) -> HashMap<String, Value> {
        let call_nonce = self.call_counter.fetch_add(1, Ordering::Relaxed);
        let mut hashes: Vec<Option<HashValue>> = vec![None; self.graph.len()];
        let mut values = ExpirationTable::default();
        self.reserve_value_uses(&mut values);

        let mut result = HashMap::new();
        for (name, id) in self.graph.outputs() {
            let value = self.value_of(id, leaves, &mut hashes, &mut values, cache, call_nonce);
            result.insert(name.to_owned(), value);
        }
        result
    }

    /// Computes, per node, how many times its value will be read by a
    /// statically-reachable consumer (another node's parent slot, or a
    /// requested output), seeding [`ExpirationTable`]'s ref counts.
    fn reserve_value_uses(&self, values: &mut ExpirationTable<Value>) {
        for idx in 0..self.graph.len() {
            if let Node::Produced { parents, .. } = self.graph.node(NodeId(idx as u32)) {
                for parent in parents {
                    let entry = values.remaining.entry(*parent).or_insert(0);
                    *entry += 1;
                }
            }
        }
        for (_, id) in self.graph.outputs() {
            let entry = values.remaining.entry(id).or_insert(0);
            *entry += 1;
        }
    }

    fn hash_of(
        &self,
        id: NodeId,
        leaves: &HashMap<Box<str>, (Value, HashValue)>,
        hashes: &mut Vec<Option<HashValue>>,
        values: &mut ExpirationTable<Value>,
        cache: Option<(&dyn CacheLookup, &dyn ValueCodec)>,
        call_nonce: u64,
    ) -> HashValue {
        if let Some(hash) = &hashes[id.as_u32() as usize] {
            return hash.clone();
        }

        let hash = match self.graph.node(id) {
            Node::Leaf { name } => leaves
                .get(&**name)
                .map(|(_, hash)| hash.clone())
                .unwrap_or_else(|| HashValue::leaf(name.as_bytes())),
            Node::Produced { edge, parents, .. } => match edge {
                Edge::HashBarrier(hasher) => {
                    let value = self.value_of(parents[0], leaves, hashes, values, cache, call_nonce);
                    hasher.hash_value(&value)
                }
                Edge::Impure(cap) => {
                    let parent_hashes: Vec<HashValue> = parents
                        .iter()
                        .map(|&p| self.hash_of(p, leaves, hashes, values, cache, call_nonce))
                        .collect();
                    HashValue::custom(
                        "impure",
                        std::iter::once(HashValue::leaf(cap.digest().as_bytes()))
                            .chain(std::iter::once(HashValue::leaf(&call_nonce.to_le_bytes())))
                            .chain(parent_hashes)
                            .collect(),
                    )
                }
                _ => {
                    let parent_hashes: Vec<HashValue> = parents
                        .iter()
                        .map(|&p| self.hash_of(p, leaves, hashes, values, cache, call_nonce))
                        .collect();
                    edge.compute_hash(id, &parent_hashes)
                }
            },
        };

        hashes[id.as_u32() as usize] = Some(hash.clone());
        hash
    }

    fn value_of(
        &self,
        id: NodeId,
        leaves: &HashMap<Box<str>, (Value, HashValue)>,
        hashes: &mut Vec<Option<HashValue>>,
        values: &mut ExpirationTable<Value>,
        cache: Option<(&dyn CacheLookup, &dyn ValueCodec)>,
        call_nonce: u64,
    ) -> Value {
        if values.contains(id) {
            return values.get(id).expect("just checked present");
        }

        let value = match self.graph.node(id) {
            Node::Leaf { name } => leaves
                .get(&**name)
                .map(|(value, _)| value.clone())
                .unwrap_or(Value::Absent),
            Node::Produced { edge, parents, .. } => {
                if let (Edge::Cache(inner, _), Some((lookup, codec))) = (edge, cache) {
                    let hash = self.hash_of(id, leaves, hashes, values, cache, call_nonce);
                    if let Some(bytes) = lookup.get(&hash) {
                        if let Some(value) = codec.decode(&bytes) {
                            values.set(id, value.clone());
                            return value;
                        }
                    }
                    let mut parent_values = Vec::with_capacity(parents.len());
                    for &parent in parents {
                        parent_values.push(self.value_of(parent, leaves, hashes, values, cache, call_nonce));
                    }
                    let produced = inner.evaluate(&parent_values);
                    if let Some(bytes) = codec.encode(&produced) {
                        lookup.put(&hash, bytes);
                    }
                    produced
                } else {
                    let mut parent_values = Vec::with_capacity(parents.len());
                    for &parent in parents {
                        parent_values.push(self.value_of(parent, leaves, hashes, values, cache, call_nonce));
                    }
                    edge.evaluate(&parent_values)
                }
            }
        };

        values.set(id, value.clone());
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::edge::{hash_barrier, named, BoundEdge};

    fn leaf(name: &str, n: i64) -> (Box<str>, (Value, HashValue)) {
        (name.into(), (Value::new(n), HashValue::leaf(&n.to_le_bytes())))
    }

    #[test]
    fn evaluates_a_simple_chain() {
        let double = named("double", |args: &[Value]| {
            let n = *args[0].downcast_ref::<i64>().unwrap();
            Value::new(n * 2)
        });
        let compiled = compile(
            vec!["x".into()],
            vec![BoundEdge::new(Edge::Function(double), vec!["x"], "y")],
            vec!["y".into()],
        )
        .unwrap();

        let leaves = HashMap::from([leaf("x", 21)]);
        let vm = Vm::new(&compiled.graph);
        let result = vm.run(&leaves, None);
        let y = result.get("y").unwrap();
        assert_eq!(*y.downcast_ref::<i64>().unwrap(), 42);
    }

    #[test]
    fn absent_short_circuits_function_edges() {
        let inc = named("inc", |args: &[Value]| {
            Value::new(args[0].downcast_ref::<i64>().unwrap() + 1)
        });
        let compiled = compile(
            vec!["x".into()],
            vec![BoundEdge::new(Edge::Function(inc), vec!["x"], "y")],
            vec!["y".into()],
        )
        .unwrap();

        let leaves = HashMap::from([("x".into(), (Value::Absent, HashValue::leaf(b"x")))]);
        let vm = Vm::new(&compiled.graph);
        let result = vm.run(&leaves, None);
        assert!(result.get("y").unwrap().is_absent());
    }

    #[test]
    fn hash_barrier_hashes_the_produced_value_not_the_node() {
        let barrier = hash_barrier(|value: &Value| {
            let n = *value.downcast_ref::<i64>().unwrap();
            HashValue::leaf(&n.to_le_bytes())
        });
        let identity_barrier = hash_barrier(|value: &Value| {
            let n = *value.downcast_ref::<i64>().unwrap();
            HashValue::leaf(&n.to_le_bytes())
        });

        // Two different nodes producing the same value must hash equal.
        let same_value = compile(
            vec!["x".into(), "y".into()],
            vec![
                BoundEdge::new(barrier, vec!["x"], "bx"),
                BoundEdge::new(identity_barrier, vec!["y"], "by"),
            ],
            vec!["bx".into(), "by".into()],
        )
        .unwrap();
        let leaves = HashMap::from([leaf("x", 7), leaf("y", 7)]);
        let vm = Vm::new(&same_value.graph);
        let mut hashes = vec![None; same_value.graph.len()];
        let mut values = ExpirationTable::default();
        vm.reserve_value_uses(&mut values);
        let bx = same_value.graph.output("bx").unwrap();
        let by = same_value.graph.output("by").unwrap();
        let hash_bx = vm.hash_of(bx, &leaves, &mut hashes, &mut values, None, 0);
        let hash_by = vm.hash_of(by, &leaves, &mut hashes, &mut values, None, 0);
        assert_eq!(hash_bx.digest(), hash_by.digest());
    }

    #[test]
    fn impure_hash_is_fresh_across_calls_but_stable_within_one() {
        let token = named("token", |_args: &[Value]| Value::new(0i64));
        let compiled = compile(
            vec!["x".into()],
            vec![BoundEdge::new(Edge::Impure(token), vec!["x"], "y")],
            vec!["y".into()],
        )
        .unwrap();
        let leaves = HashMap::from([leaf("x", 1)]);
        let vm = Vm::new(&compiled.graph);

        let y = compiled.graph.output("y").unwrap();

        let mut hashes_a = vec![None; compiled.graph.len()];
        let mut values_a = ExpirationTable::default();
        vm.reserve_value_uses(&mut values_a);
        let first = vm.hash_of(y, &leaves, &mut hashes_a, &mut values_a, None, 0);
        let first_again = vm.hash_of(y, &leaves, &mut hashes_a, &mut values_a, None, 0);
        assert_eq!(first.digest(), first_again.digest());

        let mut hashes_b = vec![None; compiled.graph.len()];
        let mut values_b = ExpirationTable::default();
        vm.reserve_value_uses(&mut values_b);
        let second = vm.hash_of(y, &leaves, &mut hashes_b, &mut values_b, None, 1);
        assert_ne!(first.digest(), second.digest());
    }
}
