// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use strata_hash::{Digest, FunctionHasher, HashValue};

use crate::graph::NodeId;
use crate::value::Value;

/// A boxed user closure plus the content identity [`strata_hash`] needs to
/// fold it into a parent's hash.
pub trait Capability: Send + Sync {
    /// Invokes the closure over its parent values.
    fn call(&self, args: &[Value]) -> Value;
    /// The closure's own identity, independent of its arguments.
    fn digest(&self) -> Digest;
}

struct NamedFn<F> {
    f: F,
    name: strata_hash::StableName,
}

impl<F: Fn(&[Value]) -> Value + Send + Sync> Capability for NamedFn<F> {
    fn call(&self, args: &[Value]) -> Value {
        (self.f)(args)
    }

    fn digest(&self) -> Digest {
        self.name.function_digest()
    }
}

/// Wraps a plain closure as a [`Capability`] identified by a stable,
/// fully-qualified name — the common case for pipeline step functions.
pub fn named(name: &str, f: impl Fn(&[Value]) -> Value + Send + Sync + 'static) -> Arc<dyn Capability> {
    Arc::new(NamedFn {
        f,
        name: strata_hash::StableName::new(name),
    })
}

/// A selector used by [`Edge::Switch`]: given the inputs feeding a branch
/// point, returns the index of the branch that should fire.
pub trait Selector: Send + Sync {
    fn select(&self, args: &[Value]) -> usize;
    fn digest(&self) -> Digest;
}

/// Hashes a produced [`Value`] for an [`Edge::HashBarrier`] node.
///
/// The graph itself never inspects a [`Value`]'s payload (it's an opaque
/// `dyn Any`), so — exactly as a leaf's hash is supplied by whoever knows
/// how to canonicalize that leaf's type — a barrier's hash is supplied by
/// whoever knows how to canonicalize the type flowing through it.
pub trait ValueHasher: Send + Sync {
    fn hash_value(&self, value: &Value) -> HashValue;
}

struct FnValueHasher<F>(F);

impl<F: Fn(&Value) -> HashValue + Send + Sync> ValueHasher for FnValueHasher<F> {
    fn hash_value(&self, value: &Value) -> HashValue {
        (self.0)(value)
    }
}

/// Wraps a plain closure as a [`ValueHasher`], the common case for an
/// [`Edge::HashBarrier`] over a type the caller knows how to canonicalize.
pub fn hash_barrier(hasher: impl Fn(&Value) -> HashValue + Send + Sync + 'static) -> Edge {
    Edge::HashBarrier(Arc::new(FnValueHasher(hasher)))
}

/// How [`Edge::Join`] reconciles rows present in only one of its two
/// inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinMode {
    Inner,
    Left,
    Right,
    Outer,
}

/// One row of a join result: the join key and whichever side(s) supplied a
/// value for it.
#[derive(Clone)]
pub struct JoinedRow {
    pub key: String,
    pub left: Option<Value>,
    pub right: Option<Value>,
}

/// A grouped value, as produced by [`Edge::Group`]: every group key maps to
/// the ordered list of member values that shared it.
#[derive(Clone, Default)]
pub struct Grouped {
    pub groups: BTreeMap<String, Vec<Value>>,
}

/// A single edge's evaluation recipe.
#[derive(Clone)]
///
/// Each variant knows how to derive the [`HashValue`] of its output from
/// its parents' hashes ([`Edge::compute_hash`]) and how to produce the
/// output [`Value`] from its parents' values ([`Edge::evaluate`]). The
/// split between the two is what lets [`crate::Vm`] skip evaluating a
/// subgraph entirely on a cache hit: the hash phase runs for every node,
/// but the value phase only runs where the cache actually missed.
pub enum Edge {
    /// Calls a user capability over its parents, short-circuiting to
    /// [`Value::Absent`] if any parent is absent.
    Function(Arc<dyn Capability>),
    /// Passes its single parent through unchanged.
    Identity,
    /// Ignores its parents and always produces the same value.
    Constant(Value, HashValue),
    /// Bundles its parents into a single [`Value`] carrying all of them in
    /// order (see [`crate::value::Value::new`] with a `Vec<Value>`).
    Product,
    /// Defers to an inner edge, but flags the node as a caching boundary
    /// so [`crate::Vm`] checks its cache backend for a hash hit before
    /// evaluating (or re-evaluating) the wrapped subgraph. The flag marks
    /// that the caller has acknowledged wrapping an [`Edge::Impure`] inner
    /// edge (directly, or via a nested `Cache`) anyway; [`crate::compile`]
    /// rejects the combination when it's unset, since an impure result
    /// cached under a stable-looking key would silently go stale.
    Cache(Box<Edge>, bool),
    /// Calls a capability whose result must never be cached or reused; its
    /// hash changes on every evaluation (within a single [`crate::Vm`]
    /// call the hash is held fixed, so two reads of the same impure node
    /// in one run still agree — see [`crate::Vm::run`]).
    Impure(Arc<dyn Capability>),
    /// Cuts hash propagation: this node's hash is derived from its
    /// produced *value* via a [`ValueHasher`], never from its parents'
    /// hashes, while its value still depends on them normally. Use to pin
    /// a cache key to content rather than to the upstream structure that
    /// produced it.
    HashBarrier(Arc<dyn ValueHasher>),
    /// Passes its last parent through if a predicate capability over the
    /// earlier parents returns true, otherwise produces
    /// [`Value::Absent`].
    Filter(Arc<dyn Capability>),
    /// Groups parent `(key, value)` pairs (supplied as two equal-length
    /// parents: a vector of keys, then a vector of values) into a
    /// [`Grouped`] value.
    Group,
    /// Splits a single parent into named parts via a capability returning
    /// a `Vec<(String, Value)>` wrapped in a [`Value`].
    Split(Arc<dyn Capability>),
    /// Joins two grouped inputs (left keys+values, right keys+values) into
    /// a `Vec<JoinedRow>` wrapped in a [`Value`], under `mode`.
    Join(JoinMode),
    /// Picks a branch index via a [`Selector`] over its parents.
    Switch(Arc<dyn Selector>),
    /// Given a tuple of branch outputs where at most one is non-absent,
    /// selects that one (or [`Value::Absent`] if none fired).
    Projection,
    /// Projects one named field out of a parent produced by
    /// [`Edge::Split`] (a `Vec<(String, Value)>`), or [`Value::Absent`] if
    /// the name is not present.
    Item(Box<str>),
}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function(_) => f.write_str("Function(..)"),
            Self::Identity => f.write_str("Identity"),
            Self::Constant(value, hash) => {
                f.debug_tuple("Constant").field(value).field(hash).finish()
            }
            Self::Product => f.write_str("Product"),
            Self::Cache(inner, allow_impure) => {
                f.debug_tuple("Cache").field(inner).field(allow_impure).finish()
            }
            Self::Impure(_) => f.write_str("Impure(..)"),
            Self::HashBarrier(_) => f.write_str("HashBarrier(..)"),
            Self::Filter(_) => f.write_str("Filter(..)"),
            Self::Group => f.write_str("Group"),
            Self::Split(_) => f.write_str("Split(..)"),
            Self::Join(mode) => f.debug_tuple("Join").field(mode).finish(),
            Self::Switch(_) => f.write_str("Switch(..)"),
            Self::Projection => f.write_str("Projection"),
            Self::Item(name) => f.debug_tuple("Item").field(name).finish(),
        }
    }
}

impl Edge {
    /// `true` for edges whose output must never be treated as reusable
    /// across evaluations — directly, or because they wrap one.
    pub fn is_impure(&self) -> bool {
        match self {
            Self::Impure(_) => true,
            Self::Cache(inner, _) => inner.is_impure(),
            _ => false,
        }
    }

    /// The hash this edge's output would have outside a live [`crate::Vm`]
    /// call — i.e. ignoring the per-call freshness [`Edge::Impure`] needs
    /// and the produced-value dependency [`Edge::HashBarrier`] needs.
    /// [`crate::Vm`] never calls this for those two variants; it computes
    /// their hashes itself, with the call context they require.
    pub fn compute_hash(&self, _node: NodeId, parents: &[HashValue]) -> HashValue {
        match self {
            Self::Function(cap) => HashValue::apply(
                &StableDigest(cap.digest()),
                parents.to_vec(),
                Vec::new(),
            ),
            Self::Identity => parents[0].clone(),
            Self::Constant(_, hash) => hash.clone(),
            Self::Product => HashValue::custom("product", parents.to_vec()),
            Self::Cache(inner, _) => inner.compute_hash(_node, parents),
            Self::Impure(cap) => HashValue::custom(
                "impure",
                std::iter::once(HashValue::leaf(cap.digest().as_bytes()))
                    .chain(parents.iter().cloned())
                    .collect(),
            ),
            Self::HashBarrier(_) => {
                unreachable!("HashBarrier's hash depends on its produced value; crate::Vm computes it directly instead of calling Edge::compute_hash")
            }
            Self::Filter(cap) => HashValue::custom(
                "filter",
                std::iter::once(HashValue::leaf(cap.digest().as_bytes()))
                    .chain(parents.iter().cloned())
                    .collect(),
            ),
            Self::Group => HashValue::custom("group", parents.to_vec()),
            Self::Split(cap) => HashValue::custom(
                "split",
                std::iter::once(HashValue::leaf(cap.digest().as_bytes()))
                    .chain(parents.iter().cloned())
                    .collect(),
            ),
            Self::Join(mode) => HashValue::custom(join_marker(*mode), parents.to_vec()),
            Self::Switch(sel) => HashValue::custom(
                "switch",
                std::iter::once(HashValue::leaf(sel.digest().as_bytes()))
                    .chain(parents.iter().cloned())
                    .collect(),
            ),
            Self::Projection => HashValue::custom("projection", parents.to_vec()),
            Self::Item(name) => HashValue::custom(format!("item:{name}"), parents.to_vec()),
        }
    }

    pub fn evaluate(&self, parents: &[Value]) -> Value {
        match self {
            Self::Function(cap) => {
                if parents.iter().any(Value::is_absent) {
                    Value::Absent
                } else {
                    cap.call(parents)
                }
            }
            Self::Identity => parents[0].clone(),
            Self::Constant(value, _) => value.clone(),
            Self::Product => Value::new(parents.to_vec()),
            Self::Cache(inner, _) => inner.evaluate(parents),
            Self::Impure(cap) => cap.call(parents),
            Self::HashBarrier(_) => parents[0].clone(),
            Self::Filter(cap) => {
                let Some((value, predicate_args)) = parents.split_last() else {
                    return Value::Absent;
                };
                let keep = cap
                    .call(predicate_args)
                    .downcast_ref::<bool>()
                    .copied()
                    .unwrap_or(false);
                if keep {
                    value.clone()
                } else {
                    Value::Absent
                }
            }
            Self::Group => evaluate_group(parents),
            Self::Split(cap) => cap.call(parents),
            Self::Join(mode) => evaluate_join(*mode, parents),
            Self::Switch(sel) => Value::new(sel.select(parents)),
            Self::Projection => parents
                .iter()
                .find(|v| !v.is_absent())
                .cloned()
                .unwrap_or(Value::Absent),
            Self::Item(name) => parents[0]
                .downcast_ref::<Vec<(String, Value)>>()
                .and_then(|parts| parts.iter().find(|(n, _)| n == &**name))
                .map(|(_, v)| v.clone())
                .unwrap_or(Value::Absent),
        }
    }
}

fn join_marker(mode: JoinMode) -> &'static str {
    match mode {
        JoinMode::Inner => "join-inner",
        JoinMode::Left => "join-left",
        JoinMode::Right => "join-right",
        JoinMode::Outer => "join-outer",
    }
}

fn evaluate_group(parents: &[Value]) -> Value {
    let keys = parents[0].downcast_ref::<Vec<String>>().cloned().unwrap_or_default();
    let values = parents[1].downcast_ref::<Vec<Value>>().cloned().unwrap_or_default();
    let mut grouped = Grouped::default();
    for (key, value) in keys.into_iter().zip(values) {
        grouped.groups.entry(key).or_default().push(value);
    }
    Value::new(grouped)
}

fn evaluate_join(mode: JoinMode, parents: &[Value]) -> Value {
    let left_keys = parents[0].downcast_ref::<Vec<String>>().cloned().unwrap_or_default();
    let left_values = parents[1].downcast_ref::<Vec<Value>>().cloned().unwrap_or_default();
    let right_keys = parents[2].downcast_ref::<Vec<String>>().cloned().unwrap_or_default();
    let right_values = parents[3].downcast_ref::<Vec<Value>>().cloned().unwrap_or_default();

    let mut left: BTreeMap<String, Value> = left_keys.into_iter().zip(left_values).collect();
    let mut right: BTreeMap<String, Value> = right_keys.into_iter().zip(right_values).collect();

    let mut keys: Vec<String> = match mode {
        JoinMode::Inner => left.keys().filter(|k| right.contains_key(*k)).cloned().collect(),
        JoinMode::Left => left.keys().cloned().collect(),
        JoinMode::Right => right.keys().cloned().collect(),
        JoinMode::Outer => {
            let mut all: Vec<String> = left.keys().chain(right.keys()).cloned().collect();
            all.sort();
            all.dedup();
            all
        }
    };
    keys.sort();

    let rows: Vec<JoinedRow> = keys
        .into_iter()
        .map(|key| JoinedRow {
            left: left.remove(&key),
            right: right.remove(&key),
            key,
        })
        .collect();
    Value::new(rows)
}

/// Adapts a pre-computed [`Digest`] to [`FunctionHasher`] for edges whose
/// "function" identity was already derived by a [`Capability`].
struct StableDigest(Digest);

impl FunctionHasher for StableDigest {
    fn function_digest(&self) -> Digest {
        self.0
    }
}

/// An [`Edge`] bound to the names of the nodes it reads and produces.
///
/// This is the authoring-time representation: [`crate::compile`] consumes
/// a set of `BoundEdge`s (plus the set of declared leaf names) and resolves
/// names to [`NodeId`]s while checking the graph invariants — every output
/// has exactly one incoming edge or is a leaf, and the edges are acyclic.
#[derive(Clone, Debug)]
pub struct BoundEdge {
    pub edge: Edge,
    pub input_names: Vec<Box<str>>,
    pub output_name: Box<str>,
}

impl BoundEdge {
    pub fn new(
        edge: Edge,
        input_names: impl IntoIterator<Item = impl Into<Box<str>>>,
        output_name: impl Into<Box<str>>,
    ) -> Self {
        Self {
            edge,
            input_names: input_names.into_iter().map(Into::into).collect(),
            output_name: output_name.into(),
        }
    }
}
