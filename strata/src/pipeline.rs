// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use strata_algebra::{chain, Context, EdgesBag};
use strata_cache::CacheBackend;
use strata_graph::vm::{CacheLookup, ValueCodec};
use strata_graph::{BoundEdge, Capability, Edge, JoinMode, Selector, Value, Vm};
use strata_hash::HashValue;

use crate::StrataError;

/// A declarative pipeline: a named, composable wrapper around an
/// [`EdgesBag`]. `>>` ([`std::ops::Shr`]) chains two pipelines; each half
/// keeps its own inputs and outputs independent until chained.
#[derive(Clone)]
pub struct Pipeline {
    bag: EdgesBag,
}

impl Pipeline {
    /// A pipeline with a single declared input, passed straight through
    /// under the same name.
    pub fn source(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            bag: EdgesBag {
                inputs: vec![name.clone()],
                outputs: vec![name],
                edges: Vec::new(),
                virtual_names: HashSet::new(),
                persistent_names: HashSet::new(),
                optional_names: HashSet::new(),
                context: Context::Identity,
            },
        }
    }

    /// Adds a function step reading `inputs` (names already present in
    /// this pipeline) and producing `output`.
    pub fn transform(
        mut self,
        capability: Arc<dyn Capability>,
        inputs: Vec<String>,
        output: impl Into<String>,
    ) -> Result<Self, StrataError> {
        let output = output.into();
        self.bag
            .edges
            .push(BoundEdge::new(Edge::Function(capability), inputs, output.clone()));
        if !self.bag.outputs.contains(&output) {
            self.bag.outputs.push(output);
        }
        self.bag.normalize()?;
        Ok(self)
    }

    /// As [`Pipeline::transform`], but wraps the step as a cache boundary:
    /// [`Pipeline::run_cached`] consults the backend for `output`'s hash
    /// before evaluating this step or anything upstream of it.
    pub fn cached_transform(
        self,
        capability: Arc<dyn Capability>,
        inputs: Vec<String>,
        output: impl Into<String>,
    ) -> Result<Self, StrataError> {
        self.push_cache_edge(Edge::Function(capability), inputs, output, false)
    }

    /// As [`Pipeline::cached_transform`], but the wrapped step is itself
    /// [`Pipeline::impure_transform`]-like: the caller is explicitly
    /// acknowledging that caching an impure result is intentional (e.g. a
    /// shard whose member hashes already pin it to a point in time), which
    /// [`Edge::Cache`]'s `allow_impure` flag otherwise rejects at compile
    /// time.
    pub fn cached_impure_transform(
        self,
        capability: Arc<dyn Capability>,
        inputs: Vec<String>,
        output: impl Into<String>,
    ) -> Result<Self, StrataError> {
        self.push_cache_edge(Edge::Impure(capability), inputs, output, true)
    }

    fn push_cache_edge(
        mut self,
        inner: Edge,
        inputs: Vec<String>,
        output: impl Into<String>,
        allow_impure: bool,
    ) -> Result<Self, StrataError> {
        let output = output.into();
        self.bag.edges.push(BoundEdge::new(
            Edge::Cache(Box::new(inner), allow_impure),
            inputs,
            output.clone(),
        ));
        if !self.bag.outputs.contains(&output) {
            self.bag.outputs.push(output);
        }
        self.bag.normalize()?;
        Ok(self)
    }

    /// Adds a step whose result must never be cached or treated as reusable
    /// across runs — the "impure" decorator over a step function.
    pub fn impure_transform(
        mut self,
        capability: Arc<dyn Capability>,
        inputs: Vec<String>,
        output: impl Into<String>,
    ) -> Result<Self, StrataError> {
        let output = output.into();
        self.bag
            .edges
            .push(BoundEdge::new(Edge::Impure(capability), inputs, output.clone()));
        if !self.bag.outputs.contains(&output) {
            self.bag.outputs.push(output);
        }
        self.bag.normalize()?;
        Ok(self)
    }

    /// Marks `name` as forwarded automatically through `>>` unless the
    /// downstream pipeline shadows it.
    pub fn mark_virtual(mut self, name: impl Into<String>) -> Self {
        self.bag.virtual_names.insert(name.into());
        self
    }

    /// Marks `name` as forwarded through `>>` even if the downstream
    /// pipeline also produces it.
    pub fn mark_persistent(mut self, name: impl Into<String>) -> Self {
        self.bag.persistent_names.insert(name.into());
        self
    }

    /// Marks `name` as an input that may be absent without treating it as
    /// a hard dependency failure — the "optional" decorator.
    pub fn mark_optional(mut self, name: impl Into<String>) -> Result<Self, StrataError> {
        self.bag.optional_names.insert(name.into());
        self.bag.normalize()?;
        Ok(self)
    }

    /// Decorates this pipeline with a function of some of its own outputs,
    /// presenting the result as a new output — the "inverse"/loopback
    /// decorator, letting a later stage feed back into an earlier layer's
    /// context.
    pub fn loopback(
        self,
        capability: Arc<dyn Capability>,
        inputs: Vec<String>,
        output: impl Into<String>,
    ) -> Result<Self, StrataError> {
        Ok(Self {
            bag: self.bag.loopback(capability, inputs, output.into())?,
        })
    }

    /// Wraps `inner`'s `value_output` so it only passes through when
    /// `predicate` (over `predicate_inputs`) returns true; rejects a
    /// predicate that transitively depends on an impure edge.
    pub fn filter(
        self,
        predicate: Arc<dyn Capability>,
        predicate_inputs: Vec<String>,
        value_output: &str,
    ) -> Result<Self, StrataError> {
        Ok(Self {
            bag: strata_algebra::filter(&self.bag, predicate, predicate_inputs, value_output)?,
        })
    }

    /// Groups `key_output`/`value_output` into `grouped_output`.
    pub fn group_by(
        self,
        key_output: &str,
        value_output: &str,
        grouped_output: &str,
    ) -> Result<Self, StrataError> {
        Ok(Self {
            bag: strata_algebra::group_by(&self.bag, key_output, value_output, grouped_output)?,
        })
    }

    /// Joins this pipeline's `(left_key, left_value)` pair against
    /// `other`'s `(right_key, right_value)` pair, rejecting a non-join
    /// field declared on both sides.
    pub fn join(
        self,
        left_key: &str,
        left_value: &str,
        other: &Pipeline,
        right_key: &str,
        right_value: &str,
        mode: JoinMode,
        joined_output: &str,
    ) -> Result<Self, StrataError> {
        Ok(Self {
            bag: strata_algebra::join(
                &self.bag,
                left_key,
                left_value,
                &other.bag,
                right_key,
                right_value,
                mode,
                joined_output,
            )?,
        })
    }

    /// Splits `source_output` into named parts via `splitter`.
    pub fn split(
        self,
        splitter: Arc<dyn Capability>,
        source_output: &str,
        parts_output: &str,
    ) -> Result<Self, StrataError> {
        Ok(Self {
            bag: strata_algebra::split(&self.bag, splitter, source_output, parts_output)?,
        })
    }

    /// Projects `field` out of a [`Pipeline::split`] result.
    pub fn item(self, parts_output: &str, field: &str, field_output: &str) -> Result<Self, StrataError> {
        Ok(Self {
            bag: strata_algebra::item(&self.bag, parts_output, field, field_output)?,
        })
    }

    /// Routes between `branches` by an index produced by `selector` over
    /// `selector_inputs`; every branch must declare the same output names.
    pub fn merge(
        branches: Vec<Pipeline>,
        selector: Arc<dyn Selector>,
        selector_inputs: Vec<String>,
    ) -> Result<Self, StrataError> {
        let bags = branches.into_iter().map(|p| p.bag).collect();
        Ok(Self {
            bag: strata_algebra::merge(bags, selector, selector_inputs)?,
        })
    }

    /// As [`Pipeline::merge`], requiring every branch to expose
    /// `id_property` among its outputs and every pair of branches' `ids`
    /// to be disjoint.
    pub fn merge_with_ids(
        branches: Vec<(Pipeline, HashSet<String>)>,
        id_property: &str,
        selector: Arc<dyn Selector>,
        selector_inputs: Vec<String>,
    ) -> Result<Self, StrataError> {
        let bags = branches.into_iter().map(|(p, ids)| (p.bag, ids)).collect();
        Ok(Self {
            bag: strata_algebra::merge_with_ids(bags, id_property, selector, selector_inputs)?,
        })
    }

    /// A deep copy under a fresh namespace, for composing a pipeline with
    /// a second, independent use of itself.
    pub fn freeze(&self) -> Self {
        Self {
            bag: self.bag.freeze(),
        }
    }

    pub fn bag(&self) -> &EdgesBag {
        &self.bag
    }

    /// Compiles this pipeline's bag into a runnable [`strata_graph::Graph`].
    pub fn compile(&self) -> Result<strata_graph::Compiled, StrataError> {
        Ok(strata_graph::compile(
            self.bag.inputs.clone(),
            self.bag.edges.clone(),
            self.bag.outputs.clone(),
        )?)
    }

    /// Compiles and runs this pipeline against `leaves` (each input name
    /// mapped to its value and the [`HashValue`] identifying it), with no
    /// caching.
    pub fn run(&self, leaves: HashMap<Box<str>, (Value, HashValue)>) -> Result<HashMap<String, Value>, StrataError> {
        let compiled = self.compile()?;
        tracing::debug!(nodes = compiled.graph.len(), outputs = self.bag.outputs.len(), "running pipeline");
        let vm = Vm::new(&compiled.graph);
        Ok(vm.run(&leaves, None))
    }

    /// As [`Pipeline::run`], but consulting `cache` (via `codec`) for every
    /// [`Edge::Cache`] node.
    pub fn run_cached(
        &self,
        leaves: HashMap<Box<str>, (Value, HashValue)>,
        cache: &dyn CacheBackend,
        codec: &dyn ValueCodec,
    ) -> Result<HashMap<String, Value>, StrataError> {
        let compiled = self.compile()?;
        tracing::debug!(nodes = compiled.graph.len(), outputs = self.bag.outputs.len(), "running pipeline with cache");
        let vm = Vm::new(&compiled.graph);
        let lookup = CacheAdapter { backend: cache };
        Ok(vm.run(&leaves, Some((&lookup, codec))))
    }
}

impl std::ops::Shr for Pipeline {
    type Output = Result<Pipeline, StrataError>;

    fn shr(self, rhs: Pipeline) -> Self::Output {
        Ok(Pipeline {
            bag: chain(&self.bag, &rhs.bag)?,
        })
    }
}

struct CacheAdapter<'a> {
    backend: &'a dyn CacheBackend,
}

impl CacheLookup for CacheAdapter<'_> {
    fn get(&self, hash: &HashValue) -> Option<Vec<u8>> {
        self.backend.get(hash).ok().flatten()
    }

    fn put(&self, hash: &HashValue, bytes: Vec<u8>) {
        if let Ok(strata_cache::Reservation::Writer) =
            self.backend.reserve_write_or_read(hash.digest())
        {
            let _ = self.backend.finish_write(hash, bytes);
        }
    }
}
