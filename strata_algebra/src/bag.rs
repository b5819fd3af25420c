// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use strata_graph::{BoundEdge, Capability, Edge};

use crate::context::Context;
use crate::error::AlgebraError;

/// A frozen, self-contained subgraph plus the metadata needed to compose
/// it with another one.
///
/// `virtual_names` are outputs forwarded automatically by [`crate::chain`]
/// into the combined bag's outputs whenever the downstream layer does not
/// already produce something under that name; `persistent_names` are
/// forwarded unconditionally, even if the downstream layer does produce
/// that name (last write wins is not allowed — that case is a
/// [`crate::AlgebraError::NotForwarded`] instead, surfaced before it can
/// silently shadow anything); `optional_names` mark inputs a layer may
/// receive [`strata_graph::Value::Absent`] for without treating that as a
/// hard dependency failure.
#[derive(Clone, Debug)]
pub struct EdgesBag {
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub edges: Vec<BoundEdge>,
    pub virtual_names: HashSet<String>,
    pub persistent_names: HashSet<String>,
    pub optional_names: HashSet<String>,
    pub context: Context,
}

static FREEZE_COUNTER: AtomicU64 = AtomicU64::new(0);

impl EdgesBag {
    /// Builds a bag from its raw parts and checks its invariants.
    pub fn new(
        inputs: Vec<String>,
        outputs: Vec<String>,
        edges: Vec<BoundEdge>,
        virtual_names: HashSet<String>,
        persistent_names: HashSet<String>,
        optional_names: HashSet<String>,
        context: Context,
    ) -> Result<Self, AlgebraError> {
        let bag = Self {
            inputs,
            outputs,
            edges,
            virtual_names,
            persistent_names,
            optional_names,
            context,
        };
        bag.normalize()?;
        Ok(bag)
    }

    /// Checks the bag's structural invariants: no name is both virtual and
    /// an explicit output, every optional name actually names a node, and
    /// the edges compile into an acyclic graph with a single producer per
    /// output.
    pub fn normalize(&self) -> Result<(), AlgebraError> {
        for name in &self.virtual_names {
            if self.outputs.contains(name) {
                return Err(AlgebraError::VirtualOutputOverlap { name: name.clone() });
            }
        }

        let known_names: HashSet<&str> = self
            .inputs
            .iter()
            .map(String::as_str)
            .chain(self.edges.iter().map(|e| &*e.output_name))
            .collect();
        for name in &self.optional_names {
            if !known_names.contains(name.as_str()) {
                return Err(AlgebraError::DanglingOptional { name: name.clone() });
            }
        }

        strata_graph::compile(
            self.inputs.clone(),
            self.edges.clone(),
            self.outputs.clone(),
        )?;
        Ok(())
    }

    /// A deep copy of this bag under a freshly minted, unique name prefix,
    /// so it can be composed with other bags (including copies of itself)
    /// without colliding on node names. The returned bag's context is
    /// reset to [`Context::Identity`].
    pub fn freeze(&self) -> Self {
        let ordinal = FREEZE_COUNTER.fetch_add(1, Ordering::Relaxed);
        let prefix = format!("layer{ordinal}$");
        let rename = |name: &str| -> String { format!("{prefix}{name}") };

        let inputs = self.inputs.iter().map(|n| rename(n)).collect();
        let outputs = self.outputs.iter().map(|n| rename(n)).collect();
        let edges = self
            .edges
            .iter()
            .map(|e| {
                BoundEdge::new(
                    e.edge.clone(),
                    e.input_names.iter().map(|n| rename(n)).collect::<Vec<_>>(),
                    rename(&e.output_name),
                )
            })
            .collect();
        let virtual_names = self.virtual_names.iter().map(|n| rename(n)).collect();
        let persistent_names = self.persistent_names.iter().map(|n| rename(n)).collect();
        let optional_names = self.optional_names.iter().map(|n| rename(n)).collect();

        Self {
            inputs,
            outputs,
            edges,
            virtual_names,
            persistent_names,
            optional_names,
            context: Context::Identity,
        }
    }

    /// Decorates this bag with a function of some of its existing outputs,
    /// presenting the result as a new top-level output under `output`.
    pub fn loopback(
        &self,
        func: std::sync::Arc<dyn Capability>,
        inputs: Vec<String>,
        output: String,
    ) -> Result<Self, AlgebraError> {
        let mut bag = self.clone();
        bag.edges
            .push(BoundEdge::new(Edge::Function(func), inputs, output.clone()));
        bag.outputs.push(output);

        let (resolved_outputs, extra_edges, extra_optional) =
            self.context.reverse(bag.outputs.clone())?;
        bag.edges.extend(extra_edges);
        bag.outputs = resolved_outputs;
        bag.optional_names.extend(extra_optional);
        bag.normalize()?;
        Ok(bag)
    }
}
