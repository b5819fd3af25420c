// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

/// Errors raised while compiling or evaluating a [`crate::Graph`].
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// The bound edges describe a cycle. The path is reported node-name by
    /// node-name, matching the cycle itself (first and last entries equal).
    #[error("cycle detected: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },

    /// More than one bound edge claims the same output node.
    #[error("node {node:?} has more than one incoming edge")]
    MultiParent { node: String },

    /// Two distinct nodes were declared under the same name.
    #[error("duplicate node name {name:?}")]
    NameCollision { name: String },

    /// A name was declared both virtual (forwarded automatically on chain)
    /// and as an explicit output of the same layer.
    #[error("{name:?} is both virtual and an explicit output")]
    VirtualOutputOverlap { name: String },

    /// An output cannot be reached from any declared input.
    #[error("output {output:?} has no path back to a declared input")]
    UnreachableInput { output: String },

    /// A requested field does not exist in the graph.
    #[error("unknown field {name:?}")]
    UnknownField { name: String },

    /// A requested field exists but was declared optional and its value
    /// was dropped upstream.
    #[error("field {name:?} was dropped (declared optional, not provided)")]
    OptionalDropped { name: String },

    /// A [`crate::Edge::Filter`] predicate depends, transitively, on an
    /// [`crate::Edge::Impure`] edge, so its hash cannot be computed ahead
    /// of evaluation.
    #[error("filter predicate for {node:?} depends on an impure edge and cannot be hashed")]
    ImpureInFilter { node: String },

    /// A [`crate::Edge::Cache`] wraps an [`crate::Edge::Impure`] edge
    /// without acknowledging it (the boolean flag on `Cache`), which would
    /// cache an impure result under a key that looks stable.
    #[error("{node:?} caches an impure edge without allow_impure set")]
    CacheOverImpure { node: String },
}
