// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

/// Errors raised while composing or reversing [`crate::EdgesBag`]s.
#[derive(Debug, thiserror::Error)]
pub enum AlgebraError {
    /// The underlying compiled graph rejected the composed bag (cycle,
    /// multi-parent, or unreachable input).
    #[error(transparent)]
    Graph(#[from] strata_graph::GraphError),

    /// A name is declared both virtual and an explicit output of the same
    /// bag.
    #[error("{name:?} is both virtual and an explicit output")]
    VirtualOutputOverlap { name: String },

    /// An optional name was declared but no node in the bag carries it.
    #[error("optional name {name:?} is not a node in this bag")]
    DanglingOptional { name: String },

    /// A downstream layer requires a name the upstream layer does not
    /// supply, and that name is neither declared optional nor virtual.
    #[error("{name:?} is required downstream but is not virtual, persistent, or optional upstream")]
    NotForwarded { name: String },

    /// [`Context::NoContext`](crate::Context) cannot be reversed — the bag
    /// it describes was never assembled from a decorated sub-bag.
    #[error("this bag has no loopback context to reverse")]
    NoReverseContext,

    /// [`crate::Context::reverse`] was asked for a name it has no mapping
    /// for and is not configured to pass through unchanged.
    #[error("unknown field {name:?} in loopback context")]
    UnknownField { name: String },

    /// A join saw the same non-join field declared on both sides, or a
    /// [`crate::merge`] branch's id set overlaps another branch's.
    #[error("conflicting values for field {field:?} at key {key:?}")]
    Conflict { key: String, field: String },

    /// A [`crate::merge_with_ids`] branch does not expose the declared
    /// id-property among its outputs.
    #[error("branch does not expose id-property {name:?}")]
    MissingIdProperty { name: String },
}
