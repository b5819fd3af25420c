// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A compiled execution graph over content-addressed values.
//!
//! [`BoundEdge`]s describe, node by node, how each output is produced from
//! its inputs. [`compile`] turns a set of bound edges into a [`Graph`]: a
//! static, topologically-ordered tree with every output's single producing
//! edge resolved, rejecting an impure edge hidden inside a [`Filter`]
//! predicate or an uncommitted [`Edge::Cache`]. [`Vm`] resolves a compiled
//! [`Graph`]'s hashes and values together, lazily, short-circuiting
//! wherever a [`edge::Edge::Cache`] reports a hash hit.
//!
//! [`Filter`]: edge::Edge::Filter

mod compiler;
mod edge;
mod error;
mod graph;
mod value;
pub mod vm;

pub use compiler::{compile, Compiled};
pub use edge::{
    hash_barrier, named, BoundEdge, Capability, Edge, Grouped, JoinMode, JoinedRow, Selector,
    ValueHasher,
};
pub use error::GraphError;
pub use graph::{Graph, Node, NodeId};
pub use value::Value;
pub use vm::Vm;
