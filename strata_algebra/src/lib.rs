// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Layer composition: building bigger pipelines out of smaller ones.
//!
//! An [`EdgesBag`] is a frozen, self-contained subgraph plus the metadata
//! needed to compose it with another: which of its names are inputs,
//! which are outputs, which outputs are "virtual" (forwarded automatically
//! through a chain unless shadowed) or "persistent" (forwarded always,
//! never shadowed), and which inputs are optional. [`chain`], [`merge`],
//! [`filter`], [`group_by`], [`join`], and [`split`] build a new
//! [`EdgesBag`] out of one or two existing ones; [`Context`] records
//! enough about how a bag was assembled to let [`EdgesBag::loopback`]
//! later decorate it with a function of its own outputs.

mod bag;
mod context;
mod error;
mod ops;

pub use bag::EdgesBag;
pub use context::Context;
pub use error::AlgebraError;
pub use ops::{chain, filter, group_by, item, join, merge, merge_with_ids, split};

pub use strata_graph::{Capability, JoinMode, Selector};
