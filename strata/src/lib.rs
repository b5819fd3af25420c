// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A declarative, content-addressed data-pipeline engine.
//!
//! Build a [`Pipeline`] out of [`Pipeline::source`] and
//! [`Pipeline::transform`] steps, compose pipelines with [`std::ops::Shr`]
//! (`>>`), then [`Pipeline::compile`] and [`Pipeline::run`] it. Every
//! intermediate value is identified by a [`strata_hash::HashValue`]; wire
//! a [`strata_cache::CacheBackend`] through [`Pipeline::run_cached`] to
//! skip recomputing anything the cache has already seen.

mod error;
mod pipeline;

pub use error::StrataError;
pub use pipeline::Pipeline;

pub use strata_algebra::{
    chain, filter, group_by, item, join, merge, merge_with_ids, split, AlgebraError, Context, EdgesBag,
};
pub use strata_cache::{disk::DiskIndex, CacheBackend, CacheColumns, LocalDirRemoteSource, MemoryCache, RemoteSource};
pub use strata_graph::{
    compile, named, BoundEdge, Capability, Compiled, Edge, Graph, JoinMode, Selector, Value, Vm,
};
pub use strata_hash::{Digest, FunctionHasher, HashValue, StableName, UnstableRegistry, UnstableToken};
