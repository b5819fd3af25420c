// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

/// The union of every error a [`crate::Pipeline`] operation can raise.
#[derive(Debug, thiserror::Error)]
pub enum StrataError {
    #[error(transparent)]
    Graph(#[from] strata_graph::GraphError),
    #[error(transparent)]
    Algebra(#[from] strata_algebra::AlgebraError),
    #[error(transparent)]
    Cache(#[from] strata_cache::CacheError),
}
