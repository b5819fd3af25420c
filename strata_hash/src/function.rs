// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::sync::atomic::{AtomicU64, Ordering};

use crate::digest::{finalize, hasher};
use crate::Digest;

/// Derives the content identity folded into an [`crate::HashValue::apply`]
/// node for the function being called.
///
/// Two notions of identity are supported, mirroring the "stable" and
/// "unstable" callable markers of the engine this crate's hashing scheme is
/// modeled on: a **stable** function is identified by its fully-qualified
/// name so that re-evaluating the same pipeline after a process restart
/// still hits the cache, while an **unstable** one (a closure capturing
/// ambient state, or a callable under active development) must never be
/// mistaken for any other callable, including itself across two different
/// construction sites.
pub trait FunctionHasher {
    /// The digest identifying this callable.
    fn function_digest(&self) -> Digest;
}

/// A function identified by its fully-qualified name.
///
/// Rust has no reflective access to a closure's compiled body, so unlike
/// the reference engine (which deep-hashes bytecode, constants, and free
/// variables for "unstable" callables) this crate asks embedders to assign
/// every cacheable function a stable name explicitly — typically
/// `module_path!().to_owned() + "::" + "function_name"`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StableName {
    digest: Digest,
}

impl StableName {
    /// Builds a stable identity from a fully-qualified name.
    pub fn new(qualified_name: &str) -> Self {
        let mut h = hasher();
        h.update(b"stable-fn");
        h.update(qualified_name.as_bytes());
        Self {
            digest: finalize(h),
        }
    }
}

impl FunctionHasher for StableName {
    fn function_digest(&self) -> Digest {
        self.digest
    }
}

/// A function identity that never matches any other token minted by the
/// same [`UnstableRegistry`]. Use this for closures capturing mutable
/// ambient state, or callables explicitly marked "under development" whose
/// behavior cannot be trusted to stay put across runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UnstableToken {
    digest: Digest,
}

impl FunctionHasher for UnstableToken {
    fn function_digest(&self) -> Digest {
        self.digest
    }
}

/// Mints [`UnstableToken`]s for one engine instance.
///
/// Ordinals are scoped to the registry rather than to the process, so two
/// independently constructed engines (as in a test suite running many
/// pipelines in the same process) never need to coordinate a shared
/// counter to keep their unstable tokens from colliding with each other's.
#[derive(Debug, Default)]
pub struct UnstableRegistry {
    counter: AtomicU64,
}

impl UnstableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints a digest guaranteed to be distinct from every other token this
    /// registry has minted.
    pub fn mint(&self) -> UnstableToken {
        let ordinal = self.counter.fetch_add(1, Ordering::Relaxed);
        let mut h = hasher();
        h.update(b"unstable-fn");
        h.update(&ordinal.to_le_bytes());
        UnstableToken {
            digest: finalize(h),
        }
    }
}
