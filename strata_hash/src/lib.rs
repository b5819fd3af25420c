// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Content-addressed structural hashing.
//!
//! A [`HashValue`] is a small tree that mirrors the shape of the graph node
//! it identifies: a leaf wraps a literal's bytes, an apply node folds in a
//! function's identity plus the hashes of its arguments, a graph node marks
//! the boundary of a bound subgraph, and a custom node lets higher layers
//! (filter predicates, merge branches, joins) mix in their own structural
//! markers without inventing a new [`HashValue`] variant per combinator.
//!
//! Two values that construct equal [`HashValue`] trees are guaranteed to
//! produce the same [`Digest`], independent of node identity, variable
//! naming, or graph node count — renaming a node or splitting one call into
//! two equivalent ones never changes the digest.

use std::fmt;

mod digest;
mod function;

pub use digest::Digest;
pub use function::{FunctionHasher, StableName, UnstableRegistry, UnstableToken};

/// The structural hash schema version folded into every digest's domain
/// separation tag. Bumping this invalidates every previously computed
/// digest; [`strata_cache`](https://docs.rs/strata_cache) uses it to decide
/// when a cache key must be looked up under an older scheme.
pub const SCHEMA_VERSION: u8 = 2;

/// Schema versions no longer current but still computable via
/// [`HashValue::digest_for_version`], newest first. A
/// [`strata_cache::disk::DiskIndex`](https://docs.rs/strata_cache) read
/// falls back through this list on a miss under the current version and
/// rewrites an older hit under the current key.
pub const PREVIOUS_SCHEMA_VERSIONS: &[u8] = &[1];

/// Structural, content-addressed identity of a graph node's value.
///
/// Cloning a [`HashValue`] is cheap relative to recomputing it: the digest
/// is computed once at construction and carried alongside the structural
/// description so repeated [`HashValue::digest`] calls are free.
#[derive(Clone, PartialEq, Eq)]
pub struct HashValue {
    digest: Digest,
    repr: Repr,
}

#[derive(Clone, PartialEq, Eq)]
enum Repr {
    Leaf(Vec<u8>),
    Apply {
        function: Digest,
        args: Vec<HashValue>,
        kwargs: Vec<(Box<str>, HashValue)>,
    },
    Graph(Box<HashValue>),
    Custom {
        marker: Box<str>,
        children: Vec<HashValue>,
    },
}

const TAG_LEAF: u8 = 0;
const TAG_APPLY: u8 = 1;
const TAG_GRAPH: u8 = 2;
const TAG_CUSTOM: u8 = 3;

impl HashValue {
    /// A leaf hash over the canonical byte encoding of a literal value.
    ///
    /// Callers are responsible for producing a canonical encoding of `T`
    /// themselves (e.g. via a deterministic `serde` serializer) — this
    /// crate only folds the bytes into the digest, it does not canonicalize
    /// floats, maps, or other representation-ambiguous values.
    pub fn leaf(bytes: &[u8]) -> Self {
        let mut hasher = digest::hasher();
        hasher.update(&[TAG_LEAF]);
        hasher.update(&[SCHEMA_VERSION]);
        hasher.update(bytes);
        Self {
            digest: digest::finalize(hasher),
            repr: Repr::Leaf(bytes.to_vec()),
        }
    }

    /// A leaf hash over a UTF-8 string, a common special case of
    /// [`HashValue::leaf`].
    pub fn leaf_str(s: &str) -> Self {
        Self::leaf(s.as_bytes())
    }

    /// An apply hash: the identity of a function call, folding in the
    /// function's own digest and the hashes of its positional and keyword
    /// arguments. Keyword arguments are sorted by name before hashing so
    /// call-site argument order never affects the digest.
    pub fn apply<F: FunctionHasher>(
        function: &F,
        args: Vec<HashValue>,
        mut kwargs: Vec<(Box<str>, HashValue)>,
    ) -> Self {
        kwargs.sort_by(|a, b| a.0.cmp(&b.0));
        let function_digest = function.function_digest();

        let mut hasher = digest::hasher();
        hasher.update(&[TAG_APPLY]);
        hasher.update(&[SCHEMA_VERSION]);
        hasher.update(function_digest.as_bytes());
        hasher.update(&(args.len() as u64).to_le_bytes());
        for arg in &args {
            hasher.update(arg.digest.as_bytes());
        }
        hasher.update(&(kwargs.len() as u64).to_le_bytes());
        for (name, value) in &kwargs {
            hasher.update(&(name.len() as u64).to_le_bytes());
            hasher.update(name.as_bytes());
            hasher.update(value.digest.as_bytes());
        }

        Self {
            digest: digest::finalize(hasher),
            repr: Repr::Apply {
                function: function_digest,
                args,
                kwargs,
            },
        }
    }

    /// A graph hash: marks that `inner` is the output hash of a bound
    /// subgraph rather than a bare leaf or apply node, so a graph and a
    /// leaf that happen to share a digest never collide once wrapped.
    pub fn graph(inner: HashValue) -> Self {
        let mut hasher = digest::hasher();
        hasher.update(&[TAG_GRAPH]);
        hasher.update(&[SCHEMA_VERSION]);
        hasher.update(inner.digest.as_bytes());
        Self {
            digest: digest::finalize(hasher),
            repr: Repr::Graph(Box::new(inner)),
        }
    }

    /// A custom hash for combinators (filter predicates, merge branch
    /// selection, join keys) that need to mix a structural marker with a
    /// set of child hashes without a dedicated variant.
    pub fn custom(marker: impl Into<Box<str>>, children: Vec<HashValue>) -> Self {
        let marker = marker.into();
        let mut hasher = digest::hasher();
        hasher.update(&[TAG_CUSTOM]);
        hasher.update(&[SCHEMA_VERSION]);
        hasher.update(&(marker.len() as u64).to_le_bytes());
        hasher.update(marker.as_bytes());
        hasher.update(&(children.len() as u64).to_le_bytes());
        for child in &children {
            hasher.update(child.digest.as_bytes());
        }
        Self {
            digest: digest::finalize(hasher),
            repr: Repr::Custom { marker, children },
        }
    }

    /// The computed digest. Constant time: never recomputes.
    pub fn digest(&self) -> Digest {
        self.digest
    }

    /// A byte-exact encoding of this value's full structural tree —
    /// recursively, not just the top node's digest — suitable for a cache
    /// backend to persist alongside a digest and compare on every read to
    /// catch the (cryptographically negligible, but specified-for) case of
    /// two distinct structures sharing a digest.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf);
        buf
    }

    fn encode_into(&self, buf: &mut Vec<u8>) {
        match &self.repr {
            Repr::Leaf(bytes) => {
                buf.push(TAG_LEAF);
                buf.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
                buf.extend_from_slice(bytes);
            }
            Repr::Apply { function, args, kwargs } => {
                buf.push(TAG_APPLY);
                buf.extend_from_slice(function.as_bytes());
                buf.extend_from_slice(&(args.len() as u64).to_le_bytes());
                for arg in args {
                    arg.encode_into(buf);
                }
                buf.extend_from_slice(&(kwargs.len() as u64).to_le_bytes());
                for (name, value) in kwargs {
                    buf.extend_from_slice(&(name.len() as u64).to_le_bytes());
                    buf.extend_from_slice(name.as_bytes());
                    value.encode_into(buf);
                }
            }
            Repr::Graph(inner) => {
                buf.push(TAG_GRAPH);
                inner.encode_into(buf);
            }
            Repr::Custom { marker, children } => {
                buf.push(TAG_CUSTOM);
                buf.extend_from_slice(&(marker.len() as u64).to_le_bytes());
                buf.extend_from_slice(marker.as_bytes());
                buf.extend_from_slice(&(children.len() as u64).to_le_bytes());
                for child in children {
                    child.encode_into(buf);
                }
            }
        }
    }

    /// Recomputes this value's digest as it would have been under an
    /// earlier [`SCHEMA_VERSION`], from the structural tree retained
    /// alongside the current digest. Used by a versioned cache read that
    /// falls back through [`PREVIOUS_SCHEMA_VERSIONS`] on a current-key
    /// miss.
    pub fn digest_for_version(&self, version: u8) -> Digest {
        if version == SCHEMA_VERSION {
            return self.digest;
        }
        hash_for_version(&self.repr, version)
    }
}

fn hash_for_version(repr: &Repr, version: u8) -> Digest {
    let mut hasher = digest::hasher();
    match repr {
        Repr::Leaf(bytes) => {
            hasher.update(&[TAG_LEAF]);
            hasher.update(&[version]);
            hasher.update(bytes);
        }
        Repr::Apply { function, args, kwargs } => {
            hasher.update(&[TAG_APPLY]);
            hasher.update(&[version]);
            hasher.update(function.as_bytes());
            hasher.update(&(args.len() as u64).to_le_bytes());
            for arg in args {
                hasher.update(arg.digest_for_version(version).as_bytes());
            }
            hasher.update(&(kwargs.len() as u64).to_le_bytes());
            for (name, value) in kwargs {
                hasher.update(&(name.len() as u64).to_le_bytes());
                hasher.update(name.as_bytes());
                hasher.update(value.digest_for_version(version).as_bytes());
            }
        }
        Repr::Graph(inner) => {
            hasher.update(&[TAG_GRAPH]);
            hasher.update(&[version]);
            hasher.update(inner.digest_for_version(version).as_bytes());
        }
        Repr::Custom { marker, children } => {
            hasher.update(&[TAG_CUSTOM]);
            hasher.update(&[version]);
            hasher.update(&(marker.len() as u64).to_le_bytes());
            hasher.update(marker.as_bytes());
            hasher.update(&(children.len() as u64).to_le_bytes());
            for child in children {
                hasher.update(child.digest_for_version(version).as_bytes());
            }
        }
    }
    digest::finalize(hasher)
}

impl fmt::Debug for HashValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::Leaf(_) => write!(f, "Leaf({})", self.digest),
            Repr::Apply { args, kwargs, .. } => f
                .debug_struct("Apply")
                .field("digest", &self.digest)
                .field("args", args)
                .field("kwargs", kwargs)
                .finish(),
            Repr::Graph(inner) => write!(f, "Graph({}, {:?})", self.digest, inner),
            Repr::Custom { marker, children } => f
                .debug_struct("Custom")
                .field("marker", marker)
                .field("digest", &self.digest)
                .field("children", children)
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_digest_is_deterministic() {
        let a = HashValue::leaf(b"hello");
        let b = HashValue::leaf(b"hello");
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn different_leaves_diverge() {
        let a = HashValue::leaf(b"hello");
        let b = HashValue::leaf(b"world");
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn apply_is_invariant_under_renaming() {
        // Two independently-constructed call trees with identical structure
        // must hash identically even though they are distinct HashValue
        // instances (no shared node identity).
        let f = StableName::new("module.func");
        let one = HashValue::apply(&f, vec![HashValue::leaf(b"x")], vec![]);
        let two = HashValue::apply(&f, vec![HashValue::leaf(b"x")], vec![]);
        assert_eq!(one.digest(), two.digest());
    }

    #[test]
    fn kwarg_order_does_not_affect_digest() {
        let f = StableName::new("module.func");
        let a = HashValue::apply(
            &f,
            vec![],
            vec![
                ("b".into(), HashValue::leaf(b"2")),
                ("a".into(), HashValue::leaf(b"1")),
            ],
        );
        let b = HashValue::apply(
            &f,
            vec![],
            vec![
                ("a".into(), HashValue::leaf(b"1")),
                ("b".into(), HashValue::leaf(b"2")),
            ],
        );
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn graph_wrapper_diverges_from_bare_leaf() {
        let inner = HashValue::leaf(b"x");
        let wrapped = HashValue::graph(inner.clone());
        assert_ne!(inner.digest(), wrapped.digest());
    }

    #[test]
    fn custom_marker_distinguishes_combinators() {
        let children = vec![HashValue::leaf(b"x")];
        let filter = HashValue::custom("filter", children.clone());
        let merge = HashValue::custom("merge", children);
        assert_ne!(filter.digest(), merge.digest());
    }

    #[test]
    fn canonical_bytes_differ_for_distinct_trees_sharing_no_relation() {
        let a = HashValue::custom("filter", vec![HashValue::leaf(b"x")]);
        let b = HashValue::custom("merge", vec![HashValue::leaf(b"x")]);
        assert_ne!(a.canonical_bytes(), b.canonical_bytes());
    }

    #[test]
    fn digest_for_version_diverges_from_current_digest() {
        let value = HashValue::leaf(b"hello");
        assert_eq!(value.digest_for_version(SCHEMA_VERSION), value.digest());
        for &old in PREVIOUS_SCHEMA_VERSIONS {
            assert_ne!(value.digest_for_version(old), value.digest());
        }
    }

    #[test]
    fn digest_for_version_is_deterministic() {
        let value = HashValue::apply(&StableName::new("f"), vec![HashValue::leaf(b"x")], vec![]);
        let old = PREVIOUS_SCHEMA_VERSIONS[0];
        assert_eq!(value.digest_for_version(old), value.digest_for_version(old));
    }

    #[test]
    fn unstable_tokens_never_collide() {
        let registry = UnstableRegistry::new();
        let a = registry.mint();
        let b = registry.mint();
        assert_ne!(a.function_digest(), b.function_digest());
    }

}
