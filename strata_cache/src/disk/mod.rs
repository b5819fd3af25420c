// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A directory-backed cache index keyed by [`strata_hash::Digest`].
//!
//! Each entry lives at a path derived from the digest's hex encoding,
//! nested into directory levels so no single directory accumulates every
//! entry. A leaf directory holds three things: `hash.bin`, a gzip-
//! compressed copy of the entry's [`strata_hash::HashValue::canonical_bytes`]
//! used to detect a corrupted or colliding entry on read; `time`, an empty
//! file whose mtime is bumped on every read and acts as an LRU eviction
//! marker for external reaping; and `data/`, the serialized value written
//! through a [`crate::serializer::SerializerChain`]. Writes land in a
//! temporary directory and are moved into place atomically so a crash
//! mid-write never leaves a half-populated leaf for a reader to trip over.
//!
//! A read tries the leaf at the hash's current-schema digest first, then
//! each of [`strata_hash::PREVIOUS_SCHEMA_VERSIONS`] in turn; a hit under
//! an older version is transparently rewritten under the current digest so
//! the next read no longer needs to fall back. If every local schema
//! version misses, [`DiskIndex::with_remotes`] attached
//! [`crate::RemoteSource`]s are tried in order; a remote hit is copied into
//! this index before being returned.

mod config;
mod index;

pub use config::DiskIndexConfig;
pub use index::DiskIndex;
