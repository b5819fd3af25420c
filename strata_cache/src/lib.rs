// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Cache backends keyed by [`strata_hash::Digest`].
//!
//! [`CacheBackend`] is the contract every backend implements: a reservation
//! step that hands back either a writer role or a reader role for a key, so
//! that at most one caller ever populates a given entry and every other
//! caller either reads the finished value or waits behind the writer.
//! [`MemoryCache`] is a process-local LRU; [`disk::DiskIndex`] is a
//! directory-backed index with collision detection and crash-safe writes,
//! optionally falling back to read-only [`RemoteSource`]s on a local miss.
//! [`shard::CacheColumns`] groups many identity keys into a handful of
//! jointly-cached shards for a column-cache warm-up.

mod backend;
pub mod disk;
mod error;
mod memory;
mod remote;
mod serializer;
pub mod shard;

pub use backend::{CacheBackend, Reservation};
pub use error::CacheError;
pub use memory::MemoryCache;
pub use remote::{LocalDirRemoteSource, RemoteSource};
pub use serializer::{BytesSerializer, JsonSerializer, Serializer, SerializerChain};
pub use shard::CacheColumns;
