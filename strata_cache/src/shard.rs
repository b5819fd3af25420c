// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Column-cache sharding: grouping many identity keys into a handful of
//! jointly-computed, jointly-cached shards.
//!
//! A plain [`crate::CacheBackend`] entry is keyed by one node's structural
//! hash, so caching a per-key transform still calls the wrapped function
//! once per key on a cold cache. `CacheColumns` groups a layer's id set
//! into `ceil(N / shard_size)` shards and gives every id in the same shard
//! the same cache key, so warming up one member of a shard warms up every
//! other member too — the "column cache warm-up" scenario spec.md's §8
//! end-to-end tests describe.

use strata_hash::HashValue;

const MARKER: &str = "strata_cache::CacheColumns";

/// Groups a sorted, deduplicated id set into fixed-size shards.
pub struct CacheColumns {
    shard_size: usize,
}

impl CacheColumns {
    /// `shard_size` must be at least 1; a shard of size 1 degenerates to
    /// one cache entry per id, which is valid but pointless.
    pub fn new(shard_size: usize) -> Self {
        assert!(shard_size > 0, "CacheColumns shard_size must be nonzero");
        Self { shard_size }
    }

    pub fn shard_size(&self) -> usize {
        self.shard_size
    }

    /// The number of shards needed to cover `len` ids: `ceil(len /
    /// shard_size)`.
    pub fn shard_count(&self, len: usize) -> usize {
        len.div_ceil(self.shard_size)
    }

    /// Which shard the id at `index` (in the same stable order `shards`
    /// iterates) belongs to.
    pub fn shard_index(&self, index: usize) -> usize {
        index / self.shard_size
    }

    /// Splits `ids` into its shards, in order. `ids` should already be in
    /// the stable order the caller wants shard membership to follow (e.g.
    /// sorted), since `CacheColumns` does not impose an ordering itself.
    pub fn shards<'a>(&self, ids: &'a [String]) -> Vec<&'a [String]> {
        ids.chunks(self.shard_size).collect()
    }

    /// The cache key every id in `shard_ids` shares: `upstream` (the hash
    /// of whatever feeds the wrapped transform) plus a leaf per member id,
    /// folded through a `Custom` node so two different shards of the same
    /// size never collide on the same digest as a coincidence.
    pub fn shard_hash(&self, upstream: &HashValue, shard_ids: &[String]) -> HashValue {
        let mut children = Vec::with_capacity(shard_ids.len() + 1);
        children.push(upstream.clone());
        children.extend(shard_ids.iter().map(|id| HashValue::leaf(id.as_bytes())));
        HashValue::custom(MARKER, children)
    }

    /// The shard hash covering `id`, given the full (stably ordered) id set
    /// it belongs to — the common case: a caller has one id in hand and
    /// wants the key for whichever shard contains it.
    pub fn shard_hash_for(&self, upstream: &HashValue, ids: &[String], id: &str) -> Option<HashValue> {
        let index = ids.iter().position(|candidate| candidate == id)?;
        let shard = self.shard_index(index);
        let start = shard * self.shard_size;
        let end = (start + self.shard_size).min(ids.len());
        Some(self.shard_hash(upstream, &ids[start..end]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| i.to_string()).collect()
    }

    #[test]
    fn shard_count_rounds_up() {
        let columns = CacheColumns::new(4);
        assert_eq!(columns.shard_count(0), 0);
        assert_eq!(columns.shard_count(4), 1);
        assert_eq!(columns.shard_count(5), 2);
        assert_eq!(columns.shard_count(16), 4);
        assert_eq!(columns.shard_count(17), 5);
    }

    #[test]
    fn shards_cover_every_id_exactly_once() {
        let columns = CacheColumns::new(3);
        let ids = ids(10);
        let shards = columns.shards(&ids);
        assert_eq!(shards.len(), columns.shard_count(ids.len()));
        let flattened: Vec<&String> = shards.iter().flat_map(|shard| shard.iter()).collect();
        assert_eq!(flattened.len(), ids.len());
    }

    #[test]
    fn members_of_the_same_shard_share_a_hash() {
        let columns = CacheColumns::new(4);
        let ids = ids(9);
        let upstream = HashValue::leaf(b"costly");

        let hash_for_0 = columns.shard_hash_for(&upstream, &ids, "0").unwrap();
        let hash_for_3 = columns.shard_hash_for(&upstream, &ids, "3").unwrap();
        assert_eq!(hash_for_0.digest(), hash_for_3.digest());

        // id "4" starts the second shard and must diverge.
        let hash_for_4 = columns.shard_hash_for(&upstream, &ids, "4").unwrap();
        assert_ne!(hash_for_0.digest(), hash_for_4.digest());
    }

    #[test]
    fn different_upstream_hashes_never_collide() {
        let columns = CacheColumns::new(4);
        let ids = ids(4);
        let a = columns.shard_hash(&HashValue::leaf(b"a"), &ids);
        let b = columns.shard_hash(&HashValue::leaf(b"b"), &ids);
        assert_ne!(a.digest(), b.digest());
    }
}
