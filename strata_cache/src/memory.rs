// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::collections::HashMap;
use std::sync::Mutex;

use strata_hash::{Digest, HashValue};

use crate::backend::{CacheBackend, Locker, Reservation};
use crate::CacheError;

struct Lru {
    capacity: usize,
    entries: HashMap<Digest, Vec<u8>>,
    order: Vec<Digest>,
}

impl Lru {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: Vec::new(),
        }
    }

    fn touch(&mut self, digest: Digest) {
        self.order.retain(|d| *d != digest);
        self.order.push(digest);
    }

    fn get(&mut self, digest: Digest) -> Option<Vec<u8>> {
        let value = self.entries.get(&digest).cloned();
        if value.is_some() {
            self.touch(digest);
        }
        value
    }

    fn insert(&mut self, digest: Digest, bytes: Vec<u8>) {
        self.entries.insert(digest, bytes);
        self.touch(digest);
        while self.entries.len() > self.capacity {
            if let Some(oldest) = self.order.first().copied() {
                self.order.remove(0);
                self.entries.remove(&oldest);
            } else {
                break;
            }
        }
    }
}

/// A process-local, capacity-bounded cache evicting least-recently-used
/// entries first. Reservation is governed by the same [`Locker`] protocol
/// as [`crate::disk::DiskIndex`], so a [`CacheBackend`] caller can treat
/// both interchangeably.
///
/// Entries are keyed by [`Digest`] alone: this cache never outlives the
/// process, so there is no older schema version or cross-restart
/// collision to guard against the way [`crate::disk::DiskIndex`] must.
pub struct MemoryCache {
    lru: Mutex<Lru>,
    locker: Locker,
}

impl MemoryCache {
    /// Builds a cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            lru: Mutex::new(Lru::new(capacity)),
            locker: Locker::new(),
        }
    }
}

impl CacheBackend for MemoryCache {
    fn get(&self, hash: &HashValue) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self
            .lru
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(hash.digest()))
    }

    fn reserve_write_or_read(&self, digest: Digest) -> Result<Reservation, CacheError> {
        self.locker.reserve_write_or_read(digest)
    }

    fn finish_write(&self, hash: &HashValue, bytes: Vec<u8>) -> Result<(), CacheError> {
        self.lru
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(hash.digest(), bytes);
        self.locker.release(hash.digest());
        Ok(())
    }

    fn fail_write(&self, digest: Digest) {
        self.locker.release(digest);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(byte: u8) -> HashValue {
        HashValue::leaf(&[byte])
    }

    #[test]
    fn write_then_read() {
        let cache = MemoryCache::new(4);
        let h = hash(1);
        assert_eq!(
            cache.reserve_write_or_read(h.digest()).unwrap(),
            Reservation::Writer
        );
        cache.finish_write(&h, vec![9, 9]).unwrap();
        assert_eq!(cache.get(&h).unwrap(), Some(vec![9, 9]));
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = MemoryCache::new(2);
        let hashes: Vec<HashValue> = (0..3u8).map(hash).collect();
        for (i, h) in hashes.iter().enumerate() {
            cache.reserve_write_or_read(h.digest()).unwrap();
            cache.finish_write(h, vec![i as u8]).unwrap();
        }
        assert_eq!(cache.get(&hashes[0]).unwrap(), None);
        assert_eq!(cache.get(&hashes[2]).unwrap(), Some(vec![2]));
    }

    #[test]
    fn failed_write_frees_the_key() {
        let cache = MemoryCache::new(4);
        let h = hash(1);
        assert_eq!(
            cache.reserve_write_or_read(h.digest()).unwrap(),
            Reservation::Writer
        );
        cache.fail_write(h.digest());
        assert_eq!(
            cache.reserve_write_or_read(h.digest()).unwrap(),
            Reservation::Writer
        );
    }
}
