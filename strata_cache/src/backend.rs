// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::collections::HashSet;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use strata_hash::{Digest, HashValue};
use tracing::{debug, warn};

use crate::CacheError;

/// How long a reader will wait for an in-progress writer before reporting
/// [`CacheError::PotentialDeadlock`]. The reference engine's limit is ten
/// minutes; tests override this via [`Locker::with_timeout`].
const DEFAULT_WAIT_CEILING: Duration = Duration::from_secs(600);

/// The role a caller is granted after reserving a key: either it is the
/// one writer responsible for populating the entry, or it is a reader that
/// must wait for (or has just missed) that writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// This caller must compute the value and call
    /// [`CacheBackend::finish_write`] or [`CacheBackend::fail_write`].
    Writer,
    /// Another caller is, or was, the writer. Call [`CacheBackend::get`]
    /// for the final value.
    Reader,
}

/// At-most-one-writer-per-key reservation tracker shared by the in-memory
/// and disk backends, mirroring the reference engine's threaded
/// transaction: the first caller to reserve a key becomes its writer,
/// every later caller becomes a reader blocked behind it, and a writer
/// that fails releases the key for the next contender instead of wedging
/// it forever.
#[derive(Debug)]
pub struct Locker {
    in_progress: Mutex<HashSet<Digest>>,
    done: Condvar,
    wait_ceiling: Duration,
}

impl Default for Locker {
    fn default() -> Self {
        Self::new()
    }
}

impl Locker {
    pub fn new() -> Self {
        Self {
            in_progress: Mutex::new(HashSet::new()),
            done: Condvar::new(),
            wait_ceiling: DEFAULT_WAIT_CEILING,
        }
    }

    /// Builds a locker with a shorter wait ceiling, for tests that exercise
    /// the deadlock-detection path without waiting ten minutes.
    pub fn with_timeout(wait_ceiling: Duration) -> Self {
        Self {
            in_progress: Mutex::new(HashSet::new()),
            done: Condvar::new(),
            wait_ceiling,
        }
    }

    /// Reserves `digest`, becoming its writer if no one else is already
    /// writing it, or blocking as a reader until the current writer
    /// finishes (successfully or not).
    pub fn reserve_write_or_read(&self, digest: Digest) -> Result<Reservation, CacheError> {
        let mut guard = self.in_progress.lock().unwrap_or_else(|e| e.into_inner());
        if guard.insert(digest) {
            debug!(%digest, "reserved as writer");
            return Ok(Reservation::Writer);
        }

        let deadline = Instant::now() + self.wait_ceiling;
        while guard.contains(&digest) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(%digest, "timed out waiting for writer");
                return Err(CacheError::PotentialDeadlock {
                    digest,
                    waited_secs: self.wait_ceiling.as_secs(),
                });
            }
            let (next_guard, timeout) = self
                .done
                .wait_timeout(guard, remaining)
                .unwrap_or_else(|e| e.into_inner());
            guard = next_guard;
            if timeout.timed_out() && guard.contains(&digest) {
                continue;
            }
        }
        debug!(%digest, "reserved as reader");
        Ok(Reservation::Reader)
    }

    /// Releases a writer reservation, successful or not, waking every
    /// reader blocked behind it.
    pub fn release(&self, digest: Digest) {
        let mut guard = self.in_progress.lock().unwrap_or_else(|e| e.into_inner());
        guard.remove(&digest);
        drop(guard);
        self.done.notify_all();
    }
}

/// A keyed byte-value cache with an at-most-one-writer reservation
/// protocol. [`crate::MemoryCache`] and [`crate::disk::DiskIndex`] both
/// implement this.
///
/// `get`/`finish_write` take the whole [`HashValue`], not just its
/// [`Digest`]: a backend that wants true structural collision detection
/// needs [`HashValue::canonical_bytes`], and a versioned read needs
/// [`HashValue::digest_for_version`] to try older schema keys on a miss.
/// Reservation is keyed by `Digest` alone — it only ever guards the
/// current version's write slot.
pub trait CacheBackend {
    /// Reads the current value for `hash`, if present.
    fn get(&self, hash: &HashValue) -> Result<Option<Vec<u8>>, CacheError>;

    /// Reserves `digest` for writing or reading. See [`Reservation`].
    fn reserve_write_or_read(&self, digest: Digest) -> Result<Reservation, CacheError>;

    /// Stores `bytes` under `hash` and releases the writer reservation.
    /// Only valid to call after [`CacheBackend::reserve_write_or_read`]
    /// returned [`Reservation::Writer`] for `hash.digest()`.
    fn finish_write(&self, hash: &HashValue, bytes: Vec<u8>) -> Result<(), CacheError>;

    /// Releases a writer reservation without storing a value, e.g. because
    /// computing the value failed. Frees the key for the next contender.
    fn fail_write(&self, digest: Digest);
}
