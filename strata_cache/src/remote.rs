// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::path::PathBuf;

use strata_hash::HashValue;
use tracing::warn;

use crate::disk::DiskIndex;
use crate::CacheError;

/// A read-only cache location consulted after every local schema version
/// has missed. Remotes never receive writes from this crate — a hit here
/// is copied into the local index so the next read stays local.
///
/// A remote fetch failure (network error, corrupted entry, anything) is
/// reported as a plain miss rather than propagated: `DiskIndex::get` tries
/// the next remote in the list instead of aborting the caller's read.
pub trait RemoteSource: Send + Sync {
    fn fetch(&self, hash: &HashValue) -> Option<Vec<u8>>;
}

/// A [`RemoteSource`] backed by a second directory on the same filesystem,
/// laid out exactly like a [`DiskIndex`]. Exercises the `RemoteSource`
/// contract without a network transport, which this workspace leaves to
/// embedders (see `DESIGN.md`).
pub struct LocalDirRemoteSource {
    index: DiskIndex,
    root: PathBuf,
}

impl LocalDirRemoteSource {
    /// Opens a read-only view of the `DiskIndex` rooted at `root`. The
    /// directory is created if absent, matching `DiskIndex::open`, since a
    /// remote that has never been written to is a legitimate (always-miss)
    /// starting state.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        Ok(Self {
            index: DiskIndex::open(&root)?,
            root,
        })
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }
}

impl RemoteSource for LocalDirRemoteSource {
    fn fetch(&self, hash: &HashValue) -> Option<Vec<u8>> {
        match self.index.get_local(hash) {
            Ok(value) => value,
            Err(error) => {
                warn!(%error, "remote fetch failed, treating as a miss");
                None
            }
        }
    }
}
