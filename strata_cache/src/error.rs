// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::path::PathBuf;

use strata_hash::Digest;

/// Errors a [`crate::CacheBackend`] can report.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The on-disk entry for `digest` failed its stored-hash consistency
    /// check and was deleted; the caller should treat this as a miss.
    #[error("disk entry for {digest} at {path:?} was corrupted and has been removed")]
    StorageCorruption { digest: Digest, path: PathBuf },

    /// No [`crate::Serializer`] in the chain could encode or decode a value.
    #[error("no serializer in the chain could handle this value")]
    NoSerializer,

    /// A writer reservation was still in progress after the locker's wait
    /// ceiling elapsed.
    #[error("timed out after {waited_secs}s waiting for a writer to finish {digest}")]
    PotentialDeadlock { digest: Digest, waited_secs: u64 },

    /// An I/O failure while reading or writing the disk index.
    #[error("disk index I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The `config.yml` at the index root failed to parse.
    #[error("invalid disk index configuration: {0}")]
    Config(#[from] serde_yaml::Error),
}
