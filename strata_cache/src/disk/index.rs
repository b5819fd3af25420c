// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use flate2::{Compression, GzBuilder};
use strata_hash::{Digest, HashValue, PREVIOUS_SCHEMA_VERSIONS, SCHEMA_VERSION};
use tracing::{debug, warn};

use super::config::DiskIndexConfig;
use crate::backend::{CacheBackend, Locker, Reservation};
use crate::remote::RemoteSource;
use crate::serializer::{BytesSerializer, SerializerChain};
use crate::CacheError;

const HASH_FILE: &str = "hash.bin";
const TIME_FILE: &str = "time";
const DATA_DIR: &str = "data";

/// A crash-safe, collision-checked cache index rooted at a directory on
/// disk.
pub struct DiskIndex {
    root: PathBuf,
    config: DiskIndexConfig,
    locker: Locker,
    data_codec: SerializerChain<Vec<u8>>,
    remotes: Vec<Arc<dyn RemoteSource>>,
}

impl DiskIndex {
    /// Opens (creating if absent) a disk index at `root`, reading
    /// `config.yml` if one already exists there.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| CacheError::Io {
            path: root.clone(),
            source,
        })?;

        let config_path = root.join("config.yml");
        let config = if config_path.exists() {
            let text = fs::read_to_string(&config_path).map_err(|source| CacheError::Io {
                path: config_path.clone(),
                source,
            })?;
            serde_yaml::from_str(&text)?
        } else {
            let config = DiskIndexConfig::default();
            let text = serde_yaml::to_string(&config)?;
            fs::write(&config_path, text).map_err(|source| CacheError::Io {
                path: config_path,
                source,
            })?;
            config
        };

        let wait_ceiling = Duration::from_secs(config.locker.wait_ceiling_secs);
        Ok(Self {
            root,
            config,
            locker: Locker::with_timeout(wait_ceiling),
            data_codec: SerializerChain::new().push(BytesSerializer),
            remotes: Vec::new(),
        })
    }

    /// Attaches read-only remotes consulted, in order, on a local miss. A
    /// hit is copied into this index so the next read stays local; the
    /// first remote to answer wins.
    pub fn with_remotes(mut self, remotes: Vec<Arc<dyn RemoteSource>>) -> Self {
        self.remotes = remotes;
        self
    }

    fn leaf_dir(&self, digest: Digest) -> PathBuf {
        let hex = digest.to_hex();
        let mut path = self.root.clone();
        let mut offset = 0;
        for &level in &self.config.levels {
            let level = level.min(hex.len());
            if level <= offset {
                continue;
            }
            path.push(&hex[offset..level]);
            offset = level;
        }
        path.push(&hex);
        path
    }

    fn encode_hash_bin(canonical: &[u8]) -> Result<Vec<u8>, CacheError> {
        // Pinning mtime to zero keeps the encoded bytes identical across
        // runs for the same canonical encoding, so two writers racing to
        // populate the same entry produce byte-identical hash.bin files.
        let mut encoder = GzBuilder::new()
            .mtime(0)
            .write(Vec::new(), Compression::new(1));
        encoder
            .write_all(canonical)
            .map_err(|source| CacheError::Io {
                path: PathBuf::from(HASH_FILE),
                source,
            })?;
        encoder.finish().map_err(|source| CacheError::Io {
            path: PathBuf::from(HASH_FILE),
            source,
        })
    }

    /// Compares the leaf's stored `hash.bin` against `canonical`, the
    /// requested entry's full structural encoding — not just its digest —
    /// so two distinct structures that happened to collide on a digest
    /// would still be caught here.
    fn check_consistency(&self, leaf: &Path, canonical: &[u8]) -> Result<bool, CacheError> {
        let hash_path = leaf.join(HASH_FILE);
        let compressed = match fs::read(&hash_path) {
            Ok(bytes) => bytes,
            Err(_) => return Ok(false),
        };
        let mut decoder = flate2::read::GzDecoder::new(compressed.as_slice());
        let mut raw = Vec::new();
        if decoder.read_to_end(&mut raw).is_err() {
            return Ok(false);
        }
        Ok(raw == canonical)
    }

    fn cleanup_corrupted(&self, leaf: &Path, digest: Digest) {
        warn!(%digest, path = ?leaf, "removing corrupted cache entry");
        let _ = fs::remove_dir_all(leaf);
    }

    fn touch_time(&self, leaf: &Path) {
        let path = leaf.join(TIME_FILE);
        let _ = fs::OpenOptions::new().create(true).write(true).open(&path);
        let _ = bump_mtime(&path);
    }

    /// Writes `bytes` under `digest`'s leaf directory, replacing whatever
    /// is already there. Shared by [`CacheBackend::finish_write`] and by
    /// [`CacheBackend::get`]'s rewrite of a stale-schema hit under the
    /// current key.
    fn write_leaf(&self, digest: Digest, canonical: &[u8], bytes: &[u8]) -> Result<(), CacheError> {
        let temp = tempfile::Builder::new()
            .prefix("strata-cache-")
            .tempdir_in(&self.root)
            .map_err(|source| CacheError::Io {
                path: self.root.clone(),
                source,
            })?;

        let data_dir = temp.path().join(DATA_DIR);
        fs::create_dir_all(&data_dir).map_err(|source| CacheError::Io {
            path: data_dir.clone(),
            source,
        })?;
        self.data_codec.save(&bytes.to_vec(), &data_dir)?;

        let hash_bytes = Self::encode_hash_bin(canonical)?;
        fs::write(temp.path().join(HASH_FILE), hash_bytes).map_err(|source| CacheError::Io {
            path: temp.path().join(HASH_FILE),
            source,
        })?;
        fs::write(temp.path().join(TIME_FILE), []).map_err(|source| CacheError::Io {
            path: temp.path().join(TIME_FILE),
            source,
        })?;

        let leaf = self.leaf_dir(digest);
        if let Some(parent) = leaf.parent() {
            fs::create_dir_all(parent).map_err(|source| CacheError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let _ = fs::remove_dir_all(&leaf);
        fs::rename(temp.into_path(), &leaf).map_err(|source| CacheError::Io {
            path: leaf.clone(),
            source,
        })?;
        Ok(())
    }
}

/// Best-effort mtime bump; failures here never fail the read, since the
/// `time` marker is only used by an external LRU reaper, not correctness.
fn bump_mtime(path: &Path) -> std::io::Result<()> {
    let file = fs::OpenOptions::new().write(true).open(path)?;
    file.set_modified(std::time::SystemTime::now())
}

impl DiskIndex {
    /// As [`CacheBackend::get`], but never consults `remotes` — used both
    /// as the first phase of that lookup and by [`crate::remote::LocalDirRemoteSource`]
    /// so a remote backed by a `DiskIndex` never recurses into its own
    /// remotes.
    pub(crate) fn get_local(&self, hash: &HashValue) -> Result<Option<Vec<u8>>, CacheError> {
        let canonical = hash.canonical_bytes();
        let versions = std::iter::once(SCHEMA_VERSION).chain(PREVIOUS_SCHEMA_VERSIONS.iter().copied());

        for version in versions {
            let digest = hash.digest_for_version(version);
            let leaf = self.leaf_dir(digest);
            if !leaf.join(HASH_FILE).exists() || !leaf.join(TIME_FILE).exists() {
                continue;
            }

            if !self.check_consistency(&leaf, &canonical)? {
                self.cleanup_corrupted(&leaf, digest);
                return Ok(None);
            }

            let data_dir = leaf.join(DATA_DIR);
            let bytes = match self.data_codec.load(&data_dir) {
                Ok(bytes) => bytes,
                Err(_) => {
                    self.cleanup_corrupted(&leaf, digest);
                    return Ok(None);
                }
            };
            self.touch_time(&leaf);

            if version != SCHEMA_VERSION {
                debug!(%digest, version, "rewriting stale-schema cache hit under the current key");
                let _ = self.write_leaf(hash.digest(), &canonical, &bytes);
            }

            debug!(digest = %hash.digest(), "disk cache hit");
            return Ok(Some(bytes));
        }

        Ok(None)
    }
}

impl CacheBackend for DiskIndex {
    fn get(&self, hash: &HashValue) -> Result<Option<Vec<u8>>, CacheError> {
        if let Some(bytes) = self.get_local(hash)? {
            return Ok(Some(bytes));
        }

        let canonical = hash.canonical_bytes();
        for remote in &self.remotes {
            if let Some(bytes) = remote.fetch(hash) {
                debug!(digest = %hash.digest(), "remote cache hit, populating local index");
                let _ = self.write_leaf(hash.digest(), &canonical, &bytes);
                return Ok(Some(bytes));
            }
        }

        Ok(None)
    }

    fn reserve_write_or_read(&self, digest: Digest) -> Result<Reservation, CacheError> {
        self.locker.reserve_write_or_read(digest)
    }

    fn finish_write(&self, hash: &HashValue, bytes: Vec<u8>) -> Result<(), CacheError> {
        let canonical = hash.canonical_bytes();
        let result = self.write_leaf(hash.digest(), &canonical, &bytes);
        if result.is_ok() {
            debug!(digest = %hash.digest(), "disk cache write");
        }
        self.locker.release(hash.digest());
        result
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
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let index = DiskIndex::open(dir.path()).unwrap();
        let h = hash(7);
        assert_eq!(
            index.reserve_write_or_read(h.digest()).unwrap(),
            Reservation::Writer
        );
        index.finish_write(&h, vec![1, 2, 3]).unwrap();
        assert_eq!(index.get(&h).unwrap(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn missing_entry_is_a_clean_miss() {
        let dir = tempfile::tempdir().unwrap();
        let index = DiskIndex::open(dir.path()).unwrap();
        assert_eq!(index.get(&hash(9)).unwrap(), None);
    }

    #[test]
    fn corrupted_hash_bin_is_reported_as_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let index = DiskIndex::open(dir.path()).unwrap();
        let h = hash(3);
        index.reserve_write_or_read(h.digest()).unwrap();
        index.finish_write(&h, vec![5]).unwrap();

        let leaf = index.leaf_dir(h.digest());
        fs::write(leaf.join(HASH_FILE), b"not gzip").unwrap();

        assert_eq!(index.get(&h).unwrap(), None);
        assert!(!leaf.exists());
    }

    #[test]
    fn a_digest_collision_with_a_different_structure_is_reported_as_corruption() {
        // Simulates two distinct HashValue trees that happened to land on
        // the same digest: write one structure's canonical bytes under a
        // leaf, then ask for a different structure that maps to the same
        // leaf directory. check_consistency must catch the mismatch rather
        // than trusting the digest alone.
        let dir = tempfile::tempdir().unwrap();
        let index = DiskIndex::open(dir.path()).unwrap();
        let h = hash(11);
        index.reserve_write_or_read(h.digest()).unwrap();
        index.finish_write(&h, vec![1]).unwrap();

        let leaf = index.leaf_dir(h.digest());
        let forged_canonical = HashValue::leaf(&[99]).canonical_bytes();
        let forged_hash_bin = DiskIndex::encode_hash_bin(&forged_canonical).unwrap();
        fs::write(leaf.join(HASH_FILE), forged_hash_bin).unwrap();

        assert_eq!(index.get(&h).unwrap(), None);
        assert!(!leaf.exists());
    }

    #[test]
    fn falls_back_to_an_older_schema_version_and_rewrites_under_the_current_key() {
        let dir = tempfile::tempdir().unwrap();
        let index = DiskIndex::open(dir.path()).unwrap();
        let h = hash(2);
        let canonical = h.canonical_bytes();
        let old_version = PREVIOUS_SCHEMA_VERSIONS[0];
        let old_digest = h.digest_for_version(old_version);
        index.write_leaf(old_digest, &canonical, &[42]).unwrap();

        assert_eq!(index.get(&h).unwrap(), Some(vec![42]));
        assert!(index.leaf_dir(h.digest()).join(HASH_FILE).exists());
    }

    #[test]
    fn a_remote_hit_is_copied_into_the_local_index() {
        use crate::remote::LocalDirRemoteSource;

        let remote_dir = tempfile::tempdir().unwrap();
        let remote_index = DiskIndex::open(remote_dir.path()).unwrap();
        let h = hash(6);
        remote_index.reserve_write_or_read(h.digest()).unwrap();
        remote_index.finish_write(&h, vec![9, 9, 9]).unwrap();

        let local_dir = tempfile::tempdir().unwrap();
        let remote = Arc::new(LocalDirRemoteSource::open(remote_dir.path()).unwrap());
        let local = DiskIndex::open(local_dir.path()).unwrap().with_remotes(vec![remote]);

        assert_eq!(local.get_local(&h).unwrap(), None);
        assert_eq!(local.get(&h).unwrap(), Some(vec![9, 9, 9]));
        // The remote hit must now be served locally without consulting the
        // remote again.
        assert_eq!(local.get_local(&h).unwrap(), Some(vec![9, 9, 9]));
    }

    #[test]
    fn a_remote_miss_falls_through_to_a_clean_miss() {
        use crate::remote::LocalDirRemoteSource;

        let remote_dir = tempfile::tempdir().unwrap();
        let remote = Arc::new(LocalDirRemoteSource::open(remote_dir.path()).unwrap());
        let local_dir = tempfile::tempdir().unwrap();
        let local = DiskIndex::open(local_dir.path()).unwrap().with_remotes(vec![remote]);

        assert_eq!(local.get(&hash(8)).unwrap(), None);
    }

    #[test]
    fn failed_writer_frees_the_key_for_a_retry() {
        let dir = tempfile::tempdir().unwrap();
        let index = DiskIndex::open(dir.path()).unwrap();
        let h = hash(4);
        assert_eq!(
            index.reserve_write_or_read(h.digest()).unwrap(),
            Reservation::Writer
        );
        index.fail_write(h.digest());
        assert_eq!(
            index.reserve_write_or_read(h.digest()).unwrap(),
            Reservation::Writer
        );
    }
}
