// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use serde::{Deserialize, Serialize};

/// On-disk configuration for a [`super::DiskIndex`], read from `config.yml`
/// at the index root.
///
/// `hash` is informational only — this workspace always hashes with
/// blake3 via [`strata_hash`] — but is kept in the schema so a
/// `config.yml` produced by an embedder that cares about documenting its
/// hashing choice round-trips unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskIndexConfig {
    #[serde(default)]
    pub hash: HashConfig,

    /// Cumulative hex-character prefix lengths used to split the digest
    /// into nested directories. `[2, 4]` means the first directory is the
    /// first two hex characters, the second directory the next two, and
    /// the leaf directory is named after the full hex digest.
    #[serde(default = "default_levels")]
    pub levels: Vec<usize>,

    #[serde(default)]
    pub locker: LockerConfig,
}

impl Default for DiskIndexConfig {
    fn default() -> Self {
        Self {
            hash: HashConfig::default(),
            levels: default_levels(),
            locker: LockerConfig::default(),
        }
    }
}

fn default_levels() -> Vec<usize> {
    vec![2, 4]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashConfig {
    #[serde(default = "default_hash_name")]
    pub name: String,
    #[serde(default)]
    pub kwargs: serde_yaml::Mapping,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            name: default_hash_name(),
            kwargs: serde_yaml::Mapping::new(),
        }
    }
}

fn default_hash_name() -> String {
    "blake3".to_owned()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockerConfig {
    #[serde(default = "default_wait_ceiling_secs")]
    pub wait_ceiling_secs: u64,
}

impl Default for LockerConfig {
    fn default() -> Self {
        Self {
            wait_ceiling_secs: default_wait_ceiling_secs(),
        }
    }
}

fn default_wait_ceiling_secs() -> u64 {
    600
}
