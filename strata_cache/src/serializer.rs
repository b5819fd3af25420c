// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::CacheError;

/// One encoding strategy in a [`SerializerChain`].
///
/// `save` is tried against the value to encode until one strategy accepts
/// it; `load` is tried against a leaf's `data/` directory until one
/// strategy recognizes what's there. Both directions are first-success-
/// wins, which lets a chain grow a new, more specific strategy (e.g. a
/// columnar array format) ahead of a catch-all without disturbing entries
/// already written by the catch-all.
pub trait Serializer<T> {
    /// Attempts to write `value` into `folder` (already created, empty),
    /// returning the encoded size in bytes, or `None` if this strategy
    /// does not apply.
    fn save(&self, value: &T, folder: &Path) -> Option<u64>;

    /// Attempts to read a value out of `folder`, returning `None` if this
    /// strategy does not recognize what's there.
    fn load(&self, folder: &Path) -> Option<T>;
}

const JSON_FILE: &str = "value.json";

/// Encodes any `serde`-serializable value as JSON under `folder`. Always
/// accepts on save; on load, accepts only a folder holding a parseable
/// [`JSON_FILE`].
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSerializer;

impl<T: Serialize + DeserializeOwned> Serializer<T> for JsonSerializer {
    fn save(&self, value: &T, folder: &Path) -> Option<u64> {
        let bytes = serde_json::to_vec(value).ok()?;
        let len = bytes.len() as u64;
        fs::write(folder.join(JSON_FILE), bytes).ok()?;
        Some(len)
    }

    fn load(&self, folder: &Path) -> Option<T> {
        let bytes = fs::read(folder.join(JSON_FILE)).ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}

const BLOB_FILE: &str = "blob";

/// Writes raw bytes through unchanged under `folder`. Only applicable when
/// `T = Vec<u8>`; this is the default (and usually only) strategy a
/// [`crate::disk::DiskIndex`] needs, since its payload already arrives
/// pre-encoded by the engine's own value codec.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytesSerializer;

impl Serializer<Vec<u8>> for BytesSerializer {
    fn save(&self, value: &Vec<u8>, folder: &Path) -> Option<u64> {
        fs::write(folder.join(BLOB_FILE), value).ok()?;
        Some(value.len() as u64)
    }

    fn load(&self, folder: &Path) -> Option<Vec<u8>> {
        fs::read(folder.join(BLOB_FILE)).ok()
    }
}

/// An ordered list of [`Serializer`] strategies, tried in order on both
/// save and load until one succeeds.
pub struct SerializerChain<T> {
    strategies: Vec<Box<dyn Serializer<T> + Send + Sync>>,
}

impl<T> Default for SerializerChain<T> {
    fn default() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }
}

impl<T> SerializerChain<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a strategy to the end of the chain (lowest priority).
    pub fn push(mut self, strategy: impl Serializer<T> + Send + Sync + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub fn save(&self, value: &T, folder: &Path) -> Result<u64, CacheError> {
        self.strategies
            .iter()
            .find_map(|s| s.save(value, folder))
            .ok_or(CacheError::NoSerializer)
    }

    pub fn load(&self, folder: &Path) -> Result<T, CacheError> {
        self.strategies
            .iter()
            .find_map(|s| s.load(folder))
            .ok_or(CacheError::NoSerializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[test]
    fn json_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let chain = SerializerChain::<Point>::new().push(JsonSerializer);
        let p = Point { x: 1, y: 2 };
        chain.save(&p, dir.path()).unwrap();
        assert_eq!(chain.load(dir.path()).unwrap(), p);
    }

    #[test]
    fn bytes_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let chain = SerializerChain::<Vec<u8>>::new().push(BytesSerializer);
        let original = vec![1u8, 2, 3];
        chain.save(&original, dir.path()).unwrap();
        assert_eq!(chain.load(dir.path()).unwrap(), original);
    }

    #[test]
    fn first_strategy_to_accept_wins() {
        let dir = tempfile::tempdir().unwrap();
        let chain = SerializerChain::<Vec<u8>>::new()
            .push(BytesSerializer)
            .push(BytesSerializer);
        chain.save(&vec![4, 5, 6], dir.path()).unwrap();
        assert!(dir.path().join(BLOB_FILE).exists());
    }
}
