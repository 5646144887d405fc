//! The server's content-addressed block store (`spec.md` §4.1).
//!
//! Blocks are immutable once written and keyed by the lowercase hex SHA-256
//! of their bytes; `putblock` is therefore naturally idempotent.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::error::SurfStoreError;

/// Compute the lowercase hex SHA-256 of `bytes`, the block identifier used
/// throughout the protocol.
pub fn hash_block(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

#[derive(Debug, Default)]
pub struct BlockStore {
    blocks: HashMap<String, Vec<u8>>,
}

impl BlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `bytes` under its SHA-256 hash. Overwriting an existing entry
    /// with identical bytes is a no-op; always returns `true`.
    pub fn put_block(&mut self, bytes: Vec<u8>) -> bool {
        let hash = hash_block(&bytes);
        self.blocks.entry(hash).or_insert(bytes);
        true
    }

    /// Return the bytes stored under `hash`, or `UnknownBlock` if absent.
    pub fn get_block(&self, hash: &str) -> Result<&[u8], SurfStoreError> {
        self.blocks
            .get(hash)
            .map(Vec::as_slice)
            .ok_or_else(|| SurfStoreError::UnknownBlock(hash.to_string()))
    }

    /// Return the subset of `hashes` currently present, preserving order and
    /// duplicates.
    pub fn has_blocks(&self, hashes: &[String]) -> Vec<String> {
        hashes
            .iter()
            .filter(|h| self.blocks.contains_key(h.as_str()))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_block_matches_known_sha256() {
        // sha256("") = e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855
        assert_eq!(
            hash_block(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn hash_is_position_independent() {
        let data = b"this is a data block\n".to_vec();
        let h1 = hash_block(&data);
        let mut store = BlockStore::new();
        store.put_block(data.clone());
        assert_eq!(store.get_block(&h1).unwrap(), data.as_slice());
    }

    #[test]
    fn put_block_is_idempotent() {
        let mut store = BlockStore::new();
        let data = b"hello".to_vec();
        assert!(store.put_block(data.clone()));
        assert!(store.put_block(data));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn get_block_unknown_hash_errors() {
        let store = BlockStore::new();
        let err = store.get_block("deadbeef").unwrap_err();
        assert!(matches!(err, SurfStoreError::UnknownBlock(h) if h == "deadbeef"));
    }

    #[test]
    fn has_blocks_is_ordered_subset_law() {
        let mut store = BlockStore::new();
        let data1 = b"this is a data block\n".to_vec();
        let h1 = hash_block(&data1);
        store.put_block(data1);

        let data2 = b"this is another data block\n".to_vec();
        let h2 = hash_block(&data2);

        let present = store.has_blocks(&[h1.clone(), h2.clone()]);
        assert_eq!(present, vec![h1.clone()]);

        // Duplicates and order are preserved.
        let present = store.has_blocks(&[h2, h1.clone(), h1.clone()]);
        assert_eq!(present, vec![h1.clone(), h1]);
    }
}
