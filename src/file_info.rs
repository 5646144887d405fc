//! The server's file info service (`spec.md` §4.2): a versioned map from
//! file name to `(version, hashList)`, with the strict acceptance rule that
//! defines the consistency model.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A file's content fingerprint, or the tombstone sentinel.
///
/// The wire form of `Tombstone` is the single-element list `["0"]` — an
/// element whose *value* is the integer 0, distinguishable from any 64-char
/// hex hash and from an empty hash list (which represents a zero-byte file).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashList {
    Blocks(Vec<String>),
    Tombstone,
}

impl HashList {
    pub fn as_blocks(&self) -> &[String] {
        match self {
            HashList::Blocks(v) => v,
            HashList::Tombstone => &[],
        }
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self, HashList::Tombstone)
    }
}

impl Serialize for HashList {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            HashList::Blocks(v) => v.serialize(serializer),
            HashList::Tombstone => ["0"].serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for HashList {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Vec::<String>::deserialize(deserializer)?;
        Ok(if raw.len() == 1 && raw[0] == "0" {
            HashList::Tombstone
        } else {
            HashList::Blocks(raw)
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    pub version: u64,
    pub hashes: HashList,
}

/// The server's versioned file metadata map and its one acceptance rule.
#[derive(Debug, Default)]
pub struct FileInfoTable {
    files: HashMap<String, FileInfo>,
}

impl FileInfoTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A full, consistent snapshot of the map (`spec.md` §4.2: no pagination).
    pub fn snapshot(&self) -> HashMap<String, FileInfo> {
        self.files.clone()
    }

    pub fn get(&self, name: &str) -> Option<&FileInfo> {
        self.files.get(name)
    }

    fn current_version(&self, name: &str) -> u64 {
        self.files.get(name).map(|f| f.version).unwrap_or(0)
    }

    /// Accept iff `version == cur_version + 1`. On acceptance, stores the
    /// new `FileInfo` and returns `true`; otherwise leaves the map untouched
    /// and returns `false`. This single rule rejects both stale
    /// (`version <= cur`) and future (`version > cur + 1`) updates — no
    /// version gaps are ever accepted.
    pub fn update_file(&mut self, name: &str, version: u64, hashes: HashList) -> bool {
        let cur = self.current_version(name);
        if version != cur + 1 {
            return false;
        }
        self.files
            .insert(name.to_string(), FileInfo { version, hashes });
        true
    }
}
