//! The client's local index (`spec.md` §4.4): a persisted record of the last
//! version and hash list this client observed for each file, stored as
//! `index.txt` in the base directory.
//!
//! Format: one line per file, whitespace-separated —
//! `<name> <version> <hash>...` — with an empty hash list meaning a
//! zero-byte file and a single `0` hash meaning a tombstone.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};

use crate::chunker::INDEX_FILE_NAME;
use crate::file_info::HashList;

/// `(version, hashList)` for one file, the local index's unit of record.
pub type IndexEntry = (u64, HashList);

/// Parse `basedir/index.txt`. A missing file is treated as an empty index,
/// matching a client's first-ever sync.
pub fn parse_index_file(basedir: &Path) -> Result<HashMap<String, IndexEntry>> {
    let path = basedir.join(INDEX_FILE_NAME);
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("read {}", path.display()))?;

    let mut index = HashMap::new();
    for line in contents.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 2 {
            crate::logging::warn(format!("malformed index.txt line: {line:?}"));
            continue;
        }
        let fname = parts[0].to_string();
        let version: u64 = match parts[1].parse() {
            Ok(v) => v,
            Err(_) => {
                crate::logging::warn(format!("malformed index.txt line: {line:?}"));
                continue;
            }
        };
        let hash_parts = &parts[2..];
        let hashes = if hash_parts == ["0"] {
            HashList::Tombstone
        } else {
            HashList::Blocks(hash_parts.iter().map(|s| s.to_string()).collect())
        };
        index.insert(fname, (version, hashes));
    }
    Ok(index)
}

/// Write `index` back to `basedir/index.txt`, atomically (write to a
/// sibling temp file, then rename over the target) so a crash mid-write
/// never leaves a half-written index behind.
pub fn write_index_file(basedir: &Path, index: &HashMap<String, IndexEntry>) -> Result<()> {
    let mut body = String::new();
    for (fname, (version, hashes)) in index {
        body.push_str(fname);
        body.push(' ');
        body.push_str(&version.to_string());
        match hashes {
            HashList::Tombstone => {
                body.push_str(" 0");
            }
            HashList::Blocks(hs) => {
                for h in hs {
                    body.push(' ');
                    body.push_str(h);
                }
            }
        }
        body.push('\n');
    }

    let tmp_path = basedir.join(format!("{INDEX_FILE_NAME}.tmp"));
    std::fs::write(&tmp_path, body)
        .with_context(|| format!("write {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, basedir.join(INDEX_FILE_NAME))
        .with_context(|| format!("rename into {}", basedir.display()))?;
    Ok(())
}
