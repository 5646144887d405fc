//! Fixed-size chunking and the base-directory scan (`spec.md` §4.3).

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{ensure, Context, Result};

use crate::block_store::hash_block;
use crate::file_info::HashList;

pub const INDEX_FILE_NAME: &str = "index.txt";

/// Read `path` in fixed `block_size`-byte chunks, hashing each with SHA-256.
/// The final chunk may be shorter than `block_size`; an empty file yields an
/// empty hash list.
pub fn chunk_file(path: &Path, block_size: usize) -> Result<(Vec<String>, HashMap<String, Vec<u8>>)> {
    ensure!(block_size > 0, "block size must be > 0");
    let mut file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut hashes = Vec::new();
    let mut blocks = HashMap::new();
    let mut buf = vec![0u8; block_size];

    loop {
        let n = read_full(&mut file, &mut buf)?;
        if n == 0 {
            break;
        }
        let chunk = buf[..n].to_vec();
        let hash = hash_block(&chunk);
        blocks.insert(hash.clone(), chunk);
        hashes.push(hash);
    }

    Ok((hashes, blocks))
}

/// Fill `buf` from `file`, reading repeatedly until `buf` is full or EOF.
/// `File::read` isn't guaranteed to fill the buffer in one call.
fn read_full(file: &mut File, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// The result of scanning a base directory: each regular file's hash list
/// under `block_size`, plus every block discovered (so the caller can
/// satisfy subsequent `putblock` calls without re-reading disk).
pub struct ScanResult {
    pub file_hashes: HashMap<String, HashList>,
    pub blocks: HashMap<String, Vec<u8>>,
}

/// Scan `base_dir`'s direct children. Subdirectories are skipped with a
/// warning; `index.txt` is never treated as data; every other regular file
/// is chunked.
pub fn scan_dir(base_dir: &Path, block_size: usize) -> Result<ScanResult> {
    let mut file_hashes = HashMap::new();
    let mut blocks = HashMap::new();

    let entries = std::fs::read_dir(base_dir)
        .with_context(|| format!("read_dir {}", base_dir.display()))?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            crate::logging::warn(format!("found dir in base dir, skipping: {}", path.display()));
            continue;
        }

        let Some(fname) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if fname == INDEX_FILE_NAME {
            continue;
        }

        let (hashes, file_blocks) = chunk_file(&path, block_size)
            .with_context(|| format!("chunk {}", path.display()))?;
        blocks.extend(file_blocks);
        file_hashes.insert(fname.to_string(), HashList::Blocks(hashes));
    }

    Ok(ScanResult {
        file_hashes,
        blocks,
    })
}
