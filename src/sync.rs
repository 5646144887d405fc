//! The client's sync engine (`spec.md` §4.5): one synchronization round,
//! phased as pull-then-push over the local index and the scanned base
//! directory.
//!
//! Grounded directly on `original_source/src/client.py`'s `synchronize` /
//! `mergeCloudToLocal` / `mergeLocalToCloud` / `upload` / `download`, ported
//! from its in-process `localIndex` dict to an async RPC client.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};

use crate::chunker;
use crate::file_info::HashList;
use crate::index::{self, IndexEntry};
use crate::logging;
use crate::rpc_client::RpcClient;

/// Run one synchronization round against `client` over `basedir`, chunking
/// files in `block_size`-byte blocks.
///
/// P0: load the local index and the remote file info map.
/// P1: pull every file the remote has at a newer version than we've seen.
/// P2: scan the base directory and push every local change (including
///     deletions).
/// P3: persist the updated local index.
pub async fn sync_once(client: &RpcClient, basedir: &Path, block_size: usize) -> Result<()> {
    let mut local_index = index::parse_index_file(basedir)?;
    let remote_index = client
        .get_file_info_map()
        .await
        .context("getfileinfomap")?;

    merge_cloud_to_local(client, &mut local_index, &remote_index, basedir).await?;
    merge_local_to_cloud(client, &mut local_index, basedir, block_size, &remote_index).await?;

    index::write_index_file(basedir, &local_index)?;
    Ok(())
}

/// Reconstitute `fname` in `basedir` from `hashes`, or remove it if `hashes`
/// is the tombstone sentinel. A file already absent is not an error — it may
/// have been created and deleted remotely between two of our sync rounds.
async fn download(
    client: &RpcClient,
    basedir: &Path,
    fname: &str,
    hashes: &HashList,
) -> Result<()> {
    let path = basedir.join(fname);
    if hashes.is_tombstone() {
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("remove {}", path.display()))?;
        }
        return Ok(());
    }

    let mut contents = Vec::new();
    for h in hashes.as_blocks() {
        let block = client.get_block(h).await.context("getblock")?;
        contents.extend_from_slice(&block);
    }
    std::fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

async fn merge_cloud_to_local(
    client: &RpcClient,
    local_index: &mut HashMap<String, IndexEntry>,
    remote_index: &HashMap<String, crate::file_info::FileInfo>,
    basedir: &Path,
) -> Result<()> {
    for (fname, info) in remote_index {
        let (local_version, _) = local_index
            .get(fname)
            .cloned()
            .unwrap_or((0, HashList::Blocks(vec![])));
        if info.version > local_version {
            if let Err(e) = download(client, basedir, fname, &info.hashes).await {
                logging::warn(format!(
                    "failed to reconcile {fname} from remote, skipping this file: {e:#}"
                ));
                continue;
            }
            local_index.insert(fname.clone(), (info.version, info.hashes.clone()));
        }
    }
    Ok(())
}

/// Upload `fname` at `version` with `hashes`: push any blocks the server
/// doesn't already have, then attempt `updatefile`.
///
/// If accepted, the local index records the new version. If rejected (a
/// concurrent writer won the race), this client lost: pull whatever the
/// server now has instead of retrying, leaving the retry to the next sync
/// round (`spec.md` §7: "losers retry next round").
async fn upload(
    client: &RpcClient,
    fname: &str,
    version: u64,
    hashes: HashList,
    blocks: &HashMap<String, Vec<u8>>,
    local_index: &mut HashMap<String, IndexEntry>,
    basedir: &Path,
) -> Result<()> {
    if !hashes.is_tombstone() {
        let wanted = hashes.as_blocks().to_vec();
        let present = client.has_blocks(&wanted).await.context("hasblocks")?;
        let present: std::collections::HashSet<_> = present.into_iter().collect();
        for h in &wanted {
            if !present.contains(h) {
                let bytes = blocks
                    .get(h)
                    .cloned()
                    .with_context(|| format!("missing block data for {h}"))?;
                client.put_block(bytes).await.context("putblock")?;
            }
        }
    }

    let accepted = client
        .update_file(fname, version, hashes.clone())
        .await
        .context("updatefile")?;
    if accepted {
        local_index.insert(fname.to_string(), (version, hashes));
    } else {
        logging::info_kv(
            "updatefile rejected, pulling winning version",
            &[("file", fname)],
        );
        let refreshed = client.get_file_info_map().await.context("getfileinfomap")?;
        if let Some(info) = refreshed.get(fname) {
            download(client, basedir, fname, &info.hashes).await?;
            local_index.insert(fname.to_string(), (info.version, info.hashes.clone()));
        }
    }
    Ok(())
}

async fn merge_local_to_cloud(
    client: &RpcClient,
    local_index: &mut HashMap<String, IndexEntry>,
    basedir: &Path,
    block_size: usize,
    remote_index: &HashMap<String, crate::file_info::FileInfo>,
) -> Result<()> {
    let scan = chunker::scan_dir(basedir, block_size)?;

    // Modified or newly created files.
    for (fname, hashes) in &scan.file_hashes {
        let (local_version, local_hashes) = local_index
            .get(fname)
            .cloned()
            .unwrap_or((0, HashList::Blocks(vec![])));
        if hashes != &local_hashes {
            if let Err(e) = upload(
                client,
                fname,
                local_version + 1,
                hashes.clone(),
                &scan.blocks,
                local_index,
                basedir,
            )
            .await
            {
                logging::warn(format!(
                    "failed to upload {fname}, skipping this file: {e:#}"
                ));
                continue;
            }
        }
    }

    // Files present in the local index but no longer on disk: deleted since
    // the last sync. Skip files the remote already has tombstoned.
    let deleted: Vec<String> = local_index
        .keys()
        .filter(|f| !scan.file_hashes.contains_key(*f))
        .cloned()
        .collect();
    for fname in deleted {
        if let Some(info) = remote_index.get(&fname) {
            if info.hashes.is_tombstone() {
                continue;
            }
        }
        let (local_version, _) = local_index[&fname].clone();
        if let Err(e) = upload(
            client,
            &fname,
            local_version + 1,
            HashList::Tombstone,
            &scan.blocks,
            local_index,
            basedir,
        )
        .await
        {
            logging::warn(format!(
                "failed to upload tombstone for {fname}, skipping this file: {e:#}"
            ));
            continue;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn make_temp_dir(prefix: &str) -> std::path::PathBuf {
        let mut root = std::env::temp_dir();
        let nanos = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        root.push(format!("{prefix}-{nanos}"));
        std::fs::create_dir_all(&root).unwrap();
        root
    }

    async fn server() -> (std::net::SocketAddr, RpcClient) {
        let (addr, fut) = crate::server::bind_ephemeral().await.unwrap();
        tokio::spawn(fut);
        let client = RpcClient::new(&format!("http://{addr}")).unwrap();
        (addr, client)
    }

    #[tokio::test]
    async fn upload_then_download_round_trips_a_file() {
        let (_, client) = server().await;
        let a = make_temp_dir("surfstore-sync-a");
        let b = make_temp_dir("surfstore-sync-b");

        std::fs::write(a.join("hello.txt"), b"hello, surfstore").unwrap();
        sync_once(&client, &a, 1024).await.unwrap();
        sync_once(&client, &b, 1024).await.unwrap();

        let got = std::fs::read(b.join("hello.txt")).unwrap();
        assert_eq!(got, b"hello, surfstore");
    }

    #[tokio::test]
    async fn deletion_propagates_as_tombstone() {
        let (_, client) = server().await;
        let a = make_temp_dir("surfstore-sync-del-a");
        let b = make_temp_dir("surfstore-sync-del-b");

        std::fs::write(a.join("f.txt"), b"content").unwrap();
        sync_once(&client, &a, 1024).await.unwrap();
        sync_once(&client, &b, 1024).await.unwrap();
        assert!(b.join("f.txt").exists());

        std::fs::remove_file(a.join("f.txt")).unwrap();
        sync_once(&client, &a, 1024).await.unwrap();
        sync_once(&client, &b, 1024).await.unwrap();
        assert!(!b.join("f.txt").exists());
    }

    #[tokio::test]
    async fn unknown_block_on_one_file_does_not_block_others() {
        let (_, client) = server().await;
        let b = make_temp_dir("surfstore-sync-unknown-block");

        // Seed the remote with two pending downloads directly through the
        // RPC surface: one file whose hash list names a block the store
        // never received (a corrupted/adversarial server per `spec.md` §7),
        // and one healthy file whose block was actually uploaded.
        let good_bytes = b"this file is fine".to_vec();
        let good_hash = crate::block_store::hash_block(&good_bytes);
        assert!(client.put_block(good_bytes.clone()).await.unwrap());
        assert!(client
            .update_file(
                "good.txt",
                1,
                HashList::Blocks(vec![good_hash]),
            )
            .await
            .unwrap());

        let missing_hash = "0".repeat(64);
        assert!(client
            .update_file(
                "bad.txt",
                1,
                HashList::Blocks(vec![missing_hash]),
            )
            .await
            .unwrap());

        // The whole sync must not abort because one file's block is unknown.
        sync_once(&client, &b, 1024).await.unwrap();

        // The healthy file still reconciled...
        let got = std::fs::read(b.join("good.txt")).unwrap();
        assert_eq!(got, good_bytes);
        let local_index = index::parse_index_file(&b).unwrap();
        assert_eq!(local_index["good.txt"].0, 1);

        // ...while the corrupted one was skipped: no file materialized, and
        // its index entry was never advanced past "not yet observed", so the
        // next sync will retry it.
        assert!(!b.join("bad.txt").exists());
        assert!(!local_index.contains_key("bad.txt"));
    }

    #[tokio::test]
    async fn second_writer_loses_and_pulls_winner() {
        let (_, client) = server().await;
        let a = make_temp_dir("surfstore-sync-conflict-a");
        let b = make_temp_dir("surfstore-sync-conflict-b");

        std::fs::write(a.join("f.txt"), b"base").unwrap();
        sync_once(&client, &a, 1024).await.unwrap();
        sync_once(&client, &b, 1024).await.unwrap();

        std::fs::write(a.join("f.txt"), b"from a").unwrap();
        std::fs::write(b.join("f.txt"), b"from b").unwrap();

        sync_once(&client, &a, 1024).await.unwrap();
        sync_once(&client, &b, 1024).await.unwrap();

        // b lost the race, so b's file now matches a's winning content.
        let content_b = std::fs::read(b.join("f.txt")).unwrap();
        assert_eq!(content_b, b"from a");
    }
}
