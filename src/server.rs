//! The SurfStore server: a shared block store + file info table behind a
//! single lock, exposed over HTTP as the six-method RPC surface from
//! `spec.md` §6.
//!
//! Concurrency model (`spec.md` §5): one `Mutex` guards both maps, held for
//! the full duration of each handler. That gives every pair of RPCs a total
//! order, which is what `updatefile`'s read-modify-write and
//! `getfileinfomap`'s snapshot semantics both need.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Path as AxumPath, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::block_store::BlockStore;
use crate::config::RPC_PATH_PREFIX;
use crate::file_info::{FileInfo, HashList};
use crate::{file_info::FileInfoTable, logging};

struct AppState {
    blocks: Mutex<BlockStore>,
    file_info: Mutex<FileInfoTable>,
}

/// A running server and the address it's actually bound to (which may
/// differ from the requested one if a fallback port was used).
#[derive(Debug, Clone, Copy)]
pub struct ServerHandle {
    pub bound_addr: SocketAddr,
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&format!("{RPC_PATH_PREFIX}/ping"), get(ping))
        .route(&format!("{RPC_PATH_PREFIX}/block/:hash"), get(get_block))
        .route(&format!("{RPC_PATH_PREFIX}/block"), post(put_block))
        .route(&format!("{RPC_PATH_PREFIX}/hasblocks"), post(has_blocks))
        .route(
            &format!("{RPC_PATH_PREFIX}/fileinfo"),
            get(get_file_info_map),
        )
        .route(
            &format!("{RPC_PATH_PREFIX}/fileinfo/:name"),
            post(update_file),
        )
        .with_state(state)
}

/// Bind `addr`, retrying a few times before falling back to an OS-assigned
/// port, and serve forever (until ctrl-c). Mirrors the bind-with-retry idiom
/// this server was grounded on.
pub async fn serve(addr: &str) -> anyhow::Result<()> {
    let state = Arc::new(AppState {
        blocks: Mutex::new(BlockStore::new()),
        file_info: Mutex::new(FileInfoTable::new()),
    });
    let app = router(state);

    const MAX_BIND_RETRIES: u32 = 5;
    const RETRY_DELAY_MS: u64 = 200;

    let requested: SocketAddr = tokio::net::lookup_host(addr)
        .await?
        .next()
        .ok_or_else(|| anyhow::anyhow!("could not resolve {addr}"))?;

    let mut last_err = None;
    let mut listener = None;
    for attempt in 1..=MAX_BIND_RETRIES {
        match tokio::net::TcpListener::bind(requested).await {
            Ok(l) => {
                listener = Some(l);
                break;
            }
            Err(e) => {
                last_err = Some(e);
                if attempt < MAX_BIND_RETRIES {
                    tokio::time::sleep(std::time::Duration::from_millis(RETRY_DELAY_MS)).await;
                }
            }
        }
    }
    let listener = match listener {
        Some(l) => l,
        None => {
            let fallback: SocketAddr = format!("{}:0", requested.ip()).parse()?;
            logging::info_kv(
                "requested port unavailable after retries, trying fallback",
                &[
                    ("requested_addr", &requested.to_string()),
                    ("error", &last_err.unwrap().to_string()),
                ],
            );
            tokio::net::TcpListener::bind(fallback).await?
        }
    };

    let bound = listener.local_addr()?;
    logging::info_kv("server bound", &[("addr", &bound.to_string())]);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Bind an ephemeral port, return the bound address and a future that runs
/// the server; used by integration tests that need the port up front.
pub async fn bind_ephemeral() -> anyhow::Result<(SocketAddr, impl std::future::Future<Output = ()>)>
{
    let state = Arc::new(AppState {
        blocks: Mutex::new(BlockStore::new()),
        file_info: Mutex::new(FileInfoTable::new()),
    });
    let app = router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let fut = async move {
        let _ = axum::serve(listener, app).await;
    };
    Ok((addr, fut))
}

async fn ping() -> Json<bool> {
    Json(true)
}

async fn get_block(
    State(state): State<Arc<AppState>>,
    AxumPath(hash): AxumPath<String>,
) -> impl IntoResponse {
    let blocks = state.blocks.lock().unwrap();
    match blocks.get_block(&hash) {
        Ok(bytes) => (StatusCode::OK, bytes.to_vec()).into_response(),
        Err(_) => (StatusCode::NOT_FOUND, format!("unknown block {hash}")).into_response(),
    }
}

async fn put_block(State(state): State<Arc<AppState>>, body: axum::body::Bytes) -> Json<bool> {
    let mut blocks = state.blocks.lock().unwrap();
    Json(blocks.put_block(body.to_vec()))
}

#[derive(Deserialize)]
struct HasBlocksRequest {
    hashes: Vec<String>,
}

#[derive(Serialize)]
struct HasBlocksResponse {
    present: Vec<String>,
}

async fn has_blocks(
    State(state): State<Arc<AppState>>,
    Json(req): Json<HasBlocksRequest>,
) -> Json<HasBlocksResponse> {
    let blocks = state.blocks.lock().unwrap();
    Json(HasBlocksResponse {
        present: blocks.has_blocks(&req.hashes),
    })
}

async fn get_file_info_map(
    State(state): State<Arc<AppState>>,
) -> Json<std::collections::HashMap<String, FileInfo>> {
    let table = state.file_info.lock().unwrap();
    Json(table.snapshot())
}

#[derive(Deserialize)]
struct UpdateFileRequest {
    version: u64,
    hashes: HashList,
}

#[derive(Serialize)]
struct UpdateFileResponse {
    accepted: bool,
}

async fn update_file(
    State(state): State<Arc<AppState>>,
    AxumPath(name): AxumPath<String>,
    Json(req): Json<UpdateFileRequest>,
) -> Json<UpdateFileResponse> {
    let mut table = state.file_info.lock().unwrap();
    let accepted = table.update_file(&name, req.version, req.hashes);
    Json(UpdateFileResponse { accepted })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_client(addr: SocketAddr) -> crate::rpc_client::RpcClient {
        crate::rpc_client::RpcClient::new(&format!("http://{addr}")).unwrap()
    }

    #[tokio::test]
    async fn ping_putblock_getblock_roundtrip() {
        let (addr, serve_fut) = bind_ephemeral().await.unwrap();
        tokio::spawn(serve_fut);
        let client = test_client(addr).await;

        assert!(client.ping().await.unwrap());

        let data = b"this is a data block\n".to_vec();
        assert!(client.put_block(data.clone()).await.unwrap());
        let hash = crate::block_store::hash_block(&data);
        let fetched = client.get_block(&hash).await.unwrap();
        assert_eq!(fetched, data);
    }

    #[tokio::test]
    async fn getblock_unknown_hash_is_error() {
        let (addr, serve_fut) = bind_ephemeral().await.unwrap();
        tokio::spawn(serve_fut);
        let client = test_client(addr).await;
        let err = client.get_block("deadbeef").await.unwrap_err();
        assert!(matches!(err, crate::error::SurfStoreError::UnknownBlock(_)));
    }

    #[tokio::test]
    async fn updatefile_and_getfileinfomap_agree() {
        let (addr, serve_fut) = bind_ephemeral().await.unwrap();
        tokio::spawn(serve_fut);
        let client = test_client(addr).await;

        let hl = HashList::Blocks(vec!["h1".to_string(), "h2".to_string()]);
        assert!(client
            .update_file("test.txt", 1, hl.clone())
            .await
            .unwrap());
        let map = client.get_file_info_map().await.unwrap();
        let info = &map["test.txt"];
        assert_eq!(info.version, 1);
        assert_eq!(info.hashes, hl);

        // Stale update is rejected without mutation.
        assert!(!client
            .update_file("test.txt", 1, HashList::Blocks(vec!["h3".to_string()]))
            .await
            .unwrap());
        let map = client.get_file_info_map().await.unwrap();
        assert_eq!(map["test.txt"].version, 1);
    }
}
