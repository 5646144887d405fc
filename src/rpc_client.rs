//! The client's RPC stub for the six SurfStore server methods
//! (`spec.md` §6). Grounded on the teacher's `ApiClient`: a single
//! `reqwest::Client` with sane timeouts, one method per endpoint, and a
//! status-to-error mapping at the boundary.

use std::time::Duration;

use reqwest::{Client as HttpClient, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::RPC_PATH_PREFIX;
use crate::error::SurfStoreError;
use crate::file_info::{FileInfo, HashList};

#[derive(Clone)]
pub struct RpcClient {
    base: String,
    http: HttpClient,
}

impl RpcClient {
    pub fn new(base: &str) -> anyhow::Result<Self> {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(5))
            .user_agent("surfstore-client/0.1")
            .build()?;
        Ok(Self {
            base: base.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub async fn ping(&self) -> Result<bool, SurfStoreError> {
        let url = format!("{}{RPC_PATH_PREFIX}/ping", self.base);
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| SurfStoreError::Transport(e.to_string()))?;
        json_ok(resp).await
    }

    pub async fn get_block(&self, hash: &str) -> Result<Vec<u8>, SurfStoreError> {
        let url = format!("{}{RPC_PATH_PREFIX}/block/{hash}", self.base);
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| SurfStoreError::Transport(e.to_string()))?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(SurfStoreError::UnknownBlock(hash.to_string()));
        }
        if !resp.status().is_success() {
            return Err(SurfStoreError::Transport(format!(
                "getblock failed: {}",
                resp.status()
            )));
        }
        resp.bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| SurfStoreError::Transport(e.to_string()))
    }

    pub async fn put_block(&self, bytes: Vec<u8>) -> Result<bool, SurfStoreError> {
        let url = format!("{}{RPC_PATH_PREFIX}/block", self.base);
        let resp = self
            .http
            .post(url)
            .body(bytes)
            .send()
            .await
            .map_err(|e| SurfStoreError::Transport(e.to_string()))?;
        json_ok(resp).await
    }

    pub async fn has_blocks(&self, hashes: &[String]) -> Result<Vec<String>, SurfStoreError> {
        #[derive(Serialize)]
        struct Req<'a> {
            hashes: &'a [String],
        }
        #[derive(Deserialize)]
        struct Resp {
            present: Vec<String>,
        }
        let url = format!("{}{RPC_PATH_PREFIX}/hasblocks", self.base);
        let resp = self
            .http
            .post(url)
            .json(&Req { hashes })
            .send()
            .await
            .map_err(|e| SurfStoreError::Transport(e.to_string()))?;
        let parsed: Resp = json_body(resp).await?;
        Ok(parsed.present)
    }

    pub async fn get_file_info_map(&self) -> Result<HashMap<String, FileInfo>, SurfStoreError> {
        let url = format!("{}{RPC_PATH_PREFIX}/fileinfo", self.base);
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| SurfStoreError::Transport(e.to_string()))?;
        json_body(resp).await
    }

    pub async fn update_file(
        &self,
        name: &str,
        version: u64,
        hashes: HashList,
    ) -> Result<bool, SurfStoreError> {
        #[derive(Serialize)]
        struct Req {
            version: u64,
            hashes: HashList,
        }
        #[derive(Deserialize)]
        struct Resp {
            accepted: bool,
        }
        let url = format!(
            "{}{RPC_PATH_PREFIX}/fileinfo/{}",
            self.base,
            urlencode_path_segment(name)
        );
        let resp = self
            .http
            .post(url)
            .json(&Req { version, hashes })
            .send()
            .await
            .map_err(|e| SurfStoreError::Transport(e.to_string()))?;
        let parsed: Resp = json_body(resp).await?;
        Ok(parsed.accepted)
    }
}

async fn json_ok(resp: reqwest::Response) -> Result<bool, SurfStoreError> {
    json_body(resp).await
}

async fn json_body<T: for<'de> Deserialize<'de>>(
    resp: reqwest::Response,
) -> Result<T, SurfStoreError> {
    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        return Err(SurfStoreError::Transport(format!("{status} {text}")));
    }
    resp.json::<T>()
        .await
        .map_err(|e| SurfStoreError::Transport(e.to_string()))
}

/// File names are assumed to contain no whitespace (`spec.md` §4.4), but
/// they may contain characters that need escaping in a URL path segment
/// (e.g. spaces from a user's environment, `/`-free by construction of the
/// scan). A minimal percent-encoder avoids pulling in a URL-encoding crate
/// the teacher doesn't carry for this purpose.
fn urlencode_path_segment(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urlencode_path_segment_escapes_special_chars() {
        assert_eq!(urlencode_path_segment("file1.txt"), "file1.txt");
        assert_eq!(urlencode_path_segment("a b.txt"), "a%20b.txt");
    }
}
