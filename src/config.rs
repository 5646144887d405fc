//! Process-wide defaults, overridable via `SURFSTORE_*` environment variables.
//!
//! SurfStore has no persisted JSON config file (unlike the daemon this crate
//! grew from): both binaries are driven entirely by CLI flags per
//! `spec.md` §6. This module only centralizes the handful of defaults that
//! would otherwise be magic numbers scattered across `main`s.

use std::path::PathBuf;

/// Default bind address for `surfstore-server` when `--addr` is omitted.
pub const DEFAULT_SERVER_ADDR: &str = "localhost:8080";

/// RPC path prefix mounted by the server and assumed by the client.
pub const RPC_PATH_PREFIX: &str = "/surfstore";

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Log file path for a given process role ("server" or "client"), honoring
/// `SURFSTORE_LOG_DIR` if set.
pub fn default_log_file_path(role: &str) -> PathBuf {
    let dir = std::env::var_os("SURFSTORE_LOG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| home_dir().join(".surfstore").join("logs"));
    dir.join(format!("{role}.log"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_log_file_path_honors_env_override() {
        std::env::set_var("SURFSTORE_LOG_DIR", "/tmp/surfstore-test-logs");
        let p = default_log_file_path("server");
        assert_eq!(p, PathBuf::from("/tmp/surfstore-test-logs/server.log"));
        std::env::remove_var("SURFSTORE_LOG_DIR");
    }
}
