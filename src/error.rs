//! Typed errors for the seams `spec.md` §7 calls out as needing
//! differentiated handling. Everything else stays `anyhow::Result` with
//! `.context(...)`, matching the rest of this crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SurfStoreError {
    /// `getblock` was asked for a hash the store has never seen. §7: implies
    /// a corrupted or adversarial server; the caller aborts reconciliation
    /// for that one file and continues with the rest.
    #[error("unknown block: {0}")]
    UnknownBlock(String),

    /// The RPC peer was unreachable, or returned a response this client
    /// can't make sense of. §7: abort the whole sync, leave the local index
    /// untouched on disk.
    #[error("transport error: {0}")]
    Transport(String),
}
