mod entries;
mod store;
mod memory;

pub use entries::{CacheEntry, CacheMap};
pub use store::FileTokenCache;
pub use memory::MemoryTokenCache;

use prover_core::{AccessToken, Identity};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to persist cache file: {0}")]
    PersistError(String),
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// Expiry-aware store of access tokens, one entry per identity.
///
/// A single instance is shared by every identity in the process; entries
/// for different identities must never clobber each other.
pub trait TokenCache: Send + Sync {
    /// Return the identity's token if present and still valid.
    ///
    /// An expired or unreadable entry is evicted before returning `None`.
    fn lookup(&self, identity: &Identity) -> Result<Option<AccessToken>>;

    /// Insert or overwrite the identity's token
    fn store(&self, identity: &Identity, token: &AccessToken) -> Result<()>;

    /// Drop every expired entry, returning how many were removed
    fn sweep_expired(&self) -> Result<usize>;
}
