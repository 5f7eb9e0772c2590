use prover_client::{AuthError, ClientError, TransportError};
use prover_persistence::CacheError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid config file: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid account on line {line}: {reason}")]
    InvalidAccount { line: usize, reason: String },

    #[error("No accounts configured")]
    NoAccounts,

    #[error("Invalid node key: {0}")]
    NodeKey(String),

    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Token cache error: {0}")]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("Transport setup failed: {0}")]
    Transport(#[from] TransportError),

    #[error("Artifact computation failed: {0}")]
    Compute(String),
}

pub type Result<T> = std::result::Result<T, WorkerError>;
