use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("Malformed access token: {0}")]
    MalformedToken(String),

    #[error("Session public key must be {expected} hex chars (got {actual})")]
    InvalidSessionKey { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, CoreError>;
