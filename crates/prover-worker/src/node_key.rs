use crate::{Result, WorkerError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ed25519_dalek::{Signer, SigningKey, SECRET_KEY_LENGTH};
use prover_core::NodeType;
use prover_protocol::SubmitProofRequest;
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;

/// Node signing key announced with task requests and submissions
#[derive(Clone)]
pub struct NodeKey {
    signing_key: SigningKey,
}

impl NodeKey {
    pub fn generate() -> Self {
        let mut secret = [0u8; SECRET_KEY_LENGTH];
        OsRng.fill_bytes(&mut secret);
        NodeKey {
            signing_key: SigningKey::from_bytes(&secret),
        }
    }

    /// Load from a base64 secret. A 64-byte keypair encoding is accepted as
    /// well; only its first half (the secret) is used.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| WorkerError::NodeKey(e.to_string()))?;

        if bytes.len() != SECRET_KEY_LENGTH && bytes.len() != 2 * SECRET_KEY_LENGTH {
            return Err(WorkerError::NodeKey(format!(
                "expected {} or {} bytes, got {}",
                SECRET_KEY_LENGTH,
                2 * SECRET_KEY_LENGTH,
                bytes.len()
            )));
        }

        let mut secret = [0u8; SECRET_KEY_LENGTH];
        secret.copy_from_slice(&bytes[..SECRET_KEY_LENGTH]);
        Ok(NodeKey {
            signing_key: SigningKey::from_bytes(&secret),
        })
    }

    /// Configured key if present, otherwise a fresh one
    pub fn from_config(encoded: Option<&str>) -> Result<Self> {
        match encoded {
            Some(encoded) => Self::from_base64(encoded),
            None => Ok(Self::generate()),
        }
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    pub fn public_key_base64(&self) -> String {
        STANDARD.encode(self.public_key())
    }

    /// Detached signature over `"{node_type} | {task_id} | {hash}"`
    pub fn sign_submission(&self, node_type: NodeType, task_id: &str, hash: &str) -> [u8; 64] {
        let statement = SubmitProofRequest::signing_message(node_type, task_id, hash);
        self.signing_key.sign(statement.as_bytes()).to_bytes()
    }
}

impl fmt::Debug for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeKey")
            .field("public_key", &self.public_key_base64())
            .finish_non_exhaustive()
    }
}
