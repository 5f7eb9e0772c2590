use crate::{CoreError, Result, CACHE_KEY_PREFIX_LEN};
use alloy_signer_local::PrivateKeySigner;
use k256::ecdsa::SigningKey;
use k256::elliptic_curve::rand_core::OsRng;
use std::fmt;

/// Hex length of a compressed SEC1 session public key without `0x`
pub const SESSION_PUBLIC_KEY_HEX_LEN: usize = 66;

/// A worker's stable identifier plus its long-term signing credential
#[derive(Clone)]
pub struct Identity {
    worker_id: String,
    credential_text: String,
    signer: PrivateKeySigner,
}

impl Identity {
    /// Build an identity from a worker id and a hex-encoded secp256k1 key
    pub fn new(worker_id: impl Into<String>, credential: impl Into<String>) -> Result<Self> {
        let worker_id = worker_id.into().trim().to_string();
        let credential_text = credential.into().trim().to_string();

        if worker_id.is_empty() {
            return Err(CoreError::InvalidIdentity("worker id is empty".to_string()));
        }

        let hex_part = credential_text
            .strip_prefix("0x")
            .unwrap_or(&credential_text);
        let key_bytes = hex::decode(hex_part)
            .map_err(|e| CoreError::InvalidCredential(format!("not hex: {}", e)))?;
        let signer = PrivateKeySigner::from_slice(&key_bytes)
            .map_err(|e| CoreError::InvalidCredential(e.to_string()))?;

        Ok(Identity {
            worker_id,
            credential_text,
            signer,
        })
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Signing half of the credential. It signs and is never serialized.
    pub fn signer(&self) -> &PrivateKeySigner {
        &self.signer
    }

    /// EIP-55 checksummed account address derived from the credential
    pub fn address(&self) -> String {
        self.signer.address().to_checksum(None)
    }

    /// Leading credential characters used to key the token cache
    pub fn cache_prefix(&self) -> &str {
        let end = self
            .credential_text
            .char_indices()
            .nth(CACHE_KEY_PREFIX_LEN)
            .map(|(i, _)| i)
            .unwrap_or(self.credential_text.len());
        &self.credential_text[..end]
    }

    /// Deterministic token cache key for this identity
    pub fn cache_key(&self) -> String {
        format!("{}_{}", self.worker_id, self.cache_prefix())
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("worker_id", &self.worker_id)
            .field("address", &self.address())
            .field("credential", &"<redacted>")
            .finish()
    }
}

/// Ephemeral keypair used to correlate one handshake
pub struct Session {
    public_key: String,
    private_key: SigningKey,
}

impl Session {
    /// Generate a fresh session keypair from the OS RNG
    pub fn generate() -> Result<Self> {
        Self::from_signing_key(SigningKey::random(&mut OsRng))
    }

    /// Wrap an existing key, enforcing the fixed-width public key encoding
    pub fn from_signing_key(private_key: SigningKey) -> Result<Self> {
        let encoded = private_key.verifying_key().to_encoded_point(true);
        let public_key = hex::encode(encoded.as_bytes());

        if public_key.len() != SESSION_PUBLIC_KEY_HEX_LEN {
            return Err(CoreError::InvalidSessionKey {
                expected: SESSION_PUBLIC_KEY_HEX_LEN,
                actual: public_key.len(),
            });
        }

        Ok(Session {
            public_key,
            private_key,
        })
    }

    /// Lowercase hex public key, no `0x` prefix
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub fn private_key(&self) -> &SigningKey {
        &self.private_key
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}
