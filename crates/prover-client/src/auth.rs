use crate::transport::{HttpRequest, HttpResponse, HttpTransport};
use crate::{classify_response, ClientError};
use alloy_signer::SignerSync;
use chrono::{DateTime, SecondsFormat, Utc};
use prover_core::{AccessToken, Clock, CoreError, Identity, Session, SystemClock};
use rand::distributions::Alphanumeric;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Steps of the sign-in handshake that talk to the auth service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStep {
    Connect,
    Nonce,
    Verify,
}

impl fmt::Display for HandshakeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeStep::Connect => write!(f, "connect"),
            HandshakeStep::Nonce => write!(f, "nonce"),
            HandshakeStep::Verify => write!(f, "verify"),
        }
    }
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Handshake {step} step failed: {source}")]
    Step {
        step: HandshakeStep,
        #[source]
        source: ClientError,
    },

    #[error("Invalid {step} response: {reason}")]
    InvalidResponse { step: HandshakeStep, reason: String },

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Verify response carried no token")]
    MissingToken,

    #[error("Issued token is unusable: {0}")]
    InvalidToken(#[source] CoreError),

    #[error("Session key generation failed: {0}")]
    Session(#[source] CoreError),
}

/// Inclusive random delay range applied before a handshake step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDelay {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl StepDelay {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        StepDelay { min_ms, max_ms }
    }

    pub const fn none() -> Self {
        StepDelay::new(0, 0)
    }

    pub fn sample(&self) -> Duration {
        let (lo, hi) = if self.min_ms <= self.max_ms {
            (self.min_ms, self.max_ms)
        } else {
            (self.max_ms, self.min_ms)
        };
        if hi == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
    }
}

/// Auth service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Base URL the `/connect`, `/nonce` and `/verify` paths hang off
    pub base_url: String,
    /// Domain and URI quoted in the sign-in statement
    pub domain: String,
    pub uri: String,
    pub statement: String,
    pub chain_id: u64,
    /// Request id quoted in the statement
    pub environment_id: String,
    pub wallet_name: String,
    pub wallet_provider: String,
    pub connect_delay: StepDelay,
    pub nonce_delay: StepDelay,
    pub verify_delay: StepDelay,
    pub timeout_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        AuthConfig {
            base_url: "http://127.0.0.1:8080/auth".to_string(),
            domain: "localhost".to_string(),
            uri: "http://localhost/".to_string(),
            statement: "Sign in to the prover network. Signing proves ownership of this account and does not authorize any transaction.".to_string(),
            chain_id: 3940,
            environment_id: "00000000-0000-0000-0000-000000000000".to_string(),
            wallet_name: "local".to_string(),
            wallet_provider: "browserExtension".to_string(),
            connect_delay: StepDelay::new(1000, 3000),
            nonce_delay: StepDelay::new(500, 2000),
            verify_delay: StepDelay::new(2000, 5000),
            timeout_secs: 30,
        }
    }
}

impl AuthConfig {
    /// Per-request timeout for the sign-in calls
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Same settings with every step delay set to zero
    pub fn without_delays(mut self) -> Self {
        self.connect_delay = StepDelay::none();
        self.nonce_delay = StepDelay::none();
        self.verify_delay = StepDelay::none();
        self
    }

    fn delay_for(&self, step: HandshakeStep) -> StepDelay {
        match step {
            HandshakeStep::Connect => self.connect_delay,
            HandshakeStep::Nonce => self.nonce_delay,
            HandshakeStep::Verify => self.verify_delay,
        }
    }
}

#[derive(Deserialize)]
struct NonceResponse {
    nonce: String,
}

#[derive(Deserialize)]
struct VerifyResponse {
    #[serde(default)]
    jwt: Option<String>,
}

/// Per-handshake header state: request ids, the header session key and
/// a device fingerprint that stays fixed for all three requests
struct HandshakeHeaders {
    session_public_key: String,
    fingerprint: String,
}

/// Runs the wallet sign-in handshake and yields an access token
pub struct AuthClient {
    config: AuthConfig,
    transport: Arc<dyn HttpTransport>,
    clock: Arc<dyn Clock>,
}

impl AuthClient {
    pub fn new(config: AuthConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self::with_clock(config, transport, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: AuthConfig,
        transport: Arc<dyn HttpTransport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        AuthClient {
            config,
            transport,
            clock,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Connect, fetch a nonce, sign the statement and exchange it for a token.
    ///
    /// Any failing step aborts the whole handshake; nothing is retried here.
    pub async fn login(&self, identity: &Identity) -> Result<AccessToken, AuthError> {
        let header_session = Session::generate().map_err(AuthError::Session)?;
        let body_session = Session::generate().map_err(AuthError::Session)?;
        let headers = HandshakeHeaders {
            session_public_key: header_session.public_key().to_string(),
            fingerprint: device_fingerprint(),
        };
        let address = identity.address();

        info!(worker_id = identity.worker_id(), %address, "Starting sign-in handshake");

        let connect = HttpRequest::post(self.url("connect")).json(json!({
            "address": address,
            "chain": "EVM",
            "provider": self.config.wallet_provider,
            "walletName": self.config.wallet_name,
            "authMode": "connect-and-sign",
        }));
        self.step(HandshakeStep::Connect, connect, &headers).await?;

        let response = self
            .step(HandshakeStep::Nonce, HttpRequest::get(self.url("nonce")), &headers)
            .await?;
        let nonce = serde_json::from_slice::<NonceResponse>(&response.body)
            .map_err(|e| AuthError::InvalidResponse {
                step: HandshakeStep::Nonce,
                reason: e.to_string(),
            })?
            .nonce;

        let message = self.build_message(&address, &nonce, self.clock.now());
        let signature = identity
            .signer()
            .sign_message_sync(message.as_bytes())
            .map_err(|e| AuthError::Signing(e.to_string()))?;
        let signed_message = format!("0x{}", hex::encode(signature.as_bytes()));

        let verify = HttpRequest::post(self.url("verify")).json(json!({
            "signedMessage": signed_message,
            "messageToSign": message,
            "publicWalletAddress": address,
            "chain": "EVM",
            "walletName": self.config.wallet_name,
            "walletProvider": self.config.wallet_provider,
            "network": self.config.chain_id.to_string(),
            "additionalWalletAddresses": [],
            "sessionPublicKey": body_session.public_key(),
        }));
        let response = self.step(HandshakeStep::Verify, verify, &headers).await?;

        let raw = serde_json::from_slice::<VerifyResponse>(&response.body)
            .map_err(|e| AuthError::InvalidResponse {
                step: HandshakeStep::Verify,
                reason: e.to_string(),
            })?
            .jwt
            .filter(|jwt| !jwt.is_empty())
            .ok_or(AuthError::MissingToken)?;

        let token = AccessToken::parse(raw).map_err(AuthError::InvalidToken)?;
        info!(
            worker_id = identity.worker_id(),
            expires_at = %token.expires_at(),
            "Sign-in complete"
        );
        Ok(token)
    }

    /// Sign-in statement for `address`, deterministic for fixed inputs
    pub fn build_message(&self, address: &str, nonce: &str, issued_at: DateTime<Utc>) -> String {
        format!(
            "{domain} wants you to sign in with your Ethereum account:\n\
             {address}\n\
             \n\
             {statement}\n\
             \n\
             URI: {uri}\n\
             Version: 1\n\
             Chain ID: {chain_id}\n\
             Nonce: {nonce}\n\
             Issued At: {issued_at}\n\
             Request ID: {request_id}",
            domain = self.config.domain,
            statement = self.config.statement,
            uri = self.config.uri,
            chain_id = self.config.chain_id,
            issued_at = issued_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            request_id = self.config.environment_id,
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn step(
        &self,
        step: HandshakeStep,
        request: HttpRequest,
        headers: &HandshakeHeaders,
    ) -> Result<HttpResponse, AuthError> {
        let delay = self.config.delay_for(step).sample();
        if !delay.is_zero() {
            debug!("Waiting {:?} before {} step", delay, step);
            tokio::time::sleep(delay).await;
        }

        let request = request
            .header("x-dyn-request-id", self.request_id(step))
            .header("x-dyn-session-public-key", headers.session_public_key.as_str())
            .header("x-dyn-device-fingerprint", headers.fingerprint.as_str());

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| AuthError::Step {
                step,
                source: e.into(),
            })?;

        if !response.is_success() {
            let source = classify_response(response.status, &response.body);
            warn!("Handshake {} step failed: {}", step, source);
            return Err(AuthError::Step { step, source });
        }

        debug!("Handshake {} step ok", step);
        Ok(response)
    }

    fn request_id(&self, step: HandshakeStep) -> String {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(9)
            .map(|b| (b as char).to_ascii_lowercase())
            .collect();
        format!("reqid-{}-{}-{}", step, self.clock.now().timestamp_millis(), suffix)
    }
}

fn device_fingerprint() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
