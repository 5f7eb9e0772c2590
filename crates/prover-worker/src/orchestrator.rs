use crate::compute::ProofComputer;
use crate::config::WorkerConfig;
use crate::cycle::{CycleReport, WorkerCycle};
use crate::events::EventSink;
use crate::node_key::NodeKey;
use crate::Result;
use futures::future::join_all;
use prover_client::{AuthClient, HttpTransport, OrchestratorClient, ReqwestTransport, TransportError};
use prover_core::{AccessToken, Identity};
use prover_persistence::TokenCache;
use prover_protocol::NodeTelemetry;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{info, info_span, warn, Instrument};

/// Builds the HTTP transports for one identity
pub trait TransportFactory: Send + Sync {
    fn build(
        &self,
        proxy: Option<&str>,
        timeout: Duration,
    ) -> std::result::Result<Arc<dyn HttpTransport>, TransportError>;
}

/// `reqwest` transports; an unusable proxy falls back to a direct connection
#[derive(Debug, Default, Clone, Copy)]
pub struct ReqwestFactory;

impl TransportFactory for ReqwestFactory {
    fn build(
        &self,
        proxy: Option<&str>,
        timeout: Duration,
    ) -> std::result::Result<Arc<dyn HttpTransport>, TransportError> {
        match ReqwestTransport::new(timeout, proxy) {
            Ok(transport) => Ok(Arc::new(transport)),
            Err(TransportError::Proxy(e)) => {
                warn!("Proxy unusable ({}), using direct connection", e);
                Ok(Arc::new(ReqwestTransport::new(timeout, None)?))
            }
            Err(e) => Err(e),
        }
    }
}

/// Final result for one identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityOutcome {
    pub index: usize,
    pub worker_id: String,
    pub success: bool,
    pub error: Option<String>,
    pub report: Option<CycleReport>,
}

impl IdentityOutcome {
    fn completed(index: usize, worker_id: String, report: CycleReport) -> Self {
        IdentityOutcome {
            index,
            worker_id,
            success: true,
            error: None,
            report: Some(report),
        }
    }

    fn failed(index: usize, worker_id: String, error: String) -> Self {
        IdentityOutcome {
            index,
            worker_id,
            success: false,
            error: Some(error),
            report: None,
        }
    }
}

struct Shared {
    config: WorkerConfig,
    cache: Arc<dyn TokenCache>,
    computer: Arc<dyn ProofComputer>,
    sink: Arc<dyn EventSink>,
    node_key: NodeKey,
    transports: Arc<dyn TransportFactory>,
}

/// Runs one worker cycle per identity concurrently
pub struct Orchestrator {
    shared: Arc<Shared>,
}

impl Orchestrator {
    pub fn new(
        config: WorkerConfig,
        cache: Arc<dyn TokenCache>,
        computer: Arc<dyn ProofComputer>,
        sink: Arc<dyn EventSink>,
        node_key: NodeKey,
        transports: Arc<dyn TransportFactory>,
    ) -> Self {
        Orchestrator {
            shared: Arc::new(Shared {
                config,
                cache,
                computer,
                sink,
                node_key,
                transports,
            }),
        }
    }

    /// Run every identity to completion. Identity `i` uses `proxies[i]` when
    /// present. Outcomes are returned in identity order.
    pub async fn run(&self, identities: Vec<Identity>, proxies: &[String]) -> Vec<IdentityOutcome> {
        let cache = self.shared.cache.clone();
        match tokio::task::spawn_blocking(move || cache.sweep_expired()).await {
            Ok(Ok(removed)) => info!("Removed {} expired cached tokens", removed),
            Ok(Err(e)) => warn!("Token cache sweep failed: {}", e),
            Err(e) => warn!("Token cache sweep aborted: {}", e),
        }

        let semaphore = self
            .shared
            .config
            .max_concurrent_identities
            .map(|n| Arc::new(Semaphore::new(n)));

        info!(
            "Starting {} identities ({} proxies, limit {:?})",
            identities.len(),
            proxies.len(),
            self.shared.config.max_concurrent_identities
        );

        let handles: Vec<_> = identities
            .into_iter()
            .enumerate()
            .map(|(index, identity)| {
                let shared = self.shared.clone();
                let semaphore = semaphore.clone();
                let proxy = proxies.get(index).cloned();
                let worker_id = identity.worker_id().to_string();
                let span = info_span!("identity", worker_id = %worker_id, index);

                let handle = tokio::spawn(
                    async move {
                        let _permit = match semaphore {
                            Some(semaphore) => match semaphore.acquire_owned().await {
                                Ok(permit) => Some(permit),
                                Err(e) => {
                                    return IdentityOutcome::failed(
                                        index,
                                        identity.worker_id().to_string(),
                                        e.to_string(),
                                    )
                                }
                            },
                            None => None,
                        };
                        shared.run_identity(index, identity, proxy).await
                    }
                    .instrument(span),
                );
                (index, worker_id, handle)
            })
            .collect();

        let outcomes = join_all(handles.into_iter().map(|(index, worker_id, handle)| async move {
            match handle.await {
                Ok(outcome) => outcome,
                Err(e) => IdentityOutcome::failed(index, worker_id, format!("identity task aborted: {}", e)),
            }
        }))
        .await;

        let successes = outcomes.iter().filter(|o| o.success).count();
        info!(
            "All identities finished: {} succeeded, {} failed",
            successes,
            outcomes.len() - successes
        );
        for outcome in outcomes.iter().filter(|o| !o.success) {
            warn!(
                worker_id = %outcome.worker_id,
                index = outcome.index,
                "Identity failed: {}",
                outcome.error.as_deref().unwrap_or("unknown error")
            );
        }

        outcomes
    }
}

impl Shared {
    async fn run_identity(&self, index: usize, identity: Identity, proxy: Option<String>) -> IdentityOutcome {
        let worker_id = identity.worker_id().to_string();
        match self.drive(&identity, proxy.as_deref()).await {
            Ok(report) => IdentityOutcome::completed(index, worker_id, report),
            Err(e) => IdentityOutcome::failed(index, worker_id, e.to_string()),
        }
    }

    async fn drive(&self, identity: &Identity, proxy: Option<&str>) -> Result<CycleReport> {
        info!(proxy = proxy.unwrap_or("none"), "Starting identity");
        let auth_transport = self.transports.build(proxy, self.config.auth.timeout())?;
        let transport = self.transports.build(proxy, self.config.orchestrator.timeout())?;
        let token = self.token_for(identity, auth_transport).await?;

        let cycle = WorkerCycle::new(
            identity.worker_id(),
            token,
            OrchestratorClient::new(self.config.orchestrator.base_url.as_str(), transport),
            self.computer.clone(),
            self.node_key.clone(),
            NodeTelemetry::from(&self.config.telemetry),
            self.config.cycle.clone(),
            self.config.backoff.policy(),
            self.sink.clone(),
        );
        Ok(cycle.run().await)
    }

    /// Cached token when still valid, otherwise a fresh sign-in whose token
    /// is written back to the cache
    async fn token_for(&self, identity: &Identity, transport: Arc<dyn HttpTransport>) -> Result<AccessToken> {
        // Cache reads and rewrites touch the filesystem; keep them off the runtime
        let cache = self.cache.clone();
        let owned = identity.clone();
        match tokio::task::spawn_blocking(move || cache.lookup(&owned)).await {
            Ok(Ok(Some(token))) => {
                info!(token = token.preview(), "Reusing cached token");
                return Ok(token);
            }
            Ok(Ok(None)) => {}
            Ok(Err(e)) => warn!("Token cache lookup failed, signing in: {}", e),
            Err(e) => warn!("Token cache lookup aborted, signing in: {}", e),
        }

        let auth = AuthClient::new(self.config.auth.clone(), transport);
        let token = auth.login(identity).await?;

        let cache = self.cache.clone();
        let owned = identity.clone();
        let stored = token.clone();
        match tokio::task::spawn_blocking(move || cache.store(&owned, &stored)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to cache token: {}", e),
            Err(e) => warn!("Token cache write aborted: {}", e),
        }
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::PlaceholderProver;
    use crate::config::CycleConfig;
    use crate::events::RecordingSink;
    use crate::test_support::{raw_token, token, KEY_A, KEY_B, TASK_BODY};
    use parking_lot::Mutex;
    use prover_client::MockTransport;
    use prover_persistence::MemoryTokenCache;
    use serde_json::json;
    use std::collections::HashMap;

    /// Hands out one scripted transport per proxy and records what was asked for
    #[derive(Default)]
    struct MockFactory {
        by_proxy: HashMap<Option<String>, Arc<MockTransport>>,
        requested: Mutex<Vec<(Option<String>, Duration)>>,
    }

    impl MockFactory {
        fn with(mut self, proxy: Option<&str>, mock: Arc<MockTransport>) -> Self {
            self.by_proxy.insert(proxy.map(str::to_string), mock);
            self
        }
    }

    impl TransportFactory for MockFactory {
        fn build(
            &self,
            proxy: Option<&str>,
            timeout: Duration,
        ) -> std::result::Result<Arc<dyn HttpTransport>, TransportError> {
            self.requested.lock().push((proxy.map(str::to_string), timeout));
            match self.by_proxy.get(&proxy.map(str::to_string)) {
                Some(mock) => Ok(mock.clone()),
                None => Err(TransportError::Other("no transport scripted".to_string())),
            }
        }
    }

    fn scripted_orchestrator(jwt: &str) -> Arc<MockTransport> {
        let mock = Arc::new(MockTransport::new());
        mock.reply("/connect", 200, "{}")
            .reply_json("/nonce", 200, json!({"nonce": "n1"}))
            .reply_json("/verify", 200, json!({"jwt": jwt}))
            .reply("/tasks", 200, TASK_BODY)
            .reply("/tasks/submit", 200, "");
        mock
    }

    fn config() -> WorkerConfig {
        let mut config = WorkerConfig::default();
        config.auth = config.auth.without_delays();
        config.cycle = CycleConfig::immediate(1);
        config
    }

    fn orchestrator(
        config: WorkerConfig,
        cache: Arc<dyn TokenCache>,
        factory: Arc<MockFactory>,
    ) -> Orchestrator {
        Orchestrator::new(
            config,
            cache,
            Arc::new(PlaceholderProver),
            Arc::new(RecordingSink::new()),
            NodeKey::generate(),
            factory,
        )
    }

    fn future_jwt() -> String {
        raw_token(chrono::Utc::now().timestamp() + 3600)
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_miss_then_hit() {
        let jwt = future_jwt();
        let mock = scripted_orchestrator(&jwt);
        let factory = Arc::new(MockFactory::default().with(None, mock.clone()));
        let cache = Arc::new(MemoryTokenCache::new());
        let identity = Identity::new("w1", KEY_A).unwrap();

        let orch = orchestrator(config(), cache.clone(), factory.clone());
        let outcomes = orch.run(vec![identity.clone()], &[]).await;
        assert!(outcomes[0].success, "{:?}", outcomes[0]);
        assert_eq!(mock.count("/connect"), 1);
        assert_eq!(cache.lookup(&identity).unwrap().unwrap().as_str(), jwt);

        // Second run reuses the cached token without a handshake
        let outcomes = orch.run(vec![identity], &[]).await;
        assert!(outcomes[0].success);
        assert_eq!(mock.count("/connect"), 1);
        assert_eq!(mock.count("/verify"), 1);
        assert_eq!(mock.count("/tasks/submit"), 2);

        let bearer = format!("Bearer {}", jwt);
        assert!(mock
            .requests()
            .iter()
            .filter(|r| r.url.ends_with("/tasks"))
            .all(|r| r.header_value("authorization") == Some(bearer.as_str())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_token_skips_handshake() {
        let mock = scripted_orchestrator(&future_jwt());
        let factory = Arc::new(MockFactory::default().with(None, mock.clone()));
        let cache = Arc::new(MemoryTokenCache::new());
        let identity = Identity::new("w1", KEY_A).unwrap();
        cache.store(&identity, &token()).unwrap();

        let outcomes = orchestrator(config(), cache, factory).run(vec![identity], &[]).await;

        assert!(outcomes[0].success);
        assert_eq!(mock.count("/connect"), 0);
        assert_eq!(outcomes[0].report.as_ref().unwrap().successes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_failure_is_isolated() {
        let failing = Arc::new(MockTransport::new());
        failing.reply("/connect", 500, "down");
        let healthy = scripted_orchestrator(&future_jwt());
        let factory = Arc::new(
            MockFactory::default()
                .with(Some("http://p1:8080"), failing.clone())
                .with(Some("http://p2:8080"), healthy.clone()),
        );
        let cache = Arc::new(MemoryTokenCache::new());
        let a = Identity::new("a", KEY_A).unwrap();
        let b = Identity::new("b", KEY_B).unwrap();
        let proxies = vec!["http://p1:8080".to_string(), "http://p2:8080".to_string()];

        let outcomes = orchestrator(config(), cache.clone(), factory)
            .run(vec![a.clone(), b], &proxies)
            .await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].worker_id, "a");
        assert!(!outcomes[0].success);
        assert!(outcomes[0].error.as_ref().unwrap().contains("connect"));
        assert!(outcomes[0].report.is_none());
        assert_eq!(outcomes[1].worker_id, "b");
        assert!(outcomes[1].success);

        // Nothing cached for the failed identity
        assert!(cache.lookup(&a).unwrap().is_none());
        assert_eq!(failing.count("/tasks"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_proxies_assigned_by_index() {
        let mock = scripted_orchestrator(&future_jwt());
        let factory = Arc::new(
            MockFactory::default()
                .with(Some("http://p1:8080"), mock.clone())
                .with(None, mock.clone()),
        );
        let identities = vec![
            Identity::new("a", KEY_A).unwrap(),
            Identity::new("b", KEY_B).unwrap(),
        ];
        let config = WorkerConfig {
            max_concurrent_identities: Some(1),
            ..config()
        };

        let outcomes = orchestrator(config, Arc::new(MemoryTokenCache::new()), factory.clone())
            .run(identities, &["http://p1:8080".to_string()])
            .await;

        assert!(outcomes.iter().all(|o| o.success));
        let mut requested: Vec<Option<String>> =
            factory.requested.lock().iter().map(|(proxy, _)| proxy.clone()).collect();
        requested.sort();
        requested.dedup();
        assert_eq!(requested, vec![None, Some("http://p1:8080".to_string())]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transports_use_their_own_timeouts() {
        let mock = scripted_orchestrator(&future_jwt());
        let factory = Arc::new(MockFactory::default().with(None, mock));
        let mut config = config();
        config.auth.timeout_secs = 7;
        config.orchestrator.timeout_secs = 45;

        let outcomes = orchestrator(config, Arc::new(MemoryTokenCache::new()), factory.clone())
            .run(vec![Identity::new("w1", KEY_A).unwrap()], &[])
            .await;

        assert!(outcomes[0].success);
        let timeouts: Vec<Duration> = factory.requested.lock().iter().map(|(_, t)| *t).collect();
        assert_eq!(timeouts, vec![Duration::from_secs(7), Duration::from_secs(45)]);
    }

    /// Records which thread each cache call ran on
    struct ThreadRecordingCache {
        inner: MemoryTokenCache,
        threads: Mutex<Vec<std::thread::ThreadId>>,
    }

    impl TokenCache for ThreadRecordingCache {
        fn lookup(&self, identity: &Identity) -> prover_persistence::Result<Option<AccessToken>> {
            self.threads.lock().push(std::thread::current().id());
            self.inner.lookup(identity)
        }

        fn store(&self, identity: &Identity, token: &AccessToken) -> prover_persistence::Result<()> {
            self.threads.lock().push(std::thread::current().id());
            self.inner.store(identity, token)
        }

        fn sweep_expired(&self) -> prover_persistence::Result<usize> {
            self.threads.lock().push(std::thread::current().id());
            self.inner.sweep_expired()
        }
    }

    #[tokio::test]
    async fn test_cache_io_runs_off_the_runtime_thread() {
        let mock = scripted_orchestrator(&future_jwt());
        let factory = Arc::new(MockFactory::default().with(None, mock));
        let cache = Arc::new(ThreadRecordingCache {
            inner: MemoryTokenCache::new(),
            threads: Mutex::new(Vec::new()),
        });

        let outcomes = orchestrator(config(), cache.clone(), factory)
            .run(vec![Identity::new("w1", KEY_A).unwrap()], &[])
            .await;

        assert!(outcomes[0].success);
        let runtime_thread = std::thread::current().id();
        let threads = cache.threads.lock().clone();
        // sweep, lookup, store
        assert_eq!(threads.len(), 3);
        assert!(threads.iter().all(|id| *id != runtime_thread));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_build_failure_is_outcome() {
        let factory = Arc::new(MockFactory::default());
        let identity = Identity::new("w1", KEY_A).unwrap();

        let outcomes = orchestrator(config(), Arc::new(MemoryTokenCache::new()), factory)
            .run(vec![identity], &[])
            .await;

        assert!(!outcomes[0].success);
        assert_eq!(outcomes[0].index, 0);
    }

    #[test]
    fn test_reqwest_factory_falls_back_on_bad_proxy() {
        let timeout = Duration::from_secs(5);
        assert!(ReqwestFactory.build(Some("::not a url::"), timeout).is_ok());
        assert!(ReqwestFactory.build(None, timeout).is_ok());
    }
}
