use crate::backoff::BackoffPolicy;
use crate::{Result, WorkerError};
use prover_client::{AuthConfig, StepDelay};
use prover_protocol::NodeTelemetry;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub auth: AuthConfig,
    pub orchestrator: OrchestratorConfig,
    pub cycle: CycleConfig,
    pub backoff: BackoffConfig,
    pub telemetry: TelemetryConfig,
    /// Base64 ed25519 secret; a fresh key is generated per process when unset
    pub node_key: Option<String>,
    pub cache_path: PathBuf,
    /// Upper bound on identities running at once; unbounded when unset
    pub max_concurrent_identities: Option<usize>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            auth: AuthConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            cycle: CycleConfig::default(),
            backoff: BackoffConfig::default(),
            telemetry: TelemetryConfig::default(),
            node_key: None,
            cache_path: PathBuf::from("jwt_cache.json"),
            max_concurrent_identities: None,
        }
    }
}

impl WorkerConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: WorkerConfig = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.orchestrator.base_url.trim().is_empty() {
            return Err(WorkerError::Config("orchestrator.base_url is empty".to_string()));
        }
        if self.auth.base_url.trim().is_empty() {
            return Err(WorkerError::Config("auth.base_url is empty".to_string()));
        }
        if self.backoff.schedule_secs.is_empty() {
            return Err(WorkerError::Config("backoff.schedule_secs is empty".to_string()));
        }
        if self.max_concurrent_identities == Some(0) {
            return Err(WorkerError::Config(
                "max_concurrent_identities must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            base_url: "http://127.0.0.1:8080/v3".to_string(),
            timeout_secs: 30,
        }
    }
}

impl OrchestratorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Iteration budget and pacing of one worker cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleConfig {
    /// Counted iterations to run; 0 runs indefinitely
    pub loop_count: u64,
    pub iteration_delay_secs: u64,
    /// Claim points every N counted iterations; 0 disables claiming
    pub claim_every: u64,
    pub pre_fetch_delay: StepDelay,
    pub pre_submit_delay_ms: u64,
    pub rejection_delay_secs: u64,
}

impl Default for CycleConfig {
    fn default() -> Self {
        CycleConfig {
            loop_count: 0,
            iteration_delay_secs: 60,
            claim_every: 0,
            pre_fetch_delay: StepDelay::new(1000, 3000),
            pre_submit_delay_ms: 2000,
            rejection_delay_secs: 5,
        }
    }
}

impl CycleConfig {
    pub fn iteration_delay(&self) -> Duration {
        Duration::from_secs(self.iteration_delay_secs)
    }

    pub fn pre_submit_delay(&self) -> Duration {
        Duration::from_millis(self.pre_submit_delay_ms)
    }

    pub fn rejection_delay(&self) -> Duration {
        Duration::from_secs(self.rejection_delay_secs)
    }

    /// No pacing at all; used by tests and dry runs
    pub fn immediate(loop_count: u64) -> Self {
        CycleConfig {
            loop_count,
            iteration_delay_secs: 0,
            claim_every: 0,
            pre_fetch_delay: StepDelay::none(),
            pre_submit_delay_ms: 0,
            rejection_delay_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Rate-limit delays by strike; the last entry repeats
    pub schedule_secs: Vec<u64>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        BackoffConfig {
            schedule_secs: vec![10, 30, 60],
        }
    }
}

impl BackoffConfig {
    pub fn policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(self.schedule_secs.iter().map(|s| Duration::from_secs(*s)).collect())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub flops_per_sec: u32,
    pub memory_used: u32,
    pub memory_capacity: u32,
    pub location: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        let telemetry = NodeTelemetry::default();
        TelemetryConfig {
            flops_per_sec: telemetry.flops_per_sec,
            memory_used: telemetry.memory_used,
            memory_capacity: telemetry.memory_capacity,
            location: telemetry.location,
        }
    }
}

impl From<&TelemetryConfig> for NodeTelemetry {
    fn from(config: &TelemetryConfig) -> Self {
        NodeTelemetry {
            flops_per_sec: config.flops_per_sec,
            memory_used: config.memory_used,
            memory_capacity: config.memory_capacity,
            location: config.location.clone(),
        }
    }
}
