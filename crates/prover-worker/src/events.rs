use parking_lot::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

/// State transitions and side effects of a worker cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleEvent {
    Fetching { iteration: u64 },
    Computing { task_id: String, input_len: usize },
    Submitting { task_id: String, hash: String, artifact_len: usize },
    Succeeded { iteration: u64, task_id: String },
    RateLimited { strike: u32, delay: Duration },
    Rejected { reason: String, delay: Duration },
    Failed { iteration: u64, kind: &'static str, error: String },
    Claimed { iteration: u64, response: String },
    ClaimFailed { iteration: u64, error: String },
    Waiting { delay: Duration },
    Finished { completed: u64, successes: u64, failures: u64 },
}

/// Receives cycle events for one or more identities
pub trait EventSink: Send + Sync {
    fn emit(&self, worker_id: &str, event: CycleEvent);
}

/// Forwards events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, worker_id: &str, event: CycleEvent) {
        match event {
            CycleEvent::Fetching { iteration } => {
                info!(worker_id, iteration, "Requesting task")
            }
            CycleEvent::Computing { task_id, input_len } => {
                debug!(worker_id, %task_id, input_len, "Computing artifact")
            }
            CycleEvent::Submitting {
                task_id,
                hash,
                artifact_len,
            } => info!(worker_id, %task_id, %hash, artifact_len, "Submitting artifact"),
            CycleEvent::Succeeded { iteration, task_id } => {
                info!(worker_id, iteration, %task_id, "Iteration succeeded")
            }
            CycleEvent::RateLimited { strike, delay } => {
                warn!(worker_id, strike, "Rate limited, backing off {:?}", delay)
            }
            CycleEvent::Rejected { reason, delay } => {
                warn!(worker_id, %reason, "Submission rejected, fetching a new task in {:?}", delay)
            }
            CycleEvent::Failed {
                iteration,
                kind,
                error,
            } => warn!(worker_id, iteration, kind, "Iteration failed: {}", error),
            CycleEvent::Claimed { iteration, response } => {
                info!(worker_id, iteration, %response, "Points claimed")
            }
            CycleEvent::ClaimFailed { iteration, error } => {
                warn!(worker_id, iteration, "Points claim failed: {}", error)
            }
            CycleEvent::Waiting { delay } => debug!(worker_id, "Next iteration in {:?}", delay),
            CycleEvent::Finished {
                completed,
                successes,
                failures,
            } => info!(worker_id, completed, successes, failures, "Cycle finished"),
        }
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(String, CycleEvent)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(String, CycleEvent)> {
        self.events.lock().clone()
    }

    /// Events recorded for one worker, in order
    pub fn events_for(&self, worker_id: &str) -> Vec<CycleEvent> {
        self.events
            .lock()
            .iter()
            .filter(|(id, _)| id == worker_id)
            .map(|(_, e)| e.clone())
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, worker_id: &str, event: CycleEvent) {
        self.events.lock().push((worker_id.to_string(), event));
    }
}
