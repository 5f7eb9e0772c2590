pub mod accounts;
pub mod backoff;
pub mod compute;
pub mod config;
pub mod cycle;
pub mod events;
pub mod node_key;
pub mod orchestrator;
mod error;

pub use backoff::{BackoffPolicy, WorkerRunState};
pub use compute::{PlaceholderProver, ProofComputer};
pub use config::WorkerConfig;
pub use cycle::{CycleReport, WorkerCycle};
pub use error::{Result, WorkerError};
pub use events::{CycleEvent, EventSink, RecordingSink, TracingSink};
pub use node_key::NodeKey;
pub use orchestrator::{IdentityOutcome, Orchestrator, ReqwestFactory, TransportFactory};
