use crate::backoff::{BackoffPolicy, WorkerRunState};
use crate::compute::ProofComputer;
use crate::config::CycleConfig;
use crate::events::{CycleEvent, EventSink};
use crate::node_key::NodeKey;
use crate::{Result, WorkerError};
use prover_client::{ClientError, OrchestratorClient};
use prover_core::{AccessToken, NodeType};
use prover_protocol::{NodeTelemetry, SubmitProofRequest};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Totals for one identity's run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub iterations_completed: u64,
    pub successes: u64,
    pub failures: u64,
    pub rate_limited: u64,
    pub rejected: u64,
    pub final_strikes: u32,
}

/// Drives fetch → compute → submit for one identity until its iteration
/// budget is spent.
///
/// Rate limits and rejections retry without consuming an iteration; every
/// other failure is counted and the loop continues at the normal cadence.
pub struct WorkerCycle {
    worker_id: String,
    token: AccessToken,
    client: OrchestratorClient,
    computer: Arc<dyn ProofComputer>,
    node_key: NodeKey,
    telemetry: NodeTelemetry,
    config: CycleConfig,
    backoff: BackoffPolicy,
    sink: Arc<dyn EventSink>,
}

impl WorkerCycle {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        worker_id: impl Into<String>,
        token: AccessToken,
        client: OrchestratorClient,
        computer: Arc<dyn ProofComputer>,
        node_key: NodeKey,
        telemetry: NodeTelemetry,
        config: CycleConfig,
        backoff: BackoffPolicy,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        WorkerCycle {
            worker_id: worker_id.into(),
            token,
            client,
            computer,
            node_key,
            telemetry,
            config,
            backoff,
            sink,
        }
    }

    pub async fn run(&self) -> CycleReport {
        let mut state = WorkerRunState::new();
        let mut report = CycleReport::default();

        while state.has_budget(self.config.loop_count) {
            if state.take_claim(self.config.claim_every) {
                self.claim(state.iteration_index).await;
            }

            match self.iteration(state.iteration_index).await {
                Ok(task_id) => {
                    state.reset_strikes();
                    report.successes += 1;
                    self.emit(CycleEvent::Succeeded {
                        iteration: state.iteration_index,
                        task_id,
                    });
                }
                Err(WorkerError::Client(ClientError::RateLimited)) => {
                    let strike = state.strike();
                    let delay = self.backoff.delay_for(strike);
                    report.rate_limited += 1;
                    self.emit(CycleEvent::RateLimited { strike, delay });
                    pause(delay).await;
                    continue;
                }
                Err(WorkerError::Client(ClientError::Rejected(reason))) => {
                    state.reset_strikes();
                    let delay = self.config.rejection_delay();
                    report.rejected += 1;
                    self.emit(CycleEvent::Rejected { reason, delay });
                    pause(delay).await;
                    continue;
                }
                Err(e) => {
                    report.failures += 1;
                    self.emit(CycleEvent::Failed {
                        iteration: state.iteration_index,
                        kind: error_kind(&e),
                        error: e.to_string(),
                    });
                }
            }

            state.advance();
            let delay = self.config.iteration_delay();
            if state.has_budget(self.config.loop_count) && !delay.is_zero() {
                self.emit(CycleEvent::Waiting { delay });
                pause(delay).await;
            }
        }

        report.iterations_completed = state.completed();
        report.final_strikes = state.rate_limit_strikes;
        self.emit(CycleEvent::Finished {
            completed: report.iterations_completed,
            successes: report.successes,
            failures: report.failures,
        });
        report
    }

    /// One fetch → compute → submit pass; returns the submitted task id
    async fn iteration(&self, iteration: u64) -> Result<String> {
        pause(self.config.pre_fetch_delay.sample()).await;
        self.emit(CycleEvent::Fetching { iteration });

        let public_key = self.node_key.public_key();
        let task = self
            .client
            .fetch_task(&self.worker_id, &public_key, &self.token)
            .await?;

        self.emit(CycleEvent::Computing {
            task_id: task.task_id.clone(),
            input_len: task.public_input.len(),
        });
        let artifact = self.computer.compute(&task).await?;

        self.emit(CycleEvent::Submitting {
            task_id: task.task_id.clone(),
            hash: artifact.hash.clone(),
            artifact_len: artifact.len(),
        });
        pause(self.config.pre_submit_delay()).await;

        let signature =
            self.node_key
                .sign_submission(NodeType::WebProver, &task.task_id, &artifact.hash);
        let payload = SubmitProofRequest::new(
            self.worker_id.as_str(),
            &task,
            &artifact,
            self.telemetry.clone(),
            public_key.to_vec(),
            signature.to_vec(),
        )
        .encode();
        self.client.submit(payload, &self.token).await?;

        Ok(task.task_id)
    }

    async fn claim(&self, iteration: u64) {
        match self.client.claim_points(&self.token).await {
            Ok(response) => self.emit(CycleEvent::Claimed {
                iteration,
                response,
            }),
            Err(e) => self.emit(CycleEvent::ClaimFailed {
                iteration,
                error: e.to_string(),
            }),
        }
    }

    fn emit(&self, event: CycleEvent) {
        self.sink.emit(&self.worker_id, event);
    }
}

fn error_kind(e: &WorkerError) -> &'static str {
    match e {
        WorkerError::Client(client) => client.kind(),
        WorkerError::Compute(_) => "compute",
        _ => "other",
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
