use crate::transport::{HttpRequest, HttpResponse, HttpTransport};
use crate::{classify_response, ClientError, Result};
use bytes::Bytes;
use prover_core::{AccessToken, Task};
use prover_protocol::{decode_task_response, TaskRequest};
use std::sync::Arc;
use tracing::{debug, info};

/// Client for the orchestrator's task API
#[derive(Clone)]
pub struct OrchestratorClient {
    base_url: String,
    transport: Arc<dyn HttpTransport>,
}

impl OrchestratorClient {
    pub fn new(base_url: impl Into<String>, transport: Arc<dyn HttpTransport>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        OrchestratorClient {
            base_url,
            transport,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Request a new task for `worker_id`.
    ///
    /// A response that decodes but carries no task id is reported as
    /// [`ClientError::MissingTaskId`].
    pub async fn fetch_task(
        &self,
        worker_id: &str,
        public_key: &[u8],
        token: &AccessToken,
    ) -> Result<Task> {
        let body = TaskRequest::new(worker_id, public_key.to_vec())
            .encode()
            .map_err(ClientError::Encode)?;

        let request = HttpRequest::post(format!("{}/tasks", self.base_url))
            .bearer(token.as_str())
            .binary(body);
        let response = self.exchange(request).await?;

        let task = decode_task_response(&response.body).map_err(ClientError::Decode)?;
        if !task.has_id() {
            return Err(ClientError::MissingTaskId);
        }

        info!(
            worker_id,
            task_id = %task.task_id,
            program_id = %task.program_id,
            input_len = task.public_input.len(),
            "Fetched task"
        );
        Ok(task)
    }

    /// Submit an encoded proof payload
    pub async fn submit(&self, payload: Bytes, token: &AccessToken) -> Result<()> {
        let len = payload.len();
        let request = HttpRequest::post(format!("{}/tasks/submit", self.base_url))
            .bearer(token.as_str())
            .binary(payload);
        self.exchange(request).await?;

        debug!("Submitted proof payload ({} bytes)", len);
        Ok(())
    }

    /// Claim accumulated points; returns the response body as text
    pub async fn claim_points(&self, token: &AccessToken) -> Result<String> {
        let request = HttpRequest::post(format!("{}/points/claim", self.base_url))
            .bearer(token.as_str());
        let response = self.exchange(request).await?;
        Ok(response.text())
    }

    async fn exchange(&self, request: HttpRequest) -> Result<HttpResponse> {
        debug!("{} {}", request.method, request.url);
        let response = self.transport.send(request).await?;

        if response.is_success() {
            Ok(response)
        } else {
            Err(classify_response(response.status, &response.body))
        }
    }
}
