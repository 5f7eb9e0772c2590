use crate::wire::{put_bytes_field, put_short_bytes_field, put_string_field, put_varint_field};
use crate::Result;
use bytes::{BufMut, Bytes, BytesMut};
use prover_core::{Artifact, NodeType, Task};

/// Request for a new proving task
///
/// Wire layout: 1 worker id (string), 2 node type (varint), 3 public key (bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRequest {
    pub worker_id: String,
    pub node_type: NodeType,
    pub public_key: Vec<u8>,
}

impl TaskRequest {
    pub fn new(worker_id: impl Into<String>, public_key: Vec<u8>) -> Self {
        TaskRequest {
            worker_id: worker_id.into(),
            node_type: NodeType::WebProver,
            public_key,
        }
    }

    /// Encode with single-byte length prefixes; longer fields are an error
    pub fn encode(&self) -> Result<Bytes> {
        let mut dst = BytesMut::with_capacity(6 + self.worker_id.len() + self.public_key.len());

        put_short_bytes_field(&mut dst, 1, self.worker_id.as_bytes())?;
        // Node type codes are all below 0x80, so the raw byte is the varint.
        dst.put_u8(crate::field_tag(2, crate::WireType::Varint) as u8);
        dst.put_u8(self.node_type.as_u32() as u8);
        put_short_bytes_field(&mut dst, 3, &self.public_key)?;

        Ok(dst.freeze())
    }
}

/// Telemetry record nested inside a submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeTelemetry {
    pub flops_per_sec: u32,
    pub memory_used: u32,
    pub memory_capacity: u32,
    pub location: String,
}

impl Default for NodeTelemetry {
    fn default() -> Self {
        NodeTelemetry {
            flops_per_sec: 1000,
            memory_used: 1,
            memory_capacity: 1,
            location: "US".to_string(),
        }
    }
}

impl NodeTelemetry {
    fn encode_into(&self, dst: &mut BytesMut) {
        put_varint_field(dst, 1, self.flops_per_sec as u64);
        put_varint_field(dst, 2, self.memory_used as u64);
        put_varint_field(dst, 3, self.memory_capacity as u64);
        put_string_field(dst, 4, &self.location);
    }
}

/// Proof submission for a completed task
///
/// Field numbers and order are fixed by the orchestrator and must not change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitProofRequest {
    pub worker_id: String,
    pub node_type: NodeType,
    pub proof_hash: String,
    pub telemetry: NodeTelemetry,
    pub proof: Vec<u8>,
    pub task_id: String,
    pub public_key: Vec<u8>,
    pub signature: Vec<u8>,
}

impl SubmitProofRequest {
    pub fn new(
        worker_id: impl Into<String>,
        task: &Task,
        artifact: &Artifact,
        telemetry: NodeTelemetry,
        public_key: Vec<u8>,
        signature: Vec<u8>,
    ) -> Self {
        SubmitProofRequest {
            worker_id: worker_id.into(),
            node_type: NodeType::WebProver,
            proof_hash: artifact.hash.clone(),
            telemetry,
            proof: artifact.bytes.clone(),
            task_id: task.task_id.clone(),
            public_key,
            signature,
        }
    }

    /// Statement the node key signs: `"{node_type} | {task_id} | {proof_hash}"`
    pub fn signing_message(node_type: NodeType, task_id: &str, proof_hash: &str) -> String {
        format!("{} | {} | {}", node_type.as_u32(), task_id, proof_hash)
    }

    pub fn encode(&self) -> Bytes {
        let mut telemetry = BytesMut::new();
        self.telemetry.encode_into(&mut telemetry);

        let mut dst = BytesMut::with_capacity(64 + self.proof.len() + telemetry.len());
        put_string_field(&mut dst, 1, &self.worker_id);
        put_varint_field(&mut dst, 2, self.node_type.as_u32() as u64);
        put_string_field(&mut dst, 3, &self.proof_hash);
        put_bytes_field(&mut dst, 4, &telemetry);
        put_bytes_field(&mut dst, 5, &self.proof);
        put_string_field(&mut dst, 6, &self.task_id);
        put_bytes_field(&mut dst, 7, &self.public_key);
        put_bytes_field(&mut dst, 8, &self.signature);
        dst.freeze()
    }
}
