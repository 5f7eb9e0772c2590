use serde::{Deserialize, Serialize};

/// Kind of prover announcing itself to the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum NodeType {
    /// Browser-class prover, the only kind this worker reports as
    WebProver = 0,
    CliProver = 1,
}

impl NodeType {
    pub fn as_u32(&self) -> u32 {
        *self as u32
    }

    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(NodeType::WebProver),
            1 => Some(NodeType::CliProver),
            _ => None,
        }
    }
}

impl Default for NodeType {
    fn default() -> Self {
        NodeType::WebProver
    }
}

/// One unit of assigned work, as decoded from a fetch response
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Task {
    /// Orchestrator-assigned task identifier
    pub task_id: String,

    /// Program the public input belongs to (e.g., "fib_input_initial")
    pub program_id: String,

    /// Opaque public input bytes
    pub public_input: Vec<u8>,
}

impl Task {
    pub fn new(
        task_id: impl Into<String>,
        program_id: impl Into<String>,
        public_input: Vec<u8>,
    ) -> Self {
        Task {
            task_id: task_id.into(),
            program_id: program_id.into(),
            public_input,
        }
    }

    /// A task without an id cannot be submitted against
    pub fn has_id(&self) -> bool {
        !self.task_id.is_empty()
    }
}

/// Computed result submitted back for a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Short hex digest identifying the artifact bytes
    pub hash: String,

    /// Artifact payload
    pub bytes: Vec<u8>,

    /// Units of work the computation reports (blocks)
    pub unit_count: u64,

    /// Cycles the computation reports
    pub cycle_count: u64,
}

impl Artifact {
    pub fn new(hash: impl Into<String>, bytes: Vec<u8>, unit_count: u64, cycle_count: u64) -> Self {
        Artifact {
            hash: hash.into(),
            bytes,
            unit_count,
            cycle_count,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_type_conversion() {
        assert_eq!(NodeType::WebProver.as_u32(), 0);
        assert_eq!(NodeType::from_u32(1), Some(NodeType::CliProver));
        assert_eq!(NodeType::from_u32(9), None);
        assert_eq!(NodeType::default(), NodeType::WebProver);
    }

    #[test]
    fn test_task_has_id() {
        let task = Task::new("t-1", "fib_input_initial", vec![1, 0, 0, 0]);
        assert!(task.has_id());
        assert!(!Task::default().has_id());
    }

    #[test]
    fn test_artifact_len() {
        let artifact = Artifact::new("abcd1234", vec![0u8; 128], 10, 55);
        assert_eq!(artifact.len(), 128);
        assert!(!artifact.is_empty());
    }
}
