use crate::Result;
use async_trait::async_trait;
use prover_core::{Artifact, Task};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Produces a result artifact for a fetched task
#[async_trait]
pub trait ProofComputer: Send + Sync {
    async fn compute(&self, task: &Task) -> Result<Artifact>;
}

/// Program marker that may precede the Fibonacci parameter in the input
pub const FIB_MARKER: &[u8] = b"fib_input_initial";

const MAGIC: &[u8] = b"NEXUS_PROOF";
const VERSION: u32 = 1;
pub const ARTIFACT_LEN: usize = 128;
const FALLBACK_LEN: usize = 64;
const FALLBACK_UNITS: u64 = 1000;
const FALLBACK_CYCLES: u64 = 500;
const MAX_CYCLES: u64 = 1_000_000;

/// Fixed-shape placeholder artifact builder.
///
/// Layout (little-endian):
///
/// | offset | len | content                         |
/// |--------|-----|---------------------------------|
/// | 0      | 12  | magic, zero padded              |
/// | 12     | 4   | version                         |
/// | 16     | 16  | program hash fragment           |
/// | 32     | 4   | n                               |
/// | 36     | 4   | fib(n), saturated               |
/// | 40     | 4   | timestamp millis, low 32 bits   |
/// | 44     | 4   | random nonce                    |
/// | 48     | 4   | unit count                      |
/// | 52     | 4   | cycle count                     |
/// | 56     | 72  | random filler                   |
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderProver;

impl PlaceholderProver {
    pub fn new() -> Self {
        PlaceholderProver
    }

    pub fn build(&self, public_input: &[u8]) -> Artifact {
        match fib_parameter(public_input) {
            Some(n) => fib_artifact(n),
            None => fallback_artifact(),
        }
    }
}

#[async_trait]
impl ProofComputer for PlaceholderProver {
    async fn compute(&self, task: &Task) -> Result<Artifact> {
        Ok(self.build(&task.public_input))
    }
}

/// First 8 bytes of the SHA-256 digest, hex encoded
pub fn artifact_hash(bytes: &[u8]) -> String {
    hex::encode(&Sha256::digest(bytes)[..8])
}

fn fib_parameter(input: &[u8]) -> Option<u32> {
    let tail = match find(input, FIB_MARKER) {
        Some(pos) => &input[pos + FIB_MARKER.len()..],
        None => input,
    };
    let bytes: [u8; 4] = tail.get(..4)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// fib with fib(0) = fib(1) = 1, saturating at `u64::MAX`
pub fn fib(n: u32) -> u64 {
    let (mut a, mut b) = (0u64, 1u64);
    for _ in 2..=n {
        let next = a.saturating_add(b);
        a = b;
        b = next;
        if b == u64::MAX {
            break;
        }
    }
    b
}

fn fib_artifact(n: u32) -> Artifact {
    let result = fib(n);
    let cycles = result.min(MAX_CYCLES);
    let mut rng = rand::thread_rng();
    let mut bytes = vec![0u8; ARTIFACT_LEN];

    bytes[..MAGIC.len()].copy_from_slice(MAGIC);
    bytes[12..16].copy_from_slice(&VERSION.to_le_bytes());
    bytes[16..32].copy_from_slice(&Sha256::digest(FIB_MARKER)[..16]);
    bytes[32..36].copy_from_slice(&n.to_le_bytes());
    bytes[36..40].copy_from_slice(&(result.min(u32::MAX as u64) as u32).to_le_bytes());
    let millis = chrono::Utc::now().timestamp_millis() as u32;
    bytes[40..44].copy_from_slice(&millis.to_le_bytes());
    bytes[44..48].copy_from_slice(&rng.next_u32().to_le_bytes());
    bytes[48..52].copy_from_slice(&n.to_le_bytes());
    bytes[52..56].copy_from_slice(&(cycles as u32).to_le_bytes());
    rng.fill_bytes(&mut bytes[56..]);

    Artifact::new(artifact_hash(&bytes), bytes, n as u64, cycles)
}

fn fallback_artifact() -> Artifact {
    let mut bytes = vec![0u8; FALLBACK_LEN];
    rand::thread_rng().fill_bytes(&mut bytes);
    Artifact::new(artifact_hash(&bytes), bytes, FALLBACK_UNITS, FALLBACK_CYCLES)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn le(bytes: &[u8], at: usize) -> u32 {
        u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
    }

    #[test]
    fn test_fib_values() {
        assert_eq!(fib(0), 1);
        assert_eq!(fib(1), 1);
        assert_eq!(fib(2), 1);
        assert_eq!(fib(10), 55);
        assert_eq!(fib(u32::MAX), u64::MAX);
    }

    #[test]
    fn test_marker_input_layout() {
        let mut input = b"xxfib_input_initial".to_vec();
        input.extend_from_slice(&10u32.to_le_bytes());

        let artifact = PlaceholderProver.build(&input);
        let bytes = &artifact.bytes;
        assert_eq!(bytes.len(), ARTIFACT_LEN);
        assert_eq!(&bytes[..11], b"NEXUS_PROOF");
        assert_eq!(bytes[11], 0);
        assert_eq!(le(bytes, 12), 1);
        assert_eq!(le(bytes, 32), 10);
        assert_eq!(le(bytes, 36), 55);
        assert_eq!(le(bytes, 48), 10);
        assert_eq!(le(bytes, 52), 55);
        assert_eq!(artifact.unit_count, 10);
        assert_eq!(artifact.cycle_count, 55);
        assert_eq!(artifact.hash, artifact_hash(bytes));
        assert_eq!(artifact.hash.len(), 16);
    }

    #[test]
    fn test_plain_input_uses_first_four_bytes() {
        let artifact = PlaceholderProver.build(&[5, 0, 0, 0, 0xFF]);
        assert_eq!(artifact.len(), ARTIFACT_LEN);
        assert_eq!(artifact.unit_count, 5);
        assert_eq!(artifact.cycle_count, 5);
    }

    #[test]
    fn test_large_n_caps_cycles() {
        let artifact = PlaceholderProver.build(&200u32.to_le_bytes());
        assert_eq!(artifact.cycle_count, MAX_CYCLES);
        assert_eq!(le(&artifact.bytes, 36), u32::MAX);
    }

    #[test]
    fn test_short_input_falls_back() {
        let artifact = PlaceholderProver.build(&[1, 2]);
        assert_eq!(artifact.len(), FALLBACK_LEN);
        assert_eq!(artifact.unit_count, FALLBACK_UNITS);
        assert_eq!(artifact.cycle_count, FALLBACK_CYCLES);

        // Marker present but too few trailing bytes
        let artifact = PlaceholderProver.build(b"fib_input_initial\x01");
        assert_eq!(artifact.len(), FALLBACK_LEN);
    }

    #[tokio::test]
    async fn test_compute_trait() {
        let task = Task::new("t1", "p", 3u32.to_le_bytes().to_vec());
        let artifact = PlaceholderProver::new().compute(&task).await.unwrap();
        assert_eq!(artifact.unit_count, 3);
    }
}
