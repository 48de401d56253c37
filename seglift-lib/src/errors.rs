use crate::uploader::UploadPhase;
use thiserror::Error;

/// Substring with which storage nodes report that a file is already stored and finalized.
const ALREADY_FINALIZED_MARKER: &str = "already uploaded and finalized";

/// Substring with which storage nodes report write congestion, e.g. "too many concurrent writes".
const TOO_MANY_WRITES_MARKER: &str = "too many";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SegliftError {
    #[error("invalid segment layout: chunk size {0}B, {1} chunks per segment")]
    InvalidSegmentLayout(usize, usize),
    #[error("empty file can't be uploaded")]
    EmptyFile,
    #[error("failed to read file: {0}")]
    FileReadFailed(String),

    #[error("merkle tree needs at least one leaf")]
    EmptyMerkleTree,
    #[error("leaf {0} out of range, tree has {1} leaves")]
    LeafOutOfRange(usize, usize),
    #[error("failed to build merkle tree: {0}")]
    TreeConstructionFailed(String),
    #[error("failed to read segment {segment_index}: {reason}")]
    SegmentReadFailed { segment_index: usize, reason: String },

    #[error("failed to serialize submission: {0}")]
    SubmissionSerializationFailed(String),
    #[error("failed to deserialize submission: {0}")]
    SubmissionDeserializationFailed(String),
    #[error("submission failed: {0}")]
    SubmissionFailed(String),
    #[error("no ledger configured, can't submit file commitment")]
    LedgerUnavailable,
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("invalid shard config: shard id {0}, number of shards {1}")]
    InvalidShardConfig(usize, usize),
    #[error("insufficient replicas: required {required}, available {available}")]
    InsufficientReplicas { required: usize, available: usize },
    #[error("task size must be non-zero")]
    InvalidTaskSize,
    #[error("no storage nodes configured")]
    NoStorageNodes,
    #[error("upload task refers to unknown storage node {0}")]
    UnknownNodeIndex(usize),

    #[error("storage node {url}: {source}")]
    Node { url: String, source: NodeError },
    #[error("upload task to node {node} failed after {attempts} attempts: {last_error}")]
    UploadTaskFailed { node: String, attempts: usize, last_error: NodeError },

    #[error("gave up polling storage nodes after {0} attempts")]
    PollingExhausted(usize),
    #[error("operation cancelled")]
    Cancelled,
}

/// Failure reported by a storage node, classified once at the node client boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeError {
    /// The node already holds the data and has finalized it. Callers treat this as success.
    #[error("data already uploaded and finalized")]
    AlreadyFinalized,
    /// Congestion, empty acknowledgement or transport hiccup. Worth retrying.
    #[error("transient failure: {0}")]
    Transient(String),
    /// Anything else. Retrying won't help.
    #[error("{0}")]
    Permanent(String),
}

impl NodeError {
    /// Classifies an error message, as returned by a storage node.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lowercase = message.to_lowercase();

        if lowercase.contains(ALREADY_FINALIZED_MARKER) {
            NodeError::AlreadyFinalized
        } else if lowercase.contains(TOO_MANY_WRITES_MARKER) {
            NodeError::Transient(message)
        } else {
            NodeError::Permanent(message)
        }
    }

    pub fn empty_acknowledgement() -> Self {
        NodeError::Transient("empty acknowledgement".to_string())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, NodeError::Transient(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Transaction wasn't confirmed in time. The only error which escalates gas price.
    #[error("transaction timed out: {0}")]
    Timeout(String),
    #[error("transaction reverted: {0}")]
    Reverted(String),
    #[error("ledger rpc error: {0}")]
    Rpc(String),
}

/// The single terminal error of an upload, naming the phase in which it failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("upload failed while {phase}: {cause}")]
pub struct UploadFailure {
    pub phase: UploadPhase,
    #[source]
    pub cause: SegliftError,
}

impl UploadFailure {
    pub fn new(phase: UploadPhase, cause: SegliftError) -> Self {
        UploadFailure { phase, cause }
    }
}
