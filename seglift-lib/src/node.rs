use crate::{errors::NodeError, segment::SegmentWithProof, shard::ShardConfig};
use async_trait::async_trait;
use std::sync::Arc;

/// Record of a committed file, as known to a storage node. Keyed by the sequence number,
/// the ledger assigned to the file's submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    pub tx_seq: u64,
    /// Index of the first chunk of the file, in the flow of all chunks ever committed.
    pub start_entry_index: usize,
    /// Size of the file, in bytes.
    pub size: usize,
    pub finalized: bool,
    pub root: Option<blake3::Hash>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeStatus {
    /// Height of the latest ledger block, the node has synced its log with.
    pub log_sync_height: u64,
}

/// A storage node of the network.
///
/// Every failure is reported as an already classified `NodeError`, so that callers decide
/// about retrying without inspecting error messages.
#[async_trait]
pub trait StorageNode: Send + Sync {
    fn url(&self) -> &str;

    /// Looks up a file by its root hash. With `need_available`, only files whose data is available on the node are reported.
    async fn get_file_info(&self, root: blake3::Hash, need_available: bool) -> Result<Option<LogEntry>, NodeError>;

    async fn get_file_info_by_tx_seq(&self, tx_seq: u64) -> Result<Option<LogEntry>, NodeError>;

    async fn get_status(&self) -> Result<Option<NodeStatus>, NodeError>;

    async fn get_shard_config(&self) -> Result<ShardConfig, NodeError>;

    /// Uploads a batch of segments of the file committed with sequence number `tx_seq`.
    async fn upload_segments(&self, segments: &[SegmentWithProof], tx_seq: u64) -> Result<(), NodeError>;
}

pub type NodeHandle = Arc<dyn StorageNode>;
