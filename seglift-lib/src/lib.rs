//! # Seglift-lib: Segmented, Shard-Aware File Uploads
//!
//! `seglift-lib` uploads arbitrary size files into a replicated, sharded storage network. A file is split into
//! fixed-size segments, committed on a ledger by the root of a BLAKE3 binary Merkle tree built over them, and then
//! pushed to storage nodes segment batch by segment batch, each node receiving only the segments of its shard.
//!
//! ## How to Use
//!
//! ### 1. Commit to a File
//!
//! Wrap your bytes in an `InMemoryFile` (or open a `DiskFile`), then build its Merkle tree and the submission
//! which commits to its content.
//!
//! ```rust
//! use seglift_lib::{InMemoryFile, SegmentLayout, UploadFile};
//! use rand::Rng;
//!
//! let mut rng = rand::rng();
//! let data: Vec<u8> = (0..1024 * 1024).map(|_| rng.random()).collect(); // 1MB of random data
//!
//! let file = InMemoryFile::new(data, SegmentLayout::default()).expect("Failed to wrap file");
//! let tree = file.merkle_tree().expect("Failed to build merkle tree");
//! let submission = file.create_submission(&[]).expect("Failed to create submission");
//!
//! assert_eq!(tree.get_root(), submission.get_root());
//! println!("{} segments, {} sectors, root {}", file.num_segments(), submission.sectors(), tree.get_root());
//! ```
//!
//! ### 2. Plan Upload Tasks
//!
//! Given the shard configuration of every storage node and the log entry of a committed file, `plan_tasks`
//! splits segments into per-node batches, interleaved round-robin across nodes.
//!
//! ```rust
//! use seglift_lib::{LogEntry, NodeTarget, SegmentLayout, ShardConfig, plan_tasks};
//!
//! let layout = SegmentLayout::default();
//! let targets = [
//!     NodeTarget { shard: ShardConfig::new(0, 2).unwrap(), already_finalized: false },
//!     NodeTarget { shard: ShardConfig::new(1, 2).unwrap(), already_finalized: false },
//! ];
//! let entry = LogEntry { tx_seq: 1, start_entry_index: 0, size: 10 * layout.get_segment_size(), finalized: false, root: None };
//!
//! let tasks = plan_tasks(&targets, &entry, &layout, 5, 1).expect("Failed to plan tasks");
//! assert_eq!(tasks.len(), 2);
//! ```
//!
//! ### 3. Upload
//!
//! An `Uploader` drives the whole flow: existence check, optional ledger submission, waiting for storage nodes
//! to pick up the log entry, parallel segment upload with retries and, finally, waiting for finality.
//!
//! ```rust,no_run
//! use seglift_lib::{DiskFile, NodeHandle, RpcNodeClient, SegmentLayout, UploadOption, Uploader};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let nodes: Vec<NodeHandle> = vec![Arc::new(RpcNodeClient::new("http://127.0.0.1:5678")?)];
//! let uploader = Uploader::new(nodes, None)?;
//!
//! let file = DiskFile::open("data.bin", SegmentLayout::default())?;
//! let summary = uploader.upload(&file, &UploadOption::default(), &CancellationToken::new()).await?;
//!
//! println!("uploaded tx_seq {} with {} tasks", summary.tx_seq, summary.num_tasks);
//! # Ok(())
//! # }
//! ```

mod consts;
mod errors;
mod executor;
mod file;
mod layout;
mod ledger;
mod merkle_tree;
mod node;
mod planner;
mod rpc;
mod segment;
mod shard;
mod uploader;
mod utils;


pub use consts::{DEFAULT_CHUNK_SIZE, DEFAULT_SEGMENT_MAX_CHUNKS, DEFAULT_TASK_SIZE, DEFAULT_UPLOAD_ROUTINES};
pub use errors::{LedgerError, NodeError, SegliftError, UploadFailure};
pub use executor::{RetryPolicy, execute_task, execute_tasks, upload_with_retry};
pub use file::{DiskFile, FileTree, InMemoryFile, Submission, SubmissionNode, UploadFile, WindowIter};
pub use layout::{SegmentLayout, next_shard_segment_index, split_count};
pub use ledger::{Ledger, LedgerHandle, ReceiptWait, TxOptions, TxReceipt, escalate_gas_price, submit_with_gas_escalation, wait_for_receipt};
pub use node::{LogEntry, NodeHandle, NodeStatus, StorageNode};
pub use planner::{NodeTarget, UploadTask, interleave, plan_tasks};
pub use rpc::RpcNodeClient;
pub use segment::{ReadSegment, SegmentWithProof, read_segment};
pub use shard::{ShardConfig, check_replica, replica_count};
pub use uploader::{UploadOption, UploadPhase, UploadSummary, Uploader};
pub use utils::format_bytes;
