use crate::{
    consts::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_INTERVAL},
    errors::{NodeError, SegliftError},
    file::{FileTree, UploadFile},
    node::{NodeHandle, StorageNode},
    planner::UploadTask,
    segment::{SegmentWithProof, read_segment},
};
use futures::{StreamExt, stream::FuturesUnordered};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry behaviour for transient upload failures. Backoff grows linearly, i.e. `interval * attempt`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: DEFAULT_MAX_RETRIES,
            interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self, attempt: usize) -> Duration {
        self.interval.saturating_mul(u32::try_from(attempt).unwrap_or(u32::MAX))
    }
}

/// Reads the segments covered by `task`, stopping early past the end of the file.
fn collect_task_segments<F: UploadFile + ?Sized>(file: &F, tree: &FileTree, task: &UploadTask) -> Result<Vec<SegmentWithProof>, SegliftError> {
    let mut segments = Vec::with_capacity(task.task_size);

    for segment_index in task.segment_indices() {
        let Some(read) = read_segment(file, tree, segment_index)? else {
            break;
        };

        segments.push(read.segment);
        if read.all_data_uploaded {
            break;
        }
    }

    Ok(segments)
}

/// Uploads one batch of segments, retrying transient failures as per `policy`.
///
/// A node reporting the data as already finalized counts as success.
pub async fn upload_with_retry(node: &dyn StorageNode, segments: &[SegmentWithProof], tx_seq: u64, policy: &RetryPolicy) -> Result<(), SegliftError> {
    let mut attempt = 0;

    loop {
        attempt += 1;

        match node.upload_segments(segments, tx_seq).await {
            Ok(()) => return Ok(()),
            Err(NodeError::AlreadyFinalized) => {
                debug!("{} already finalized tx_seq {}, skipping remaining segments", node.url(), tx_seq);
                return Ok(());
            }
            Err(err @ NodeError::Transient(_)) if attempt > policy.max_retries => {
                return Err(SegliftError::UploadTaskFailed {
                    node: node.url().to_string(),
                    attempts: attempt,
                    last_error: err,
                });
            }
            Err(err @ NodeError::Transient(_)) => {
                let backoff = policy.backoff(attempt);
                warn!(
                    "upload of {} segments to {} failed (attempt {}/{}), retrying in {:?}: {}",
                    segments.len(),
                    node.url(),
                    attempt,
                    policy.max_retries + 1,
                    backoff,
                    err
                );

                tokio::time::sleep(backoff).await;
            }
            Err(err @ NodeError::Permanent(_)) => {
                return Err(SegliftError::Node {
                    url: node.url().to_string(),
                    source: err,
                });
            }
        }
    }
}

/// Reads and uploads all segments of one task.
pub async fn execute_task<F: UploadFile + ?Sized>(
    file: &F,
    tree: &FileTree,
    node: &dyn StorageNode,
    task: &UploadTask,
    policy: &RetryPolicy,
) -> Result<(), SegliftError> {
    let segments = collect_task_segments(file, tree, task)?;
    if segments.is_empty() {
        return Ok(());
    }

    debug!(
        "uploading segments {}..{} (step {}) of tx_seq {} to {}",
        task.segment_index,
        segments.last().map_or(task.segment_index, |segment| segment.index),
        task.num_shard,
        task.tx_seq,
        node.url()
    );

    upload_with_retry(node, &segments, task.tx_seq, policy).await
}

/// Runs `tasks` against `nodes`, keeping at most `routines` tasks in flight.
///
/// Stops starting new tasks as soon as one fails, lets the in-flight ones finish and
/// returns the first error.
pub async fn execute_tasks<F: UploadFile + ?Sized>(
    file: &F,
    tree: &FileTree,
    nodes: &[NodeHandle],
    tasks: &[UploadTask],
    policy: &RetryPolicy,
    routines: usize,
) -> Result<(), SegliftError> {
    if let Some(task) = tasks.iter().find(|task| task.node_index >= nodes.len()) {
        return Err(SegliftError::UnknownNodeIndex(task.node_index));
    }

    let routines = routines.max(1);
    let mut pending = tasks.iter();
    let mut in_flight = FuturesUnordered::new();
    let mut first_error = None;

    loop {
        while first_error.is_none() && in_flight.len() < routines {
            let Some(task) = pending.next() else {
                break;
            };

            let node = nodes[task.node_index].as_ref();
            in_flight.push(execute_task(file, tree, node, task, policy));
        }

        match in_flight.next().await {
            Some(Ok(())) => {}
            Some(Err(err)) => {
                warn!("upload task failed: {}", err);
                first_error.get_or_insert(err);
            }
            None => break,
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
