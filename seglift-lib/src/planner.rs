use crate::{
    errors::SegliftError,
    layout::SegmentLayout,
    node::LogEntry,
    shard::{ShardConfig, check_replica},
};

/// Batch of segments to be uploaded to one storage node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UploadTask {
    /// Index of the target node, in the node list the plan was made for.
    pub node_index: usize,
    /// First segment of the batch, relative to the first segment of the file.
    pub segment_index: usize,
    /// Distance between two consecutive segments of the batch.
    pub num_shard: usize,
    /// Number of segments in the batch.
    pub task_size: usize,
    pub tx_seq: u64,
}

impl UploadTask {
    /// File relative indices of segments, covered by this task.
    pub fn segment_indices(&self) -> impl Iterator<Item = usize> + use<> {
        let (from, step) = (self.segment_index, self.num_shard.max(1));
        (0..self.task_size).map(move |i| from + i * step)
    }
}

/// What the planner needs to know about one storage node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeTarget {
    pub shard: ShardConfig,
    /// The node reported the file as finalized, so there's nothing left to upload to it.
    pub already_finalized: bool,
}

/// Splits the segments of the file described by `entry` into upload tasks of at most `task_size`
/// segments, one set per node, each node receiving only the segments of its own shard.
///
/// Per-node task lists are merged round-robin, preserving per-node order. An empty plan means
/// every node has already finalized the file.
pub fn plan_tasks(
    targets: &[NodeTarget],
    entry: &LogEntry,
    layout: &SegmentLayout,
    task_size: usize,
    expected_replica: usize,
) -> Result<Vec<UploadTask>, SegliftError> {
    if task_size == 0 {
        return Err(SegliftError::InvalidTaskSize);
    }

    let shards = targets.iter().map(|target| target.shard).collect::<Vec<ShardConfig>>();
    check_replica(&shards, expected_replica)?;

    let (start_segment_index, end_segment_index) = layout.segment_range(entry.start_entry_index, entry.size);

    let per_node_tasks = targets
        .iter()
        .enumerate()
        .filter(|(_, target)| !target.already_finalized)
        .map(|(node_index, target)| {
            let num_shard = target.shard.num_shard;
            let mut tasks = Vec::new();

            let mut segment_index = target.shard.next_segment_index(start_segment_index);
            while segment_index <= end_segment_index {
                let remaining = (end_segment_index - segment_index) / num_shard + 1;

                tasks.push(UploadTask {
                    node_index,
                    segment_index: segment_index - start_segment_index,
                    num_shard,
                    task_size: remaining.min(task_size),
                    tx_seq: entry.tx_seq,
                });

                match num_shard.checked_mul(task_size).and_then(|stride| segment_index.checked_add(stride)) {
                    Some(next) => segment_index = next,
                    None => break,
                }
            }

            tasks
        })
        .collect::<Vec<Vec<UploadTask>>>();

    Ok(interleave(per_node_tasks))
}

/// Round-robin merge: first item of every list, then second item of every list, and so on.
pub fn interleave<T>(lists: Vec<Vec<T>>) -> Vec<T> {
    let total = lists.iter().map(Vec::len).sum();
    let mut iters = lists.into_iter().map(Vec::into_iter).collect::<Vec<_>>();

    let mut merged = Vec::with_capacity(total);
    while merged.len() < total {
        iters.iter_mut().filter_map(Iterator::next).for_each(|item| merged.push(item));
    }

    merged
}
