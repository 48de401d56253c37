use crate::{
    consts::{DEFAULT_POLL_INTERVAL, DEFAULT_TASK_SIZE, DEFAULT_UPLOAD_ROUTINES},
    errors::{SegliftError, UploadFailure},
    executor::{RetryPolicy, execute_tasks},
    file::{FileTree, Submission, UploadFile},
    ledger::{LedgerHandle, ReceiptWait, TxOptions, TxReceipt, submit_with_gas_escalation},
    node::{LogEntry, NodeHandle},
    planner::{NodeTarget, UploadTask, plan_tasks},
};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};
use tokio_util::sync::CancellationToken;

/// Phases of one upload, in the order they are visited.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UploadPhase {
    PreparingTree,
    CheckingExistingFile,
    SubmittingTransaction,
    AwaitingLogEntry,
    PlanningTasks,
    UploadingSegments,
    AwaitingFinality,
    Done,
}

impl fmt::Display for UploadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            UploadPhase::PreparingTree => "preparing merkle tree",
            UploadPhase::CheckingExistingFile => "checking for existing file",
            UploadPhase::SubmittingTransaction => "submitting transaction",
            UploadPhase::AwaitingLogEntry => "awaiting log entry",
            UploadPhase::PlanningTasks => "planning upload tasks",
            UploadPhase::UploadingSegments => "uploading segments",
            UploadPhase::AwaitingFinality => "awaiting finality",
            UploadPhase::Done => "done",
        };

        f.write_str(phase)
    }
}

/// Knobs of one upload. Every field has a default, so partial JSON configs deserialize fine.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UploadOption {
    /// Opaque metadata committed along with the file.
    pub tags: Vec<u8>,
    /// Wait for storage nodes to finalize the file, before returning.
    pub finality_required: bool,
    /// Number of segments per upload task.
    pub task_size: usize,
    pub expected_replica: usize,
    /// Don't submit a new transaction, if storage nodes already know a file with the same root.
    pub skip_tx: bool,

    /// Storage fee override. Computed from the market price per sector, when unset.
    pub fee: Option<u128>,
    pub gas_price: Option<u128>,
    pub max_gas_price: Option<u128>,
    pub gas_limit: Option<u64>,
    pub nonce: Option<u64>,
    pub receipt: ReceiptWait,

    pub retry: RetryPolicy,
    /// Maximum number of upload tasks in flight.
    pub routines: usize,

    pub poll_interval: Duration,
    /// Gives up waiting for log entries after this many polls. Unbounded when unset.
    pub max_poll_attempts: Option<usize>,
}

impl Default for UploadOption {
    fn default() -> Self {
        UploadOption {
            tags: Vec::new(),
            finality_required: true,
            task_size: DEFAULT_TASK_SIZE,
            expected_replica: 1,
            skip_tx: true,
            fee: None,
            gas_price: None,
            max_gas_price: None,
            gas_limit: None,
            nonce: None,
            receipt: ReceiptWait::default(),
            retry: RetryPolicy::default(),
            routines: DEFAULT_UPLOAD_ROUTINES,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_poll_attempts: None,
        }
    }
}

/// Outcome of a successful upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadSummary {
    pub root: blake3::Hash,
    pub tx_seq: u64,
    /// Receipt of the submission transaction, `None` if an existing one was reused.
    pub receipt: Option<TxReceipt>,
    pub num_tasks: usize,
    /// Every phase visited, ending with `UploadPhase::Done`.
    pub phases: Vec<UploadPhase>,
}

/// Tracks the current phase, and tags errors with it.
struct PhaseTracker {
    phases: Vec<UploadPhase>,
}

impl PhaseTracker {
    fn new() -> Self {
        PhaseTracker { phases: Vec::new() }
    }

    fn enter(&mut self, phase: UploadPhase) {
        info!("upload: {}", phase);
        self.phases.push(phase);
    }

    fn current(&self) -> UploadPhase {
        self.phases.last().copied().unwrap_or(UploadPhase::PreparingTree)
    }

    fn fail(&self, cause: SegliftError) -> UploadFailure {
        UploadFailure::new(self.current(), cause)
    }
}

/// Uploads files to a fixed set of storage nodes, committing them through an optional ledger.
pub struct Uploader {
    nodes: Vec<NodeHandle>,
    ledger: Option<LedgerHandle>,
}

impl Uploader {
    pub fn new(nodes: Vec<NodeHandle>, ledger: Option<LedgerHandle>) -> Result<Self, SegliftError> {
        if nodes.is_empty() {
            return Err(SegliftError::NoStorageNodes);
        }

        Ok(Uploader { nodes, ledger })
    }

    pub fn get_nodes(&self) -> &[NodeHandle] {
        &self.nodes
    }

    /// Uploads `file`, driving it through every `UploadPhase`.
    ///
    /// Cancelling `cancel` interrupts waiting on storage nodes; segment uploads already started run to completion.
    pub async fn upload<F: UploadFile + ?Sized>(&self, file: &F, option: &UploadOption, cancel: &CancellationToken) -> Result<UploadSummary, UploadFailure> {
        let mut tracker = PhaseTracker::new();

        tracker.enter(UploadPhase::PreparingTree);
        let tree = file
            .merkle_tree()
            .map_err(|err| tracker.fail(SegliftError::TreeConstructionFailed(err.to_string())))?;
        info!("file of {}B, {} segments, root {}", file.size(), tree.get_num_segments(), tree.get_root());

        tracker.enter(UploadPhase::CheckingExistingFile);
        let existing = self.find_existing_file_info(tree.get_root()).await;

        let (tx_seq, receipt) = match existing {
            Some(entry) if option.skip_tx => {
                info!("file already committed with tx_seq {}, skipping transaction", entry.tx_seq);
                (entry.tx_seq, None)
            }
            _ => {
                tracker.enter(UploadPhase::SubmittingTransaction);
                let receipt = self.submit(file, &tree, option).await.map_err(|err| tracker.fail(err))?;
                let tx_seq = receipt
                    .tx_seqs
                    .first()
                    .copied()
                    .ok_or_else(|| tracker.fail(SegliftError::SubmissionFailed(format!("no sequence number in receipt of {}", receipt.tx_hash))))?;

                info!("transaction {} committed file with tx_seq {}", receipt.tx_hash, tx_seq);
                (tx_seq, Some(receipt))
            }
        };

        tracker.enter(UploadPhase::AwaitingLogEntry);
        let entries = self
            .wait_for_log_entry(tx_seq, false, receipt.as_ref(), option, cancel)
            .await
            .map_err(|err| tracker.fail(err))?;

        tracker.enter(UploadPhase::PlanningTasks);
        let tasks = self.plan(file, &entries, option).await.map_err(|err| tracker.fail(err))?;

        if tasks.is_empty() {
            info!("every storage node already holds tx_seq {}, nothing to upload", tx_seq);
        } else {
            tracker.enter(UploadPhase::UploadingSegments);
            execute_tasks(file, &tree, &self.nodes, &tasks, &option.retry, option.routines)
                .await
                .map_err(|err| tracker.fail(err))?;

            if option.finality_required {
                tracker.enter(UploadPhase::AwaitingFinality);
                self.wait_for_log_entry(tx_seq, true, receipt.as_ref(), option, cancel)
                    .await
                    .map_err(|err| tracker.fail(err))?;
            }
        }

        tracker.enter(UploadPhase::Done);
        Ok(UploadSummary {
            root: tree.get_root(),
            tx_seq,
            receipt,
            num_tasks: tasks.len(),
            phases: tracker.phases,
        })
    }

    /// Asks every node about a file with root `root`. First answer wins, failing nodes are ignored.
    pub async fn find_existing_file_info(&self, root: blake3::Hash) -> Option<LogEntry> {
        for node in &self.nodes {
            match node.get_file_info(root, false).await {
                Ok(Some(entry)) => return Some(entry),
                Ok(None) => debug!("{} doesn't know file {}", node.url(), root),
                Err(err) => warn!("failed to query file info of {} from {}: {}", root, node.url(), err),
            }
        }

        None
    }

    async fn submit<F: UploadFile + ?Sized>(&self, file: &F, tree: &FileTree, option: &UploadOption) -> Result<TxReceipt, SegliftError> {
        let ledger = self.ledger.as_deref().ok_or(SegliftError::LedgerUnavailable)?;
        let submission = Submission::new(file, tree, &option.tags)?;

        let fee = match option.fee {
            Some(fee) => fee,
            None => ledger.market_price_per_sector().await?.saturating_mul(submission.sectors()),
        };
        debug!("submitting {} sectors with fee {}", submission.sectors(), fee);

        let tx_options = TxOptions {
            gas_price: option.gas_price,
            gas_limit: option.gas_limit,
            fee,
            nonce: option.nonce,
        };

        let receipt = submit_with_gas_escalation(ledger, &submission, &tx_options, option.max_gas_price, &option.receipt).await?;
        if !receipt.success {
            return Err(SegliftError::SubmissionFailed(format!("transaction {} reverted", receipt.tx_hash)));
        }

        Ok(receipt)
    }

    /// Polls every node until all of them know `tx_seq`, and with `finality_required` have finalized it.
    ///
    /// Returns the entries, in node order.
    pub async fn wait_for_log_entry(
        &self,
        tx_seq: u64,
        finality_required: bool,
        receipt: Option<&TxReceipt>,
        option: &UploadOption,
        cancel: &CancellationToken,
    ) -> Result<Vec<LogEntry>, SegliftError> {
        let mut entries: Vec<Option<LogEntry>> = vec![None; self.nodes.len()];
        let mut attempts = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(SegliftError::Cancelled);
            }
            attempts += 1;

            for (node, slot) in self.nodes.iter().zip(entries.iter_mut()) {
                if slot.as_ref().is_some_and(|entry| entry.finalized || !finality_required) {
                    continue;
                }

                match node.get_file_info_by_tx_seq(tx_seq).await {
                    Ok(Some(entry)) if finality_required && !entry.finalized => {
                        debug!("{} has tx_seq {} but hasn't finalized it yet", node.url(), tx_seq);
                    }
                    Ok(Some(entry)) => *slot = Some(entry),
                    Ok(None) => self.log_sync_progress(node, tx_seq, receipt).await,
                    Err(err) => warn!("failed to query tx_seq {} from {}: {}", tx_seq, node.url(), err),
                }
            }

            if entries.iter().all(Option::is_some) {
                return Ok(entries.into_iter().flatten().collect());
            }

            if option.max_poll_attempts.is_some_and(|max_attempts| attempts >= max_attempts) {
                return Err(SegliftError::PollingExhausted(attempts));
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(SegliftError::Cancelled),
                _ = tokio::time::sleep(option.poll_interval) => {}
            }
        }
    }

    async fn log_sync_progress(&self, node: &NodeHandle, tx_seq: u64, receipt: Option<&TxReceipt>) {
        match (node.get_status().await, receipt) {
            (Ok(Some(status)), Some(receipt)) => debug!(
                "{} hasn't seen tx_seq {} yet, log synced up to block {}, transaction in block {}",
                node.url(),
                tx_seq,
                status.log_sync_height,
                receipt.block_number
            ),
            (Ok(Some(status)), None) => debug!("{} hasn't seen tx_seq {} yet, log synced up to block {}", node.url(), tx_seq, status.log_sync_height),
            (Ok(None), _) => debug!("{} hasn't seen tx_seq {} yet", node.url(), tx_seq),
            (Err(err), _) => warn!("failed to query status of {}: {}", node.url(), err),
        }
    }

    async fn plan<F: UploadFile + ?Sized>(&self, file: &F, entries: &[LogEntry], option: &UploadOption) -> Result<Vec<UploadTask>, SegliftError> {
        let Some(entry) = entries.first() else {
            return Err(SegliftError::NoStorageNodes);
        };

        let mut targets = Vec::with_capacity(self.nodes.len());
        for (node, node_entry) in self.nodes.iter().zip(entries) {
            let shard = node.get_shard_config().await.map_err(|source| SegliftError::Node {
                url: node.url().to_string(),
                source,
            })?;

            debug!("{} serves shard {}/{}", node.url(), shard.shard_id, shard.num_shard);
            targets.push(NodeTarget {
                shard,
                already_finalized: node_entry.finalized,
            });
        }

        let tasks = plan_tasks(&targets, entry, &file.layout(), option.task_size, option.expected_replica)?;
        info!("planned {} upload tasks over {} nodes", tasks.len(), self.nodes.len());

        Ok(tasks)
    }
}
