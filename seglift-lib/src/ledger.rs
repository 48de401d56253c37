use crate::{
    consts::{DEFAULT_RECEIPT_INTERVAL, DEFAULT_RECEIPT_RETRIES, GAS_ESCALATION_DENOMINATOR, GAS_ESCALATION_NUMERATOR},
    errors::LedgerError,
    file::Submission,
};
use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TxOptions {
    /// Gas price to bid. Left unset, the ledger's suggestion is used.
    pub gas_price: Option<u128>,
    pub gas_limit: Option<u64>,
    /// Storage fee paid along with the submission.
    pub fee: u128,
    pub nonce: Option<u64>,
}

/// Ledger confirmed result of a submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: String,
    pub block_number: u64,
    pub success: bool,
    /// Sequence numbers assigned to submissions of this transaction, parsed from its emitted logs.
    pub tx_seqs: Vec<u64>,
}

/// How long to wait for a transaction receipt: `retries` lookups, `interval` apart.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReceiptWait {
    pub retries: usize,
    pub interval: Duration,
}

impl Default for ReceiptWait {
    fn default() -> Self {
        ReceiptWait {
            retries: DEFAULT_RECEIPT_RETRIES,
            interval: DEFAULT_RECEIPT_INTERVAL,
        }
    }
}

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Broadcasts a transaction carrying `submission`, returning its hash.
    async fn send_submission(&self, submission: &Submission, options: &TxOptions) -> Result<String, LedgerError>;

    /// Looks up the receipt of transaction `tx_hash`.
    ///
    /// # Returns
    ///
    /// * `Result<Option<TxReceipt>, LedgerError>` - `None` while the transaction isn't mined yet.
    async fn get_transaction_receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>, LedgerError>;

    /// Current storage fee of one sector.
    async fn market_price_per_sector(&self) -> Result<u128, LedgerError>;

    async fn suggested_gas_price(&self) -> Result<u128, LedgerError>;

    /// Sends `submission` and waits for its receipt. Fails with `LedgerError::Timeout` if the receipt doesn't show up in time.
    async fn submit(&self, submission: &Submission, options: &TxOptions, wait: &ReceiptWait) -> Result<TxReceipt, LedgerError> {
        let tx_hash = self.send_submission(submission, options).await?;
        wait_for_receipt(self, &tx_hash, wait).await
    }
}

pub type LedgerHandle = Arc<dyn Ledger>;

/// Polls the receipt of transaction `tx_hash`, up to `wait.retries` times, `wait.interval` apart.
///
/// Lookup errors are logged and polling goes on.
///
/// # Arguments
///
/// * `ledger` - Ledger the transaction was sent to.
/// * `tx_hash` - Hash of the transaction.
/// * `wait` - How many lookups, and how far apart.
///
/// # Returns
///
/// * `Result<TxReceipt, LedgerError>` - The receipt, or `LedgerError::Timeout` if no lookup found one.
pub async fn wait_for_receipt<L: Ledger + ?Sized>(ledger: &L, tx_hash: &str, wait: &ReceiptWait) -> Result<TxReceipt, LedgerError> {
    for attempt in 1..=wait.retries {
        match ledger.get_transaction_receipt(tx_hash).await {
            Ok(Some(receipt)) => return Ok(receipt),
            Ok(None) => debug!("receipt of transaction {} not available yet (attempt {}/{})", tx_hash, attempt, wait.retries),
            Err(err) => warn!("failed to look up receipt of transaction {} (attempt {}/{}): {}", tx_hash, attempt, wait.retries, err),
        }

        if attempt < wait.retries {
            tokio::time::sleep(wait.interval).await;
        }
    }

    Err(LedgerError::Timeout(format!("no receipt for transaction {} after {} lookups", tx_hash, wait.retries)))
}

/// Next gas price to bid, after a timeout: 10% more, at least one unit more.
pub fn escalate_gas_price(gas_price: u128) -> u128 {
    (gas_price.saturating_mul(GAS_ESCALATION_NUMERATOR) / GAS_ESCALATION_DENOMINATOR).max(gas_price.saturating_add(1))
}

/// Submits with geometrically increasing gas price, as long as submissions time out.
///
/// Starts at `options.gas_price`, or the ledger's suggestion if unset. Bids never exceed `max_gas_price`;
/// a timeout at the maximum bid is returned to the caller. Any other error aborts immediately.
///
/// # Arguments
///
/// * `ledger` - Ledger to submit to.
/// * `submission` - Commitment to the file being uploaded.
/// * `options` - Transaction options; its `gas_price` is only the starting bid.
/// * `max_gas_price` - Upper bound of any bid. Unbounded when `None`.
/// * `wait` - How long to wait for the receipt of each bid.
///
/// # Returns
///
/// * `Result<TxReceipt, LedgerError>` - Receipt of the first bid confirmed in time.
pub async fn submit_with_gas_escalation<L: Ledger + ?Sized>(
    ledger: &L,
    submission: &Submission,
    options: &TxOptions,
    max_gas_price: Option<u128>,
    wait: &ReceiptWait,
) -> Result<TxReceipt, LedgerError> {
    let mut gas_price = match options.gas_price {
        Some(gas_price) => gas_price,
        None => ledger.suggested_gas_price().await?,
    };
    if let Some(max_gas_price) = max_gas_price {
        gas_price = gas_price.min(max_gas_price);
    }

    loop {
        let attempt = TxOptions {
            gas_price: Some(gas_price),
            ..options.clone()
        };

        match ledger.submit(submission, &attempt, wait).await {
            Err(LedgerError::Timeout(reason)) => {
                let next_gas_price = match max_gas_price {
                    Some(max_gas_price) if gas_price >= max_gas_price => return Err(LedgerError::Timeout(reason)),
                    Some(max_gas_price) => escalate_gas_price(gas_price).min(max_gas_price),
                    None => escalate_gas_price(gas_price),
                };

                warn!("submission timed out at gas price {}, retrying with {}: {}", gas_price, next_gas_price, reason);
                gas_price = next_gas_price;
            }
            result => return result,
        }
    }
}
