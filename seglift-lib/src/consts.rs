use std::time::Duration;

/// Fixed configuration for `bincode` serialization and deserialization.
pub const SEGLIFT_BINCODE_CONFIG: bincode::config::Configuration = bincode::config::standard();

/// Default size of a chunk, the smallest addressable unit of a file, in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 256;

/// Default maximum number of chunks packed into one segment, the unit of upload transfer.
pub const DEFAULT_SEGMENT_MAX_CHUNKS: usize = 1024;

/// Default number of segments uploaded to a storage node in one batch.
pub const DEFAULT_TASK_SIZE: usize = 10;

/// Default number of retries for a transiently failing segment upload.
pub const DEFAULT_MAX_RETRIES: usize = 3;

/// Default base interval of the linear retry backoff.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(3);

/// Interval between two polls of storage nodes, while waiting for a log entry or its finality.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Number of times a transaction receipt is looked up, before declaring the transaction timed out.
pub const DEFAULT_RECEIPT_RETRIES: usize = 30;

/// Interval between two transaction receipt lookups.
pub const DEFAULT_RECEIPT_INTERVAL: Duration = Duration::from_secs(1);

/// Default number of upload tasks running concurrently.
pub const DEFAULT_UPLOAD_ROUTINES: usize = 16;

/// Gas price is multiplied by `GAS_ESCALATION_NUMERATOR / GAS_ESCALATION_DENOMINATOR`, after each transaction timeout.
pub const GAS_ESCALATION_NUMERATOR: u128 = 11;
pub const GAS_ESCALATION_DENOMINATOR: u128 = 10;

/// Upper bound on the least common multiple of shard counts, a replica check is willing to inspect.
pub const MAX_SHARD_PERIOD: usize = 1 << 20;
