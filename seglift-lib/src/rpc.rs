use crate::{
    errors::NodeError,
    node::{LogEntry, NodeStatus, StorageNode},
    segment::SegmentWithProof,
    shard::ShardConfig,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

const RPC_METHOD_PREFIX: &str = "seglift";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

fn hash_to_hex(hash: &blake3::Hash) -> String {
    const_hex::encode_prefixed(hash.as_bytes())
}

fn hash_from_hex(hex: &str) -> Result<blake3::Hash, NodeError> {
    const_hex::decode_to_array::<_, { blake3::OUT_LEN }>(hex.strip_prefix("0x").unwrap_or(hex))
        .map(blake3::Hash::from_bytes)
        .map_err(|err| NodeError::Permanent(format!("malformed hash {}: {}", hex, err)))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SegmentWire<'a> {
    root: String,
    data: &'a str,
    index: usize,
    proof: Vec<String>,
    file_size: usize,
}

impl<'a> From<&'a SegmentWithProof> for SegmentWire<'a> {
    fn from(segment: &'a SegmentWithProof) -> Self {
        SegmentWire {
            root: hash_to_hex(&segment.root),
            data: &segment.data,
            index: segment.index,
            proof: segment.proof.iter().map(hash_to_hex).collect(),
            file_size: segment.file_size,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileInfoWire {
    tx_seq: u64,
    start_entry_index: usize,
    size: usize,
    finalized: bool,
    root: Option<String>,
}

impl TryFrom<FileInfoWire> for LogEntry {
    type Error = NodeError;

    fn try_from(wire: FileInfoWire) -> Result<Self, Self::Error> {
        Ok(LogEntry {
            tx_seq: wire.tx_seq,
            start_entry_index: wire.start_entry_index,
            size: wire.size,
            finalized: wire.finalized,
            root: wire.root.as_deref().map(hash_from_hex).transpose()?,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusWire {
    log_sync_height: u64,
}

#[derive(Deserialize)]
struct RpcErrorWire {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct RpcResponseWire {
    result: Option<Value>,
    error: Option<RpcErrorWire>,
}

/// Transport level failures are worth retrying, when they look like congestion or a flaky connection.
fn classify_transport_error(err: reqwest::Error) -> NodeError {
    let congested = err.status().is_some_and(|status| status.as_u16() == 429 || status.is_server_error());

    if err.is_timeout() || err.is_connect() || congested {
        NodeError::Transient(err.to_string())
    } else {
        NodeError::Permanent(err.to_string())
    }
}

/// Storage node client speaking JSON-RPC 2.0 over HTTP.
pub struct RpcNodeClient {
    url: String,
    http: reqwest::Client,
    next_request_id: AtomicU64,
}

impl RpcNodeClient {
    pub fn new(url: impl Into<String>) -> Result<Self, NodeError> {
        Self::with_timeout(url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self, NodeError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| NodeError::Permanent(err.to_string()))?;

        Ok(RpcNodeClient {
            url: url.into(),
            http,
            next_request_id: AtomicU64::new(1),
        })
    }

    /// Calls `method` and returns its raw result, `None` if the node answered with `null`.
    async fn call_raw(&self, method: &str, params: Value) -> Result<Option<Value>, NodeError> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": self.next_request_id.fetch_add(1, Ordering::Relaxed),
            "method": format!("{}_{}", RPC_METHOD_PREFIX, method),
            "params": params,
        });

        let response = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(classify_transport_error)?;

        let response = response.json::<RpcResponseWire>().await.map_err(classify_transport_error)?;
        if let Some(err) = response.error {
            log::debug!("{} answered {} with error {}: {}", self.url, method, err.code, err.message);
            return Err(NodeError::classify(err.message));
        }

        Ok(response.result.filter(|result| !result.is_null()))
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<Option<T>, NodeError> {
        self.call_raw(method, params)
            .await?
            .map(|result| serde_json::from_value::<T>(result).map_err(|err| NodeError::Permanent(format!("malformed {} response: {}", method, err))))
            .transpose()
    }
}

#[async_trait]
impl StorageNode for RpcNodeClient {
    fn url(&self) -> &str {
        &self.url
    }

    async fn get_file_info(&self, root: blake3::Hash, need_available: bool) -> Result<Option<LogEntry>, NodeError> {
        self.call::<FileInfoWire>("getFileInfo", json!([hash_to_hex(&root), need_available]))
            .await?
            .map(LogEntry::try_from)
            .transpose()
    }

    async fn get_file_info_by_tx_seq(&self, tx_seq: u64) -> Result<Option<LogEntry>, NodeError> {
        self.call::<FileInfoWire>("getFileInfoByTxSeq", json!([tx_seq]))
            .await?
            .map(LogEntry::try_from)
            .transpose()
    }

    async fn get_status(&self) -> Result<Option<NodeStatus>, NodeError> {
        Ok(self.call::<StatusWire>("getStatus", json!([])).await?.map(|status| NodeStatus {
            log_sync_height: status.log_sync_height,
        }))
    }

    async fn get_shard_config(&self) -> Result<ShardConfig, NodeError> {
        let config = self
            .call::<ShardConfig>("getShardConfig", json!([]))
            .await?
            .ok_or_else(|| NodeError::Permanent("node didn't report its shard config".to_string()))?;

        config.validate().map_err(|err| NodeError::Permanent(err.to_string()))?;
        Ok(config)
    }

    async fn upload_segments(&self, segments: &[SegmentWithProof], tx_seq: u64) -> Result<(), NodeError> {
        let wire = segments.iter().map(SegmentWire::from).collect::<Vec<SegmentWire<'_>>>();

        match self.call_raw("uploadSegmentsByTxSeq", json!([wire, tx_seq])).await? {
            Some(_) => Ok(()),
            None => Err(NodeError::empty_acknowledgement()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        errors::NodeError,
        node::LogEntry,
        rpc::{FileInfoWire, SegmentWire, hash_from_hex, hash_to_hex},
        segment::SegmentWithProof,
    };

    #[test]
    fn test_hash_hex_conversion() {
        let hash = blake3::hash(b"segment");
        let hex = hash_to_hex(&hash);

        assert!(hex.starts_with("0x"));
        assert_eq!(hash_from_hex(&hex), Ok(hash));
        assert_eq!(hash_from_hex(&hex[2..]), Ok(hash));
        assert!(matches!(hash_from_hex("0x1234"), Err(NodeError::Permanent(_))));
    }

    #[test]
    fn test_file_info_wire_decoding() {
        let root = blake3::hash(b"file");
        let wire = serde_json::from_value::<FileInfoWire>(serde_json::json!({
            "txSeq": 7,
            "startEntryIndex": 2048,
            "size": 1000,
            "finalized": false,
            "root": hash_to_hex(&root),
        }))
        .expect("Must be able to decode file info");

        assert_eq!(
            LogEntry::try_from(wire),
            Ok(LogEntry {
                tx_seq: 7,
                start_entry_index: 2048,
                size: 1000,
                finalized: false,
                root: Some(root),
            })
        );
    }

    #[test]
    fn test_segment_wire_encoding() {
        let segment = SegmentWithProof {
            root: blake3::hash(b"root"),
            data: "AAEC".to_string(),
            index: 3,
            proof: vec![blake3::hash(b"sibling")],
            file_size: 3,
        };

        let value = serde_json::to_value(SegmentWire::from(&segment)).expect("Must be able to encode segment");

        assert_eq!(value["root"], hash_to_hex(&segment.root));
        assert_eq!(value["data"], "AAEC");
        assert_eq!(value["index"], 3);
        assert_eq!(value["proof"][0], hash_to_hex(&segment.proof[0]));
        assert_eq!(value["fileSize"], 3);
    }
}
