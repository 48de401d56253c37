use crate::{LayoutArgs, errors::SegliftCliError};
use seglift_lib::{DiskFile, NodeHandle, RpcNodeClient, SegmentLayout, UploadFile, UploadOption, format_bytes};
use std::{path::PathBuf, sync::Arc};

pub fn open_file(file_path: &PathBuf, layout: LayoutArgs) -> Result<DiskFile, SegliftCliError> {
    let layout = SegmentLayout::new(layout.chunk_size, layout.segment_chunks)?;
    let file = DiskFile::open(file_path, layout)?;

    println!("Read {:?}", file_path);
    println!("Size {}", format_bytes(file.size()));

    Ok(file)
}

pub fn connect_nodes(node_urls: &[String]) -> Result<Vec<NodeHandle>, SegliftCliError> {
    node_urls
        .iter()
        .map(|url| {
            RpcNodeClient::new(url.as_str())
                .map(|client| Arc::new(client) as NodeHandle)
                .map_err(|e| SegliftCliError::FailedToConnectNode(url.clone(), e))
        })
        .collect()
}

pub fn read_upload_option(opt_config_path: &Option<PathBuf>) -> Result<UploadOption, SegliftCliError> {
    let Some(config_path) = opt_config_path else {
        return Ok(UploadOption::default());
    };

    let bytes = std::fs::read(config_path).map_err(|e| SegliftCliError::FailedToReadConfig(config_path.clone(), e.to_string()))?;
    serde_json::from_slice::<UploadOption>(&bytes).map_err(|e| SegliftCliError::FailedToReadConfig(config_path.clone(), e.to_string()))
}
