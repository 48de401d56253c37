use seglift_lib::{NodeError, SegliftError, UploadFailure};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SegliftCliError {
    #[error("failed to read upload config {0:?}: {1}")]
    FailedToReadConfig(PathBuf, String),
    #[error("failed to write {0:?}: {1}")]
    FailedToWriteFile(PathBuf, String),
    #[error("failed to set up client for storage node {0}: {1}")]
    FailedToConnectNode(String, NodeError),
    #[error("file with root {0} isn't committed yet, no storage node knows it")]
    FileNotCommitted(String),

    #[error(transparent)]
    Seglift(#[from] SegliftError),
    #[error(transparent)]
    Upload(#[from] UploadFailure),
}
