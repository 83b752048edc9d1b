//! Transfer Orchestrator errors

use thiserror::Error;

use crate::remote::RemoteError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum TransferError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid folder name '{0}': use only letters, numbers, underscores and hyphens")]
    InvalidFolderName(String),

    #[error("Local IO error: {0}")]
    Io(#[from] std::io::Error),
}
