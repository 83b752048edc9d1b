//! Metadata store errors

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Folder not found in database: {0}")]
    FolderNotFound(String),
}

/// `map_err` adapter: `"<context>: <error>"` as a storage error
pub(crate) fn storage<E: std::fmt::Display>(context: &'static str) -> impl FnOnce(E) -> StoreError {
    move |e| StoreError::Storage(format!("{}: {}", context, e))
}
