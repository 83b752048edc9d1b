//! SFTP data types

use serde::{Deserialize, Serialize};

/// Size and modification time reported by a remote stat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteStat {
    /// File size in bytes
    pub size: u64,
    /// Last modified time (Unix timestamp), if the server reports one
    pub modified: Option<i64>,
}

/// One entry of a structured directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    /// File name (not full path)
    pub name: String,
    pub is_dir: bool,
}

/// Constants for SFTP operations
pub mod constants {
    /// Chunk size for put/get copy loops (64 KB)
    pub const TRANSFER_CHUNK_SIZE: usize = 64 * 1024;
}
