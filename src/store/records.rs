//! Cached folder and file records

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A remote folder as last seen by a listing refresh or a create
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderRecord {
    /// Stable for a given name, even across cache clears
    pub id: u64,
    pub name: String,
    pub full_path: String,
    pub created_at: DateTime<Utc>,
}

/// A file known to have been uploaded or downloaded through this client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: u64,
    pub folder_id: u64,
    pub name: String,
    pub local_path: PathBuf,
    pub remote_path: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
}

/// Input for [`MetadataStore::add_file`](super::MetadataStore::add_file)
#[derive(Debug, Clone)]
pub struct NewFile<'a> {
    pub folder_name: &'a str,
    pub file_name: &'a str,
    pub local_path: &'a std::path::Path,
    pub remote_path: &'a str,
    pub size: u64,
}
