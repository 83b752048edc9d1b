//! Metadata store
//!
//! Local cache of known remote folders and of files uploaded or downloaded
//! through this client. The remote host stays authoritative; the cache only
//! speeds up listings and remembers where local copies live.

mod db;
mod error;
mod records;

use async_trait::async_trait;

pub use db::RedbMetadataStore;
pub use error::StoreError;
pub use records::{FileRecord, FolderRecord, NewFile};

#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert-or-ignore by name; returns the cached record either way
    async fn add_folder(&self, name: &str, full_path: &str) -> Result<FolderRecord, StoreError>;

    /// Cached folder names, sorted
    async fn folder_names(&self) -> Result<Vec<String>, StoreError>;

    async fn folder(&self, name: &str) -> Result<Option<FolderRecord>, StoreError>;

    async fn folder_id(&self, name: &str) -> Result<Option<u64>, StoreError> {
        Ok(self.folder(name).await?.map(|f| f.id))
    }

    async fn folder_path(&self, name: &str) -> Result<Option<String>, StoreError> {
        Ok(self.folder(name).await?.map(|f| f.full_path))
    }

    /// Drop every folder record. File records are kept.
    async fn clear_folders(&self) -> Result<usize, StoreError>;

    /// Insert or replace the record for `(folder, name)`.
    ///
    /// Fails with [`StoreError::FolderNotFound`] when the folder is not cached.
    async fn add_file(&self, file: NewFile<'_>) -> Result<FileRecord, StoreError>;

    /// Records in `folder_name`, sorted by file name; empty for unknown folders
    async fn files_in_folder(&self, folder_name: &str) -> Result<Vec<FileRecord>, StoreError>;

    async fn file(&self, folder_name: &str, file_name: &str)
        -> Result<Option<FileRecord>, StoreError>;

    /// Returns whether a record was removed
    async fn delete_file(&self, file_id: u64) -> Result<bool, StoreError>;

    /// Remove file records whose folder is no longer cached
    async fn prune_orphaned_files(&self) -> Result<usize, StoreError>;
}
