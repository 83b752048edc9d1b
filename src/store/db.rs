//! redb-backed metadata store

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use redb::{ReadableTable, TableDefinition, WriteTransaction};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use super::error::{storage, StoreError};
use super::records::{FileRecord, FolderRecord, NewFile};
use super::MetadataStore;

/// Folder name -> FolderRecord
const FOLDERS: TableDefinition<&str, &[u8]> = TableDefinition::new("folders");
/// Folder name -> id; never cleared, so ids stay stable across refreshes
const FOLDER_IDS: TableDefinition<&str, u64> = TableDefinition::new("folder_ids");
/// File id -> FileRecord
const FILES: TableDefinition<u64, &[u8]> = TableDefinition::new("files");
/// "<folder id>/<file name>" -> file id
const FILE_INDEX: TableDefinition<&str, u64> = TableDefinition::new("file_index");
const COUNTERS: TableDefinition<&str, u64> = TableDefinition::new("counters");

const FOLDER_COUNTER: &str = "folder";
const FILE_COUNTER: &str = "file";

pub struct RedbMetadataStore {
    db: redb::Database,
}

impl RedbMetadataStore {
    /// Open (or create) the store at `db_path`
    pub fn new(db_path: &Path) -> Result<Self, StoreError> {
        info!("Opening metadata store at: {:?}", db_path);

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(storage("Failed to create data directory"))?;
        }

        let db = redb::Database::create(db_path)
            .map_err(storage("Failed to create metadata database"))?;

        let write_txn = db
            .begin_write()
            .map_err(storage("Failed to begin write transaction"))?;
        {
            write_txn
                .open_table(FOLDERS)
                .map_err(storage("Failed to open folders table"))?;
            write_txn
                .open_table(FOLDER_IDS)
                .map_err(storage("Failed to open folder id table"))?;
            write_txn
                .open_table(FILES)
                .map_err(storage("Failed to open files table"))?;
            write_txn
                .open_table(FILE_INDEX)
                .map_err(storage("Failed to open file index"))?;
            write_txn
                .open_table(COUNTERS)
                .map_err(storage("Failed to open counters table"))?;
        }
        write_txn
            .commit()
            .map_err(storage("Failed to commit transaction"))?;

        debug!("Metadata store initialized");
        Ok(Self { db })
    }

    fn find_folder<T: ReadableTable<&'static str, &'static [u8]>>(
        folders: &T,
        name: &str,
    ) -> Result<Option<FolderRecord>, StoreError> {
        folders
            .get(name)
            .map_err(storage("Failed to read folder"))?
            .map(|v| decode(v.value()))
            .transpose()
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    rmp_serde::to_vec_named(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    rmp_serde::from_slice(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn file_key(folder_id: u64, file_name: &str) -> String {
    format!("{}/{}", folder_id, file_name)
}

fn next_id(txn: &WriteTransaction, counter: &str) -> Result<u64, StoreError> {
    let mut table = txn
        .open_table(COUNTERS)
        .map_err(storage("Failed to open counters table"))?;
    let next = table
        .get(counter)
        .map_err(storage("Failed to read counter"))?
        .map(|v| v.value())
        .unwrap_or(0)
        + 1;
    table
        .insert(counter, next)
        .map_err(storage("Failed to update counter"))?;
    Ok(next)
}

/// Id registered for `name`, allocating one on first sight
fn folder_id_for(txn: &WriteTransaction, name: &str) -> Result<u64, StoreError> {
    let mut ids = txn
        .open_table(FOLDER_IDS)
        .map_err(storage("Failed to open folder id table"))?;
    let existing = ids
        .get(name)
        .map_err(storage("Failed to read folder id"))?
        .map(|v| v.value());
    match existing {
        Some(id) => Ok(id),
        None => {
            let id = next_id(txn, FOLDER_COUNTER)?;
            ids.insert(name, id)
                .map_err(storage("Failed to register folder id"))?;
            Ok(id)
        }
    }
}

#[async_trait]
impl MetadataStore for RedbMetadataStore {
    async fn add_folder(&self, name: &str, full_path: &str) -> Result<FolderRecord, StoreError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(storage("Failed to begin write transaction"))?;

        let record = {
            let mut folders = write_txn
                .open_table(FOLDERS)
                .map_err(storage("Failed to open folders table"))?;

            match Self::find_folder(&folders, name)? {
                Some(existing) => existing,
                None => {
                    let record = FolderRecord {
                        id: folder_id_for(&write_txn, name)?,
                        name: name.to_string(),
                        full_path: full_path.to_string(),
                        created_at: Utc::now(),
                    };
                    folders
                        .insert(name, encode(&record)?.as_slice())
                        .map_err(storage("Failed to insert folder"))?;
                    debug!("Cached folder {} (id {})", name, record.id);
                    record
                }
            }
        };

        write_txn
            .commit()
            .map_err(storage("Failed to commit transaction"))?;
        Ok(record)
    }

    async fn folder_names(&self) -> Result<Vec<String>, StoreError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(storage("Failed to begin read transaction"))?;
        let folders = read_txn
            .open_table(FOLDERS)
            .map_err(storage("Failed to open folders table"))?;

        let mut names = Vec::new();
        for item in folders.iter().map_err(storage("Failed to iterate folders"))? {
            let (key, _) = item.map_err(storage("Failed to read folder entry"))?;
            names.push(key.value().to_string());
        }
        Ok(names)
    }

    async fn folder(&self, name: &str) -> Result<Option<FolderRecord>, StoreError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(storage("Failed to begin read transaction"))?;
        let folders = read_txn
            .open_table(FOLDERS)
            .map_err(storage("Failed to open folders table"))?;
        Self::find_folder(&folders, name)
    }

    async fn clear_folders(&self) -> Result<usize, StoreError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(storage("Failed to begin write transaction"))?;

        let cleared = {
            let mut folders = write_txn
                .open_table(FOLDERS)
                .map_err(storage("Failed to open folders table"))?;

            let mut names = Vec::new();
            for item in folders.iter().map_err(storage("Failed to iterate folders"))? {
                let (key, _) = item.map_err(storage("Failed to read folder entry"))?;
                names.push(key.value().to_string());
            }
            for name in &names {
                folders
                    .remove(name.as_str())
                    .map_err(storage("Failed to remove folder"))?;
            }
            names.len()
        };

        write_txn
            .commit()
            .map_err(storage("Failed to commit transaction"))?;
        debug!("Cleared {} cached folders", cleared);
        Ok(cleared)
    }

    async fn add_file(&self, file: NewFile<'_>) -> Result<FileRecord, StoreError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(storage("Failed to begin write transaction"))?;

        let record = {
            let folders = write_txn
                .open_table(FOLDERS)
                .map_err(storage("Failed to open folders table"))?;
            let folder = Self::find_folder(&folders, file.folder_name)?
                .ok_or_else(|| StoreError::FolderNotFound(file.folder_name.to_string()))?;

            let key = file_key(folder.id, file.file_name);
            let mut index = write_txn
                .open_table(FILE_INDEX)
                .map_err(storage("Failed to open file index"))?;
            let existing = index
                .get(key.as_str())
                .map_err(storage("Failed to read file index"))?
                .map(|v| v.value());
            let id = match existing {
                Some(id) => id,
                None => next_id(&write_txn, FILE_COUNTER)?,
            };

            let record = FileRecord {
                id,
                folder_id: folder.id,
                name: file.file_name.to_string(),
                local_path: file.local_path.to_path_buf(),
                remote_path: file.remote_path.to_string(),
                size: file.size,
                uploaded_at: Utc::now(),
            };

            let mut files = write_txn
                .open_table(FILES)
                .map_err(storage("Failed to open files table"))?;
            files
                .insert(id, encode(&record)?.as_slice())
                .map_err(storage("Failed to insert file"))?;
            index
                .insert(key.as_str(), id)
                .map_err(storage("Failed to update file index"))?;
            record
        };

        write_txn
            .commit()
            .map_err(storage("Failed to commit transaction"))?;
        debug!(
            "Recorded {}/{} (id {}, {} bytes)",
            file.folder_name, record.name, record.id, record.size
        );
        Ok(record)
    }

    async fn files_in_folder(&self, folder_name: &str) -> Result<Vec<FileRecord>, StoreError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(storage("Failed to begin read transaction"))?;
        let folders = read_txn
            .open_table(FOLDERS)
            .map_err(storage("Failed to open folders table"))?;
        let Some(folder) = Self::find_folder(&folders, folder_name)? else {
            return Ok(Vec::new());
        };

        let files = read_txn
            .open_table(FILES)
            .map_err(storage("Failed to open files table"))?;
        let mut results = Vec::new();
        for item in files.iter().map_err(storage("Failed to iterate files"))? {
            let (_, value) = item.map_err(storage("Failed to read file entry"))?;
            let record: FileRecord = decode(value.value())?;
            if record.folder_id == folder.id {
                results.push(record);
            }
        }
        results.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(results)
    }

    async fn file(
        &self,
        folder_name: &str,
        file_name: &str,
    ) -> Result<Option<FileRecord>, StoreError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(storage("Failed to begin read transaction"))?;
        let folders = read_txn
            .open_table(FOLDERS)
            .map_err(storage("Failed to open folders table"))?;
        let Some(folder) = Self::find_folder(&folders, folder_name)? else {
            return Ok(None);
        };

        let index = read_txn
            .open_table(FILE_INDEX)
            .map_err(storage("Failed to open file index"))?;
        let id = index
            .get(file_key(folder.id, file_name).as_str())
            .map_err(storage("Failed to read file index"))?
            .map(|v| v.value());
        let Some(id) = id else {
            return Ok(None);
        };

        let files = read_txn
            .open_table(FILES)
            .map_err(storage("Failed to open files table"))?;
        let record = files
            .get(id)
            .map_err(storage("Failed to read file"))?
            .map(|v| decode(v.value()))
            .transpose()?;
        Ok(record)
    }

    async fn delete_file(&self, file_id: u64) -> Result<bool, StoreError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(storage("Failed to begin write transaction"))?;

        let removed = {
            let mut files = write_txn
                .open_table(FILES)
                .map_err(storage("Failed to open files table"))?;
            let removed: Option<FileRecord> = files
                .remove(file_id)
                .map_err(storage("Failed to delete file"))?
                .map(|v| decode(v.value()))
                .transpose()?;

            if let Some(record) = &removed {
                let mut index = write_txn
                    .open_table(FILE_INDEX)
                    .map_err(storage("Failed to open file index"))?;
                index
                    .remove(file_key(record.folder_id, &record.name).as_str())
                    .map_err(storage("Failed to update file index"))?;
            }
            removed.is_some()
        };

        write_txn
            .commit()
            .map_err(storage("Failed to commit transaction"))?;
        debug!("Deleted file record {}: {}", file_id, removed);
        Ok(removed)
    }

    async fn prune_orphaned_files(&self) -> Result<usize, StoreError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(storage("Failed to begin write transaction"))?;

        let pruned = {
            let folders = write_txn
                .open_table(FOLDERS)
                .map_err(storage("Failed to open folders table"))?;
            let mut live = HashSet::new();
            for item in folders.iter().map_err(storage("Failed to iterate folders"))? {
                let (_, value) = item.map_err(storage("Failed to read folder entry"))?;
                let folder: FolderRecord = decode(value.value())?;
                live.insert(folder.id);
            }

            let mut files = write_txn
                .open_table(FILES)
                .map_err(storage("Failed to open files table"))?;
            let mut orphans = Vec::new();
            for item in files.iter().map_err(storage("Failed to iterate files"))? {
                let (_, value) = item.map_err(storage("Failed to read file entry"))?;
                let record: FileRecord = decode(value.value())?;
                if !live.contains(&record.folder_id) {
                    orphans.push(record);
                }
            }

            let mut index = write_txn
                .open_table(FILE_INDEX)
                .map_err(storage("Failed to open file index"))?;
            for record in &orphans {
                files
                    .remove(record.id)
                    .map_err(storage("Failed to delete file"))?;
                index
                    .remove(file_key(record.folder_id, &record.name).as_str())
                    .map_err(storage("Failed to update file index"))?;
            }
            orphans.len()
        };

        write_txn
            .commit()
            .map_err(storage("Failed to commit transaction"))?;
        if pruned > 0 {
            info!("Pruned {} orphaned file records", pruned);
        }
        Ok(pruned)
    }
}
