//! Transfer Orchestrator
//!
//! Pairs each remote operation with the matching metadata store update.
//! The remote mutation always runs first and the store is touched only
//! after it succeeds. Store failures at that point are reported as
//! warnings on the outcome; the remote side is never rolled back.

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::display::{format_file_size, format_timestamp, format_unix_timestamp, UNKNOWN};
use super::error::TransferError;
use super::preview::PreviewKind;
use crate::remote::{Connector, DownloadReceipt, RemoteSession, UploadReceipt};
use crate::sftp::path_utils::{remote_file_path, remote_folder_path};
use crate::store::{MetadataStore, NewFile};

static FOLDER_NAME: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$"));

/// Result of an orchestrated operation plus any cache problems it hit
#[derive(Debug)]
pub struct Outcome<T> {
    pub value: T,
    pub warnings: Vec<String>,
}

impl<T> Outcome<T> {
    fn new(value: T, warnings: Vec<String>) -> Self {
        Self { value, warnings }
    }
}

/// Where a listing row's size and date came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntrySource {
    Cache,
    Remote,
    Unknown,
}

/// One row of a folder's file listing, ready for display
#[derive(Debug, Clone, Serialize)]
pub struct FileEntry {
    pub name: String,
    pub size: Option<u64>,
    pub size_display: String,
    pub date_display: String,
    pub source: EntrySource,
}

/// A local copy ready to be shown
#[derive(Debug, Clone)]
pub struct PreviewFile {
    pub local_path: PathBuf,
    pub kind: PreviewKind,
    /// The cached local copy was reused without touching the remote host
    pub from_cache: bool,
}

pub fn validate_folder_name(name: &str) -> Result<(), TransferError> {
    match &*FOLDER_NAME {
        Ok(pattern) if pattern.is_match(name) => Ok(()),
        _ => Err(TransferError::InvalidFolderName(name.to_string())),
    }
}

fn push_warning(warnings: &mut Vec<String>, context: &str, err: impl Display) {
    let message = format!("{}: {}", context, err);
    warn!("{}", message);
    warnings.push(message);
}

pub struct TransferOrchestrator<C: Connector> {
    session: Arc<RemoteSession<C>>,
    store: Arc<dyn MetadataStore>,
    temp_dir: PathBuf,
    prune_orphans: bool,
}

impl<C: Connector> TransferOrchestrator<C> {
    pub fn new(
        session: Arc<RemoteSession<C>>,
        store: Arc<dyn MetadataStore>,
        temp_dir: PathBuf,
    ) -> Self {
        Self {
            session,
            store,
            temp_dir,
            prune_orphans: false,
        }
    }

    /// Delete file records left without a folder after each refresh
    pub fn with_prune_orphans(mut self, prune: bool) -> Self {
        self.prune_orphans = prune;
        self
    }

    pub fn session(&self) -> &Arc<RemoteSession<C>> {
        &self.session
    }

    pub fn store(&self) -> &Arc<dyn MetadataStore> {
        &self.store
    }

    /// Connect and refresh the folder cache. On error the cache is left as
    /// it was, so callers can carry on offline.
    pub async fn start(&self) -> Result<Outcome<Vec<String>>, TransferError> {
        self.session.connect().await?;
        self.refresh_folder_list().await
    }

    /// Replace the cached folder list with the remote one.
    ///
    /// Returns the remote names in server order.
    pub async fn refresh_folder_list(&self) -> Result<Outcome<Vec<String>>, TransferError> {
        let names = self.session.list_folders().await?;
        let mut warnings = Vec::new();

        match self.store.clear_folders().await {
            Ok(_) => {
                for name in &names {
                    let path = remote_folder_path(self.session.remote_root(), name);
                    if let Err(e) = self.store.add_folder(name, &path).await {
                        push_warning(&mut warnings, &format!("Failed to cache folder {}", name), e);
                    }
                }
            }
            Err(e) => push_warning(&mut warnings, "Failed to clear folder cache", e),
        }

        if self.prune_orphans {
            if let Err(e) = self.store.prune_orphaned_files().await {
                push_warning(&mut warnings, "Failed to prune orphaned file records", e);
            }
        }

        info!("Refreshed folder list: {} folders", names.len());
        Ok(Outcome::new(names, warnings))
    }

    /// Validate, create remotely, then cache the folder record
    pub async fn create_folder(&self, name: &str) -> Result<Outcome<String>, TransferError> {
        validate_folder_name(name)?;

        let path = self.session.create_folder(name).await?;
        let mut warnings = Vec::new();
        if let Err(e) = self.store.add_folder(name, &path).await {
            push_warning(&mut warnings, "Folder created but not cached", e);
        }

        info!("Created folder {}", path);
        Ok(Outcome::new(path, warnings))
    }

    /// Folder names from the cache only, sorted
    pub async fn cached_folder_names(&self) -> Result<Vec<String>, TransferError> {
        Ok(self.store.folder_names().await?)
    }

    /// Remote file names of `folder`, described from the cache where possible
    /// and from a remote stat otherwise. Nothing is cached by listing.
    pub async fn list_folder_files(
        &self,
        folder: &str,
    ) -> Result<Outcome<Vec<FileEntry>>, TransferError> {
        let names = self.session.list_files(folder).await?;
        let mut warnings = Vec::new();
        let mut entries = Vec::with_capacity(names.len());

        for name in names {
            let record = match self.store.file(folder, &name).await {
                Ok(record) => record,
                Err(e) => {
                    push_warning(&mut warnings, &format!("Cache lookup failed for {}", name), e);
                    None
                }
            };

            let entry = match record {
                Some(record) => FileEntry {
                    size: Some(record.size),
                    size_display: format_file_size(record.size),
                    date_display: format_timestamp(record.uploaded_at),
                    source: EntrySource::Cache,
                    name,
                },
                None => match self.session.stat_file(folder, &name).await {
                    Ok(stat) => FileEntry {
                        size: Some(stat.size),
                        size_display: format_file_size(stat.size),
                        date_display: stat
                            .modified
                            .map(format_unix_timestamp)
                            .unwrap_or_else(|| UNKNOWN.to_string()),
                        source: EntrySource::Remote,
                        name,
                    },
                    Err(e) => {
                        debug!("stat {}/{} failed: {}", folder, name, e);
                        FileEntry {
                            size: None,
                            size_display: UNKNOWN.to_string(),
                            date_display: UNKNOWN.to_string(),
                            source: EntrySource::Unknown,
                            name,
                        }
                    }
                },
            };
            entries.push(entry);
        }

        Ok(Outcome::new(entries, warnings))
    }

    /// Upload, then write or overwrite the file record
    pub async fn upload(
        &self,
        local_path: &Path,
        folder: &str,
    ) -> Result<Outcome<UploadReceipt>, TransferError> {
        let receipt = self.session.upload_file(local_path, folder).await?;
        let mut warnings = Vec::new();

        let file_name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.record_file(
            &mut warnings,
            NewFile {
                folder_name: folder,
                file_name: &file_name,
                local_path,
                remote_path: &receipt.remote_path,
                size: receipt.size,
            },
        )
        .await;

        Ok(Outcome::new(receipt, warnings))
    }

    /// Download into `local_dir`; records the copy if the file was not cached
    pub async fn download(
        &self,
        folder: &str,
        file: &str,
        local_dir: &Path,
    ) -> Result<Outcome<DownloadReceipt>, TransferError> {
        let receipt = self.session.download_file(folder, file, local_dir).await?;
        let mut warnings = Vec::new();
        self.record_fetch(&mut warnings, folder, file, &receipt).await;
        Ok(Outcome::new(receipt, warnings))
    }

    /// Local copy for previewing: the cached one if it is still on disk,
    /// otherwise a fresh download into the temp directory. A record whose
    /// local copy vanished is repointed at the new download.
    pub async fn fetch_for_preview(
        &self,
        folder: &str,
        file: &str,
    ) -> Result<Outcome<PreviewFile>, TransferError> {
        let mut warnings = Vec::new();
        let mut stale = None;

        match self.store.file(folder, file).await {
            Ok(Some(record)) => {
                if tokio::fs::try_exists(&record.local_path).await.unwrap_or(false) {
                    debug!("Preview from cached copy {:?}", record.local_path);
                    return Ok(Outcome::new(
                        PreviewFile {
                            kind: PreviewKind::for_path(&record.local_path),
                            local_path: record.local_path,
                            from_cache: true,
                        },
                        warnings,
                    ));
                }
                debug!("Cached copy {:?} is gone, downloading again", record.local_path);
                stale = Some(record);
            }
            Ok(None) => {}
            Err(e) => push_warning(&mut warnings, "Cache lookup failed", e),
        }

        tokio::fs::create_dir_all(&self.temp_dir).await?;
        let receipt = self.session.download_file(folder, file, &self.temp_dir).await?;
        match stale {
            Some(record) => {
                self.record_file(
                    &mut warnings,
                    NewFile {
                        folder_name: folder,
                        file_name: file,
                        local_path: &receipt.local_path,
                        remote_path: &record.remote_path,
                        size: receipt.bytes,
                    },
                )
                .await
            }
            None => self.record_fetch(&mut warnings, folder, file, &receipt).await,
        }

        Ok(Outcome::new(
            PreviewFile {
                kind: PreviewKind::for_path(&receipt.local_path),
                local_path: receipt.local_path,
                from_cache: false,
            },
            warnings,
        ))
    }

    /// Delete remotely; only on success drop the matching record.
    ///
    /// Returns whether a cache record was removed.
    pub async fn delete(&self, folder: &str, file: &str) -> Result<Outcome<bool>, TransferError> {
        self.session.delete_file(folder, file).await?;
        let mut warnings = Vec::new();

        let removed = match self.store.file(folder, file).await {
            Ok(Some(record)) => match self.store.delete_file(record.id).await {
                Ok(removed) => removed,
                Err(e) => {
                    push_warning(&mut warnings, "File deleted but cache record kept", e);
                    false
                }
            },
            Ok(None) => false,
            Err(e) => {
                push_warning(&mut warnings, "File deleted but cache lookup failed", e);
                false
            }
        };

        Ok(Outcome::new(removed, warnings))
    }

    /// After a download: create a record if none existed for the file
    async fn record_fetch(
        &self,
        warnings: &mut Vec<String>,
        folder: &str,
        file: &str,
        receipt: &DownloadReceipt,
    ) {
        match self.store.file(folder, file).await {
            Ok(Some(_)) => return,
            Ok(None) => {}
            Err(e) => {
                push_warning(warnings, "Cache lookup failed", e);
                return;
            }
        }

        let size = match self.session.stat_file(folder, file).await {
            Ok(stat) => stat.size,
            Err(e) => {
                debug!("stat after download failed, using byte count: {}", e);
                receipt.bytes
            }
        };
        let remote_path = remote_file_path(self.session.remote_root(), folder, file);

        self.record_file(
            warnings,
            NewFile {
                folder_name: folder,
                file_name: file,
                local_path: &receipt.local_path,
                remote_path: &remote_path,
                size,
            },
        )
        .await;
    }

    /// Ensure the folder record exists, then write the file record
    async fn record_file(&self, warnings: &mut Vec<String>, file: NewFile<'_>) {
        let folder_path = remote_folder_path(self.session.remote_root(), file.folder_name);
        if let Err(e) = self.store.add_folder(file.folder_name, &folder_path).await {
            push_warning(warnings, "Failed to cache folder", e);
            return;
        }

        match self.store.add_file(file).await {
            Ok(record) => debug!("Cached {} as record {}", record.remote_path, record.id),
            Err(e) => push_warning(warnings, "Transfer succeeded but was not cached", e),
        }
    }
}
