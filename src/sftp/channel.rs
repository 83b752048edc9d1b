//! SFTP transfer channel
//!
//! Structured byte-level operations (put/get/stat/remove/read_dir) over an
//! SFTP subsystem opened on an existing SSH connection.

use std::path::Path;
use std::time::Duration;

use russh::client::Msg;
use russh::Channel;
use russh_sftp::client::error::Error as SftpErrorInner;
use russh_sftp::client::SftpSession as RusshSftpSession;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use super::error::SftpError;
use super::types::{constants, RemoteEntry, RemoteStat};

pub struct SftpChannel {
    sftp: RusshSftpSession,
    /// Per-chunk I/O timeout; a dead SSH link otherwise blocks forever
    io_timeout: Duration,
}

impl SftpChannel {
    /// Request the `sftp` subsystem on `channel` and negotiate the session
    pub async fn new(channel: Channel<Msg>, io_timeout: Duration) -> Result<Self, SftpError> {
        channel.request_subsystem(true, "sftp").await.map_err(|e| {
            SftpError::SubsystemNotAvailable(format!("Failed to request SFTP subsystem: {}", e))
        })?;

        let sftp = RusshSftpSession::new(channel.into_stream())
            .await
            .map_err(|e| SftpError::SubsystemNotAvailable(e.to_string()))?;

        info!("SFTP subsystem opened");
        Ok(Self { sftp, io_timeout })
    }

    pub async fn stat(&self, path: &str) -> Result<RemoteStat, SftpError> {
        debug!("stat {}", path);
        let metadata = self
            .sftp
            .metadata(path)
            .await
            .map_err(|e| map_sftp_error(e, path))?;

        Ok(RemoteStat {
            size: metadata.size.unwrap_or(0),
            modified: metadata.mtime.map(|t| t as i64),
        })
    }

    pub async fn remove(&self, path: &str) -> Result<(), SftpError> {
        info!("Removing {}", path);
        self.sftp
            .remove_file(path)
            .await
            .map_err(|e| map_sftp_error(e, path))
    }

    /// Entries of `path` in server order, without `.` and `..`
    pub async fn read_dir(&self, path: &str) -> Result<Vec<RemoteEntry>, SftpError> {
        let read_dir = self
            .sftp
            .read_dir(path)
            .await
            .map_err(|e| map_sftp_error(e, path))?;

        Ok(read_dir
            .filter_map(|entry| {
                let name = entry.file_name();
                if name == "." || name == ".." {
                    return None;
                }
                Some(RemoteEntry {
                    is_dir: entry.metadata().is_dir(),
                    name,
                })
            })
            .collect())
    }

    /// Copy a local file to `remote_path`, creating or truncating it
    pub async fn put(&self, local_path: &Path, remote_path: &str) -> Result<u64, SftpError> {
        let mut local_file = tokio::fs::File::open(local_path).await?;
        let mut remote_file = self
            .sftp
            .create(remote_path)
            .await
            .map_err(|e| map_sftp_error(e, remote_path))?;

        let mut buffer = vec![0u8; constants::TRANSFER_CHUNK_SIZE];
        let mut transferred = 0u64;

        loop {
            let bytes_read = local_file.read(&mut buffer).await?;
            if bytes_read == 0 {
                break;
            }

            match tokio::time::timeout(
                self.io_timeout,
                remote_file.write_all(&buffer[..bytes_read]),
            )
            .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(SftpError::ProtocolError(e.to_string())),
                Err(_) => {
                    warn!(
                        "SFTP upload write timeout after {:?} at {} bytes",
                        self.io_timeout, transferred
                    );
                    return Err(SftpError::TransferError(format!(
                        "Remote write timeout after {:?} - SSH connection may be dead",
                        self.io_timeout
                    )));
                }
            }

            transferred += bytes_read as u64;
        }

        match tokio::time::timeout(self.io_timeout, remote_file.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(SftpError::ProtocolError(e.to_string())),
            Err(_) => {
                return Err(SftpError::TransferError(format!(
                    "Remote close timeout after {:?}",
                    self.io_timeout
                )))
            }
        }

        info!(
            "Upload complete: {:?} -> {} ({} bytes)",
            local_path, remote_path, transferred
        );
        Ok(transferred)
    }

    /// Copy `remote_path` into a local file, overwriting it
    pub async fn get(&self, remote_path: &str, local_path: &Path) -> Result<u64, SftpError> {
        let mut remote_file = self
            .sftp
            .open(remote_path)
            .await
            .map_err(|e| map_sftp_error(e, remote_path))?;
        let mut local_file = tokio::fs::File::create(local_path).await?;

        let mut buffer = vec![0u8; constants::TRANSFER_CHUNK_SIZE];
        let mut transferred = 0u64;

        loop {
            let bytes_read =
                match tokio::time::timeout(self.io_timeout, remote_file.read(&mut buffer)).await {
                    Ok(Ok(n)) => n,
                    Ok(Err(e)) => return Err(SftpError::ProtocolError(e.to_string())),
                    Err(_) => {
                        warn!(
                            "SFTP download read timeout after {:?} at {} bytes",
                            self.io_timeout, transferred
                        );
                        return Err(SftpError::TransferError(format!(
                            "Read timeout after {:?} - SSH connection may be dead",
                            self.io_timeout
                        )));
                    }
                };

            if bytes_read == 0 {
                break;
            }

            local_file.write_all(&buffer[..bytes_read]).await?;
            transferred += bytes_read as u64;
        }

        local_file.flush().await?;

        info!(
            "Download complete: {} -> {:?} ({} bytes)",
            remote_path, local_path, transferred
        );
        Ok(transferred)
    }

    pub async fn close(&self) -> Result<(), SftpError> {
        self.sftp
            .close()
            .await
            .map_err(|e| SftpError::ProtocolError(e.to_string()))
    }
}

/// Map SFTP errors to our error type
fn map_sftp_error(err: SftpErrorInner, path: &str) -> SftpError {
    let err_str = err.to_string();
    if err_str.contains("No such file") || err_str.contains("not found") {
        SftpError::FileNotFound(path.to_string())
    } else if err_str.contains("Permission denied") {
        SftpError::PermissionDenied(path.to_string())
    } else {
        SftpError::ProtocolError(err_str)
    }
}
