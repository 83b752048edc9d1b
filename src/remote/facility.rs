//! Transport seams for the session manager
//!
//! `RemoteSession` talks to these traits rather than to russh directly so the
//! session logic can run against the in-memory transport in tests.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::sftp::{RemoteEntry, RemoteStat, SftpChannel, SftpError};
use crate::ssh::{ExecOutput, SshClient, SshConnection, SshError};

/// Establishes authenticated connections
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Connection: ShellConnection;

    async fn connect(&self) -> Result<Self::Connection, SshError>;
}

/// An authenticated connection able to run commands and open a transfer channel
#[async_trait]
pub trait ShellConnection: Send + Sync + 'static {
    type Transfer: TransferChannel;

    fn is_alive(&self) -> bool;

    async fn exec(&self, command: &str, timeout: Duration) -> Result<ExecOutput, SshError>;

    async fn open_transfer_channel(&self, io_timeout: Duration)
        -> Result<Self::Transfer, SftpError>;

    async fn close(&self) -> Result<(), SshError>;
}

/// Structured file operations bound to one connection
#[async_trait]
pub trait TransferChannel: Send + Sync + 'static {
    async fn put(&self, local_path: &Path, remote_path: &str) -> Result<u64, SftpError>;

    async fn get(&self, remote_path: &str, local_path: &Path) -> Result<u64, SftpError>;

    async fn stat(&self, remote_path: &str) -> Result<RemoteStat, SftpError>;

    async fn remove(&self, remote_path: &str) -> Result<(), SftpError>;

    async fn read_dir(&self, remote_path: &str) -> Result<Vec<RemoteEntry>, SftpError>;

    async fn close(&self) -> Result<(), SftpError>;
}

#[async_trait]
impl Connector for SshClient {
    type Connection = SshConnection;

    async fn connect(&self) -> Result<SshConnection, SshError> {
        SshClient::connect(self).await
    }
}

#[async_trait]
impl ShellConnection for SshConnection {
    type Transfer = SftpChannel;

    fn is_alive(&self) -> bool {
        SshConnection::is_alive(self)
    }

    async fn exec(&self, command: &str, timeout: Duration) -> Result<ExecOutput, SshError> {
        SshConnection::exec(self, command, timeout).await
    }

    async fn open_transfer_channel(&self, io_timeout: Duration) -> Result<SftpChannel, SftpError> {
        self.open_sftp(io_timeout).await
    }

    async fn close(&self) -> Result<(), SshError> {
        self.disconnect().await
    }
}

#[async_trait]
impl TransferChannel for SftpChannel {
    async fn put(&self, local_path: &Path, remote_path: &str) -> Result<u64, SftpError> {
        SftpChannel::put(self, local_path, remote_path).await
    }

    async fn get(&self, remote_path: &str, local_path: &Path) -> Result<u64, SftpError> {
        SftpChannel::get(self, remote_path, local_path).await
    }

    async fn stat(&self, remote_path: &str) -> Result<RemoteStat, SftpError> {
        SftpChannel::stat(self, remote_path).await
    }

    async fn remove(&self, remote_path: &str) -> Result<(), SftpError> {
        SftpChannel::remove(self, remote_path).await
    }

    async fn read_dir(&self, remote_path: &str) -> Result<Vec<RemoteEntry>, SftpError> {
        SftpChannel::read_dir(self, remote_path).await
    }

    async fn close(&self) -> Result<(), SftpError> {
        SftpChannel::close(self).await
    }
}
