//! SFTP Error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SftpError {
    #[error("SFTP Connection Error: {0}")]
    ChannelError(String),

    #[error("SFTP subsystem not available: {0}")]
    SubsystemNotAvailable(String),

    #[error("No such file: {0}")]
    FileNotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("SFTP protocol error: {0}")]
    ProtocolError(String),

    #[error("Transfer error: {0}")]
    TransferError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl SftpError {
    /// Errors after which the channel should not be reused
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            SftpError::ChannelError(_) | SftpError::TransferError(_)
        ) || matches!(self, SftpError::ProtocolError(msg) if is_connection_message(msg))
    }
}

fn is_connection_message(msg: &str) -> bool {
    let msg = msg.to_lowercase();
    msg.contains("session closed")
        || msg.contains("connection")
        || msg.contains("disconnect")
        || msg.contains("timeout")
}
