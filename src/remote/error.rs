//! Remote Session Manager error types

use thiserror::Error;

use crate::sftp::SftpError;
use crate::ssh::SshError;

#[derive(Error, Debug)]
pub enum RemoteError {
    /// Connect, authentication or host key failure
    #[error(transparent)]
    Connection(#[from] SshError),

    /// The SFTP channel could not be negotiated
    #[error("{0}")]
    ChannelNegotiation(SftpError),

    /// The command or transfer never completed (dead link, timeout)
    #[error("{0}")]
    Transport(String),

    /// The remote side ran the operation and reported failure
    #[error("{0}")]
    Operation(String),

    /// A structured transfer operation failed
    #[error(transparent)]
    Transfer(#[from] SftpError),

    #[error("Invalid name: {0}")]
    InvalidName(String),
}
