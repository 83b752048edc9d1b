//! SFTP transfer channel and remote path helpers

pub mod channel;
pub mod error;
pub mod path_utils;
pub mod types;

pub use channel::SftpChannel;
pub use error::SftpError;
pub use types::*;
