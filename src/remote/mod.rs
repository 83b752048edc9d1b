//! Remote Session Manager and directory listing parser

pub mod error;
pub mod facility;
#[cfg(test)]
pub mod fake;
pub mod listing;
pub mod session;
pub mod types;

pub use error::RemoteError;
pub use facility::{Connector, ShellConnection, TransferChannel};
pub use listing::{parse_listing, ListingMode, RemoteShell};
pub use session::{RemoteSession, SessionOptions};
pub use types::{CommandOutput, ConnectionState, DownloadReceipt, UploadReceipt};
