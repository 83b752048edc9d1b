//! Transfer Orchestrator: keeps the metadata store in step with the remote host

mod display;
mod error;
mod orchestrator;
mod preview;

pub use display::{format_file_size, format_timestamp, format_unix_timestamp, UNKNOWN};
pub use error::TransferError;
pub use orchestrator::{
    validate_folder_name, EntrySource, FileEntry, Outcome, PreviewFile, TransferOrchestrator,
};
pub use preview::PreviewKind;
