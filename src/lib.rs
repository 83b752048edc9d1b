//! Remote Folders - manage folders and files on a remote SSH server
//!
//! A session manager owns one SSH connection and one SFTP channel; folder
//! and file listings come from remote shell commands; a local redb cache
//! remembers folders and transferred files.

pub mod config;
pub mod remote;
pub mod sftp;
pub mod ssh;
pub mod store;
pub mod transfer;

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use remote::{RemoteSession, SessionOptions};
pub use store::{MetadataStore, RedbMetadataStore};
pub use transfer::TransferOrchestrator;

/// Initialize logging (`RUST_LOG`, default `info`) on stderr
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Append a line to `<log_dir>/startup.log`; failures are ignored
pub fn write_startup_log(log_dir: &Path, message: &str) {
    let _ = std::fs::create_dir_all(log_dir);

    let log_file = log_dir.join("startup.log");
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&log_file) {
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        let _ = writeln!(file, "[{}] {}", timestamp, message);
    }
}
