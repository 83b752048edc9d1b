//! SSH module - authenticated connections and remote command execution
//!
//! Built on russh. One `SshConnection` carries both exec channels (for the
//! shell commands that create and list folders) and the SFTP channel.

mod client;
mod config;
mod error;
mod exec;
pub mod known_hosts;

pub use client::{ClientHandler, SshClient, SshConnection};
pub use config::{HostKeyPolicy, SshConfig};
pub use error::SshError;
pub use exec::ExecOutput;
pub use known_hosts::{HostKeyVerification, KnownHostsStore};
