//! Remote session data types

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::ssh::ExecOutput;

/// Exit status reported for commands that never ran to completion
pub const TRANSPORT_FAILURE_STATUS: i32 = -1;

/// Connection lifecycle as seen by the session manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Never connected, or closed
    Disconnected,
    /// Authenticated handle held
    Connected,
    /// Last connect or operation hit a transport failure; next use reconnects
    Failed,
}

/// Result of `execute_command`: `(stdout, stderr, exit_status)`.
///
/// On transport failure `stdout` is `None`, `stderr` carries the error text
/// and `exit_status` is [`TRANSPORT_FAILURE_STATUS`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: Option<String>,
    pub stderr: String,
    pub exit_status: i32,
}

impl CommandOutput {
    pub fn transport_failure(message: impl Into<String>) -> Self {
        Self {
            stdout: None,
            stderr: message.into(),
            exit_status: TRANSPORT_FAILURE_STATUS,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_status == 0
    }

    pub fn is_transport_failure(&self) -> bool {
        self.stdout.is_none()
    }

    /// stderr, or a generic message when the command failed silently
    pub fn error_text(&self) -> String {
        if self.stderr.is_empty() {
            format!("command exited with status {}", self.exit_status)
        } else {
            self.stderr.clone()
        }
    }
}

impl From<ExecOutput> for CommandOutput {
    fn from(out: ExecOutput) -> Self {
        let mut stderr = out.stderr.trim().to_string();
        let exit_status = match out.exit_status {
            Some(status) => i32::try_from(status).unwrap_or(i32::MAX),
            None => {
                if stderr.is_empty() {
                    stderr = "remote command ended without an exit status".to_string();
                }
                TRANSPORT_FAILURE_STATUS
            }
        };

        Self {
            stdout: Some(out.stdout),
            stderr,
            exit_status,
        }
    }
}

/// Confirmation of a completed upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub remote_path: String,
    /// Size reported by a stat of the remote copy
    pub size: u64,
}

/// Confirmation of a completed download
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadReceipt {
    pub local_path: PathBuf,
    pub bytes: u64,
}
