//! SSH Configuration

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How the server's host key is checked during the handshake
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum HostKeyPolicy {
    /// Key must already be present in known_hosts and match
    #[default]
    Strict,
    /// Unknown hosts are accepted and saved, changed keys are rejected
    TrustOnFirstUse,
    /// Key fingerprint must equal the configured `SHA256:...` value
    Pinned { fingerprint: String },
    /// Any key is accepted (no verification at all)
    AcceptAny,
}

impl HostKeyPolicy {
    /// Short name used in logs and environment values
    pub fn name(&self) -> &'static str {
        match self {
            HostKeyPolicy::Strict => "strict",
            HostKeyPolicy::TrustOnFirstUse => "trust_on_first_use",
            HostKeyPolicy::Pinned { .. } => "pinned",
            HostKeyPolicy::AcceptAny => "accept_any",
        }
    }
}

/// SSH connection configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct SshConfig {
    /// Remote host address
    pub host: String,

    /// SSH port (default: 22)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Username for authentication
    pub username: String,

    /// Password for authentication
    pub password: String,

    /// Connection timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Host key verification mode
    #[serde(default)]
    pub host_key_policy: HostKeyPolicy,

    /// Override for the known_hosts file (defaults to ~/.ssh/known_hosts)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub known_hosts_path: Option<PathBuf>,
}

impl fmt::Debug for SshConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .field("host_key_policy", &self.host_key_policy)
            .field("known_hosts_path", &self.known_hosts_path)
            .finish()
    }
}

fn default_port() -> u16 {
    22
}

fn default_timeout() -> u64 {
    30
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 22,
            username: String::new(),
            password: String::new(),
            timeout_secs: 30,
            host_key_policy: HostKeyPolicy::Strict,
            known_hosts_path: None,
        }
    }
}
