//! SSH Client implementation using russh

use std::sync::Arc;
use std::time::Duration;

use russh::client::{self, Handle};
use russh::keys::PublicKey;
use russh::Disconnect;
use tracing::{debug, info, warn};

use super::config::{HostKeyPolicy, SshConfig};
use super::error::SshError;
use super::exec::{run_command, ExecOutput};
use super::known_hosts::{default_known_hosts_path, HostKeyVerification, KnownHostsStore};
use crate::sftp::{SftpChannel, SftpError};

/// Establishes authenticated connections from a fixed configuration
pub struct SshClient {
    config: SshConfig,
}

impl SshClient {
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SshConfig {
        &self.config
    }

    /// Connect and authenticate with the stored password
    pub async fn connect(&self) -> Result<SshConnection, SshError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        info!(
            "Connecting to SSH server at {} (host key policy: {})",
            addr,
            self.config.host_key_policy.name()
        );

        let known_hosts = match self.config.host_key_policy {
            HostKeyPolicy::Strict | HostKeyPolicy::TrustOnFirstUse => {
                let path = self
                    .config
                    .known_hosts_path
                    .clone()
                    .unwrap_or_else(default_known_hosts_path);
                Some(Arc::new(KnownHostsStore::open(path)?))
            }
            HostKeyPolicy::Pinned { .. } | HostKeyPolicy::AcceptAny => None,
        };

        let ssh_config = client::Config {
            inactivity_timeout: None,
            keepalive_interval: Some(Duration::from_secs(30)),
            keepalive_max: 3,
            ..Default::default()
        };

        let handler = ClientHandler {
            host: self.config.host.clone(),
            port: self.config.port,
            policy: self.config.host_key_policy.clone(),
            known_hosts,
        };

        let mut handle = tokio::time::timeout(
            Duration::from_secs(self.config.timeout_secs),
            client::connect(
                Arc::new(ssh_config),
                (self.config.host.as_str(), self.config.port),
                handler,
            ),
        )
        .await
        .map_err(|_| SshError::Timeout("Connection timed out".to_string()))?
        .map_err(|e| match e {
            SshError::HostKeyRejected(_) => e,
            other => SshError::ConnectionFailed(other.to_string()),
        })?;

        debug!("SSH handshake completed");

        let authenticated = handle
            .authenticate_password(&self.config.username, &self.config.password)
            .await
            .map_err(|e| SshError::AuthenticationFailed(e.to_string()))?;

        if !authenticated.success() {
            return Err(SshError::AuthenticationFailed(
                "Authentication rejected by server".to_string(),
            ));
        }

        info!("SSH authentication successful for {}@{}", self.config.username, addr);

        Ok(SshConnection { handle, addr })
    }
}

/// An authenticated connection; exec and SFTP channels are opened from it
pub struct SshConnection {
    handle: Handle<ClientHandler>,
    addr: String,
}

impl SshConnection {
    /// False once the transport has been torn down by either side
    pub fn is_alive(&self) -> bool {
        !self.handle.is_closed()
    }

    /// Run one command in its own exec channel
    pub async fn exec(&self, command: &str, timeout: Duration) -> Result<ExecOutput, SshError> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| SshError::ChannelError(format!("Failed to open exec channel: {}", e)))?;

        run_command(channel, command, timeout).await
    }

    /// Open the SFTP subsystem on a new channel
    pub async fn open_sftp(&self, io_timeout: Duration) -> Result<SftpChannel, SftpError> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| SftpError::ChannelError(e.to_string()))?;

        SftpChannel::new(channel, io_timeout).await
    }

    pub async fn disconnect(&self) -> Result<(), SshError> {
        info!("Disconnecting from {}", self.addr);
        self.handle
            .disconnect(Disconnect::ByApplication, "Session closed", "en")
            .await
            .map_err(SshError::from)
    }
}

/// Client handler for russh callbacks; only host key checking is customised
pub struct ClientHandler {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
    known_hosts: Option<Arc<KnownHostsStore>>,
}

impl ClientHandler {
    fn check_known_hosts(&self, key: &PublicKey, trust_unknown: bool) -> Result<bool, SshError> {
        let Some(known_hosts) = &self.known_hosts else {
            return Err(SshError::HostKeyRejected(
                "known_hosts store not loaded".to_string(),
            ));
        };

        match known_hosts.verify(&self.host, self.port, key) {
            HostKeyVerification::Verified => {
                info!("Host key verified for {}:{}", self.host, self.port);
                Ok(true)
            }
            HostKeyVerification::Unknown { fingerprint } if trust_unknown => {
                info!(
                    "TOFU: trusting new host {}:{} (fingerprint: {})",
                    self.host, self.port, fingerprint
                );
                if let Err(e) = known_hosts.add_host(&self.host, self.port, key) {
                    warn!("Failed to save host key: {}", e);
                }
                Ok(true)
            }
            HostKeyVerification::Unknown { fingerprint } => {
                warn!(
                    "Unknown host key for {}:{} (fingerprint: {}), strict mode rejects it",
                    self.host, self.port, fingerprint
                );
                Err(SshError::HostKeyRejected(format!(
                    "unknown host {}:{} with fingerprint {}; add it to known_hosts, \
                     pin the fingerprint, or use trust_on_first_use",
                    self.host, self.port, fingerprint
                )))
            }
            HostKeyVerification::Changed {
                expected_fingerprint,
                actual_fingerprint,
            } => {
                warn!(
                    "HOST KEY CHANGED for {}:{}! Expected {}, got {}",
                    self.host, self.port, expected_fingerprint, actual_fingerprint
                );
                Err(SshError::HostKeyRejected(format!(
                    "key for {}:{} has changed (expected {}, got {})",
                    self.host, self.port, expected_fingerprint, actual_fingerprint
                )))
            }
        }
    }
}

impl client::Handler for ClientHandler {
    type Error = SshError;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        match &self.policy {
            HostKeyPolicy::Strict => self.check_known_hosts(server_public_key, false),
            HostKeyPolicy::TrustOnFirstUse => self.check_known_hosts(server_public_key, true),
            HostKeyPolicy::Pinned { fingerprint } => {
                let actual = KnownHostsStore::fingerprint(server_public_key);
                if &actual == fingerprint {
                    debug!("Pinned host key matched for {}:{}", self.host, self.port);
                    Ok(true)
                } else {
                    Err(SshError::HostKeyRejected(format!(
                        "pinned fingerprint {} does not match server key {}",
                        fingerprint, actual
                    )))
                }
            }
            HostKeyPolicy::AcceptAny => {
                warn!(
                    "Accepting host key for {}:{} without verification (fingerprint: {})",
                    self.host,
                    self.port,
                    KnownHostsStore::fingerprint(server_public_key)
                );
                Ok(true)
            }
        }
    }
}
