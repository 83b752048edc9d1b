//! Configuration Types

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::storage::ConfigError;
use crate::remote::{ListingMode, RemoteShell, SessionOptions};
use crate::ssh::{HostKeyPolicy, SshConfig};

pub const ENV_HOST: &str = "SSH_HOST";
pub const ENV_PORT: &str = "SSH_PORT";
pub const ENV_USER: &str = "SSH_USER";
pub const ENV_PASSWORD: &str = "SSH_PASSWORD";
pub const ENV_REMOTE_PATH: &str = "REMOTE_PATH";
pub const ENV_HOST_KEY_POLICY: &str = "SSH_HOST_KEY_POLICY";
pub const ENV_HOST_FINGERPRINT: &str = "SSH_HOST_FINGERPRINT";
pub const ENV_REMOTE_SHELL: &str = "REMOTE_SHELL";

/// Application configuration (`config.json`, overlaid by the environment)
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Remote directory holding every managed folder
    pub remote_root: String,
    pub host_key_policy: HostKeyPolicy,
    pub remote_shell: RemoteShell,
    pub listing: ListingMode,
    pub connect_timeout_secs: u64,
    pub command_timeout_secs: u64,
    pub io_timeout_secs: u64,
    pub prune_orphans_on_refresh: bool,
    /// Overrides the config directory for the database and temp files
    pub data_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 22,
            username: String::new(),
            password: String::new(),
            remote_root: String::new(),
            host_key_policy: HostKeyPolicy::default(),
            remote_shell: RemoteShell::default(),
            listing: ListingMode::default(),
            connect_timeout_secs: 30,
            command_timeout_secs: 60,
            io_timeout_secs: 300,
            prune_orphans_on_refresh: false,
            data_dir: None,
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("remote_root", &self.remote_root)
            .field("host_key_policy", &self.host_key_policy)
            .field("remote_shell", &self.remote_shell)
            .field("listing", &self.listing)
            .field("data_dir", &self.data_dir)
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    /// Overlay values from `lookup` (normally the process environment)
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(host) = get(ENV_HOST) {
            self.host = host.trim().to_string();
        }
        if let Some(port) = get(ENV_PORT) {
            self.port = port.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: ENV_PORT,
                value: port.clone(),
            })?;
        }
        if let Some(user) = get(ENV_USER) {
            self.username = user;
        }
        if let Some(password) = get(ENV_PASSWORD) {
            self.password = password;
        }
        if let Some(root) = get(ENV_REMOTE_PATH) {
            self.remote_root = root;
        }
        if let Some(shell) = get(ENV_REMOTE_SHELL) {
            self.remote_shell = RemoteShell::parse(&shell).ok_or(ConfigError::InvalidValue {
                key: ENV_REMOTE_SHELL,
                value: shell.clone(),
            })?;
        }

        let fingerprint = get(ENV_HOST_FINGERPRINT);
        match get(ENV_HOST_KEY_POLICY) {
            Some(policy) => {
                self.host_key_policy = parse_policy(&policy, fingerprint, &self.host_key_policy)?;
            }
            None => {
                if let Some(fingerprint) = fingerprint {
                    self.host_key_policy = HostKeyPolicy::Pinned { fingerprint };
                }
            }
        }

        Ok(())
    }

    /// Every missing required key is reported at once
    pub fn validate(&self) -> Result<(), ConfigError> {
        let missing: Vec<&'static str> = [
            (ENV_HOST, &self.host),
            (ENV_USER, &self.username),
            (ENV_PASSWORD, &self.password),
            (ENV_REMOTE_PATH, &self.remote_root),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(key, _)| key)
        .collect();

        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidValue {
                key: ENV_PORT,
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    pub fn ssh_config(&self) -> SshConfig {
        SshConfig {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            password: self.password.clone(),
            timeout_secs: self.connect_timeout_secs,
            host_key_policy: self.host_key_policy.clone(),
            known_hosts_path: None,
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            remote_root: self.remote_root.clone(),
            shell: self.remote_shell,
            listing: self.listing,
            command_timeout: Duration::from_secs(self.command_timeout_secs),
            io_timeout: Duration::from_secs(self.io_timeout_secs),
        }
    }
}

fn parse_policy(
    value: &str,
    fingerprint: Option<String>,
    current: &HostKeyPolicy,
) -> Result<HostKeyPolicy, ConfigError> {
    let invalid = || ConfigError::InvalidValue {
        key: ENV_HOST_KEY_POLICY,
        value: value.to_string(),
    };

    match value.trim().to_ascii_lowercase().as_str() {
        "strict" => Ok(HostKeyPolicy::Strict),
        "trust_on_first_use" | "tofu" => Ok(HostKeyPolicy::TrustOnFirstUse),
        "accept_any" => Ok(HostKeyPolicy::AcceptAny),
        "pinned" => match (fingerprint, current) {
            (Some(fingerprint), _) => Ok(HostKeyPolicy::Pinned { fingerprint }),
            (None, HostKeyPolicy::Pinned { fingerprint }) => Ok(HostKeyPolicy::Pinned {
                fingerprint: fingerprint.clone(),
            }),
            (None, _) => Err(ConfigError::InvalidValue {
                key: ENV_HOST_FINGERPRINT,
                value: String::new(),
            }),
        },
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_overlay() {
        let mut config = AppConfig::default();
        config
            .apply_env(env(&[
                ("SSH_HOST", "files.example.com"),
                ("SSH_PORT", "2222"),
                ("SSH_USER", "alice"),
                ("SSH_PASSWORD", "secret"),
                ("REMOTE_PATH", "D:/shares"),
                ("REMOTE_SHELL", "posix"),
            ]))
            .unwrap();

        assert_eq!(config.host, "files.example.com");
        assert_eq!(config.port, 2222);
        assert_eq!(config.remote_shell, RemoteShell::Posix);
        assert!(config.validate().is_ok());

        let ssh = config.ssh_config();
        assert_eq!(ssh.port, 2222);
        assert_eq!(ssh.timeout_secs, 30);
    }

    #[test]
    fn test_missing_keys_reported_together() {
        let mut config = AppConfig::default();
        config
            .apply_env(env(&[("SSH_PASSWORD", "x"), ("REMOTE_PATH", "/srv")]))
            .unwrap();

        let err = config.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing required configuration: SSH_HOST, SSH_USER"
        );
    }

    #[test]
    fn test_invalid_port() {
        let mut config = AppConfig::default();
        let err = config.apply_env(env(&[("SSH_PORT", "ssh")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "SSH_PORT", .. }));
    }

    #[test]
    fn test_host_key_policy_from_env() {
        let mut config = AppConfig::default();
        config
            .apply_env(env(&[("SSH_HOST_FINGERPRINT", "SHA256:abc")]))
            .unwrap();
        assert_eq!(
            config.host_key_policy,
            HostKeyPolicy::Pinned {
                fingerprint: "SHA256:abc".to_string()
            }
        );

        config
            .apply_env(env(&[("SSH_HOST_KEY_POLICY", "tofu")]))
            .unwrap();
        assert_eq!(config.host_key_policy, HostKeyPolicy::TrustOnFirstUse);

        let err = config
            .apply_env(env(&[("SSH_HOST_KEY_POLICY", "pinned")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "SSH_HOST_FINGERPRINT",
                ..
            }
        ));
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = AppConfig {
            password: "hunter2".to_string(),
            ..AppConfig::default()
        };
        assert!(!format!("{:?}", config).contains("hunter2"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"host":"h","remote_shell":"posix"}"#).unwrap();
        assert_eq!(config.port, 22);
        assert_eq!(config.remote_shell, RemoteShell::Posix);
        assert_eq!(config.listing, ListingMode::Shell);
        assert_eq!(config.host_key_policy, HostKeyPolicy::Strict);
    }
}
