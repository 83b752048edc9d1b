//! known_hosts lookup for host key verification
//!
//! Only plain (non-hashed) host entries are understood. Hashed `|1|` entries
//! are skipped, which makes such hosts look unknown.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use parking_lot::RwLock;
use russh::keys::{PublicKey, PublicKeyBase64};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::error::SshError;

/// Outcome of checking a server key against known_hosts
#[derive(Debug, Clone, PartialEq)]
pub enum HostKeyVerification {
    /// Stored key of the same type matches
    Verified,
    /// No stored key of this type for the host
    Unknown { fingerprint: String },
    /// A stored key of the same type differs
    Changed {
        expected_fingerprint: String,
        actual_fingerprint: String,
    },
}

#[derive(Clone, Debug)]
struct HostKeyEntry {
    key_type: String,
    key_data: String,
}

/// Default location: ~/.ssh/known_hosts
pub fn default_known_hosts_path() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".ssh").join("known_hosts"))
        .unwrap_or_else(|| PathBuf::from(".ssh/known_hosts"))
}

/// In-memory view of a known_hosts file that can append new entries
pub struct KnownHostsStore {
    hosts: RwLock<HashMap<String, Vec<HostKeyEntry>>>,
    path: PathBuf,
}

impl KnownHostsStore {
    /// Load the file at `path`; a missing file yields an empty store
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SshError> {
        let path = path.into();
        let hosts = if path.exists() {
            Self::parse_file(&path)?
        } else {
            debug!("known_hosts not found at {:?}, starting empty", path);
            HashMap::new()
        };

        Ok(Self {
            hosts: RwLock::new(hosts),
            path,
        })
    }

    fn parse_file(path: &Path) -> Result<HashMap<String, Vec<HostKeyEntry>>, SshError> {
        let reader = BufReader::new(fs::File::open(path)?);
        let mut hosts: HashMap<String, Vec<HostKeyEntry>> = HashMap::new();
        let mut entry_count = 0;

        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            // hostname[,alias] keytype base64key [comment]
            let mut parts = line.split_whitespace();
            let (Some(hostnames), Some(key_type), Some(key_data)) =
                (parts.next(), parts.next(), parts.next())
            else {
                continue;
            };

            let entry = HostKeyEntry {
                key_type: key_type.to_string(),
                key_data: key_data.to_string(),
            };

            for hostname in hostnames.split(',').filter(|h| !h.starts_with('|')) {
                hosts
                    .entry(Self::normalize_hostname(hostname))
                    .or_default()
                    .push(entry.clone());
                entry_count += 1;
            }
        }

        info!(
            "Loaded {} known host entries ({} unique hosts)",
            entry_count,
            hosts.len()
        );
        Ok(hosts)
    }

    /// Hosts match case-insensitively; `[host]:port` forms are kept as written
    fn normalize_hostname(host: &str) -> String {
        host.to_lowercase()
    }

    /// Lookup key the way OpenSSH writes it
    fn make_key(host: &str, port: u16) -> String {
        let host = host.to_lowercase();
        if port == 22 {
            host
        } else {
            format!("[{}]:{}", host, port)
        }
    }

    /// SHA256 fingerprint in OpenSSH format (`SHA256:<unpadded base64>`)
    pub fn fingerprint(key: &PublicKey) -> String {
        Self::fingerprint_bytes(&key.public_key_bytes())
    }

    fn fingerprint_bytes(bytes: &[u8]) -> String {
        let hash = Sha256::digest(bytes);
        format!("SHA256:{}", BASE64.encode(hash).trim_end_matches('='))
    }

    fn fingerprint_from_b64(stored_b64: &str) -> String {
        BASE64
            .decode(stored_b64)
            .map(|bytes| Self::fingerprint_bytes(&bytes))
            .unwrap_or_else(|_| "unknown".to_string())
    }

    /// Check a server key for `host:port`
    pub fn verify(&self, host: &str, port: u16, key: &PublicKey) -> HostKeyVerification {
        let key_type = key.algorithm().as_str().to_string();
        let key_b64 = BASE64.encode(key.public_key_bytes());
        self.verify_raw(host, port, &key_type, &key_b64)
    }

    fn verify_raw(
        &self,
        host: &str,
        port: u16,
        key_type: &str,
        key_b64: &str,
    ) -> HostKeyVerification {
        let lookup_key = Self::make_key(host, port);
        let fingerprint = BASE64
            .decode(key_b64)
            .map(|b| Self::fingerprint_bytes(&b))
            .unwrap_or_else(|_| "unknown".to_string());

        let hosts = self.hosts.read();
        let stored = hosts
            .get(&lookup_key)
            .and_then(|entries| entries.iter().find(|e| e.key_type == key_type));

        match stored {
            Some(entry) if entry.key_data == key_b64 => {
                debug!("Host key verified for {} ({})", lookup_key, key_type);
                HostKeyVerification::Verified
            }
            Some(entry) => HostKeyVerification::Changed {
                expected_fingerprint: Self::fingerprint_from_b64(&entry.key_data),
                actual_fingerprint: fingerprint,
            },
            None => HostKeyVerification::Unknown { fingerprint },
        }
    }

    /// Remember a key and append it to the file
    pub fn add_host(&self, host: &str, port: u16, key: &PublicKey) -> Result<(), SshError> {
        let key_type = key.algorithm().as_str().to_string();
        let key_b64 = BASE64.encode(key.public_key_bytes());
        self.add_raw(host, port, &key_type, &key_b64)
    }

    fn add_raw(&self, host: &str, port: u16, key_type: &str, key_b64: &str) -> Result<(), SshError> {
        let lookup_key = Self::make_key(host, port);

        self.hosts
            .write()
            .entry(lookup_key.clone())
            .or_default()
            .push(HostKeyEntry {
                key_type: key_type.to_string(),
                key_data: key_b64.to_string(),
            });

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{} {} {}", lookup_key, key_type, key_b64)?;

        info!("Added {} host key for {} to {:?}", key_type, lookup_key, self.path);
        Ok(())
    }
}
