//! In-memory remote host for tests
//!
//! Interprets the Windows and POSIX listing/mkdir commands issued by the
//! session manager against a fake filesystem, and serves the transfer
//! channel operations from the same state. Failures can be injected per
//! operation.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::facility::{Connector, ShellConnection, TransferChannel};
use crate::sftp::path_utils::normalize_remote_path;
use crate::sftp::{RemoteEntry, RemoteStat, SftpError};
use crate::ssh::{ExecOutput, SshError};

const FAKE_MTIME: i64 = 1_700_000_000;

#[derive(Default)]
struct FakeState {
    /// Directory paths in creation order
    dirs: Vec<String>,
    /// File paths and contents in creation order
    files: Vec<(String, Vec<u8>)>,
    connect_failure: Option<String>,
    exec_transport_failure: bool,
    /// (command substring, stderr) pairs that make a command exit 1
    exec_failures: Vec<(String, String)>,
    remove_failure: bool,
    stat_failure: bool,
    channel_close_failure: bool,
    connect_count: usize,
    closed_connections: usize,
    generation: u64,
}

impl FakeState {
    fn is_dir(&self, path: &str) -> bool {
        self.dirs.iter().any(|d| d == path)
    }

    fn file(&self, path: &str) -> Option<&Vec<u8>> {
        self.files.iter().find(|(p, _)| p == path).map(|(_, data)| data)
    }

    fn children(&self, dir: &str) -> Vec<RemoteEntry> {
        let dirs = self.dirs.iter().map(|p| (p, true));
        let files = self.files.iter().map(|(p, _)| (p, false));
        dirs.chain(files)
            .filter_map(|(path, is_dir)| {
                let (parent, name) = path.rsplit_once('/')?;
                (parent == dir).then(|| RemoteEntry {
                    name: name.to_string(),
                    is_dir,
                })
            })
            .collect()
    }

    fn run(&mut self, command: &str) -> ExecOutput {
        if let Some((_, stderr)) = self
            .exec_failures
            .iter()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
        {
            return exit(1, "", stderr);
        }

        let posix = command.contains('\'');
        let Some(path) = quoted_arg(command) else {
            return exit(1, "", "The syntax of the command is incorrect.");
        };

        if command.starts_with("mkdir") {
            if self.is_dir(&path) || self.file(&path).is_some() {
                if posix {
                    return exit(0, "", "");
                }
                return exit(
                    1,
                    "",
                    &format!("A subdirectory or file {} already exists.", path),
                );
            }
            self.dirs.push(path);
            return exit(0, "", "");
        }

        let want_dirs = if command.contains("/ad") || command.contains("-type d") {
            true
        } else if command.contains("/a-d") || command.contains("-type f") {
            false
        } else {
            return exit(1, "", &format!("'{}' is not recognized", command));
        };

        if !self.is_dir(&path) {
            if posix {
                return exit(1, "", &format!("find: '{}': No such file or directory", path));
            }
            return exit(1, "", "The system cannot find the file specified.");
        }

        let names: Vec<String> = self
            .children(&path)
            .into_iter()
            .filter(|e| e.is_dir == want_dirs)
            .map(|e| e.name)
            .collect();

        match (posix, names.is_empty()) {
            (true, _) => exit(0, &names.iter().map(|n| format!("{}\n", n)).collect::<String>(), ""),
            (false, true) => exit(1, "", "File Not Found"),
            (false, false) => exit(0, &format!("{}\r\n", names.join("\r\n")), ""),
        }
    }
}

fn exit(status: u32, stdout: &str, stderr: &str) -> ExecOutput {
    let stderr = if stderr.is_empty() {
        String::new()
    } else {
        format!("{}\r\n", stderr)
    };
    ExecOutput {
        stdout: stdout.to_string(),
        stderr,
        exit_status: Some(status),
    }
}

/// First `"..."` or `'...'` argument of a command
fn quoted_arg(command: &str) -> Option<String> {
    let start = command.find(['"', '\''])?;
    let quote = command[start..].chars().next()?;
    let rest = &command[start + 1..];
    let end = rest.find(quote)?;
    Some(rest[..end].to_string())
}

/// Handle to a fake remote host; clones share the same state
#[derive(Clone, Default)]
pub struct FakeRemote {
    state: Arc<Mutex<FakeState>>,
}

impl FakeRemote {
    pub fn new(root: &str) -> Self {
        let remote = Self::default();
        remote.add_dir(root);
        remote
    }

    pub fn connector(&self) -> FakeConnector {
        FakeConnector {
            state: self.state.clone(),
        }
    }

    pub fn add_dir(&self, path: &str) {
        let path = normalize_remote_path(path);
        let mut state = self.state.lock();
        if !state.is_dir(&path) {
            state.dirs.push(path);
        }
    }

    pub fn add_file(&self, path: &str, data: &[u8]) {
        let path = normalize_remote_path(path);
        let mut state = self.state.lock();
        state.files.retain(|(p, _)| *p != path);
        state.files.push((path, data.to_vec()));
    }

    pub fn remove_dir(&self, path: &str) {
        let path = normalize_remote_path(path);
        self.state.lock().dirs.retain(|d| *d != path);
    }

    pub fn exists(&self, path: &str) -> bool {
        let state = self.state.lock();
        state.is_dir(path) || state.file(path).is_some()
    }

    pub fn file_contents(&self, path: &str) -> Option<Vec<u8>> {
        self.state.lock().file(path).cloned()
    }

    pub fn set_connect_failure(&self, message: Option<&str>) {
        self.state.lock().connect_failure = message.map(String::from);
    }

    pub fn set_exec_transport_failure(&self, fail: bool) {
        self.state.lock().exec_transport_failure = fail;
    }

    /// Commands containing `pattern` exit 1 with `stderr`
    pub fn fail_exec_matching(&self, pattern: &str, stderr: &str) {
        self.state
            .lock()
            .exec_failures
            .push((pattern.to_string(), stderr.to_string()));
    }

    pub fn set_remove_failure(&self, fail: bool) {
        self.state.lock().remove_failure = fail;
    }

    pub fn set_stat_failure(&self, fail: bool) {
        self.state.lock().stat_failure = fail;
    }

    pub fn set_channel_close_failure(&self, fail: bool) {
        self.state.lock().channel_close_failure = fail;
    }

    /// Every connection handed out so far stops being alive
    pub fn kill_connections(&self) {
        self.state.lock().generation += 1;
    }

    pub fn connect_count(&self) -> usize {
        self.state.lock().connect_count
    }

    pub fn closed_connections(&self) -> usize {
        self.state.lock().closed_connections
    }
}

pub struct FakeConnector {
    state: Arc<Mutex<FakeState>>,
}

#[async_trait]
impl Connector for FakeConnector {
    type Connection = FakeConnection;

    async fn connect(&self) -> Result<FakeConnection, SshError> {
        let mut state = self.state.lock();
        if let Some(message) = &state.connect_failure {
            return Err(SshError::AuthenticationFailed(message.clone()));
        }
        state.connect_count += 1;
        Ok(FakeConnection {
            state: self.state.clone(),
            generation: state.generation,
        })
    }
}

pub struct FakeConnection {
    state: Arc<Mutex<FakeState>>,
    generation: u64,
}

#[async_trait]
impl ShellConnection for FakeConnection {
    type Transfer = FakeTransfer;

    fn is_alive(&self) -> bool {
        self.state.lock().generation == self.generation
    }

    async fn exec(&self, command: &str, _timeout: Duration) -> Result<ExecOutput, SshError> {
        let mut state = self.state.lock();
        if state.exec_transport_failure || state.generation != self.generation {
            return Err(SshError::ChannelError("channel closed".to_string()));
        }
        Ok(state.run(command))
    }

    async fn open_transfer_channel(
        &self,
        _io_timeout: Duration,
    ) -> Result<FakeTransfer, SftpError> {
        if !self.is_alive() {
            return Err(SftpError::ChannelError("session closed".to_string()));
        }
        Ok(FakeTransfer {
            state: self.state.clone(),
            generation: self.generation,
        })
    }

    async fn close(&self) -> Result<(), SshError> {
        self.state.lock().closed_connections += 1;
        Ok(())
    }
}

pub struct FakeTransfer {
    state: Arc<Mutex<FakeState>>,
    generation: u64,
}

impl FakeTransfer {
    fn check_alive(&self) -> Result<(), SftpError> {
        if self.state.lock().generation == self.generation {
            Ok(())
        } else {
            Err(SftpError::ChannelError("session closed".to_string()))
        }
    }
}

#[async_trait]
impl TransferChannel for FakeTransfer {
    async fn put(&self, local_path: &Path, remote_path: &str) -> Result<u64, SftpError> {
        self.check_alive()?;
        let data = tokio::fs::read(local_path).await?;
        let len = data.len() as u64;

        let mut state = self.state.lock();
        let parent = remote_path
            .rsplit_once('/')
            .map(|(parent, _)| parent)
            .unwrap_or("");
        if !state.is_dir(parent) {
            return Err(SftpError::FileNotFound(remote_path.to_string()));
        }
        state.files.retain(|(p, _)| p != remote_path);
        state.files.push((remote_path.to_string(), data));
        Ok(len)
    }

    async fn get(&self, remote_path: &str, local_path: &Path) -> Result<u64, SftpError> {
        self.check_alive()?;
        let data = self
            .state
            .lock()
            .file(remote_path)
            .cloned()
            .ok_or_else(|| SftpError::FileNotFound(remote_path.to_string()))?;
        tokio::fs::write(local_path, &data).await?;
        Ok(data.len() as u64)
    }

    async fn stat(&self, remote_path: &str) -> Result<RemoteStat, SftpError> {
        self.check_alive()?;
        let state = self.state.lock();
        if state.stat_failure {
            return Err(SftpError::ProtocolError("stat not supported".to_string()));
        }
        if let Some(data) = state.file(remote_path) {
            return Ok(RemoteStat {
                size: data.len() as u64,
                modified: Some(FAKE_MTIME),
            });
        }
        if state.is_dir(remote_path) {
            return Ok(RemoteStat {
                size: 0,
                modified: Some(FAKE_MTIME),
            });
        }
        Err(SftpError::FileNotFound(remote_path.to_string()))
    }

    async fn remove(&self, remote_path: &str) -> Result<(), SftpError> {
        self.check_alive()?;
        let mut state = self.state.lock();
        if state.remove_failure {
            return Err(SftpError::PermissionDenied(remote_path.to_string()));
        }
        let before = state.files.len();
        state.files.retain(|(p, _)| p != remote_path);
        if state.files.len() == before {
            return Err(SftpError::FileNotFound(remote_path.to_string()));
        }
        Ok(())
    }

    async fn read_dir(&self, remote_path: &str) -> Result<Vec<RemoteEntry>, SftpError> {
        self.check_alive()?;
        let state = self.state.lock();
        if !state.is_dir(remote_path) {
            return Err(SftpError::FileNotFound(remote_path.to_string()));
        }
        Ok(state.children(remote_path))
    }

    async fn close(&self) -> Result<(), SftpError> {
        if self.state.lock().channel_close_failure {
            return Err(SftpError::ProtocolError("close failed".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_windows_listing_output() {
        let remote = FakeRemote::new("C:/data");
        remote.add_dir("C:/data/b");
        remote.add_dir("C:/data/a");
        let mut state = remote.state.lock();

        let out = state.run("dir \"C:/data\" /b /ad");
        assert_eq!(out.stdout, "b\r\na\r\n");
        assert_eq!(out.exit_status, Some(0));

        let out = state.run("dir \"C:/data\" /b /a-d");
        assert_eq!(out.exit_status, Some(1));
        assert_eq!(out.stderr, "File Not Found\r\n");
    }

    #[test]
    fn test_quoted_arg() {
        assert_eq!(quoted_arg("mkdir \"C:/x y\"").as_deref(), Some("C:/x y"));
        assert_eq!(quoted_arg("mkdir -p '/srv'").as_deref(), Some("/srv"));
        assert_eq!(quoted_arg("whoami"), None);
    }
}
