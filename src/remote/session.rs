//! Remote Session Manager
//!
//! Owns at most one authenticated connection and one transfer channel per
//! remote host. Every operation takes the session lock for its whole
//! duration, so concurrent callers are serialized and never interleave on
//! the shared handles.
//!
//! A transport failure (dead link, timeout, closed channel) marks the
//! session `Failed` and drops both handles; the next operation reconnects.
//! A remote-side failure (non-zero exit, missing file) leaves the
//! connection in place.

use std::path::Path;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::error::RemoteError;
use super::facility::{Connector, ShellConnection, TransferChannel};
use super::listing::{is_already_exists, parse_listing, ListingMode, RemoteShell};
use super::types::{CommandOutput, ConnectionState, DownloadReceipt, UploadReceipt};
use crate::sftp::path_utils::{
    is_plain_name, join_local_path, local_file_name, normalize_remote_path, remote_file_path,
    remote_folder_path,
};
use crate::sftp::{RemoteStat, SftpError};

type ConnectionOf<C> = <C as Connector>::Connection;
type TransferOf<C> = <<C as Connector>::Connection as ShellConnection>::Transfer;

/// Folder and file names must stay one level below their parent
fn check_name(name: &str) -> Result<(), RemoteError> {
    if is_plain_name(name) {
        Ok(())
    } else {
        Err(RemoteError::InvalidName(name.to_string()))
    }
}

/// Behaviour knobs for a session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Absolute folder on the remote host under which all managed folders live
    pub remote_root: String,
    pub shell: RemoteShell,
    pub listing: ListingMode,
    pub command_timeout: Duration,
    /// Per-chunk timeout for transfer channel I/O
    pub io_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            remote_root: String::new(),
            shell: RemoteShell::default(),
            listing: ListingMode::default(),
            command_timeout: Duration::from_secs(60),
            io_timeout: Duration::from_secs(300),
        }
    }
}

struct SessionState<C: Connector> {
    state: ConnectionState,
    connection: Option<ConnectionOf<C>>,
    transfer: Option<TransferOf<C>>,
}

pub struct RemoteSession<C: Connector> {
    connector: C,
    options: SessionOptions,
    inner: Mutex<SessionState<C>>,
}

impl<C: Connector> RemoteSession<C> {
    pub fn new(connector: C, mut options: SessionOptions) -> Self {
        options.remote_root = normalize_remote_path(&options.remote_root);
        Self {
            connector,
            options,
            inner: Mutex::new(SessionState {
                state: ConnectionState::Disconnected,
                connection: None,
                transfer: None,
            }),
        }
    }

    pub fn remote_root(&self) -> &str {
        &self.options.remote_root
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub async fn state(&self) -> ConnectionState {
        self.inner.lock().await.state
    }

    /// Establish a fresh authenticated connection, replacing any existing one
    pub async fn connect(&self) -> Result<(), RemoteError> {
        let mut st = self.inner.lock().await;
        self.connect_locked(&mut st).await
    }

    /// Reconnect only if there is no live connection
    pub async fn ensure_connected(&self) -> Result<(), RemoteError> {
        let mut st = self.inner.lock().await;
        self.ensure_connected_locked(&mut st).await
    }

    /// Open the transfer channel on the current connection if not already open
    pub async fn open_transfer_channel(&self) -> Result<(), RemoteError> {
        let mut st = self.inner.lock().await;
        self.ensure_transfer_locked(&mut st).await.map(|_| ())
    }

    /// Release the transfer channel, then the connection. Never fails.
    pub async fn close(&self) {
        let mut st = self.inner.lock().await;
        Self::close_locked(&mut st).await;
        info!("Remote session closed");
    }

    /// Run a shell command on the remote host.
    ///
    /// Transport failures come back as `(None, error text, -1)` instead of
    /// an `Err`.
    pub async fn execute_command(&self, command: &str) -> CommandOutput {
        let mut st = self.inner.lock().await;
        self.exec_locked(&mut st, command).await
    }

    /// Create `root/name`. An existing folder counts as success.
    pub async fn create_folder(&self, name: &str) -> Result<String, RemoteError> {
        let mut st = self.inner.lock().await;
        self.create_folder_locked(&mut st, name).await
    }

    /// Immediate subdirectory names of the remote root, in server order
    pub async fn list_folders(&self) -> Result<Vec<String>, RemoteError> {
        let mut st = self.inner.lock().await;
        let root = self.options.remote_root.clone();
        match self.options.listing {
            ListingMode::Shell => {
                let command = self.options.shell.list_dirs_command(&root);
                self.list_shell_locked(&mut st, &command).await
            }
            ListingMode::Sftp => self.list_sftp_locked(&mut st, &root, true).await,
        }
    }

    /// Regular file names directly inside `root/folder`, in server order
    pub async fn list_files(&self, folder: &str) -> Result<Vec<String>, RemoteError> {
        check_name(folder)?;
        let mut st = self.inner.lock().await;
        let path = remote_folder_path(&self.options.remote_root, folder);
        match self.options.listing {
            ListingMode::Shell => {
                let command = self.options.shell.list_files_command(&path);
                self.list_shell_locked(&mut st, &command).await
            }
            ListingMode::Sftp => self.list_sftp_locked(&mut st, &path, false).await,
        }
    }

    pub async fn stat_file(&self, folder: &str, file: &str) -> Result<RemoteStat, RemoteError> {
        check_name(folder)?;
        check_name(file)?;
        let mut st = self.inner.lock().await;
        let path = remote_file_path(&self.options.remote_root, folder, file);
        let result = {
            let transfer = self.ensure_transfer_locked(&mut st).await?;
            transfer.stat(&path).await
        };
        result.map_err(|e| Self::transfer_failed(&mut st, e))
    }

    /// Copy a local file to `root/folder/<local file name>`.
    ///
    /// The local file is checked before anything touches the remote host.
    /// The folder is created next; if that fails nothing is transferred.
    pub async fn upload_file(
        &self,
        local_path: &Path,
        folder: &str,
    ) -> Result<UploadReceipt, RemoteError> {
        check_name(folder)?;
        let file_name = local_file_name(local_path)
            .ok_or_else(|| RemoteError::InvalidName(local_path.display().to_string()))?;
        check_name(&file_name)?;

        let metadata = tokio::fs::metadata(local_path).await.map_err(SftpError::from)?;
        if !metadata.is_file() {
            return Err(RemoteError::InvalidName(local_path.display().to_string()));
        }

        let mut st = self.inner.lock().await;
        self.create_folder_locked(&mut st, folder).await?;

        let remote_path = remote_file_path(&self.options.remote_root, folder, &file_name);
        let result = {
            let transfer = self.ensure_transfer_locked(&mut st).await?;
            match transfer.put(local_path, &remote_path).await {
                Ok(written) => match transfer.stat(&remote_path).await {
                    Ok(stat) => Ok(stat.size),
                    Err(e) => {
                        debug!("stat after upload failed, using byte count: {}", e);
                        Ok(written)
                    }
                },
                Err(e) => Err(e),
            }
        };
        let size = result.map_err(|e| Self::transfer_failed(&mut st, e))?;

        info!("Uploaded {:?} to {} ({} bytes)", local_path, remote_path, size);
        Ok(UploadReceipt { remote_path, size })
    }

    /// Copy `root/folder/file` to `local_dir/file`, overwriting it
    pub async fn download_file(
        &self,
        folder: &str,
        file: &str,
        local_dir: &Path,
    ) -> Result<DownloadReceipt, RemoteError> {
        check_name(folder)?;
        check_name(file)?;

        let mut st = self.inner.lock().await;
        let remote_path = remote_file_path(&self.options.remote_root, folder, file);
        let local_path = join_local_path(local_dir, file);
        let result = {
            let transfer = self.ensure_transfer_locked(&mut st).await?;
            transfer.get(&remote_path, &local_path).await
        };
        let bytes = result.map_err(|e| Self::transfer_failed(&mut st, e))?;

        Ok(DownloadReceipt { local_path, bytes })
    }

    pub async fn delete_file(&self, folder: &str, file: &str) -> Result<(), RemoteError> {
        check_name(folder)?;
        check_name(file)?;
        let mut st = self.inner.lock().await;
        let remote_path = remote_file_path(&self.options.remote_root, folder, file);
        let result = {
            let transfer = self.ensure_transfer_locked(&mut st).await?;
            transfer.remove(&remote_path).await
        };
        result.map_err(|e| Self::transfer_failed(&mut st, e))?;

        info!("Deleted {}", remote_path);
        Ok(())
    }

    async fn connect_locked(&self, st: &mut SessionState<C>) -> Result<(), RemoteError> {
        Self::close_locked(st).await;

        match self.connector.connect().await {
            Ok(connection) => {
                st.connection = Some(connection);
                st.state = ConnectionState::Connected;
                Ok(())
            }
            Err(e) => {
                warn!("Connect failed: {}", e);
                st.state = ConnectionState::Failed;
                Err(RemoteError::Connection(e))
            }
        }
    }

    async fn ensure_connected_locked(&self, st: &mut SessionState<C>) -> Result<(), RemoteError> {
        if st.state == ConnectionState::Connected {
            match &st.connection {
                Some(conn) if conn.is_alive() => return Ok(()),
                Some(_) => warn!("Connection no longer alive, reconnecting"),
                None => {}
            }
        }
        self.connect_locked(st).await
    }

    async fn ensure_transfer_locked<'a>(
        &self,
        st: &'a mut SessionState<C>,
    ) -> Result<&'a TransferOf<C>, RemoteError> {
        self.ensure_connected_locked(st).await?;

        if st.transfer.is_none() {
            let opened = match &st.connection {
                Some(conn) => conn.open_transfer_channel(self.options.io_timeout).await,
                None => Err(SftpError::ChannelError("no connection".to_string())),
            };
            match opened {
                Ok(channel) => st.transfer = Some(channel),
                Err(e) => {
                    warn!("Transfer channel negotiation failed: {}", e);
                    if e.is_transport_failure() {
                        Self::mark_failed(st);
                    }
                    return Err(RemoteError::ChannelNegotiation(e));
                }
            }
        }

        st.transfer.as_ref().ok_or_else(|| {
            RemoteError::ChannelNegotiation(SftpError::ChannelError(
                "transfer channel unavailable".to_string(),
            ))
        })
    }

    async fn exec_locked(&self, st: &mut SessionState<C>, command: &str) -> CommandOutput {
        if let Err(e) = self.ensure_connected_locked(st).await {
            return CommandOutput::transport_failure(e.to_string());
        }
        let Some(conn) = st.connection.as_ref() else {
            return CommandOutput::transport_failure("no connection");
        };

        let result = conn.exec(command, self.options.command_timeout).await;
        match result {
            Ok(out) => {
                let out = CommandOutput::from(out);
                if out.exit_status != 0 {
                    debug!("exit {}: {}", out.exit_status, out.stderr);
                }
                out
            }
            Err(e) => {
                warn!("Command transport failure: {}", e);
                if e.is_transport_failure() {
                    Self::mark_failed(st);
                }
                CommandOutput::transport_failure(e.to_string())
            }
        }
    }

    async fn create_folder_locked(
        &self,
        st: &mut SessionState<C>,
        name: &str,
    ) -> Result<String, RemoteError> {
        check_name(name)?;

        let path = remote_folder_path(&self.options.remote_root, name);
        let out = self
            .exec_locked(st, &self.options.shell.mkdir_command(&path))
            .await;

        if out.success() || (!out.is_transport_failure() && is_already_exists(&out.stderr)) {
            debug!("Folder ready: {}", path);
            Ok(path)
        } else if out.is_transport_failure() {
            Err(RemoteError::Transport(out.stderr))
        } else {
            Err(RemoteError::Operation(out.error_text()))
        }
    }

    async fn list_shell_locked(
        &self,
        st: &mut SessionState<C>,
        command: &str,
    ) -> Result<Vec<String>, RemoteError> {
        let out = self.exec_locked(st, command).await;
        match out.stdout {
            None => Err(RemoteError::Transport(out.stderr)),
            Some(stdout) if out.exit_status == 0 => Ok(parse_listing(&stdout)),
            Some(_) if self.options.shell.is_empty_listing(&out.stderr) => Ok(Vec::new()),
            Some(_) => {
                if out.stderr.is_empty() {
                    Err(RemoteError::Operation(format!(
                        "command exited with status {}",
                        out.exit_status
                    )))
                } else {
                    Err(RemoteError::Operation(out.stderr))
                }
            }
        }
    }

    async fn list_sftp_locked(
        &self,
        st: &mut SessionState<C>,
        path: &str,
        dirs: bool,
    ) -> Result<Vec<String>, RemoteError> {
        let result = {
            let transfer = self.ensure_transfer_locked(st).await?;
            transfer.read_dir(path).await
        };
        let entries = result.map_err(|e| Self::transfer_failed(st, e))?;

        Ok(entries
            .into_iter()
            .filter(|entry| entry.is_dir == dirs)
            .map(|entry| entry.name)
            .collect())
    }

    fn transfer_failed(st: &mut SessionState<C>, err: SftpError) -> RemoteError {
        if err.is_transport_failure() {
            warn!("Transfer channel failure: {}", err);
            Self::mark_failed(st);
            RemoteError::Transport(err.to_string())
        } else {
            RemoteError::Transfer(err)
        }
    }

    fn mark_failed(st: &mut SessionState<C>) {
        st.transfer = None;
        st.connection = None;
        st.state = ConnectionState::Failed;
    }

    async fn close_locked(st: &mut SessionState<C>) {
        if let Some(transfer) = st.transfer.take() {
            if let Err(e) = transfer.close().await {
                debug!("Transfer channel close failed: {}", e);
            }
        }
        if let Some(connection) = st.connection.take() {
            if let Err(e) = connection.close().await {
                debug!("Connection close failed: {}", e);
            }
        }
        st.state = ConnectionState::Disconnected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::fake::{FakeConnector, FakeRemote};

    fn session(
        remote: &FakeRemote,
        shell: RemoteShell,
        listing: ListingMode,
    ) -> RemoteSession<FakeConnector> {
        RemoteSession::new(
            remote.connector(),
            SessionOptions {
                remote_root: "C:/data".to_string(),
                shell,
                listing,
                ..SessionOptions::default()
            },
        )
    }

    #[tokio::test]
    async fn test_list_folders_empty_root() {
        let remote = FakeRemote::new("C:/data");
        let session = session(&remote, RemoteShell::Windows, ListingMode::Shell);

        assert!(session.list_folders().await.unwrap().is_empty());
        assert_eq!(session.state().await, ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_create_folder_is_idempotent() {
        let remote = FakeRemote::new("C:/data");
        let session = session(&remote, RemoteShell::Windows, ListingMode::Shell);

        let first = session.create_folder("docs").await.unwrap();
        let second = session.create_folder("docs").await.unwrap();
        assert_eq!(first, "C:/data/docs");
        assert_eq!(second, first);
        assert_eq!(session.list_folders().await.unwrap(), vec!["docs"]);
    }

    #[tokio::test]
    async fn test_list_folders_keeps_server_order() {
        let remote = FakeRemote::new("/srv/data");
        remote.add_dir("/srv/data/zeta");
        remote.add_dir("/srv/data/alpha");
        let session = RemoteSession::new(
            remote.connector(),
            SessionOptions {
                remote_root: "/srv/data".to_string(),
                shell: RemoteShell::Posix,
                ..SessionOptions::default()
            },
        );

        assert_eq!(session.list_folders().await.unwrap(), vec!["zeta", "alpha"]);
    }

    #[tokio::test]
    async fn test_listing_over_sftp() {
        let remote = FakeRemote::new("C:/data");
        remote.add_dir("C:/data/docs");
        remote.add_file("C:/data/docs/a.txt", b"hello");
        remote.add_dir("C:/data/docs/nested");
        let session = session(&remote, RemoteShell::Windows, ListingMode::Sftp);

        assert_eq!(session.list_folders().await.unwrap(), vec!["docs"]);
        assert_eq!(session.list_files("docs").await.unwrap(), vec!["a.txt"]);
    }

    #[tokio::test]
    async fn test_upload_download_round_trip() {
        let remote = FakeRemote::new("C:/data");
        let session = session(&remote, RemoteShell::Windows, ListingMode::Shell);
        let local = tempfile::tempdir().unwrap();
        let source = local.path().join("report.pdf");
        std::fs::write(&source, b"%PDF-1.4 body").unwrap();

        let receipt = session.upload_file(&source, "docs").await.unwrap();
        assert_eq!(receipt.remote_path, "C:/data/docs/report.pdf");
        assert_eq!(receipt.size, 13);
        assert_eq!(session.list_files("docs").await.unwrap(), vec!["report.pdf"]);

        let out_dir = tempfile::tempdir().unwrap();
        let download = session
            .download_file("docs", "report.pdf", out_dir.path())
            .await
            .unwrap();
        assert_eq!(download.bytes, 13);
        assert_eq!(std::fs::read(&download.local_path).unwrap(), b"%PDF-1.4 body");
    }

    #[tokio::test]
    async fn test_upload_aborts_when_folder_creation_fails() {
        let remote = FakeRemote::new("C:/data");
        remote.fail_exec_matching("mkdir", "Access is denied.");
        let session = session(&remote, RemoteShell::Windows, ListingMode::Shell);
        let local = tempfile::tempdir().unwrap();
        let source = local.path().join("a.txt");
        std::fs::write(&source, b"x").unwrap();

        let err = session.upload_file(&source, "docs").await.unwrap_err();
        assert!(matches!(err, RemoteError::Operation(ref msg) if msg == "Access is denied."));
        assert!(!remote.exists("C:/data/docs/a.txt"));
    }

    #[tokio::test]
    async fn test_delete_removes_file() {
        let remote = FakeRemote::new("C:/data");
        remote.add_dir("C:/data/docs");
        remote.add_file("C:/data/docs/a.txt", b"hello");
        let session = session(&remote, RemoteShell::Windows, ListingMode::Shell);

        session.delete_file("docs", "a.txt").await.unwrap();
        assert!(session.list_files("docs").await.unwrap().is_empty());

        let err = session.delete_file("docs", "a.txt").await.unwrap_err();
        assert!(matches!(err, RemoteError::Transfer(SftpError::FileNotFound(_))));
        assert_eq!(session.state().await, ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_connect_failure_reports_and_recovers() {
        let remote = FakeRemote::new("C:/data");
        remote.set_connect_failure(Some("Authentication failed"));
        let session = session(&remote, RemoteShell::Windows, ListingMode::Shell);

        assert!(matches!(
            session.connect().await,
            Err(RemoteError::Connection(_))
        ));
        assert_eq!(session.state().await, ConnectionState::Failed);

        let out = session.execute_command("dir").await;
        assert!(out.stdout.is_none());
        assert_eq!(out.exit_status, -1);

        remote.set_connect_failure(None);
        session.ensure_connected().await.unwrap();
        assert_eq!(session.state().await, ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_dead_connection_is_replaced() {
        let remote = FakeRemote::new("C:/data");
        let session = session(&remote, RemoteShell::Windows, ListingMode::Shell);
        session.connect().await.unwrap();
        assert_eq!(remote.connect_count(), 1);

        remote.kill_connections();
        session.list_folders().await.unwrap();
        assert_eq!(remote.connect_count(), 2);
    }

    #[tokio::test]
    async fn test_transport_failure_marks_failed() {
        let remote = FakeRemote::new("C:/data");
        let session = session(&remote, RemoteShell::Windows, ListingMode::Shell);
        session.connect().await.unwrap();

        remote.set_exec_transport_failure(true);
        let out = session.execute_command("dir \"C:/data\" /b /ad").await;
        assert!(out.is_transport_failure());
        assert_eq!(session.state().await, ConnectionState::Failed);

        remote.set_exec_transport_failure(false);
        let out = session.execute_command("dir \"C:/data\" /b /ad").await;
        assert_eq!(out.exit_status, 1);
        assert_eq!(out.stderr, "File Not Found");
    }

    #[tokio::test]
    async fn test_close_is_safe_when_never_connected() {
        let remote = FakeRemote::new("C:/data");
        let session = session(&remote, RemoteShell::Windows, ListingMode::Shell);

        session.close().await;
        session.close().await;
        assert_eq!(session.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_close_releases_channel_and_connection() {
        let remote = FakeRemote::new("C:/data");
        remote.set_channel_close_failure(true);
        let session = session(&remote, RemoteShell::Windows, ListingMode::Shell);
        session.open_transfer_channel().await.unwrap();

        session.close().await;
        assert_eq!(session.state().await, ConnectionState::Disconnected);
        assert_eq!(remote.closed_connections(), 1);
    }

    #[tokio::test]
    async fn test_stat_missing_file() {
        let remote = FakeRemote::new("C:/data");
        remote.add_dir("C:/data/docs");
        let session = session(&remote, RemoteShell::Windows, ListingMode::Shell);

        assert!(matches!(
            session.stat_file("docs", "gone.txt").await,
            Err(RemoteError::Transfer(SftpError::FileNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_download_rejects_path_names() {
        let remote = FakeRemote::new("C:/data");
        let session = session(&remote, RemoteShell::Windows, ListingMode::Shell);
        let out_dir = tempfile::tempdir().unwrap();

        assert!(matches!(
            session.download_file("docs", "../escape.txt", out_dir.path()).await,
            Err(RemoteError::InvalidName(_))
        ));
        assert!(matches!(
            session.download_file("..", "a.txt", out_dir.path()).await,
            Err(RemoteError::InvalidName(_))
        ));
    }

    #[tokio::test]
    async fn test_names_cannot_leave_the_root() {
        let remote = FakeRemote::new("C:/data");
        remote.add_dir("C:/data/docs");
        remote.add_dir("C:/other");
        remote.add_file("C:/other/secret.txt", b"keep");
        let session = session(&remote, RemoteShell::Windows, ListingMode::Shell);
        let local = tempfile::tempdir().unwrap();
        let source = local.path().join("a.txt");
        std::fs::write(&source, b"x").unwrap();

        for folder in ["../other", "..", ".", "", "docs/nested", "docs\\nested"] {
            assert!(
                matches!(
                    session.upload_file(&source, folder).await,
                    Err(RemoteError::InvalidName(_))
                ),
                "upload into {:?} was accepted",
                folder
            );
        }
        assert!(!remote.exists("C:/other/a.txt"));
        assert!(!remote.exists("C:/data/../other/a.txt"));

        assert!(matches!(
            session.delete_file("docs", "../../other/secret.txt").await,
            Err(RemoteError::InvalidName(_))
        ));
        assert!(matches!(
            session.delete_file("..", "other").await,
            Err(RemoteError::InvalidName(_))
        ));
        assert_eq!(remote.file_contents("C:/other/secret.txt").as_deref(), Some(&b"keep"[..]));

        assert!(matches!(
            session.stat_file("docs", "../../other/secret.txt").await,
            Err(RemoteError::InvalidName(_))
        ));
        assert!(matches!(
            session.list_files("../other").await,
            Err(RemoteError::InvalidName(_))
        ));
        assert!(matches!(
            session.create_folder("../other").await,
            Err(RemoteError::InvalidName(_))
        ));
        // rejected before connecting
        assert_eq!(remote.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_upload_checks_local_file_first() {
        let remote = FakeRemote::new("C:/data");
        let session = session(&remote, RemoteShell::Windows, ListingMode::Shell);
        let local = tempfile::tempdir().unwrap();

        let err = session
            .upload_file(&local.path().join("missing.txt"), "docs")
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Transfer(SftpError::IoError(_))));

        let dir_source = local.path().join("folder");
        std::fs::create_dir(&dir_source).unwrap();
        assert!(matches!(
            session.upload_file(&dir_source, "docs").await,
            Err(RemoteError::InvalidName(_))
        ));

        assert!(!remote.exists("C:/data/docs"));
        assert_eq!(remote.connect_count(), 0);
    }
}
