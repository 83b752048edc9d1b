//! Remote command execution over an exec channel

use std::time::Duration;

use russh::client::Msg;
use russh::{Channel, ChannelMsg};
use tracing::{debug, warn};

use super::error::SshError;

/// Captured result of one remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Standard output (lossy UTF-8)
    pub stdout: String,
    /// Standard error (lossy UTF-8)
    pub stderr: String,
    /// Exit status (None if the server never reported one)
    pub exit_status: Option<u32>,
}

/// Run `command` on a freshly opened session channel and collect its output.
///
/// Reads until the server closes the channel: exit-status usually arrives
/// after EOF, so stopping at EOF would lose it.
pub async fn run_command(
    mut channel: Channel<Msg>,
    command: &str,
    timeout: Duration,
) -> Result<ExecOutput, SshError> {
    debug!("exec: {}", command);

    channel
        .exec(true, command)
        .await
        .map_err(|e| SshError::ChannelError(format!("Failed to execute command: {}", e)))?;

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut exit_status: Option<u32> = None;

    let collected = tokio::time::timeout(timeout, async {
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { data } => stdout.extend_from_slice(&data),
                // ext=1 is stderr
                ChannelMsg::ExtendedData { data, ext: 1 } => stderr.extend_from_slice(&data),
                ChannelMsg::ExitStatus { exit_status: status } => exit_status = Some(status),
                ChannelMsg::Close => break,
                _ => {}
            }
        }
    })
    .await;

    if collected.is_err() {
        warn!("exec timed out after {:?}: {}", timeout, command);
        let _ = channel.close().await;
        return Err(SshError::Timeout(format!(
            "Command timed out after {} seconds",
            timeout.as_secs()
        )));
    }

    let output = ExecOutput {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_status,
    };

    debug!(
        "exec completed: exit={:?} stdout_len={} stderr_len={}",
        output.exit_status,
        output.stdout.len(),
        output.stderr.len()
    );

    Ok(output)
}
