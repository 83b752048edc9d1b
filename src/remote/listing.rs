//! Directory listing parser and remote shell dialects

use serde::{Deserialize, Serialize};

/// Split raw listing output into entry names.
///
/// Lines are separated by `\r\n` (bare `\n` is accepted too); each line is
/// trimmed and empty lines are dropped. Server order is preserved.
pub fn parse_listing(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

/// True when `stderr` reports that the target already exists
pub fn is_already_exists(stderr: &str) -> bool {
    stderr.to_lowercase().contains("already exists")
}

/// Command dialect of the remote host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteShell {
    /// `cmd.exe` (Windows OpenSSH default shell)
    #[default]
    Windows,
    /// POSIX `sh`
    Posix,
}

impl RemoteShell {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "windows" | "cmd" => Some(Self::Windows),
            "posix" | "sh" | "unix" => Some(Self::Posix),
            _ => None,
        }
    }

    pub fn quote(&self, path: &str) -> String {
        match self {
            // cmd.exe has no escape for `"` inside quotes; Windows names
            // cannot contain it anyway.
            Self::Windows => format!("\"{}\"", path.replace('"', "")),
            Self::Posix => format!("'{}'", path.replace('\'', "'\\''")),
        }
    }

    /// Create `path`. Windows `mkdir` creates intermediate directories.
    pub fn mkdir_command(&self, path: &str) -> String {
        match self {
            Self::Windows => format!("mkdir {}", self.quote(path)),
            Self::Posix => format!("mkdir -p {}", self.quote(path)),
        }
    }

    /// Bare names of the immediate subdirectories of `path`
    pub fn list_dirs_command(&self, path: &str) -> String {
        match self {
            Self::Windows => format!("dir {} /b /ad", self.quote(path)),
            Self::Posix => format!(
                "find {} -mindepth 1 -maxdepth 1 -type d -exec basename {{}} \\;",
                self.quote(path)
            ),
        }
    }

    /// Bare names of the regular files directly inside `path`
    pub fn list_files_command(&self, path: &str) -> String {
        match self {
            Self::Windows => format!("dir {} /b /a-d", self.quote(path)),
            Self::Posix => format!(
                "find {} -mindepth 1 -maxdepth 1 -type f -exec basename {{}} \\;",
                self.quote(path)
            ),
        }
    }

    /// A failed listing that only means "nothing matched".
    ///
    /// `dir /b` exits non-zero with `File Not Found` for an empty directory.
    pub fn is_empty_listing(&self, stderr: &str) -> bool {
        match self {
            Self::Windows => stderr.trim().eq_ignore_ascii_case("File Not Found"),
            Self::Posix => false,
        }
    }
}

/// How folder and file names are enumerated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingMode {
    /// Run the shell's listing command and parse its output
    #[default]
    Shell,
    /// Read the directory over the SFTP channel
    Sftp,
}

impl ListingMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shell" => Some(Self::Shell),
            "sftp" => Some(Self::Sftp),
            _ => None,
        }
    }
}
