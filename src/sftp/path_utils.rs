//! Path helpers for the remote root / folder / file layout
//!
//! Remote paths always use `/`, even when the configured root was written
//! Windows-style (`D:\shares\data`); SFTP servers on Windows accept both.

use std::path::{Path, PathBuf};

/// Replace `\` separators with `/`
pub fn normalize_remote_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// Join remote path components using `/` separator.
pub fn join_remote_path(base: &str, component: &str) -> String {
    let base = normalize_remote_path(base);
    if base.is_empty() {
        component.to_string()
    } else if base.ends_with('/') {
        format!("{}{}", base, component)
    } else {
        format!("{}/{}", base, component)
    }
}

/// `root/folder`
pub fn remote_folder_path(root: &str, folder: &str) -> String {
    join_remote_path(root, folder)
}

/// `root/folder/file`
pub fn remote_file_path(root: &str, folder: &str, file: &str) -> String {
    join_remote_path(&remote_folder_path(root, folder), file)
}

/// A single folder or file name directly under its parent: not empty,
/// not `.` or `..`, and free of `/` and `\`
pub fn is_plain_name(name: &str) -> bool {
    !name.trim().is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.contains('\0')
}

/// Final component of a local path, as used for the remote file name
pub fn local_file_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

/// `dir/file_name` using the platform separator
pub fn join_local_path(dir: &Path, file_name: &str) -> PathBuf {
    dir.join(file_name)
}
