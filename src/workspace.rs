//! Ephemeral request workspaces.
//!
//! Each request gets a unique directory under the system temp root holding
//! its validated input files; the directory is bind-mounted into the step
//! containers through the box's volume template. The [`Workspace`] guard
//! removes the directory when dropped, so cleanup happens on every exit
//! path out of the engine, including errors and panics.
//!
//! # Security model
//!
//! File names come straight from the client, so they are validated before
//! any write: a name must be a single path component — no separators, no
//! `..`, no absolute prefix. The empty name is reserved for the entry file
//! and is renamed to the command's declared entry on disk. Violations fail
//! fast with the wire-visible `files[<name>]: invalid name`.

use std::collections::HashMap;
use std::fs::Permissions;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use tempfile::TempDir;
use tracing::{debug, trace};

use crate::error::ExecError;

/// File mode for materialized inputs: readable, never executable.
const FILE_MODE: u32 = 0o644;

/// A materialized workspace, removed from disk on drop.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Host path of the workspace directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Returns `true` if `name` is safe to create inside a workspace.
///
/// Safe means a single relative path component: non-empty, no `/` or `\`,
/// and no `..` anywhere.
#[must_use]
pub fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains("..")
}

/// Materializes request files into a fresh workspace directory.
///
/// The file stored under the empty name is written as `entry`; every other
/// name is validated with [`is_safe_name`] first.
///
/// # Errors
///
/// Returns [`ExecError::InvalidFilename`] for unsafe names (and for an
/// entry file when the command declares no entry), or
/// [`ExecError::Internal`] when the filesystem misbehaves.
pub async fn materialize(
    files: &HashMap<String, String>,
    entry: &str,
) -> std::result::Result<Workspace, ExecError> {
    let dir = tempfile::Builder::new()
        .prefix("codebox-")
        .tempdir()
        .map_err(|e| ExecError::Internal(format!("cannot create workspace: {e}")))?;

    for (name, content) in files {
        let filename = if name.is_empty() {
            if entry.is_empty() {
                // nothing to store the entry file under
                return Err(ExecError::InvalidFilename(String::new()));
            }
            entry
        } else {
            if !is_safe_name(name) {
                return Err(ExecError::InvalidFilename(name.clone()));
            }
            name.as_str()
        };

        let path = dir.path().join(filename);
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| ExecError::Internal(format!("cannot write {filename}: {e}")))?;
        tokio::fs::set_permissions(&path, Permissions::from_mode(FILE_MODE))
            .await
            .map_err(|e| ExecError::Internal(format!("cannot chmod {filename}: {e}")))?;
        trace!(file = filename, bytes = content.len(), "materialized");
    }

    debug!(path = %dir.path().display(), files = files.len(), "workspace ready");
    Ok(Workspace { dir })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn safe_name_matrix() {
        assert!(is_safe_name("main.py"));
        assert!(is_safe_name("data.csv"));
        assert!(is_safe_name("no-extension"));

        assert!(!is_safe_name(""));
        assert!(!is_safe_name("."));
        assert!(!is_safe_name(".."));
        assert!(!is_safe_name("../evil"));
        assert!(!is_safe_name("a/../b"));
        assert!(!is_safe_name("sub/file.py"));
        assert!(!is_safe_name("/etc/passwd"));
        assert!(!is_safe_name("windows\\path"));
    }

    #[tokio::test]
    async fn writes_entry_under_declared_name() {
        let ws = materialize(&files(&[("", "print('hi')")]), "main.py")
            .await
            .unwrap();
        let written = std::fs::read_to_string(ws.path().join("main.py")).unwrap();
        assert_eq!(written, "print('hi')");
    }

    #[tokio::test]
    async fn writes_extra_files_next_to_entry() {
        let ws = materialize(
            &files(&[("", "code"), ("data.txt", "1 2 3")]),
            "main.py",
        )
        .await
        .unwrap();
        assert!(ws.path().join("main.py").is_file());
        assert!(ws.path().join("data.txt").is_file());
    }

    #[tokio::test]
    async fn rejects_traversal_names() {
        let err = materialize(&files(&[("../../opt/codebox", "hehe")]), "main.py")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ExecError::InvalidFilename("../../opt/codebox".to_string())
        );
        assert_eq!(err.to_string(), "files[../../opt/codebox]: invalid name");
    }

    #[tokio::test]
    async fn rejects_entry_without_declared_name() {
        let err = materialize(&files(&[("", "code")]), "").await.unwrap_err();
        assert_eq!(err, ExecError::InvalidFilename(String::new()));
    }

    #[tokio::test]
    async fn removes_directory_on_drop() {
        let ws = materialize(&files(&[("", "code")]), "main.py").await.unwrap();
        let path = ws.path().to_path_buf();
        assert!(path.is_dir());
        drop(ws);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn files_are_not_executable() {
        let ws = materialize(&files(&[("", "#!/bin/sh")]), "main.sh")
            .await
            .unwrap();
        let mode = std::fs::metadata(ws.path().join("main.sh"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o644);
    }
}
