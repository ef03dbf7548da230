//! Environment checks implementation.

use std::path::{Path, PathBuf};

use crate::error::SystemError;

/// Results of all environment checks.
#[derive(Debug, Clone)]
pub struct SystemRequirements {
    /// Resolved path of the docker CLI.
    pub docker_path: PathBuf,
    /// Temp root used for request workspaces.
    pub temp_root: PathBuf,
}

/// Check all environment requirements and return detailed results.
///
/// # Errors
///
/// Returns the first failing requirement.
pub fn check_all() -> std::result::Result<SystemRequirements, SystemError> {
    let docker_path = find_docker().ok_or(SystemError::DockerNotFound)?;

    let temp_root = std::env::temp_dir();
    probe_temp(&temp_root)?;

    Ok(SystemRequirements {
        docker_path,
        temp_root,
    })
}

/// Locates the docker CLI on `PATH`.
fn find_docker() -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    find_in(std::env::split_paths(&path))
}

fn find_in(dirs: impl Iterator<Item = PathBuf>) -> Option<PathBuf> {
    dirs.map(|dir| dir.join("docker")).find(|p| p.is_file())
}

/// Verifies a workspace directory can be created under `dir`.
fn probe_temp(dir: &Path) -> std::result::Result<(), SystemError> {
    tempfile::tempdir_in(dir)
        .map(drop)
        .map_err(|e| SystemError::TempRootUnwritable {
            path: dir.to_path_buf(),
            source: e,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_docker_in_listed_dirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("docker"), "#!/bin/sh\n").unwrap();

        let found = find_in([dir.path().to_path_buf()].into_iter());
        assert_eq!(found, Some(dir.path().join("docker")));
    }

    #[test]
    fn missing_docker_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(find_in([dir.path().to_path_buf()].into_iter()), None);
    }

    #[test]
    fn temp_probe_accepts_writable_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(probe_temp(dir.path()).is_ok());
    }
}
