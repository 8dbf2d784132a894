//! Capability grants and the per-invocation sandbox directory.
//!
//! Default grants are empty: no network, no writes. Every resource path a
//! module names is resolved inside one directory; anything that could
//! escape it is refused before the filesystem is touched.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::HostError;

/// Capability grants the host provisions before invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grants {
    #[serde(default)]
    pub network: bool,
    #[serde(default)]
    pub file_write: bool,
    /// Hosts `issue_request` may reach. Empty means any.
    #[serde(default)]
    pub allowed_hosts: Vec<String>,
}

impl Grants {
    pub fn allows_host(&self, host: &str) -> bool {
        self.allowed_hosts.is_empty()
            || self
                .allowed_hosts
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(host))
    }
}

/// A directory all module resource paths resolve into.
#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
}

impl Sandbox {
    /// Use `root` as the sandbox, creating it if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, HostError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| {
            HostError::Sandbox(format!("failed to create {}: {e}", root.display()))
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a module-supplied relative path to a host path.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, HostError> {
        if path.is_empty() {
            return Err(HostError::Sandbox("empty resource path".into()));
        }
        let rel = Path::new(path);
        for component in rel.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => {
                    return Err(HostError::Sandbox(format!(
                        "path escapes sandbox: {path}"
                    )))
                }
            }
        }
        Ok(self.root.join(rel))
    }

    pub fn read(&self, path: &str) -> Result<Vec<u8>, HostError> {
        let full = self.resolve(path)?;
        Ok(std::fs::read(full)?)
    }

    /// Write a file, creating parent directories inside the sandbox.
    pub fn write(&self, path: &str, data: &[u8]) -> Result<(), HostError> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(full, data)?;
        Ok(())
    }

    /// Remove a file if it exists.
    pub fn remove(&self, path: &str) -> Result<(), HostError> {
        let full = self.resolve(path)?;
        match std::fs::remove_file(full) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
