//! YAML module manifests.
//!
//! A manifest names the module's wasm file and entry point, declares its
//! input/output schemas, and lists the grants the host provisions before
//! the entry point runs. The module itself never asks for grants.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::sandbox::Grants;
use crate::abi::{OUTPUT_PATH, REPLY_PATH};

const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid manifest YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid manifest: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleManifest {
    pub module: ModuleSection,
    #[serde(default)]
    pub io: IoSection,
    #[serde(default)]
    pub grants: Grants,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub schemas: Schemas,
    /// Directory relative paths resolve against.
    #[serde(skip)]
    base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleSection {
    pub name: String,
    /// Path to the compiled module, relative to the manifest.
    pub wasm: PathBuf,
    pub entry_point: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Fixed resource paths shared by host and module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoSection {
    #[serde(default = "default_output_path")]
    pub output_path: String,
    #[serde(default = "default_reply_path")]
    pub reply_path: String,
}

impl Default for IoSection {
    fn default() -> Self {
        Self {
            output_path: default_output_path(),
            reply_path: default_reply_path(),
        }
    }
}

fn default_output_path() -> String {
    OUTPUT_PATH.into()
}

fn default_reply_path() -> String {
    REPLY_PATH.into()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Limits {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Declared schemas. Informational for the host; the module validates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schemas {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
}

impl ModuleManifest {
    /// Parse and validate a manifest. Relative paths resolve against `base_dir`.
    pub fn from_yaml(yaml: &str, base_dir: impl Into<PathBuf>) -> Result<Self, ManifestError> {
        let mut manifest: ModuleManifest = serde_yaml::from_str(yaml)?;
        manifest.base_dir = base_dir.into();
        manifest.validate()?;
        Ok(manifest)
    }

    /// Load a manifest file.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let yaml = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::from_yaml(&yaml, base_dir)
    }

    /// Absolute-or-manifest-relative path to the wasm file.
    pub fn wasm_path(&self) -> PathBuf {
        if self.module.wasm.is_absolute() {
            self.module.wasm.clone()
        } else {
            self.base_dir.join(&self.module.wasm)
        }
    }

    fn validate(&self) -> Result<(), ManifestError> {
        if self.module.name.trim().is_empty() {
            return Err(ManifestError::Invalid("module.name is empty".into()));
        }
        if self.module.entry_point.trim().is_empty() {
            return Err(ManifestError::Invalid("module.entry_point is empty".into()));
        }
        if self.module.wasm.as_os_str().is_empty() {
            return Err(ManifestError::Invalid("module.wasm is empty".into()));
        }
        for (key, path) in [
            ("io.output_path", &self.io.output_path),
            ("io.reply_path", &self.io.reply_path),
        ] {
            if path.is_empty() || Path::new(path).is_absolute() || path.contains("..") {
                return Err(ManifestError::Invalid(format!(
                    "{key} must be a relative path inside the sandbox, got '{path}'"
                )));
            }
        }
        if self.io.output_path == self.io.reply_path {
            return Err(ManifestError::Invalid(
                "io.output_path and io.reply_path must differ".into(),
            ));
        }
        if self.limits.timeout_secs == 0 {
            return Err(ManifestError::Invalid("limits.timeout_secs must be > 0".into()));
        }
        Ok(())
    }
}
