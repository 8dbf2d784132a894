//! Error types for the host runtime.

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("engine creation failed: {0}")]
    EngineCreation(String),
    #[error("module compilation failed: {0}")]
    Compilation(String),
    #[error("module imports unknown capability: {0}")]
    UnknownImport(String),
    #[error("module is missing export: {0}")]
    MissingExport(String),
    #[error("linking failed: {0}")]
    Link(String),
    #[error("instantiation failed: {0}")]
    Instantiation(String),
    #[error("guest memory error: {0}")]
    Memory(String),
    #[error("module trapped: {0}")]
    Trap(String),
    #[error("sandbox error: {0}")]
    Sandbox(String),
    #[error("manifest error: {0}")]
    Manifest(#[from] super::manifest::ManifestError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
