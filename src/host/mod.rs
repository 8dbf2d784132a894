//! Host runtime — loads modules and owns every real I/O channel.
//!
//! A module can only reach the outside world through the four `env`
//! capabilities linked here. Files are confined to a per-invocation sandbox
//! directory, HTTP goes through an injected transport, and module log lines
//! become tracing events.
//!
//! Architecture:
//! - `runtime.rs` — ModuleRuntime: engine, module loading, export checks, invocation
//! - `memory.rs` — host side of the memory bridge (guest reads, staged pushes)
//! - `sandbox.rs` — capability grants and sandbox path resolution
//! - `transport.rs` — HttpTransport seam and the reqwest implementation
//! - `manifest.rs` — YAML module manifests
//! - `error.rs` — HostError types

pub mod error;
pub mod manifest;
pub mod memory;
pub mod runtime;
pub mod sandbox;
pub mod transport;

pub use error::HostError;
pub use manifest::ModuleManifest;
pub use runtime::{CapabilityCall, InvocationReport, LoadedModule, ModuleRuntime};
pub use sandbox::{Grants, Sandbox};
pub use transport::{HttpReply, HttpRequest, HttpTransport, ReqwestTransport};
