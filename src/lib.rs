//! floatkit — sandboxed integration modules and the host that runs them.
//!
//! A module is a WebAssembly core module that turns one JSON input into one
//! JSON output document, touching the world only through four host
//! capabilities. The first module is `ollama-generate`, a text-generation
//! bridge to an Ollama server.
//!
//! `abi` is shared by both sides, `module` compiles into guests, and `host`
//! (feature `host`, on by default) loads and runs them.

pub mod abi;
pub mod module;

#[cfg(feature = "host")]
pub mod host;
