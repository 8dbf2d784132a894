//! Module SDK — everything that runs inside the sandbox.
//!
//! A module is single-shot: the host stages one input buffer, calls the
//! entry point once, and reads back whatever the module persisted through
//! `write_resource`. All I/O goes through the four host capabilities.
//!
//! Architecture:
//! - `bridge.rs` — owned-buffer copies across the memory boundary
//! - `capabilities.rs` — the `Capabilities` seam and its wasm32 host binding
//! - `input.rs` — input decoding and first-violation validation
//! - `request.rs` — outbound request projection and reply decoding
//! - `pipeline.rs` — the parse → validate → build → invoke → interpret → emit pass
//! - `output.rs` — result document, metadata and the emitter
//! - `error.rs` — the module error taxonomy
//! - `mock.rs` — scripted in-process host for tests
//! - `entry.rs` — export glue for `cdylib` modules

pub mod bridge;
pub mod capabilities;
pub mod entry;
pub mod error;
pub mod input;
pub mod mock;
pub mod output;
pub mod pipeline;
pub mod request;

pub use capabilities::{Capabilities, InvocationResult, Status};
pub use error::{ErrorKind, ModuleError};
pub use pipeline::Pipeline;

/// Declare the exports of a module crate.
///
/// Expands to the `float_alloc` export the host uses to stage buffers and to
/// an entry point with the given name that runs the module pipeline.
///
/// ```ignore
/// floatkit::module_entry!(generate_ollama);
/// ```
#[macro_export]
macro_rules! module_entry {
    ($entry:ident) => {
        #[no_mangle]
        pub extern "C" fn float_alloc(len: u32) -> u32 {
            $crate::module::bridge::stage_alloc(len)
        }

        #[no_mangle]
        pub extern "C" fn $entry(ptr: u32, len: u32) -> u32 {
            // SAFETY: the host hands us a range it staged through float_alloc.
            unsafe { $crate::module::entry::run_entry(ptr, len) }
        }
    };
}
