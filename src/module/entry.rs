//! Export glue behind [`module_entry!`](crate::module_entry).

use super::bridge::{clear_staged, copy_input};
use super::capabilities::Capabilities;
use super::pipeline::Pipeline;

/// Copy the staged input out of memory and run the pipeline once over `caps`.
///
/// # Safety
///
/// `ptr..ptr + len` must be readable; normally it is the buffer the host
/// filled through `float_alloc`.
pub unsafe fn run_with<C: Capabilities>(caps: &mut C, ptr: *const u8, len: usize) -> u32 {
    let input = copy_input(ptr, len);
    // The host's staging buffer is ours to release once copied.
    clear_staged();

    let mut pipeline = Pipeline::new(caps);
    match input {
        Ok(raw) => pipeline.run(&raw),
        Err(e) => pipeline.reject(&e.to_string()),
    }
}

/// Entry point body for wasm32 modules, backed by the real host imports.
///
/// # Safety
///
/// `ptr..ptr + len` must be the range the host filled through `float_alloc`.
#[cfg(target_arch = "wasm32")]
pub unsafe fn run_entry(ptr: u32, len: u32) -> u32 {
    let mut host = super::capabilities::HostCapabilities;
    run_with(&mut host, ptr as usize as *const u8, len as usize)
}
