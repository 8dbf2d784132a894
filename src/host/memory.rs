//! Memory bridge, host side.
//!
//! Reads copy guest bytes out by (offset, length) after a bounds check;
//! writes go through the guest's `float_alloc` so the guest owns every
//! buffer the host fills. Nothing here holds a view into guest memory past
//! the call that produced it.

use wasmtime::{AsContext, AsContextMut, Caller, Extern, Memory, TypedFunc};

use super::error::HostError;
use crate::abi::{ALLOC_EXPORT, MEMORY_EXPORT};

/// Copy `len` bytes at `ptr` out of guest memory.
pub fn read_bytes(
    store: impl AsContext,
    memory: &Memory,
    ptr: u32,
    len: u32,
) -> Result<Vec<u8>, HostError> {
    let size = memory.data_size(&store);
    let in_bounds = (ptr as usize)
        .checked_add(len as usize)
        .is_some_and(|end| end <= size);
    if !in_bounds {
        return Err(HostError::Memory(format!(
            "range {ptr}+{len} outside guest memory of {size} bytes"
        )));
    }
    let mut buf = vec![0u8; len as usize];
    memory
        .read(&store, ptr as usize, &mut buf)
        .map_err(|e| HostError::Memory(format!("read of {len} bytes at {ptr}: {e}")))?;
    Ok(buf)
}

/// Allocate a guest buffer through `float_alloc` and copy `bytes` into it.
///
/// Empty input allocates nothing and yields `(0, 0)`.
pub fn stage_bytes(
    mut store: impl AsContextMut,
    alloc: &TypedFunc<u32, u32>,
    memory: &Memory,
    bytes: &[u8],
) -> Result<(u32, u32), HostError> {
    if bytes.is_empty() {
        return Ok((0, 0));
    }
    let len = u32::try_from(bytes.len()).map_err(|_| {
        HostError::Memory(format!("{} bytes exceed the 32-bit guest range", bytes.len()))
    })?;
    let ptr = alloc
        .call(&mut store, len)
        .map_err(|e| HostError::Trap(format!("{ALLOC_EXPORT}({len}) failed: {e}")))?;
    memory
        .write(&mut store, ptr as usize, bytes)
        .map_err(|e| HostError::Memory(format!("write of {len} bytes at {ptr}: {e}")))?;
    Ok((ptr, len))
}

/// The calling instance's linear memory.
pub(crate) fn caller_memory<T: 'static>(caller: &mut Caller<'_, T>) -> Result<Memory, HostError> {
    caller
        .get_export(MEMORY_EXPORT)
        .and_then(Extern::into_memory)
        .ok_or_else(|| HostError::MissingExport(MEMORY_EXPORT.into()))
}

/// Copy a guest range named in a capability call.
pub(crate) fn read_from_caller<T: 'static>(
    caller: &mut Caller<'_, T>,
    ptr: u32,
    len: u32,
) -> Result<Vec<u8>, HostError> {
    let memory = caller_memory(caller)?;
    read_bytes(&*caller, &memory, ptr, len)
}

/// Push bytes into the calling instance via its allocator.
pub(crate) fn push_to_caller<T: 'static>(
    caller: &mut Caller<'_, T>,
    bytes: &[u8],
) -> Result<(u32, u32), HostError> {
    let memory = caller_memory(caller)?;
    let alloc = caller
        .get_export(ALLOC_EXPORT)
        .and_then(Extern::into_func)
        .ok_or_else(|| HostError::MissingExport(ALLOC_EXPORT.into()))?
        .typed::<u32, u32>(&*caller)
        .map_err(|e| HostError::MissingExport(format!("{ALLOC_EXPORT}: {e}")))?;
    stage_bytes(&mut *caller, &alloc, &memory, bytes)
}
