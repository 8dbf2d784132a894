//! Memory bridge, guest side.
//!
//! Module and host never share ownership of a buffer. Host → guest bytes
//! arrive through `float_alloc` and are copied or taken immediately; guest →
//! host bytes are lent as an (offset, length) pair for exactly one call.

use std::cell::RefCell;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    #[error("input buffer is empty")]
    EmptyInput,
    #[error("input buffer of {0} bytes starts at a null offset")]
    NullInput(usize),
}

/// Copy `len` bytes at `ptr` into an owned buffer.
///
/// # Safety
///
/// `ptr..ptr + len` must be readable for the duration of the call. Nothing
/// derived from `ptr` survives the call.
pub unsafe fn copy_in(ptr: *const u8, len: usize) -> Vec<u8> {
    if len == 0 || ptr.is_null() {
        return Vec::new();
    }
    std::slice::from_raw_parts(ptr, len).to_vec()
}

/// Copy the primary input buffer. Zero-length input is rejected.
///
/// # Safety
///
/// Same contract as [`copy_in`].
pub unsafe fn copy_input(ptr: *const u8, len: usize) -> Result<Vec<u8>, BridgeError> {
    if len == 0 {
        return Err(BridgeError::EmptyInput);
    }
    if ptr.is_null() {
        return Err(BridgeError::NullInput(len));
    }
    Ok(copy_in(ptr, len))
}

/// A borrowed buffer presented to the host as (offset, length).
///
/// The borrow ties the pair to the buffer, so it cannot be kept past the
/// capability call it was built for.
#[derive(Debug, Clone, Copy)]
pub struct Marshaled<'a> {
    bytes: &'a [u8],
}

impl<'a> Marshaled<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn text(s: &'a str) -> Self {
        Self::new(s.as_bytes())
    }

    /// Offset into linear memory. Only meaningful on wasm32, where pointers
    /// are 32 bits wide.
    pub fn offset(&self) -> u32 {
        if self.bytes.is_empty() {
            return 0;
        }
        self.bytes.as_ptr() as usize as u32
    }

    pub fn len(&self) -> u32 {
        self.bytes.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn parts(&self) -> (u32, u32) {
        (self.offset(), self.len())
    }
}

thread_local! {
    /// The one buffer the host may currently be filling.
    static STAGED: RefCell<Option<Vec<u8>>> = const { RefCell::new(None) };
}

/// Back end of the `float_alloc` export.
///
/// Allocates a zeroed buffer, parks it in the staging slot (replacing any
/// previous one) and returns its offset. The heap allocation does not move
/// when the `Vec` is moved into the slot.
pub fn stage_alloc(len: u32) -> u32 {
    let mut buf = vec![0u8; len as usize];
    let offset = buf.as_mut_ptr() as usize as u32;
    STAGED.with(|slot| *slot.borrow_mut() = Some(buf));
    offset
}

/// Take ownership of the staged buffer, leaving the slot empty.
pub fn take_staged() -> Option<Vec<u8>> {
    STAGED.with(|slot| slot.borrow_mut().take())
}

/// Drop whatever is staged.
pub fn clear_staged() {
    STAGED.with(|slot| slot.borrow_mut().take());
}

/// Stage a copy of `bytes` the way the host would through `float_alloc`,
/// returning the buffer's native address.
#[cfg(test)]
pub(crate) fn stage_copy(bytes: &[u8]) -> *const u8 {
    let buf = bytes.to_vec();
    let ptr = buf.as_ptr();
    STAGED.with(|slot| *slot.borrow_mut() = Some(buf));
    ptr
}
