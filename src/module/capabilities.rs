//! Capability seam — the four host functions as a trait.
//!
//! The pipeline only ever sees `Capabilities`. On wasm32 the trait is backed
//! by the real `env` imports (`HostCapabilities`); natively it is backed by
//! `mock::MockHost`.

use std::fmt;

use super::bridge::{clear_staged, take_staged};
use crate::abi::HostStatus;

/// Raw status code returned by a capability call. Zero is success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status(pub u32);

impl Status {
    pub const OK: Status = Status(0);

    pub fn is_ok(self) -> bool {
        self.0 == 0
    }

    pub fn code(self) -> u32 {
        self.0
    }
}

impl From<HostStatus> for Status {
    fn from(status: HostStatus) -> Self {
        Status(status.code())
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match HostStatus::from_code(self.0) {
            Some(known) => write!(f, "{} ({known:?})", self.0),
            None => write!(f, "{}", self.0),
        }
    }
}

/// Status plus whatever bytes the capability produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationResult {
    pub status: Status,
    pub body: Vec<u8>,
}

impl InvocationResult {
    pub fn ok(body: Vec<u8>) -> Self {
        Self {
            status: Status::OK,
            body,
        }
    }

    pub fn failed(status: Status) -> Self {
        Self {
            status,
            body: Vec::new(),
        }
    }
}

/// The host-exposed capabilities, in the host's positional order.
///
/// Every call is synchronous from the module's point of view. A nonzero
/// status is final: callers never retry.
pub trait Capabilities {
    /// Fire-and-forget. Host-side failures are invisible.
    fn log(&mut self, message: &str);

    /// Send one request. The reply is not returned here; the host leaves it
    /// at the agreed reply path for `read_resource`.
    fn issue_request(&mut self, url: &str, method: &str, headers: &str, body: &[u8]) -> Status;

    fn read_resource(&mut self, path: &str) -> InvocationResult;

    fn write_resource(&mut self, path: &str, data: &[u8]) -> Status;
}

/// Run a raw `read_resource` import and collect the bytes it staged.
///
/// The staging slot is emptied before the call, so a buffer left over from
/// an earlier read never passes for this one, and emptied again after.
pub fn collect_staged(read: impl FnOnce() -> u32) -> InvocationResult {
    clear_staged();
    let status = Status(read());
    let staged = take_staged();
    if !status.is_ok() {
        return InvocationResult::failed(status);
    }
    InvocationResult::ok(staged.unwrap_or_default())
}

#[cfg(target_arch = "wasm32")]
mod ffi {
    #[link(wasm_import_module = "env")]
    extern "C" {
        pub fn float_log(ptr: u32, len: u32);
        pub fn float_http_request(
            url_ptr: u32,
            url_len: u32,
            method_ptr: u32,
            method_len: u32,
            headers_ptr: u32,
            headers_len: u32,
            body_ptr: u32,
            body_len: u32,
        ) -> u32;
        pub fn float_read_file(path_ptr: u32, path_len: u32) -> u32;
        pub fn float_write_file(path_ptr: u32, path_len: u32, data_ptr: u32, data_len: u32)
            -> u32;
    }
}

/// The real host, reached through the `env` imports.
#[cfg(target_arch = "wasm32")]
#[derive(Debug, Default)]
pub struct HostCapabilities;

#[cfg(target_arch = "wasm32")]
impl Capabilities for HostCapabilities {
    fn log(&mut self, message: &str) {
        if message.is_empty() {
            return;
        }
        let (ptr, len) = super::bridge::Marshaled::text(message).parts();
        // SAFETY: the range stays borrowed until the import returns.
        unsafe { ffi::float_log(ptr, len) }
    }

    fn issue_request(&mut self, url: &str, method: &str, headers: &str, body: &[u8]) -> Status {
        use super::bridge::Marshaled;

        let (url_ptr, url_len) = Marshaled::text(url).parts();
        let (method_ptr, method_len) = Marshaled::text(method).parts();
        let (headers_ptr, headers_len) = Marshaled::text(headers).parts();
        let (body_ptr, body_len) = Marshaled::new(body).parts();
        // SAFETY: all four ranges stay borrowed until the import returns.
        let code = unsafe {
            ffi::float_http_request(
                url_ptr,
                url_len,
                method_ptr,
                method_len,
                headers_ptr,
                headers_len,
                body_ptr,
                body_len,
            )
        };
        Status(code)
    }

    fn read_resource(&mut self, path: &str) -> InvocationResult {
        let (path_ptr, path_len) = super::bridge::Marshaled::text(path).parts();
        // SAFETY: the path range stays borrowed until the import returns.
        collect_staged(|| unsafe { ffi::float_read_file(path_ptr, path_len) })
    }

    fn write_resource(&mut self, path: &str, data: &[u8]) -> Status {
        use super::bridge::Marshaled;

        let (path_ptr, path_len) = Marshaled::text(path).parts();
        let (data_ptr, data_len) = Marshaled::new(data).parts();
        // SAFETY: both ranges stay borrowed until the import returns.
        Status(unsafe { ffi::float_write_file(path_ptr, path_len, data_ptr, data_len) })
    }
}
