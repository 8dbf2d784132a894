//! The module/host contract — names, paths and codes both sides agree on.
//!
//! Nothing here touches memory or I/O. The guest SDK and the host runtime
//! both import these constants so a renamed import or a moved reply path
//! breaks at compile time instead of at the boundary.

use std::fmt;

/// Import module every capability is declared under.
pub const IMPORT_MODULE: &str = "env";

pub const LOG_IMPORT: &str = "float_log";
pub const HTTP_REQUEST_IMPORT: &str = "float_http_request";
pub const READ_FILE_IMPORT: &str = "float_read_file";
pub const WRITE_FILE_IMPORT: &str = "float_write_file";

/// Guest export the host calls to obtain a buffer it may fill.
pub const ALLOC_EXPORT: &str = "float_alloc";
/// Guest linear memory export.
pub const MEMORY_EXPORT: &str = "memory";

/// Where the emitter persists the single result document.
pub const OUTPUT_PATH: &str = "output.json";
/// Where the host leaves the reply body after a successful `issue_request`.
pub const REPLY_PATH: &str = "http_response.json";

/// The only body format modules send.
pub const JSON_CONTENT_TYPE_HEADER: &str = "Content-Type: application/json\r\n";

/// Process-level status returned from a module entry point.
pub const EXIT_SUCCESS: u32 = 0;
/// The pipeline failed; a structured error document was persisted.
pub const EXIT_FAILURE: u32 = 1;
/// No output document could be persisted.
pub const EXIT_OUTPUT_LOST: u32 = 2;

/// The four host-exposed capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Log,
    IssueRequest,
    ReadResource,
    WriteResource,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::Log,
        Capability::IssueRequest,
        Capability::ReadResource,
        Capability::WriteResource,
    ];

    /// Name of the `env` import backing this capability.
    pub fn import_name(self) -> &'static str {
        match self {
            Capability::Log => LOG_IMPORT,
            Capability::IssueRequest => HTTP_REQUEST_IMPORT,
            Capability::ReadResource => READ_FILE_IMPORT,
            Capability::WriteResource => WRITE_FILE_IMPORT,
        }
    }

    pub fn from_import_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.import_name() == name)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::Log => "log",
            Capability::IssueRequest => "issue_request",
            Capability::ReadResource => "read_resource",
            Capability::WriteResource => "write_resource",
        };
        f.write_str(name)
    }
}

/// Status codes the host returns from capability calls.
///
/// Modules must treat every nonzero value as a failure; the finer codes
/// exist for diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum HostStatus {
    Ok = 0,
    /// Grant missing, or destination not allow-listed.
    Denied = 1,
    /// Malformed string, path outside the sandbox, bad method or header.
    BadArgument = 2,
    Io = 3,
    /// Connection failure or timeout.
    Transport = 4,
    /// The remote answered with a non-2xx status.
    HttpStatus = 5,
    /// Guest memory could not be read or written.
    Memory = 6,
}

impl HostStatus {
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Ok),
            1 => Some(Self::Denied),
            2 => Some(Self::BadArgument),
            3 => Some(Self::Io),
            4 => Some(Self::Transport),
            5 => Some(Self::HttpStatus),
            6 => Some(Self::Memory),
            _ => None,
        }
    }
}
