//! Module error taxonomy. Every variant is terminal.

use serde::Serialize;

use super::capabilities::Status;
use super::input::ValidationError;

/// Which half of the request/reply exchange failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpPhase {
    Send,
    ReadReply,
}

impl std::fmt::Display for HttpPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpPhase::Send => f.write_str("send"),
            HttpPhase::ReadReply => f.write_str("reply read"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModuleError {
    #[error("invalid input JSON: {0}")]
    InputParse(String),

    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("failed to prepare request: {0}")]
    RequestMarshal(String),

    #[error("request to {endpoint} failed during {phase} with status {status}")]
    HttpRequest {
        endpoint: String,
        phase: HttpPhase,
        status: Status,
    },

    #[error("invalid response from server: {message}")]
    ResponseParse { message: String, raw: Vec<u8> },
}

/// The `error_type` tag written to error documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    #[serde(rename = "INPUT_PARSE_ERROR")]
    InputParse,
    #[serde(rename = "VALIDATION_ERROR")]
    Validation,
    #[serde(rename = "REQUEST_MARSHAL_ERROR")]
    RequestMarshal,
    #[serde(rename = "HTTP_REQUEST_ERROR")]
    HttpRequest,
    #[serde(rename = "RESPONSE_PARSE_ERROR")]
    ResponseParse,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InputParse => "INPUT_PARSE_ERROR",
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::RequestMarshal => "REQUEST_MARSHAL_ERROR",
            ErrorKind::HttpRequest => "HTTP_REQUEST_ERROR",
            ErrorKind::ResponseParse => "RESPONSE_PARSE_ERROR",
        }
    }
}

impl ModuleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ModuleError::InputParse(_) => ErrorKind::InputParse,
            ModuleError::Validation(_) => ErrorKind::Validation,
            ModuleError::RequestMarshal(_) => ErrorKind::RequestMarshal,
            ModuleError::HttpRequest { .. } => ErrorKind::HttpRequest,
            ModuleError::ResponseParse { .. } => ErrorKind::ResponseParse,
        }
    }

    /// Pipeline stage the error was raised in, as written to `error_stage`.
    pub fn stage(&self) -> &'static str {
        match self {
            ModuleError::InputParse(_) => "input_parsing",
            ModuleError::Validation(_) => "validation",
            ModuleError::RequestMarshal(_) => "request_preparation",
            ModuleError::HttpRequest { .. } => "http_request",
            ModuleError::ResponseParse { .. } => "response_parsing",
        }
    }
}
