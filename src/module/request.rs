//! Outbound request and reply shapes for the generate endpoint.
//!
//! `OutboundRequest` carries exactly what the upstream API accepts; the
//! endpoint lives beside it, never inside the body.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::ModuleError;
use super::input::ModuleInput;

/// Operation path appended to the normalized endpoint.
pub const GENERATE_PATH: &str = "/api/generate";
/// The one verb this module sends.
pub const METHOD: &str = "POST";

/// Body of the generate call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundRequest {
    pub model: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Vec<i64>>,
    /// Always present; defaults to `false` so the reply arrives whole.
    pub stream: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub raw: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_alive: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
}

/// A built request: target URL plus encoded body.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltRequest {
    pub url: String,
    pub request: OutboundRequest,
    pub body: Vec<u8>,
}

/// Strip trailing separators from a base URL.
pub fn normalize_endpoint(endpoint: &str) -> &str {
    endpoint.trim_end_matches('/')
}

fn non_empty(s: &Option<String>) -> Option<String> {
    s.as_ref().filter(|s| !s.is_empty()).cloned()
}

impl OutboundRequest {
    /// Project a validated input onto the upstream schema.
    pub fn from_input(input: &ModuleInput) -> Self {
        Self {
            model: input.target_id.clone(),
            prompt: input.payload.clone(),
            system: non_empty(&input.system),
            template: non_empty(&input.template),
            context: input.context.clone().filter(|c| !c.is_empty()),
            stream: input.stream.unwrap_or(false),
            raw: input.raw.unwrap_or(false),
            format: input.format.clone().filter(|f| !f.is_null()),
            options: input.options.clone().filter(|o| !o.is_empty()),
            suffix: non_empty(&input.suffix),
            keep_alive: non_empty(&input.keep_alive),
            images: input.images.clone().filter(|i| !i.is_empty()),
        }
    }
}

/// BUILD stage: normalized URL plus JSON body.
pub fn build(input: &ModuleInput) -> Result<BuiltRequest, ModuleError> {
    let request = OutboundRequest::from_input(input);
    let body =
        serde_json::to_vec(&request).map_err(|e| ModuleError::RequestMarshal(e.to_string()))?;
    let url = format!("{}{GENERATE_PATH}", normalize_endpoint(&input.endpoint));
    Ok(BuiltRequest { url, request, body })
}

/// Reply of the generate call. `response` and `done` are required.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GenerateReply {
    pub response: String,
    pub done: bool,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub context: Option<Vec<i64>>,
    #[serde(default)]
    pub total_duration: Option<u64>,
    #[serde(default)]
    pub load_duration: Option<u64>,
    #[serde(default)]
    pub prompt_eval_count: Option<u64>,
    #[serde(default)]
    pub prompt_eval_duration: Option<u64>,
    #[serde(default)]
    pub eval_count: Option<u64>,
    #[serde(default)]
    pub eval_duration: Option<u64>,
}

/// INTERPRET stage. Keeps the raw bytes on failure.
pub fn interpret(raw: &[u8]) -> Result<GenerateReply, ModuleError> {
    serde_json::from_slice(raw).map_err(|e| ModuleError::ResponseParse {
        message: e.to_string(),
        raw: raw.to_vec(),
    })
}
