//! Result document and the emitter that persists it.
//!
//! Exactly one `ModuleOutput` is produced per run and written once to the
//! fixed output path. Metadata is a sorted map, so two runs over the same
//! input and the same host replies serialize byte-for-byte identically.

use serde::Serialize;
use serde_json::{json, Map, Value};

use super::capabilities::Capabilities;
use super::error::{ErrorKind, ModuleError};
use super::input::ModuleInput;
use super::request::GenerateReply;
use crate::abi::{EXIT_FAILURE, EXIT_OUTPUT_LOST, EXIT_SUCCESS, OUTPUT_PATH};

pub type Metadata = Map<String, Value>;

/// Persisted when the real document cannot be serialized.
const FALLBACK_OUTPUT: &[u8] = br#"{
  "success": false,
  "done": true,
  "error": "failed to serialize module output",
  "error_type": "REQUEST_MARSHAL_ERROR",
  "metadata": {
    "error_stage": "output_serialization",
    "processing_complete": false
  }
}"#;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuccessPayload {
    success: bool,
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Vec<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_duration: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_duration: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_eval_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_eval_duration: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eval_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eval_duration: Option<u64>,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorPayload {
    success: bool,
    /// Target id echoed back when the input got far enough to have one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub done: bool,
    pub error: String,
    pub error_type: ErrorKind,
    pub metadata: Metadata,
}

/// The single terminal value of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ModuleOutput {
    Success(SuccessPayload),
    Error(ErrorPayload),
}

impl ModuleOutput {
    pub fn success(reply: GenerateReply, target_id: &str, metadata: Metadata) -> Self {
        ModuleOutput::Success(SuccessPayload {
            success: true,
            response: reply.response,
            model: reply.model.or_else(|| Some(target_id.to_string())),
            created_at: reply.created_at,
            done: reply.done,
            context: reply.context,
            total_duration: reply.total_duration,
            load_duration: reply.load_duration,
            prompt_eval_count: reply.prompt_eval_count,
            prompt_eval_duration: reply.prompt_eval_duration,
            eval_count: reply.eval_count,
            eval_duration: reply.eval_duration,
            metadata,
        })
    }

    pub fn error(err: &ModuleError, target_id: Option<&str>, metadata: Metadata) -> Self {
        ModuleOutput::Error(ErrorPayload {
            success: false,
            model: target_id.filter(|t| !t.is_empty()).map(str::to_string),
            done: true,
            error: err.to_string(),
            error_type: err.kind(),
            metadata,
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ModuleOutput::Success(_))
    }

    pub fn metadata(&self) -> &Metadata {
        match self {
            ModuleOutput::Success(s) => &s.metadata,
            ModuleOutput::Error(e) => &e.metadata,
        }
    }

    /// Pretty-printed JSON, or the fixed fallback document.
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec_pretty(self).unwrap_or_else(|_| FALLBACK_OUTPUT.to_vec())
    }
}

/// Facts gathered while the pipeline runs; the emitter turns them into
/// metadata for either outcome.
#[derive(Debug, Clone, Default)]
pub struct RunFacts {
    pub input_size: usize,
    pub reply_size: usize,
    pub optional_fields: Vec<&'static str>,
    pub endpoint: Option<String>,
}

impl RunFacts {
    pub fn new(input_size: usize) -> Self {
        Self {
            input_size,
            ..Default::default()
        }
    }

    fn base(&self, complete: bool) -> Metadata {
        let mut m = Metadata::new();
        m.insert("input_size".into(), json!(self.input_size));
        m.insert("reply_size".into(), json!(self.reply_size));
        m.insert("optional_fields".into(), json!(self.optional_fields));
        m.insert("processing_complete".into(), json!(complete));
        m
    }

    /// Metadata for a completed run.
    pub fn success_metadata(&self, input: &ModuleInput, reply: &GenerateReply) -> Metadata {
        let mut m = self.base(true);
        m.insert("payload_length".into(), json!(input.payload.len()));
        m.insert("response_length".into(), json!(reply.response.len()));
        if let Some(endpoint) = &self.endpoint {
            m.insert("endpoint".into(), json!(endpoint));
        }
        m.insert("stream_mode".into(), json!(input.stream.unwrap_or(false)));
        if input.system.as_deref().is_some_and(|s| !s.is_empty()) {
            m.insert("has_system_message".into(), json!(true));
        }
        if let Some(images) = input.images.as_ref().filter(|i| !i.is_empty()) {
            m.insert("image_count".into(), json!(images.len()));
        }
        if let Some(context) = input.context.as_ref().filter(|c| !c.is_empty()) {
            m.insert("has_context".into(), json!(true));
            m.insert("context_length".into(), json!(context.len()));
        }
        m
    }

    /// Metadata for a failed run, tagged with the error's details.
    pub fn error_metadata(&self, err: &ModuleError) -> Metadata {
        let mut m = self.base(false);
        m.insert("error_stage".into(), json!(err.stage()));
        match err {
            ModuleError::Validation(v) => {
                let key = if v.is_missing() {
                    "missing_field"
                } else {
                    "invalid_field"
                };
                m.insert(key.into(), json!(v.field));
            }
            ModuleError::HttpRequest {
                endpoint, status, ..
            } => {
                m.insert("endpoint".into(), json!(endpoint));
                m.insert("status".into(), json!(status.code()));
            }
            ModuleError::ResponseParse { raw, .. } => {
                m.insert(
                    "raw_response".into(),
                    json!(String::from_utf8_lossy(raw)),
                );
            }
            ModuleError::InputParse(_) | ModuleError::RequestMarshal(_) => {}
        }
        m
    }
}

/// Persists the one output document and decides the process status.
pub struct Emitter<'a, C: Capabilities> {
    caps: &'a mut C,
    path: &'a str,
}

impl<'a, C: Capabilities> Emitter<'a, C> {
    pub fn new(caps: &'a mut C) -> Self {
        Self {
            caps,
            path: OUTPUT_PATH,
        }
    }

    /// Write `output` and return the process status. A document that could
    /// not be written counts as a failure even if the run succeeded.
    pub fn emit(self, output: &ModuleOutput) -> u32 {
        let bytes = output.to_bytes();
        let status = self.caps.write_resource(self.path, &bytes);
        if !status.is_ok() {
            self.caps
                .log(&format!("Failed to write {}: status {status}", self.path));
            return EXIT_OUTPUT_LOST;
        }
        if output.is_success() {
            EXIT_SUCCESS
        } else {
            EXIT_FAILURE
        }
    }
}
