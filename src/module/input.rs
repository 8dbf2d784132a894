//! Module input — decoding and validation.
//!
//! Validation is pure and total: it either passes or reports the first
//! violation in a fixed field order (target_id → payload → endpoint →
//! auxiliary text → tuning options), so error documents are deterministic.

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use super::error::ModuleError;

/// Maximum payload (prompt) length in bytes.
pub const MAX_PAYLOAD_BYTES: usize = 32_768;
/// Maximum system message length in bytes.
pub const MAX_SYSTEM_BYTES: usize = 8_192;
/// Upper bound for `options.top_k`.
pub const MAX_TOP_K: i64 = 1_000;

/// Decoded input buffer. Field names follow the module's input schema; the
/// upstream API's names are accepted as aliases.
///
/// A required field sent as `null` decodes as empty and is reported by
/// validation as missing. Supplying both a name and its alias (`model` and
/// `target_id`) is a duplicate field and fails to parse.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ModuleInput {
    #[serde(alias = "model", deserialize_with = "null_as_empty")]
    pub target_id: String,
    #[serde(alias = "prompt", deserialize_with = "null_as_empty")]
    pub payload: String,
    #[serde(alias = "ollama_url", deserialize_with = "null_as_empty")]
    pub endpoint: String,

    pub system: Option<String>,
    pub template: Option<String>,
    pub suffix: Option<String>,
    pub keep_alive: Option<String>,
    /// Conversation state returned by a previous call.
    pub context: Option<Vec<i64>>,
    pub stream: Option<bool>,
    pub raw: Option<bool>,
    /// Response-shape hint: `"json"` or a JSON schema object.
    pub format: Option<Value>,
    pub options: Option<Map<String, Value>>,
    /// Base64-encoded attachments.
    pub images: Option<Vec<String>>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Option::unwrap_or_default)
}

impl ModuleInput {
    /// Decode a raw input buffer. Anything but a JSON object is rejected.
    pub fn parse(raw: &[u8]) -> Result<Self, ModuleError> {
        if raw.is_empty() {
            return Err(ModuleError::InputParse("input buffer is empty".into()));
        }
        let value: Value =
            serde_json::from_slice(raw).map_err(|e| ModuleError::InputParse(e.to_string()))?;
        if !value.is_object() {
            return Err(ModuleError::InputParse("input must be a JSON object".into()));
        }
        serde_json::from_value(value).map_err(|e| ModuleError::InputParse(e.to_string()))
    }

    /// Names of the optional fields carrying a value, sorted.
    pub fn optional_fields(&self) -> Vec<&'static str> {
        let mut present = Vec::new();
        let text = |s: &Option<String>| s.as_deref().is_some_and(|s| !s.is_empty());

        if self.context.as_ref().is_some_and(|c| !c.is_empty()) {
            present.push("context");
        }
        if self.format.as_ref().is_some_and(|f| !f.is_null()) {
            present.push("format");
        }
        if self.images.as_ref().is_some_and(|i| !i.is_empty()) {
            present.push("images");
        }
        if text(&self.keep_alive) {
            present.push("keep_alive");
        }
        if self.options.as_ref().is_some_and(|o| !o.is_empty()) {
            present.push("options");
        }
        if self.raw.is_some() {
            present.push("raw");
        }
        if self.stream.is_some() {
            present.push("stream");
        }
        if text(&self.suffix) {
            present.push("suffix");
        }
        if text(&self.system) {
            present.push("system");
        }
        if text(&self.template) {
            present.push("template");
        }
        present
    }

    /// Check required fields, sizes and tuning ranges. First violation wins.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.target_id.is_empty() {
            return Err(ValidationError::missing("target_id"));
        }

        if self.payload.is_empty() {
            return Err(ValidationError::missing("payload"));
        }
        if self.payload.len() > MAX_PAYLOAD_BYTES {
            return Err(ValidationError::new(
                "payload",
                Violation::TooLong {
                    max: MAX_PAYLOAD_BYTES,
                    actual: self.payload.len(),
                },
            ));
        }

        if self.endpoint.is_empty() {
            return Err(ValidationError::missing("endpoint"));
        }
        if !is_http_url(&self.endpoint) {
            return Err(ValidationError::new("endpoint", Violation::NotHttpUrl));
        }

        if let Some(system) = &self.system {
            if system.len() > MAX_SYSTEM_BYTES {
                return Err(ValidationError::new(
                    "system",
                    Violation::TooLong {
                        max: MAX_SYSTEM_BYTES,
                        actual: system.len(),
                    },
                ));
            }
        }

        if let Some(options) = &self.options {
            check_ratio(options, "temperature", 2.0)?;
            check_ratio(options, "top_p", 1.0)?;
            check_count(options, "top_k", MAX_TOP_K)?;
        }

        Ok(())
    }
}

/// `http://` or `https://` followed by a non-empty authority.
fn is_http_url(s: &str) -> bool {
    let rest = s
        .strip_prefix("http://")
        .or_else(|| s.strip_prefix("https://"));
    match rest {
        Some(rest) => rest
            .split(['/', '?', '#'])
            .next()
            .is_some_and(|host| !host.is_empty()),
        None => false,
    }
}

fn check_ratio(
    options: &Map<String, Value>,
    key: &'static str,
    max: f64,
) -> Result<(), ValidationError> {
    let Some(value) = options.get(key) else {
        return Ok(());
    };
    let Some(n) = value.as_f64() else {
        return Err(ValidationError::new(key, Violation::NotANumber));
    };
    if !(0.0..=max).contains(&n) {
        return Err(ValidationError::new(
            key,
            Violation::OutOfRange {
                min: "0".into(),
                max: format_bound(max),
            },
        ));
    }
    Ok(())
}

fn check_count(
    options: &Map<String, Value>,
    key: &'static str,
    max: i64,
) -> Result<(), ValidationError> {
    let Some(value) = options.get(key) else {
        return Ok(());
    };
    let Some(n) = value.as_i64() else {
        return Err(ValidationError::new(key, Violation::NotAnInteger));
    };
    if !(1..=max).contains(&n) {
        return Err(ValidationError::new(
            key,
            Violation::OutOfRange {
                min: "1".into(),
                max: max.to_string(),
            },
        ));
    }
    Ok(())
}

fn format_bound(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{}", v as i64)
    } else {
        v.to_string()
    }
}

/// The single violation reported for an invalid input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field} {violation}")]
pub struct ValidationError {
    pub field: &'static str,
    pub violation: Violation,
}

impl ValidationError {
    pub fn new(field: &'static str, violation: Violation) -> Self {
        Self { field, violation }
    }

    pub fn missing(field: &'static str) -> Self {
        Self::new(field, Violation::Missing)
    }

    pub fn is_missing(&self) -> bool {
        self.violation == Violation::Missing
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Violation {
    #[error("field is required")]
    Missing,
    #[error("exceeds maximum length of {max} bytes (got {actual})")]
    TooLong { max: usize, actual: usize },
    #[error("must be a valid HTTP/HTTPS URL")]
    NotHttpUrl,
    #[error("must be between {min} and {max}")]
    OutOfRange { min: String, max: String },
    #[error("must be a number")]
    NotANumber,
    #[error("must be an integer")]
    NotAnInteger,
}
