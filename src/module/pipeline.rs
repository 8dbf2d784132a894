//! Request pipeline — one deterministic pass per invocation.
//!
//! RECEIVED → PARSED → VALIDATED → BUILT → INVOKED → INTERPRETED → EMITTED.
//! Any failure short-circuits straight to EMITTED with an error document.
//! Nothing is retried and nothing escapes unstructured.

use super::capabilities::Capabilities;
use super::error::{HttpPhase, ModuleError};
use super::input::ModuleInput;
use super::output::{Emitter, ModuleOutput, RunFacts};
use super::request::{self, GenerateReply, METHOD};
use crate::abi::{JSON_CONTENT_TYPE_HEADER, REPLY_PATH};

/// Pipeline states, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Received,
    Parsed,
    Validated,
    Built,
    Invoked,
    Interpreted,
    Emitted,
}

/// Runs one invocation against a set of capabilities.
pub struct Pipeline<'a, C: Capabilities> {
    caps: &'a mut C,
    stage: Stage,
    facts: RunFacts,
    target_id: Option<String>,
}

/// A finished exchange, ready to become a success document.
struct Completed {
    input: ModuleInput,
    reply: GenerateReply,
}

impl<'a, C: Capabilities> Pipeline<'a, C> {
    pub fn new(caps: &'a mut C) -> Self {
        Self {
            caps,
            stage: Stage::Received,
            facts: RunFacts::default(),
            target_id: None,
        }
    }

    /// The furthest stage reached.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Run the whole pass over an owned input buffer and return the
    /// process-level status (0 success).
    pub fn run(&mut self, raw: &[u8]) -> u32 {
        self.caps.log("Starting Ollama text generation");
        self.facts = RunFacts::new(raw.len());

        let output = match self.process(raw) {
            Ok(Completed { input, reply }) => {
                self.caps.log(&format!(
                    "Successfully parsed Ollama response ({} characters)",
                    reply.response.len()
                ));
                let metadata = self.facts.success_metadata(&input, &reply);
                ModuleOutput::success(reply, &input.target_id, metadata)
            }
            Err(err) => {
                self.caps.log(&format!("{} failed: {err}", err.stage()));
                let metadata = self.facts.error_metadata(&err);
                ModuleOutput::error(&err, self.target_id.as_deref(), metadata)
            }
        };

        self.emit(&output)
    }

    /// Run the pass for input the bridge already refused.
    pub fn reject(&mut self, reason: &str) -> u32 {
        self.caps.log(&format!("Rejected input buffer: {reason}"));
        self.facts = RunFacts::new(0);
        let err = ModuleError::InputParse(reason.to_string());
        let output = ModuleOutput::error(&err, None, self.facts.error_metadata(&err));
        self.emit(&output)
    }

    fn emit(&mut self, output: &ModuleOutput) -> u32 {
        let status = Emitter::new(&mut *self.caps).emit(output);
        self.stage = Stage::Emitted;
        if status == crate::abi::EXIT_SUCCESS {
            self.caps.log("Ollama text generation completed successfully");
        }
        status
    }

    fn process(&mut self, raw: &[u8]) -> Result<Completed, ModuleError> {
        let input = ModuleInput::parse(raw)?;
        self.stage = Stage::Parsed;
        self.target_id = Some(input.target_id.clone());
        self.facts.optional_fields = input.optional_fields();
        self.caps.log(&format!("Parsed input for model: {}", input.target_id));

        input.validate()?;
        self.stage = Stage::Validated;
        self.caps.log("Input validation passed");

        let built = request::build(&input)?;
        self.stage = Stage::Built;
        self.facts.endpoint = Some(built.url.clone());
        self.caps.log(&format!(
            "Prepared request body ({} bytes)",
            built.body.len()
        ));

        let raw_reply = self.invoke(&built.url, &built.body)?;
        self.stage = Stage::Invoked;
        self.facts.reply_size = raw_reply.len();

        let reply = request::interpret(&raw_reply)?;
        self.stage = Stage::Interpreted;

        Ok(Completed { input, reply })
    }

    /// Send, then fetch the reply from the agreed path. The two halves are
    /// separate capability calls.
    fn invoke(&mut self, url: &str, body: &[u8]) -> Result<Vec<u8>, ModuleError> {
        self.caps.log(&format!("Making HTTP {METHOD} request to {url}"));
        let status = self
            .caps
            .issue_request(url, METHOD, JSON_CONTENT_TYPE_HEADER, body);
        if !status.is_ok() {
            return Err(ModuleError::HttpRequest {
                endpoint: url.to_string(),
                phase: HttpPhase::Send,
                status,
            });
        }

        let reply = self.caps.read_resource(REPLY_PATH);
        if !reply.status.is_ok() {
            return Err(ModuleError::HttpRequest {
                endpoint: url.to_string(),
                phase: HttpPhase::ReadReply,
                status: reply.status,
            });
        }
        self.caps.log("HTTP request completed successfully");
        Ok(reply.body)
    }
}
