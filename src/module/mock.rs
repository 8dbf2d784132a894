//! In-process host double for running the pipeline without a runtime.
//!
//! Scripted statuses and reply bytes go in; the ordered capability calls,
//! requests, writes and log lines come out.

use std::collections::BTreeMap;

use super::capabilities::{Capabilities, InvocationResult, Status};
use crate::abi::{Capability, REPLY_PATH};

/// A request observed by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub url: String,
    pub method: String,
    pub headers: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct MockHost {
    /// Status returned from `issue_request`.
    pub send_status: Status,
    /// Reply body left at the reply path after a successful send.
    pub reply: Option<Vec<u8>>,
    /// Status returned from `read_resource`, when not `Ok`.
    pub read_status: Status,
    /// Status returned from `write_resource`.
    pub write_status: Status,
    /// Files readable through `read_resource`.
    pub files: BTreeMap<String, Vec<u8>>,

    pub calls: Vec<Capability>,
    pub logs: Vec<String>,
    pub requests: Vec<RecordedRequest>,
    pub written: Vec<(String, Vec<u8>)>,
}

impl Default for MockHost {
    fn default() -> Self {
        Self {
            send_status: Status::OK,
            reply: None,
            read_status: Status::OK,
            write_status: Status::OK,
            files: BTreeMap::new(),
            calls: Vec::new(),
            logs: Vec::new(),
            requests: Vec::new(),
            written: Vec::new(),
        }
    }
}

impl MockHost {
    /// A host whose request succeeds with `reply`.
    pub fn replying(reply: impl Into<Vec<u8>>) -> Self {
        Self {
            reply: Some(reply.into()),
            ..Default::default()
        }
    }

    /// The last document written, if any.
    pub fn output(&self) -> Option<&[u8]> {
        self.written.last().map(|(_, data)| data.as_slice())
    }

    /// The last document written, decoded as JSON.
    pub fn output_json(&self) -> Option<serde_json::Value> {
        self.output().and_then(|b| serde_json::from_slice(b).ok())
    }
}

impl Capabilities for MockHost {
    fn log(&mut self, message: &str) {
        self.calls.push(Capability::Log);
        self.logs.push(message.to_string());
    }

    fn issue_request(&mut self, url: &str, method: &str, headers: &str, body: &[u8]) -> Status {
        self.calls.push(Capability::IssueRequest);
        self.requests.push(RecordedRequest {
            url: url.to_string(),
            method: method.to_string(),
            headers: headers.to_string(),
            body: body.to_vec(),
        });
        if self.send_status.is_ok() {
            // The host overwrites the reply path on every send.
            match &self.reply {
                Some(reply) => self.files.insert(REPLY_PATH.to_string(), reply.clone()),
                None => self.files.remove(REPLY_PATH),
            };
        }
        self.send_status
    }

    fn read_resource(&mut self, path: &str) -> InvocationResult {
        self.calls.push(Capability::ReadResource);
        if !self.read_status.is_ok() {
            return InvocationResult::failed(self.read_status);
        }
        match self.files.get(path) {
            Some(data) => InvocationResult::ok(data.clone()),
            None => InvocationResult::failed(Status(crate::abi::HostStatus::Io.code())),
        }
    }

    fn write_resource(&mut self, path: &str, data: &[u8]) -> Status {
        self.calls.push(Capability::WriteResource);
        if self.write_status.is_ok() {
            self.written.push((path.to_string(), data.to_vec()));
        }
        self.write_status
    }
}
