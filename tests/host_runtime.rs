//! Host runtime against small hand-written modules and a stub transport.

#![cfg(feature = "host")]

use std::sync::{Arc, Mutex};

use floatkit::abi::{Capability, HostStatus, REPLY_PATH};
use floatkit::host::transport::TransportError;
use floatkit::host::{
    CapabilityCall, HostError, HttpReply, HttpRequest, HttpTransport, ModuleManifest,
    ModuleRuntime, Sandbox,
};
use tempfile::TempDir;

/// Logs, then persists its input as the output document.
const ECHO: &str = r#"
(module
  (import "env" "float_log" (func $log (param i32 i32)))
  (import "env" "float_write_file" (func $write (param i32 i32 i32 i32) (result i32)))
  (memory (export "memory") 1)
  (global $heap (mut i32) (i32.const 1024))
  (data (i32.const 0) "output.json")
  (data (i32.const 16) "echo")
  (func (export "float_alloc") (param $len i32) (result i32)
    (local $ptr i32)
    (local.set $ptr (global.get $heap))
    (global.set $heap (i32.add (global.get $heap) (local.get $len)))
    (local.get $ptr))
  (func (export "run") (param $ptr i32) (param $len i32) (result i32)
    (call $log (i32.const 16) (i32.const 4))
    (call $write (i32.const 0) (i32.const 11) (local.get $ptr) (local.get $len))))
"#;

/// Posts its input, reads the reply back through the allocator and
/// persists it. Returns 10 when the send fails and 11 when the read does.
const FETCH: &str = r#"
(module
  (import "env" "float_http_request"
    (func $http (param i32 i32 i32 i32 i32 i32 i32 i32) (result i32)))
  (import "env" "float_read_file" (func $read (param i32 i32) (result i32)))
  (import "env" "float_write_file" (func $write (param i32 i32 i32 i32) (result i32)))
  (memory (export "memory") 1)
  (global $heap (mut i32) (i32.const 1024))
  (global $last_ptr (mut i32) (i32.const 0))
  (global $last_len (mut i32) (i32.const 0))
  (data (i32.const 0) "output.json")
  (data (i32.const 16) "http_response.json")
  (data (i32.const 48) "http://h/api/generate")
  (data (i32.const 80) "POST")
  (data (i32.const 96) "Content-Type: application/json\0d\0a")
  (func (export "float_alloc") (param $len i32) (result i32)
    (local $ptr i32)
    (local.set $ptr (global.get $heap))
    (global.set $heap (i32.add (global.get $heap) (local.get $len)))
    (global.set $last_ptr (local.get $ptr))
    (global.set $last_len (local.get $len))
    (local.get $ptr))
  (func (export "run") (param $ptr i32) (param $len i32) (result i32)
    (if (call $http (i32.const 48) (i32.const 21) (i32.const 80) (i32.const 4)
                    (i32.const 96) (i32.const 32) (local.get $ptr) (local.get $len))
      (then (return (i32.const 10))))
    (if (call $read (i32.const 16) (i32.const 18))
      (then (return (i32.const 11))))
    (call $write (i32.const 0) (i32.const 11) (global.get $last_ptr) (global.get $last_len))))
"#;

/// Tries to write outside the sandbox.
const ESCAPE: &str = r#"
(module
  (import "env" "float_write_file" (func $write (param i32 i32 i32 i32) (result i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "../escape.json")
  (func (export "float_alloc") (param i32) (result i32) (i32.const 1024))
  (func (export "run") (param $ptr i32) (param $len i32) (result i32)
    (call $write (i32.const 0) (i32.const 14) (local.get $ptr) (local.get $len))))
"#;

/// Posts with a header name reqwest would refuse, returning the raw status.
const BAD_HEADER: &str = r#"
(module
  (import "env" "float_http_request"
    (func $http (param i32 i32 i32 i32 i32 i32 i32 i32) (result i32)))
  (memory (export "memory") 1)
  (data (i32.const 48) "http://h/api/generate")
  (data (i32.const 80) "POST")
  (data (i32.const 96) "Bad Name: x")
  (func (export "float_alloc") (param i32) (result i32) (i32.const 1024))
  (func (export "run") (param $ptr i32) (param $len i32) (result i32)
    (call $http (i32.const 48) (i32.const 21) (i32.const 80) (i32.const 4)
                (i32.const 96) (i32.const 11) (local.get $ptr) (local.get $len))))
"#;

const TRAP: &str = r#"
(module
  (memory (export "memory") 1)
  (func (export "float_alloc") (param i32) (result i32) (i32.const 1024))
  (func (export "run") (param i32 i32) (result i32) unreachable))
"#;

const REPLY: &[u8] = br#"{"response":"hi","done":true}"#;

struct StubTransport {
    status: u16,
    body: Vec<u8>,
    seen: Mutex<Vec<HttpRequest>>,
}

impl StubTransport {
    fn new(status: u16, body: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            status,
            body: body.to_vec(),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn seen(&self) -> Vec<HttpRequest> {
        self.seen.lock().unwrap().clone()
    }
}

impl HttpTransport for StubTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpReply, TransportError> {
        self.seen.lock().unwrap().push(request.clone());
        Ok(HttpReply {
            status: self.status,
            body: self.body.clone(),
        })
    }
}

fn manifest(grants: &str) -> ModuleManifest {
    let yaml = format!(
        "module: {{ name: test-module, wasm: test.wasm, entry_point: run }}\ngrants: {grants}\n"
    );
    ModuleManifest::from_yaml(&yaml, ".").unwrap()
}

fn call(capability: Capability, status: HostStatus) -> CapabilityCall {
    CapabilityCall { capability, status }
}

struct Fixture {
    runtime: ModuleRuntime,
    dir: TempDir,
    sandbox: Sandbox,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let sandbox = Sandbox::open(dir.path().join("box")).unwrap();
        Self {
            runtime: ModuleRuntime::new().unwrap(),
            dir,
            sandbox,
        }
    }

    fn invoke(
        &self,
        wat: &str,
        grants: &str,
        transport: Arc<StubTransport>,
        input: &[u8],
    ) -> Result<floatkit::host::InvocationReport, HostError> {
        let module = self.runtime.load_module(wat.as_bytes())?;
        self.runtime
            .invoke(&module, &manifest(grants), &self.sandbox, transport, input)
    }
}

#[test]
fn echo_persists_input() {
    let fx = Fixture::new();
    let report = fx
        .invoke(ECHO, "{ file_write: true }", StubTransport::new(200, b""), br#"{"a":1}"#)
        .unwrap();

    assert!(report.succeeded());
    assert_eq!(report.output.as_deref(), Some(&br#"{"a":1}"#[..]));
    assert_eq!(report.output_json().unwrap()["a"], 1);
    assert_eq!(
        report.calls,
        vec![
            call(Capability::Log, HostStatus::Ok),
            call(Capability::WriteResource, HostStatus::Ok),
        ]
    );
}

#[test]
fn write_denied_without_grant() {
    let fx = Fixture::new();
    let report = fx
        .invoke(ECHO, "{}", StubTransport::new(200, b""), b"{}")
        .unwrap();

    assert_eq!(report.status, HostStatus::Denied.code());
    assert!(report.output.is_none());
    assert_eq!(
        report.calls.last(),
        Some(&call(Capability::WriteResource, HostStatus::Denied))
    );
}

#[test]
fn stale_output_is_cleared_before_invocation() {
    let fx = Fixture::new();
    fx.sandbox.write("output.json", b"from an earlier run").unwrap();
    let report = fx
        .invoke(ECHO, "{}", StubTransport::new(200, b""), b"{}")
        .unwrap();
    assert!(report.output.is_none());
}

#[test]
fn fetch_round_trip_through_reply_path() {
    let fx = Fixture::new();
    let transport = StubTransport::new(200, REPLY);
    let report = fx
        .invoke(
            FETCH,
            "{ network: true, file_write: true, allowed_hosts: [h] }",
            transport.clone(),
            br#"{"model":"m1"}"#,
        )
        .unwrap();

    assert!(report.succeeded(), "status {}", report.status);
    assert_eq!(report.output.as_deref(), Some(REPLY));
    assert_eq!(fx.sandbox.read(REPLY_PATH).unwrap(), REPLY);
    assert_eq!(
        report.calls,
        vec![
            call(Capability::IssueRequest, HostStatus::Ok),
            call(Capability::ReadResource, HostStatus::Ok),
            call(Capability::WriteResource, HostStatus::Ok),
        ]
    );

    let seen = transport.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].url, "http://h/api/generate");
    assert_eq!(seen[0].method, "POST");
    assert_eq!(
        seen[0].headers,
        vec![("Content-Type".to_string(), "application/json".to_string())]
    );
    assert_eq!(seen[0].body, br#"{"model":"m1"}"#);
}

#[test]
fn network_denied_without_grant() {
    let fx = Fixture::new();
    let transport = StubTransport::new(200, REPLY);
    let report = fx
        .invoke(FETCH, "{ file_write: true }", transport.clone(), b"{}")
        .unwrap();

    assert_eq!(report.status, 10);
    assert!(transport.seen().is_empty());
    assert_eq!(
        report.calls,
        vec![call(Capability::IssueRequest, HostStatus::Denied)]
    );
}

#[test]
fn host_outside_allow_list_denied() {
    let fx = Fixture::new();
    let transport = StubTransport::new(200, REPLY);
    let report = fx
        .invoke(
            FETCH,
            "{ network: true, allowed_hosts: [ollama.internal] }",
            transport.clone(),
            b"{}",
        )
        .unwrap();

    assert_eq!(report.status, 10);
    assert!(transport.seen().is_empty());
}

#[test]
fn error_reply_is_not_persisted() {
    let fx = Fixture::new();
    fx.sandbox.write(REPLY_PATH, b"stale").unwrap();
    let report = fx
        .invoke(
            FETCH,
            "{ network: true, file_write: true }",
            StubTransport::new(500, b"boom"),
            b"{}",
        )
        .unwrap();

    assert_eq!(report.status, 10);
    assert_eq!(
        report.calls,
        vec![call(Capability::IssueRequest, HostStatus::HttpStatus)]
    );
    assert!(fx.sandbox.read(REPLY_PATH).is_err());
}

#[test]
fn invalid_header_is_bad_argument() {
    let fx = Fixture::new();
    let transport = StubTransport::new(200, REPLY);
    let report = fx
        .invoke(BAD_HEADER, "{ network: true }", transport.clone(), b"{}")
        .unwrap();

    assert_eq!(report.status, HostStatus::BadArgument.code());
    assert!(transport.seen().is_empty());
    assert_eq!(
        report.calls,
        vec![call(Capability::IssueRequest, HostStatus::BadArgument)]
    );
}

#[test]
fn sandbox_escape_refused() {
    let fx = Fixture::new();
    let report = fx
        .invoke(ESCAPE, "{ file_write: true }", StubTransport::new(200, b""), b"x")
        .unwrap();

    assert_eq!(report.status, HostStatus::BadArgument.code());
    assert!(!fx.dir.path().join("escape.json").exists());
}

#[test]
fn empty_input_stages_nothing() {
    let fx = Fixture::new();
    let report = fx
        .invoke(ECHO, "{ file_write: true }", StubTransport::new(200, b""), b"")
        .unwrap();
    assert!(report.succeeded());
    assert_eq!(report.output.as_deref(), Some(&b""[..]));
}

#[test]
fn trap_surfaces_as_error() {
    let fx = Fixture::new();
    let err = fx
        .invoke(TRAP, "{}", StubTransport::new(200, b""), b"{}")
        .unwrap_err();
    assert!(matches!(err, HostError::Trap(_)), "{err}");
}

#[test]
fn missing_entry_point_refused_before_running() {
    let fx = Fixture::new();
    let module = fx.runtime.load_module(ECHO.as_bytes()).unwrap();
    let yaml = "module: { name: m, wasm: m.wasm, entry_point: generate_ollama }";
    let manifest = ModuleManifest::from_yaml(yaml, ".").unwrap();
    let err = fx
        .runtime
        .invoke(
            &module,
            &manifest,
            &fx.sandbox,
            StubTransport::new(200, b""),
            b"{}",
        )
        .unwrap_err();
    assert!(matches!(err, HostError::MissingExport(_)), "{err}");
}
