//! End-to-end runs of the generation pipeline against the scripted host.

use floatkit::abi::{Capability, EXIT_FAILURE, EXIT_OUTPUT_LOST, EXIT_SUCCESS, OUTPUT_PATH};
use floatkit::module::input::{MAX_PAYLOAD_BYTES, MAX_SYSTEM_BYTES};
use floatkit::module::mock::MockHost;
use floatkit::module::{Pipeline, Status};
use serde_json::{json, Value};

const REPLY: &[u8] =
    br#"{"model":"m1","created_at":"2024-01-01T00:00:00Z","response":"hi","done":true,"eval_count":3}"#;

fn run(host: &mut MockHost, input: &Value) -> (u32, Value) {
    let raw = serde_json::to_vec(input).unwrap();
    let status = Pipeline::new(host).run(&raw);
    let output = host.output_json().expect("an output document");
    (status, output)
}

fn base_input() -> Value {
    json!({"target_id": "m1", "payload": "hello", "endpoint": "http://h/"})
}

#[test]
fn scenario_a_successful_generation() {
    let mut host = MockHost::replying(br#"{"response":"hi","done":true}"#.to_vec());
    let (status, out) = run(&mut host, &base_input());

    assert_eq!(status, EXIT_SUCCESS);
    assert_eq!(out["success"], true);
    assert_eq!(out["response"], "hi");
    assert_eq!(out["done"], true);
    assert_eq!(out["model"], "m1");
    assert_eq!(out["metadata"]["processing_complete"], true);
    assert_eq!(out["metadata"]["endpoint"], "http://h/api/generate");
    assert_eq!(out["metadata"]["payload_length"], 5);
    assert_eq!(out["metadata"]["response_length"], 2);
    assert_eq!(host.written[0].0, OUTPUT_PATH);
}

#[test]
fn scenario_b_missing_endpoint() {
    let mut host = MockHost::replying(REPLY.to_vec());
    let input = json!({"target_id": "m1", "payload": "hello"});
    let (status, out) = run(&mut host, &input);

    assert_eq!(status, EXIT_FAILURE);
    assert_eq!(out["success"], false);
    assert_eq!(out["error_type"], "VALIDATION_ERROR");
    assert_eq!(out["metadata"]["missing_field"], "endpoint");
    assert_eq!(out["metadata"]["error_stage"], "validation");
    assert!(host.requests.is_empty());
}

#[test]
fn scenario_c_send_failure() {
    let mut host = MockHost {
        send_status: Status(4),
        reply: Some(REPLY.to_vec()),
        ..Default::default()
    };
    let (status, out) = run(&mut host, &base_input());

    assert_eq!(status, EXIT_FAILURE);
    assert_eq!(out["success"], false);
    assert_eq!(out["error_type"], "HTTP_REQUEST_ERROR");
    assert_eq!(out["metadata"]["status"], 4);
    assert_eq!(out["metadata"]["error_stage"], "http_request");
    assert!(!host.calls.contains(&Capability::ReadResource));
}

#[test]
fn scenario_d_unparseable_reply() {
    let mut host = MockHost::replying(br#"{"unexpected": 1}"#.to_vec());
    let (status, out) = run(&mut host, &base_input());

    assert_eq!(status, EXIT_FAILURE);
    assert_eq!(out["error_type"], "RESPONSE_PARSE_ERROR");
    assert_eq!(out["metadata"]["raw_response"], r#"{"unexpected": 1}"#);
    assert_eq!(out["metadata"]["reply_size"], 17);
}

#[test]
fn every_required_field_reported_when_missing() {
    for field in ["target_id", "payload", "endpoint"] {
        let mut input = base_input();
        input.as_object_mut().unwrap().remove(field);
        let mut host = MockHost::replying(REPLY.to_vec());
        let (status, out) = run(&mut host, &input);
        assert_eq!(status, EXIT_FAILURE, "{field}");
        assert_eq!(out["error_type"], "VALIDATION_ERROR", "{field}");
        assert_eq!(out["metadata"]["missing_field"], field);
        assert!(host.requests.is_empty(), "{field} must not reach the network");
    }
}

#[test]
fn null_required_field_reported_as_missing() {
    for field in ["target_id", "payload", "endpoint"] {
        let mut input = base_input();
        input[field] = Value::Null;
        let mut host = MockHost::replying(REPLY.to_vec());
        let (status, out) = run(&mut host, &input);
        assert_eq!(status, EXIT_FAILURE, "{field}");
        assert_eq!(out["error_type"], "VALIDATION_ERROR", "{field}");
        assert_eq!(out["metadata"]["missing_field"], field);
        assert!(host.requests.is_empty(), "{field} must not reach the network");
    }
}

#[test]
fn name_and_alias_together_is_input_parse_error() {
    let mut host = MockHost::replying(REPLY.to_vec());
    let mut input = base_input();
    input["model"] = json!("m2");
    let (status, out) = run(&mut host, &input);
    assert_eq!(status, EXIT_FAILURE);
    assert_eq!(out["error_type"], "INPUT_PARSE_ERROR");
    assert!(host.requests.is_empty());
}

#[test]
fn first_violation_wins() {
    let mut host = MockHost::replying(REPLY.to_vec());
    let input = json!({"payload": "x".repeat(MAX_PAYLOAD_BYTES + 1)});
    let (_, out) = run(&mut host, &input);
    assert_eq!(out["metadata"]["missing_field"], "target_id");
}

#[test]
fn payload_at_limit_is_accepted() {
    let mut host = MockHost::replying(REPLY.to_vec());
    let mut input = base_input();
    input["payload"] = json!("p".repeat(MAX_PAYLOAD_BYTES));
    input["system"] = json!("s".repeat(MAX_SYSTEM_BYTES));
    let (status, out) = run(&mut host, &input);
    assert_eq!(status, EXIT_SUCCESS, "{out}");
    assert_eq!(out["metadata"]["has_system_message"], true);
}

#[test]
fn payload_over_limit_is_rejected() {
    let mut host = MockHost::replying(REPLY.to_vec());
    let mut input = base_input();
    input["payload"] = json!("p".repeat(MAX_PAYLOAD_BYTES + 1));
    let (status, out) = run(&mut host, &input);
    assert_eq!(status, EXIT_FAILURE);
    assert_eq!(out["metadata"]["invalid_field"], "payload");
}

#[test]
fn option_out_of_range_is_rejected() {
    let mut host = MockHost::replying(REPLY.to_vec());
    let mut input = base_input();
    input["options"] = json!({"temperature": 2.5});
    let (_, out) = run(&mut host, &input);
    assert_eq!(out["error_type"], "VALIDATION_ERROR");
    assert_eq!(out["metadata"]["invalid_field"], "temperature");
}

#[test]
fn legacy_field_names_accepted() {
    let mut host = MockHost::replying(REPLY.to_vec());
    let input = json!({"model": "m1", "prompt": "hello", "ollama_url": "http://h"});
    let (status, _) = run(&mut host, &input);
    assert_eq!(status, EXIT_SUCCESS);
    assert_eq!(host.requests[0].url, "http://h/api/generate");
}

#[test]
fn optional_fields_flow_into_request_and_metadata() {
    let mut host = MockHost::replying(REPLY.to_vec());
    let mut input = base_input();
    input["system"] = json!("be brief");
    input["context"] = json!([1, 2, 3]);
    input["images"] = json!(["aGk="]);
    input["options"] = json!({"top_k": 40});
    let (status, out) = run(&mut host, &input);
    assert_eq!(status, EXIT_SUCCESS);

    let body: Value = serde_json::from_slice(&host.requests[0].body).unwrap();
    assert_eq!(body["system"], "be brief");
    assert_eq!(body["context"], json!([1, 2, 3]));
    assert_eq!(body["options"]["top_k"], 40);
    assert_eq!(body["stream"], false);

    let md = &out["metadata"];
    assert_eq!(md["has_context"], true);
    assert_eq!(md["context_length"], 3);
    assert_eq!(md["image_count"], 1);
    assert_eq!(
        md["optional_fields"],
        json!(["context", "images", "options", "system"])
    );
}

#[test]
fn reply_fields_echoed() {
    let mut host = MockHost::replying(REPLY.to_vec());
    let (_, out) = run(&mut host, &base_input());
    assert_eq!(out["created_at"], "2024-01-01T00:00:00Z");
    assert_eq!(out["eval_count"], 3);
    assert!(out.get("total_duration").is_none());
}

#[test]
fn identical_runs_are_byte_identical() {
    let raw = serde_json::to_vec(&base_input()).unwrap();
    let mut first = MockHost::replying(REPLY.to_vec());
    let mut second = MockHost::replying(REPLY.to_vec());
    Pipeline::new(&mut first).run(&raw);
    Pipeline::new(&mut second).run(&raw);
    assert_eq!(first.output().unwrap(), second.output().unwrap());
    assert_eq!(first.logs, second.logs);
}

#[test]
fn exactly_one_document_per_run() {
    for input in [base_input(), json!({}), json!({"target_id": 7})] {
        let mut host = MockHost::replying(REPLY.to_vec());
        let raw = serde_json::to_vec(&input).unwrap();
        Pipeline::new(&mut host).run(&raw);
        assert_eq!(host.written.len(), 1, "{input}");
    }
}

#[test]
fn malformed_json_is_input_parse_error() {
    let mut host = MockHost::default();
    let status = Pipeline::new(&mut host).run(b"{not json");
    assert_eq!(status, EXIT_FAILURE);
    let out = host.output_json().unwrap();
    assert_eq!(out["error_type"], "INPUT_PARSE_ERROR");
    assert_eq!(out["metadata"]["error_stage"], "input_parsing");
    assert!(out.get("model").is_none());
}

#[test]
fn lost_output_is_distinct_status() {
    let mut host = MockHost {
        reply: Some(REPLY.to_vec()),
        write_status: Status(3),
        ..Default::default()
    };
    let raw = serde_json::to_vec(&base_input()).unwrap();
    assert_eq!(Pipeline::new(&mut host).run(&raw), EXIT_OUTPUT_LOST);
    assert!(host.output().is_none());
    assert!(host.logs.iter().any(|l| l.contains("Failed to write")));
}
