//! HTTP transport behind the `issue_request` capability.
//!
//! No module awareness. Takes a decoded request, returns status and body.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use tokio::runtime::Handle;

/// A request decoded from the capability's four buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// A complete, non-streamed reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid method: {0}")]
    InvalidMethod(String),

    #[error("invalid header line: {0}")]
    InvalidHeader(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Sends one request and waits for the whole reply.
pub trait HttpTransport: Send + Sync {
    fn send(&self, request: &HttpRequest) -> Result<HttpReply, TransportError>;
}

/// Parse a `Name: value\r\n` header block.
pub fn parse_headers(raw: &str) -> Result<Vec<(String, String)>, TransportError> {
    let mut headers = Vec::new();
    for line in raw.split("\r\n").map(str::trim).filter(|l| !l.is_empty()) {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| TransportError::InvalidHeader(line.to_string()))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(TransportError::InvalidHeader(line.to_string()));
        }
        headers.push((name.to_string(), value.trim().to_string()));
    }
    Ok(headers)
}

/// Convert decoded header pairs into a reqwest header map.
pub fn header_map(headers: &[(String, String)]) -> Result<HeaderMap, TransportError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| TransportError::InvalidHeader(format!("{name}: {value}")))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|_| TransportError::InvalidHeader(format!("{name}: {value}")))?;
        map.append(header_name, header_value);
    }
    Ok(map)
}

/// reqwest-backed transport.
///
/// `send` blocks on the tokio runtime behind `handle`, so it must be called
/// from a blocking thread (e.g. inside `spawn_blocking`), never from async
/// code.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: Client,
    handle: Handle,
}

impl ReqwestTransport {
    pub fn new(handle: Handle, timeout: Duration) -> Result<Self, TransportError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, handle })
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpReply, TransportError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| TransportError::InvalidMethod(request.method.clone()))?;

        let headers = header_map(&request.headers)?;
        let builder = self
            .http
            .request(method, &request.url)
            .headers(headers)
            .body(request.body.clone());

        self.handle.block_on(async move {
            let response = builder.send().await?;
            let status = response.status().as_u16();
            let body = response.bytes().await?.to_vec();
            Ok(HttpReply { status, body })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_content_type_block() {
        let headers = parse_headers("Content-Type: application/json\r\n").unwrap();
        assert_eq!(
            headers,
            vec![("Content-Type".to_string(), "application/json".to_string())]
        );
    }

    #[test]
    fn parse_multiple_and_blank_lines() {
        let headers = parse_headers("A: 1\r\n\r\nB:two words \r\n").unwrap();
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[1], ("B".to_string(), "two words".to_string()));
    }

    #[test]
    fn parse_empty_block() {
        assert!(parse_headers("").unwrap().is_empty());
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(matches!(
            parse_headers("no colon here"),
            Err(TransportError::InvalidHeader(_))
        ));
        assert!(matches!(
            parse_headers(": value"),
            Err(TransportError::InvalidHeader(_))
        ));
    }

    #[test]
    fn header_map_accepts_content_type() {
        let map = header_map(&parse_headers("Content-Type: application/json\r\n").unwrap())
            .unwrap();
        assert_eq!(map["content-type"], "application/json");
    }

    #[test]
    fn header_map_rejects_bad_name_and_value() {
        let bad_name = vec![("Bad Name".to_string(), "x".to_string())];
        assert!(matches!(
            header_map(&bad_name),
            Err(TransportError::InvalidHeader(_))
        ));
        let bad_value = vec![("X-Trace".to_string(), "a\u{7f}b".to_string())];
        assert!(matches!(
            header_map(&bad_value),
            Err(TransportError::InvalidHeader(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn invalid_header_rejected_before_send() {
        let transport =
            ReqwestTransport::new(Handle::current(), Duration::from_secs(1)).unwrap();
        let request = HttpRequest {
            url: "http://127.0.0.1:9/api/generate".into(),
            method: "POST".into(),
            headers: vec![("Bad Name".into(), "x".into())],
            body: vec![],
        };
        let result = tokio::task::spawn_blocking(move || transport.send(&request))
            .await
            .unwrap();
        assert!(matches!(result, Err(TransportError::InvalidHeader(_))));
    }

    #[test]
    fn success_range() {
        let reply = |status| HttpReply {
            status,
            body: Vec::new(),
        };
        assert!(reply(200).is_success());
        assert!(reply(204).is_success());
        assert!(!reply(404).is_success());
        assert!(!reply(500).is_success());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn invalid_method_rejected_before_send() {
        let transport =
            ReqwestTransport::new(Handle::current(), Duration::from_secs(1)).unwrap();
        let request = HttpRequest {
            url: "http://127.0.0.1:9/api/generate".into(),
            method: "BAD METHOD".into(),
            headers: vec![],
            body: vec![],
        };
        let result = tokio::task::spawn_blocking(move || transport.send(&request))
            .await
            .unwrap();
        assert!(matches!(result, Err(TransportError::InvalidMethod(_))));
    }
}
