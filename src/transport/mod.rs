//! Request/response transport used by the loader
//!
//! A [`Transport`] performs one attempt: it sends a request and returns the
//! terminal status and payload. It never retries and never classifies a status
//! as success or failure; both are the loader's job. Cancelling an attempt is
//! done by dropping the future returned by [`Transport::fetch`].
//!
//! # Components
//!
//! - [`http`]: reqwest-based transport, with a built-in `file://` reader

pub mod http;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::TransportError;
use crate::retry::FailureClass;

pub use http::{HttpTransport, HttpTransportConfig};

/// Request method
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Method {
    /// GET
    #[default]
    Get,
}

/// One transport attempt
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    /// Absolute url, base prefix already applied
    pub url: String,
    /// Request method
    pub method: Method,
    /// Return raw bytes instead of text
    pub binary: bool,
}

impl TransportRequest {
    /// GET request for `url`
    pub fn get(url: impl Into<String>, binary: bool) -> Self {
        Self {
            url: url.into(),
            method: Method::Get,
            binary,
        }
    }
}

/// Terminal status of an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    /// A status code from the remote end
    Code(u16),
    /// No status available (local reads); success only in a headless context
    Neutral,
}

impl ResponseStatus {
    /// True for codes in `200..300`
    pub fn is_success(&self) -> bool {
        matches!(self, ResponseStatus::Code(code) if (200..300).contains(code))
    }
}

/// Result of an attempt that produced a response
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    /// Terminal status
    pub status: ResponseStatus,
    /// Response body
    pub payload: Payload,
    /// Final url after redirects
    pub response_url: Option<String>,
}

/// Loaded bytes or text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Text payload
    Text(String),
    /// Binary payload
    Binary(Bytes),
}

impl Payload {
    /// Wrap raw bytes; text payloads are decoded as lossy UTF-8
    pub fn from_bytes(bytes: Bytes, binary: bool) -> Self {
        if binary {
            Payload::Binary(bytes)
        } else {
            Payload::Text(String::from_utf8_lossy(&bytes).into_owned())
        }
    }

    /// Raw bytes of the payload
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Text(text) => text.as_bytes(),
            Payload::Binary(bytes) => bytes,
        }
    }

    /// Text of a text payload
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            Payload::Binary(_) => None,
        }
    }

    /// Size in bytes
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// True when there are no bytes
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this is a binary payload
    pub fn is_binary(&self) -> bool {
        matches!(self, Payload::Binary(_))
    }

    /// Convert into bytes
    pub fn into_bytes(self) -> Bytes {
        match self {
            Payload::Text(text) => Bytes::from(text),
            Payload::Binary(bytes) => bytes,
        }
    }
}

/// Partial-bytes notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Bytes received so far
    pub loaded: u64,
    /// Expected total, when known
    pub total: Option<u64>,
}

/// Callback receiving progress notifications
pub type ProgressSink = Arc<dyn Fn(Progress) + Send + Sync>;

/// A request/response transport
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one attempt
    ///
    /// Returns `Ok` whenever a terminal status was received, whatever the code.
    /// Returns `Err` when no usable response arrived.
    async fn fetch(
        &self,
        request: &TransportRequest,
        progress: Option<ProgressSink>,
    ) -> Result<TransportResponse, TransportError>;
}

impl From<&TransportError> for FailureClass {
    fn from(err: &TransportError) -> Self {
        match err {
            TransportError::Timeout => FailureClass::Timeout,
            TransportError::Connect(msg) | TransportError::Network(msg) => {
                FailureClass::Network(msg.clone())
            }
            TransportError::Io(_) => FailureClass::ZeroStatus,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test 1: Text payloads decode lossily
    #[test]
    fn test_payload_from_bytes() {
        let text = Payload::from_bytes(Bytes::from_static(b"{\"meshes\":[]}"), false);
        assert_eq!(text.as_text(), Some("{\"meshes\":[]}"));
        assert!(!text.is_binary());

        let lossy = Payload::from_bytes(Bytes::from_static(&[0x61, 0xff, 0x62]), false);
        assert_eq!(lossy.as_text(), Some("a\u{fffd}b"));

        let binary = Payload::from_bytes(Bytes::from_static(&[0x89, 0x50, 0x4e, 0x47]), true);
        assert!(binary.is_binary());
        assert_eq!(binary.len(), 4);
        assert_eq!(binary.as_text(), None);
    }

    // Test 2: Status success range
    #[test]
    fn test_response_status_success_range() {
        assert!(ResponseStatus::Code(200).is_success());
        assert!(ResponseStatus::Code(204).is_success());
        assert!(ResponseStatus::Code(299).is_success());
        assert!(!ResponseStatus::Code(199).is_success());
        assert!(!ResponseStatus::Code(300).is_success());
        assert!(!ResponseStatus::Code(404).is_success());
        assert!(!ResponseStatus::Neutral.is_success());
    }

    // Test 3: Transport errors classify into failure classes
    #[test]
    fn test_transport_error_classification() {
        assert_eq!(
            FailureClass::from(&TransportError::Timeout),
            FailureClass::Timeout
        );
        assert_eq!(
            FailureClass::from(&TransportError::Connect("refused".to_string())),
            FailureClass::Network("refused".to_string())
        );
        assert_eq!(
            FailureClass::from(&TransportError::Io("missing".to_string())),
            FailureClass::ZeroStatus
        );
    }

    // Test 4: into_bytes keeps content
    #[test]
    fn test_payload_into_bytes() {
        assert_eq!(
            Payload::Text("abc".to_string()).into_bytes(),
            Bytes::from_static(b"abc")
        );
        assert!(Payload::Binary(Bytes::new()).is_empty());
    }

    // Test 5: Requests are built as GET
    #[test]
    fn test_request_defaults_to_get() {
        let request = TransportRequest::get("https://cdn.example.com/scene.json", false);
        assert_eq!(request.method, Method::Get);
        assert_eq!(request.method, Method::default());
        assert_eq!(request.method.to_string(), "GET");
        assert!(!request.binary);
    }
}
