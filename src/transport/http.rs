//! HTTP transport for remote resources
//!
//! This module provides a reqwest-based [`Transport`] with a request timeout,
//! a global concurrent request limit, and streaming progress notifications.
//! `file://` urls are read from the local filesystem instead.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use percent_encoding::percent_decode_str;
use reqwest::Client;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::LoaderConfig;
use crate::error::TransportError;

use super::{
    Method, Payload, Progress, ProgressSink, ResponseStatus, Transport, TransportRequest,
    TransportResponse,
};

/// Configuration for [`HttpTransport`]
#[derive(Debug, Clone, PartialEq)]
pub struct HttpTransportConfig {
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Maximum number of requests in flight
    pub max_concurrent: usize,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_concurrent: 6,
        }
    }
}

impl From<&LoaderConfig> for HttpTransportConfig {
    fn from(config: &LoaderConfig) -> Self {
        Self {
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            max_concurrent: config.max_concurrent,
        }
    }
}

/// HTTP transport with concurrency limiting
///
/// Features:
/// - Global concurrent request limiting via semaphore
/// - Chunked body reads with progress notifications
/// - `file://` urls served from disk with a neutral status
#[derive(Debug)]
pub struct HttpTransport {
    client: Client,
    semaphore: Arc<Semaphore>,
    config: HttpTransportConfig,
}

impl HttpTransport {
    /// Create a new transport
    pub fn new(config: HttpTransportConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TransportError::Network(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self::with_client(client, config))
    }

    /// Create a transport with a custom reqwest Client
    pub fn with_client(client: Client, config: HttpTransportConfig) -> Self {
        Self {
            client,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent)),
            config,
        }
    }

    /// Get current configuration
    pub fn config(&self) -> &HttpTransportConfig {
        &self.config
    }

    /// Get number of available permits (concurrent request slots)
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    async fn fetch_remote(
        &self,
        request: &TransportRequest,
        progress: Option<ProgressSink>,
    ) -> Result<TransportResponse, TransportError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| TransportError::Network("Transport closed".to_string()))?;

        debug!(url = %request.url, method = %request.method, "Sending HTTP request");

        let builder = match request.method {
            Method::Get => self.client.get(&request.url),
        };
        let mut response = builder.send().await.map_err(classify_reqwest_error)?;

        let status = response.status();
        let response_url = response.url().to_string();
        let total = response.content_length();

        let mut body = BytesMut::with_capacity(total.unwrap_or(0).min(1 << 20) as usize);
        while let Some(chunk) = response.chunk().await.map_err(classify_reqwest_error)? {
            body.extend_from_slice(&chunk);
            if let Some(sink) = &progress {
                sink(Progress {
                    loaded: body.len() as u64,
                    total,
                });
            }
        }

        if status.is_success() {
            debug!(
                url = %request.url,
                status = status.as_u16(),
                body_size = body.len(),
                "Received response"
            );
        } else {
            warn!(url = %request.url, status = status.as_u16(), "Unsuccessful status");
        }

        Ok(TransportResponse {
            status: ResponseStatus::Code(status.as_u16()),
            payload: Payload::from_bytes(body.freeze(), request.binary),
            response_url: Some(response_url),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(
        &self,
        request: &TransportRequest,
        progress: Option<ProgressSink>,
    ) -> Result<TransportResponse, TransportError> {
        match local_path(&request.url) {
            Some(path) => read_local_file(&request.url, path, request.binary, progress).await,
            None => self.fetch_remote(request, progress).await,
        }
    }
}

/// Map a reqwest error onto the transport error taxonomy
fn classify_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Network(err.to_string())
    }
}

/// Filesystem path of a `file://` url
fn local_path(url: &str) -> Option<PathBuf> {
    let rest = url.strip_prefix("file://")?;
    let decoded = percent_decode_str(rest).decode_utf8_lossy();
    Some(PathBuf::from(decoded.into_owned()))
}

async fn read_local_file(
    url: &str,
    path: PathBuf,
    binary: bool,
    progress: Option<ProgressSink>,
) -> Result<TransportResponse, TransportError> {
    debug!(url = url, path = %path.display(), "Reading local file");

    let data = tokio::fs::read(&path)
        .await
        .map_err(|e| TransportError::Io(format!("{}: {}", path.display(), e)))?;

    if let Some(sink) = &progress {
        let size = data.len() as u64;
        sink(Progress {
            loaded: size,
            total: Some(size),
        });
    }

    Ok(TransportResponse {
        status: ResponseStatus::Neutral,
        payload: Payload::from_bytes(Bytes::from(data), binary),
        response_url: Some(url.to_string()),
    })
}
