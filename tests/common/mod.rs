//! Common test utilities and helpers for integration tests

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use resource_loader::cache::CacheGateway;
use resource_loader::config::{Config, LoaderConfig, RetryConfig};
use resource_loader::error::{CacheError, TransportError};
use resource_loader::loader::{LoaderContext, ResourceKind, ResourceLoader};
use resource_loader::transport::{
    HttpTransport, HttpTransportConfig, Payload, ProgressSink, ResponseStatus, Transport,
    TransportRequest, TransportResponse,
};

/// Configuration with short retry intervals against `base_url`
pub fn test_config(base_url: &str, max_retries: u32) -> Config {
    Config {
        loader: LoaderConfig {
            base_url: base_url.to_string(),
            request_timeout_secs: 5,
            ..LoaderConfig::default()
        },
        retry: RetryConfig {
            max_retries,
            base_interval_ms: 10,
            ..RetryConfig::default()
        },
        ..Config::default()
    }
}

/// Loader backed by a real HTTP transport
pub fn create_http_loader(config: &Config) -> ResourceLoader {
    let transport = HttpTransport::new(HttpTransportConfig::from(&config.loader))
        .expect("Failed to create HTTP transport");
    ResourceLoader::new(LoaderContext::from_config(config, Arc::new(transport)))
}

/// Loader backed by a scripted transport
pub fn create_scripted_loader(
    config: &Config,
    transport: Arc<ScriptedTransport>,
) -> ResourceLoader {
    ResourceLoader::new(LoaderContext::from_config(config, transport))
}

/// Transport that replays a fixed list of outcomes and records requested urls
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<TransportResponse, TransportError>>>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response with the given status and text body
    pub fn then_status(self, code: u16, body: &str) -> Self {
        self.push(Ok(TransportResponse {
            status: ResponseStatus::Code(code),
            payload: Payload::Text(body.to_string()),
            response_url: None,
        }))
    }

    /// Queue a transport error
    pub fn then_error(self, error: TransportError) -> Self {
        self.push(Err(error))
    }

    fn push(self, outcome: Result<TransportResponse, TransportError>) -> Self {
        self.script
            .lock()
            .expect("script lock poisoned")
            .push_back(outcome);
        self
    }

    /// Urls requested so far
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("requests lock poisoned").clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn fetch(
        &self,
        request: &TransportRequest,
        _progress: Option<ProgressSink>,
    ) -> Result<TransportResponse, TransportError> {
        self.requests
            .lock()
            .expect("requests lock poisoned")
            .push(request.url.clone());
        self.script
            .lock()
            .expect("script lock poisoned")
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Network("script exhausted".to_string())))
    }
}

/// In-memory gateway counting its calls
#[derive(Default)]
pub struct CountingGateway {
    entries: Mutex<HashMap<String, Payload>>,
    pub lookups: AtomicU32,
    pub stores: AtomicU32,
    pub fail_open: bool,
}

impl CountingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gateway whose `open` always fails
    pub fn failing_open() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    pub fn with_entry(self, key: &str, payload: Payload) -> Self {
        self.entries
            .lock()
            .expect("entries lock poisoned")
            .insert(key.to_string(), payload);
        self
    }

    pub fn lookups(&self) -> u32 {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn stores(&self) -> u32 {
        self.stores.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheGateway for CountingGateway {
    fn name(&self) -> &str {
        "counting"
    }

    fn offline_enabled(&self, _kind: ResourceKind) -> bool {
        true
    }

    async fn open(&self) -> Result<(), CacheError> {
        if self.fail_open {
            Err(CacheError::Unavailable("open refused".to_string()))
        } else {
            Ok(())
        }
    }

    async fn lookup(&self, key: &str, _binary: bool) -> Result<Option<Payload>, CacheError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .entries
            .lock()
            .expect("entries lock poisoned")
            .get(key)
            .cloned())
    }

    async fn store(&self, key: &str, payload: &Payload) -> Result<(), CacheError> {
        self.stores.fetch_add(1, Ordering::SeqCst);
        self.entries
            .lock()
            .expect("entries lock poisoned")
            .insert(key.to_string(), payload.clone());
        Ok(())
    }
}
