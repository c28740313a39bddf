//! Resource loading with retry, offline cache and cancellation
//!
//! [`ResourceLoader::load`] resolves one logical resource in this order:
//!
//! 1. a payload pre-registered in [`LocalFiles`] for `file:` urls
//! 2. the offline [`CacheGateway`], when one is supplied and enabled for the
//!    resource kind
//! 3. the [`Transport`], retried according to the context's [`RetryPolicy`]
//!
//! Each load runs in its own tokio task and is observed through the returned
//! [`FileRequest`]. The outcome goes to exactly one sink: the callback in
//! [`LoadOptions`] when supplied, otherwise [`FileRequest::wait`]. Completion
//! fires once after delivery, whatever the outcome.

pub mod local;
pub mod request;

use std::fmt;
use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cache::CacheGateway;
use crate::config::{Config, LoaderConfig};
use crate::error::LoadError;
use crate::retry::{FailureClass, FailureSignal, GiveUpReason, RetryDecision, RetryPolicy};
use crate::schedule::defer;
use crate::transport::{
    Payload, Progress, ProgressSink, ResponseStatus, Transport, TransportRequest,
};

pub use local::LocalFiles;
pub use request::{FileRequest, RequestOutcome, ResourceRequest};

/// Kind of resource, selects the cache's per-kind switch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Scenes and generic files
    #[default]
    File,
    /// Textures
    Texture,
}

/// Url rewrite hook applied after cleaning
pub type UrlRewrite = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Receives a loaded resource
pub type SuccessCallback = Box<dyn FnOnce(Resource) + Send>;

/// Receives a terminal load error
pub type ErrorCallback = Box<dyn FnOnce(LoadError) + Send>;

/// Receives the completion outcome
pub type CompleteCallback = Box<dyn FnOnce(&RequestOutcome) + Send>;

/// Escape characters the transport would otherwise treat as url syntax
pub fn clean_url(url: &str) -> String {
    url.replace('#', "%23")
}

/// Where a resource was resolved from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceSource {
    /// Pre-registered local file
    LocalOverride,
    /// Offline cache
    Cache,
    /// Transport
    Transport,
}

/// A resolved resource
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    /// Loaded bytes or text
    pub payload: Payload,
    /// Final url reported by the transport
    pub response_url: Option<String>,
    /// Where the payload came from
    pub source: ResourceSource,
}

/// Everything a loader needs, passed explicitly
#[derive(Clone)]
pub struct LoaderContext {
    /// Base url, headless flag and transport limits
    pub config: LoaderConfig,
    /// Active retry policy, shared by every request
    pub policy: Arc<dyn RetryPolicy>,
    /// Transport used for remote attempts
    pub transport: Arc<dyn Transport>,
    /// Local-override registry
    pub local_files: LocalFiles,
    /// Optional url rewrite hook
    pub rewrite: Option<UrlRewrite>,
}

impl LoaderContext {
    /// Create a context with no local files and no rewrite hook
    pub fn new(
        config: LoaderConfig,
        policy: Arc<dyn RetryPolicy>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            config,
            policy,
            transport,
            local_files: LocalFiles::new(),
            rewrite: None,
        }
    }

    /// Build a context from configuration
    pub fn from_config(config: &Config, transport: Arc<dyn Transport>) -> Self {
        Self::new(config.loader.clone(), config.retry.build_policy(), transport)
    }

    /// Set the url rewrite hook
    pub fn with_rewrite<F>(mut self, rewrite: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.rewrite = Some(Arc::new(rewrite));
        self
    }

    /// Use an existing local-file registry
    pub fn with_local_files(mut self, local_files: LocalFiles) -> Self {
        self.local_files = local_files;
        self
    }

    /// Clean and rewrite a caller-supplied url
    pub fn resolve_url(&self, url: &str) -> String {
        let cleaned = clean_url(url);
        match &self.rewrite {
            Some(rewrite) => rewrite(&cleaned),
            None => cleaned,
        }
    }
}

impl fmt::Debug for LoaderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderContext")
            .field("config", &self.config)
            .field("policy", &self.policy)
            .field("local_files", &self.local_files.len())
            .field("rewrite", &self.rewrite.is_some())
            .finish()
    }
}

/// Per-load options
#[derive(Default)]
pub struct LoadOptions {
    binary: bool,
    kind: ResourceKind,
    cache: Option<Arc<dyn CacheGateway>>,
    on_success: Option<SuccessCallback>,
    on_error: Option<ErrorCallback>,
    on_progress: Option<ProgressSink>,
    on_complete: Option<CompleteCallback>,
}

impl LoadOptions {
    /// Default options: text payload, file kind, no cache, no callbacks
    pub fn new() -> Self {
        Self::default()
    }

    /// Load raw bytes instead of text
    pub fn binary(mut self, binary: bool) -> Self {
        self.binary = binary;
        self
    }

    /// Resource kind
    pub fn kind(mut self, kind: ResourceKind) -> Self {
        self.kind = kind;
        self
    }

    /// Offline cache to consult before the transport
    pub fn cache(mut self, cache: Arc<dyn CacheGateway>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Deliver the resource to a callback instead of `wait()`
    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: FnOnce(Resource) + Send + 'static,
    {
        self.on_success = Some(Box::new(f));
        self
    }

    /// Deliver a terminal error to a callback instead of `wait()`
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: FnOnce(LoadError) + Send + 'static,
    {
        self.on_error = Some(Box::new(f));
        self
    }

    /// Receive transport progress
    pub fn on_progress<F>(mut self, f: F) -> Self
    where
        F: Fn(Progress) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(f));
        self
    }

    /// Subscribe to completion before the load starts
    pub fn on_complete<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&RequestOutcome) + Send + 'static,
    {
        self.on_complete = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for LoadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadOptions")
            .field("binary", &self.binary)
            .field("kind", &self.kind)
            .field("cache", &self.cache.as_ref().map(|c| c.name().to_string()))
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_progress", &self.on_progress.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}

enum CacheProbe {
    Hit(Payload),
    Miss,
    Unavailable,
}

/// Loads resources on the tokio runtime
#[derive(Debug, Clone)]
pub struct ResourceLoader {
    ctx: Arc<LoaderContext>,
}

impl ResourceLoader {
    /// Create a loader
    pub fn new(ctx: LoaderContext) -> Self {
        Self { ctx: Arc::new(ctx) }
    }

    /// Loader context
    pub fn context(&self) -> &LoaderContext {
        &self.ctx
    }

    /// Start loading `url`
    ///
    /// Must be called from within a tokio runtime.
    pub fn load(&self, url: &str, options: LoadOptions) -> FileRequest {
        let LoadOptions {
            binary,
            kind,
            cache,
            on_success,
            on_error,
            on_progress,
            on_complete,
        } = options;

        let shared = Arc::new(ResourceRequest::new(self.ctx.resolve_url(url), binary));
        if let Some(on_complete) = on_complete {
            shared.completion().subscribe(on_complete);
        }

        // Progress is dropped once the request is aborted
        let progress = on_progress.map(|sink| {
            let request = shared.clone();
            Arc::new(move |p: Progress| {
                if !request.is_aborted() {
                    sink(p)
                }
            }) as ProgressSink
        });

        let loader = self.clone();
        let request = shared.clone();
        let task = tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                _ = request.aborted() => None,
                result = loader.resolve(&request, kind, cache, progress) => Some(result),
            };
            loader.deliver(&request, result, on_success, on_error)
        });

        FileRequest::new(shared, task)
    }

    fn deliver(
        &self,
        request: &ResourceRequest,
        result: Option<Result<Resource, LoadError>>,
        on_success: Option<SuccessCallback>,
        on_error: Option<ErrorCallback>,
    ) -> Result<Option<Resource>, LoadError> {
        let (returned, outcome) = match result {
            _ if request.is_aborted() => {
                debug!(url = %request.url(), "Load aborted");
                (Ok(None), RequestOutcome::Aborted)
            }
            None => (Ok(None), RequestOutcome::Aborted),
            Some(Ok(resource)) => match on_success {
                Some(callback) => {
                    callback(resource);
                    (Ok(None), RequestOutcome::Loaded)
                }
                None => (Ok(Some(resource)), RequestOutcome::Loaded),
            },
            Some(Err(err)) => match on_error {
                Some(callback) => {
                    callback(err);
                    (Ok(None), RequestOutcome::Failed)
                }
                None => (Err(err), RequestOutcome::Failed),
            },
        };

        request.completion().notify_all(&outcome);
        returned
    }

    async fn resolve(
        &self,
        request: &ResourceRequest,
        kind: ResourceKind,
        cache: Option<Arc<dyn CacheGateway>>,
        progress: Option<ProgressSink>,
    ) -> Result<Resource, LoadError> {
        let url = request.url();
        let binary = request.binary();

        if let Some(data) = self.ctx.local_files.resolve(url) {
            debug!(url = url, size = data.len(), "Serving local override");
            if let Some(sink) = &progress {
                let size = data.len() as u64;
                sink(Progress {
                    loaded: size,
                    total: Some(size),
                });
            }
            return Ok(Resource {
                payload: Payload::from_bytes(data, binary),
                response_url: None,
                source: ResourceSource::LocalOverride,
            });
        }

        let cache = cache.filter(|c| c.offline_enabled(kind) && !url.starts_with("data:"));
        let mut cache_ready = false;
        if let Some(gateway) = &cache {
            match probe_cache(gateway.as_ref(), url, binary).await {
                CacheProbe::Hit(payload) => {
                    return Ok(Resource {
                        payload,
                        response_url: None,
                        source: ResourceSource::Cache,
                    });
                }
                CacheProbe::Miss => cache_ready = true,
                CacheProbe::Unavailable => {}
            }
        }

        let resource = self.fetch_with_retry(request, progress).await?;

        if let Some(gateway) = cache.filter(|_| cache_ready) {
            if let Err(e) = gateway.store(url, &resource.payload).await {
                debug!(url = url, cache = gateway.name(), error = %e, "Cache write failed");
            }
        }

        Ok(resource)
    }

    async fn fetch_with_retry(
        &self,
        request: &ResourceRequest,
        progress: Option<ProgressSink>,
    ) -> Result<Resource, LoadError> {
        let load_url = format!("{}{}", self.ctx.config.base_url, request.url());
        let transport_request = TransportRequest::get(load_url.clone(), request.binary());
        let started = Instant::now();

        loop {
            let attempt = request.attempt_index();
            debug!(url = %load_url, attempt = attempt, "Starting transport attempt");

            let failure = match self
                .ctx
                .transport
                .fetch(&transport_request, progress.clone())
                .await
            {
                Ok(response) => match self.classify(response.status) {
                    None => {
                        return Ok(Resource {
                            payload: response.payload,
                            response_url: response.response_url,
                            source: ResourceSource::Transport,
                        });
                    }
                    Some(class) => class,
                },
                Err(e) => FailureClass::from(&e),
            };

            let signal = FailureSignal::new(failure, &load_url, started.elapsed());
            match self.ctx.policy.decide(&load_url, &signal, attempt) {
                RetryDecision::Wait(delay) => {
                    warn!(
                        url = %load_url,
                        attempt = attempt,
                        failure = %signal.class,
                        delay_ms = delay.as_millis() as u64,
                        "Attempt failed, retrying"
                    );
                    defer(delay).await;
                    request.next_attempt();
                }
                RetryDecision::GiveUp(reason) => {
                    warn!(
                        url = %load_url,
                        attempt = attempt,
                        failure = %signal.class,
                        reason = ?reason,
                        "Giving up"
                    );
                    return Err(match reason {
                        GiveUpReason::Exhausted => LoadError::PolicyExhausted {
                            url: load_url,
                            failure: signal.class,
                            attempts: attempt,
                        },
                        _ => LoadError::Transport {
                            url: load_url,
                            failure: signal.class,
                            attempt,
                        },
                    });
                }
            }
        }
    }

    /// `None` on success, otherwise the failure class
    fn classify(&self, status: ResponseStatus) -> Option<FailureClass> {
        match status {
            status if status.is_success() => None,
            ResponseStatus::Neutral if self.ctx.config.headless => None,
            ResponseStatus::Neutral => Some(FailureClass::ZeroStatus),
            ResponseStatus::Code(code) => Some(FailureClass::Status(code)),
        }
    }
}

async fn probe_cache(gateway: &dyn CacheGateway, url: &str, binary: bool) -> CacheProbe {
    if let Err(e) = gateway.open().await {
        debug!(url = url, cache = gateway.name(), error = %e, "Cache unavailable");
        return CacheProbe::Unavailable;
    }

    match gateway.lookup(url, binary).await {
        Ok(Some(payload)) => {
            debug!(url = url, cache = gateway.name(), "Cache hit");
            CacheProbe::Hit(payload)
        }
        Ok(None) => {
            debug!(url = url, cache = gateway.name(), "Cache miss");
            CacheProbe::Miss
        }
        Err(e) => {
            debug!(url = url, cache = gateway.name(), error = %e, "Cache lookup failed");
            CacheProbe::Unavailable
        }
    }
}
