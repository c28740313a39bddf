//! resource-loader - Asynchronous resource loading with retry and offline cache
//!
//! This crate fetches remote or locally supplied payloads over a pluggable
//! transport, retrying failures with backoff, consulting an optional offline
//! cache first, and notifying observers exactly once when a load ends. It also
//! provides a cooperative burst scheduler for splitting long synchronous work
//! into slices that yield to the async runtime.
//!
//! ```no_run
//! use std::sync::Arc;
//! use resource_loader::config::Config;
//! use resource_loader::loader::{LoadOptions, LoaderContext, ResourceLoader};
//! use resource_loader::transport::{HttpTransport, HttpTransportConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::default();
//! let transport = HttpTransport::new(HttpTransportConfig::from(&config.loader))?;
//! let loader = ResourceLoader::new(LoaderContext::from_config(&config, Arc::new(transport)));
//!
//! let request = loader.load("https://cdn.example.com/scene.json", LoadOptions::new());
//! if let Some(resource) = request.wait().await? {
//!     println!("{} bytes", resource.payload.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod completion;
pub mod config;
pub mod error;
pub mod loader;
pub mod retry;
pub mod schedule;
pub mod telemetry;
pub mod transport;

pub use completion::CompletionObservable;
pub use error::LoadError;
pub use loader::{FileRequest, LoadOptions, LoaderContext, Resource, ResourceLoader};
pub use retry::{ExponentialBackoff, RetryDecision, RetryPolicy};
