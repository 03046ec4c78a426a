//! # Registry REST Client
//!
//! HTTP/JSON client for the destination asset registry, implementing every
//! capability trait of `assetsync-registry`.
//!
//! ## Features
//!
//! - API key authentication (`Authorization: ESP-APIKEY <key>`)
//! - Request and connect timeouts
//! - Retry with exponential backoff and `Retry-After` support
//! - Benign "nothing changed" answers surfaced as `WriteOutcome::NoChange`
//!
//! ## Example
//!
//! ```ignore
//! use assetsync_registry_rest::{RestRegistryConfig, RestRegistryFactory};
//! use assetsync_registry::prelude::*;
//!
//! let config = RestRegistryConfig::new("https://api.example.com/instance/xmlmc", "key");
//! let factory = RestRegistryFactory::new(config)?;
//! factory.client().test_connection().await?;
//! ```

pub mod client;
pub mod config;
mod envelope;
pub mod retry;

pub use client::{RestRegistryClient, RestRegistryFactory};
pub use config::RestRegistryConfig;
pub use retry::{parse_retry_after, RetryConfig};
