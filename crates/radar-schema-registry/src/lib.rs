//! RADAR Schema Registry client
//!
//! Talks to a Confluent-compatible schema registry and caches what it learns.
//!
//! # Features
//!
//! - **Client**: subject/version, subject/content and ID lookups, registration
//! - **Caching**: TTL caches keyed by ID, content and version, with
//!   single-flight lookups and cached failures
//!
//! # Usage
//!
//! ```ignore
//! use radar_schema_registry::{SchemaCache, SchemaRegistryClient};
//!
//! let client = Arc::new(SchemaRegistryClient::new("http://localhost:8081")?);
//! let cache = SchemaCache::new(client);
//!
//! // Latest value schema of a topic
//! let metadata = cache.get_by_version("android_phone_acceleration", true, 0).await?;
//!
//! // The same schema by ID is now served from the cache
//! let schema = cache.get_by_id(metadata.id).await?;
//! ```

pub mod cache;
pub mod client;
pub mod error;
pub mod types;

pub use cache::SchemaCache;
pub use client::{SchemaRegistryClient, SchemaRegistryClientBuilder};
pub use error::{Result, SchemaError};
pub use types::{schema_json, subject, SchemaMetadata};
