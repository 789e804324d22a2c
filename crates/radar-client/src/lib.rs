//! RADAR REST Client - Avro record senders for the Kafka REST proxy
//!
//! This crate sends Avro records to a Kafka REST proxy. It resolves the
//! registry schemas of every topic, converts local records to them, and
//! posts them in the RADAR binary or the Avro JSON format.
//!
//! # Examples
//!
//! ## Sending records
//!
//! ```ignore
//! use radar_client::{KafkaSender, RestKafkaSender, TopicSender};
//! use radar_schema_registry::{SchemaCache, SchemaRegistryClient};
//!
//! let registry = Arc::new(SchemaRegistryClient::new("http://localhost:8081")?);
//! let sender = RestKafkaSender::builder()
//!     .base_url("http://localhost:8082")
//!     .schema_cache(Arc::new(SchemaCache::new(registry)))
//!     .binary_content(true)
//!     .build()?;
//!
//! let topic_sender = sender.sender(topic);
//! topic_sender.send(key, value).await?;
//! ```
//!
//! ## Batching
//!
//! ```ignore
//! use radar_client::{BatchConfig, BatchedKafkaSender};
//!
//! let batched = BatchedKafkaSender::new(Arc::new(sender), BatchConfig::default());
//! let topic_sender = batched.sender(topic);
//! topic_sender.send(key, value).await?; // buffered
//! topic_sender.flush().await?;          // sent
//! ```

pub mod auth;
pub mod batch;
pub mod config;
pub mod connection;
pub mod content;
pub mod error;
pub mod rest;
pub mod retry;
pub mod sender;

pub use auth::{BearerToken, StaticTokenSource, TokenHolder, TokenSource};
pub use batch::{BatchBuffer, BatchConfig, BatchedKafkaSender, BatchedTopicSender};
pub use config::{RestSenderBuilder, RestSenderConfig};
pub use connection::{ConnectionState, ConnectionStatus};
pub use content::{ContentFormat, RecordEncoder};
pub use error::{ClientError, Result};
pub use rest::{RestKafkaSender, RestTopicSender};
pub use retry::{retry_with_backoff, retry_with_jittered_backoff, RetryPolicy};
pub use sender::{KafkaSender, TopicSender};
