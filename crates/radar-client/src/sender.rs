//! Sender Traits
//!
//! A [`KafkaSender`] owns a connection to the REST proxy and hands out one
//! [`TopicSender`] per topic:
//!
//! ```text
//! ┌──────────────────┐  sender(topic)  ┌──────────────────┐
//! │   KafkaSender    │ ──────────────→ │   TopicSender    │ send / send_batch
//! │ connection state │                 │ encoder per topic│ flush / clear
//! └──────────────────┘                 └──────────────────┘
//! ```
//!
//! Implementations:
//! - [`RestKafkaSender`](crate::RestKafkaSender): sends every batch immediately
//! - [`BatchedKafkaSender`](crate::BatchedKafkaSender): buffers records of the
//!   same key and forwards them in batches to another sender

use crate::connection::ConnectionStatus;
use crate::error::Result;
use crate::retry::{retry_with_jittered_backoff, RetryPolicy};
use apache_avro::types::Value;
use async_trait::async_trait;
use radar_avro::{AvroTopic, RecordData};
use std::sync::Arc;
use tokio::sync::watch;

/// Sends records of a single topic.
#[async_trait]
pub trait TopicSender: Send + Sync {
    /// Topic this sender writes to.
    fn topic(&self) -> &Arc<AvroTopic>;

    /// Send a batch of values sharing one key.
    ///
    /// All values are sent or none is: on error the caller still owns the
    /// whole batch.
    async fn send_batch(&self, records: RecordData) -> Result<()>;

    /// Send a single record.
    async fn send(&self, key: Value, value: Value) -> Result<()> {
        let records = RecordData::new(self.topic().clone(), key, vec![value])?;
        self.send_batch(records).await
    }

    /// Send any buffered records.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Drop any buffered records without sending them.
    async fn clear(&self) {}

    /// Send a batch, retrying transient failures with exponential backoff.
    ///
    /// Authentication and schema errors are returned immediately.
    async fn send_batch_with_retry(&self, records: RecordData, policy: &RetryPolicy) -> Result<()> {
        retry_with_jittered_backoff(policy, || self.send_batch(records.clone())).await
    }
}

/// Connection to a Kafka REST proxy.
#[async_trait]
pub trait KafkaSender: Send + Sync {
    /// Sender for records of `topic`.
    fn sender(&self, topic: Arc<AvroTopic>) -> Arc<dyn TopicSender>;

    /// Probe the proxy and update the connection state.
    ///
    /// # Returns
    ///
    /// - `Ok(true)` if the proxy answered successfully
    /// - `Ok(false)` if it could not be reached or answered with an error
    ///
    /// # Errors
    ///
    /// `ClientError::Authentication` if the proxy rejected the credentials.
    async fn reset_connection(&self) -> Result<bool>;

    /// Last known connection state.
    fn connection_state(&self) -> ConnectionStatus;

    /// Subscribe to connection state changes.
    fn subscribe_state(&self) -> watch::Receiver<ConnectionStatus>;
}
