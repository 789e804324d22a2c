//! Batching Sender
//!
//! This module buffers records per topic so that many small sends become a
//! few large REST requests. A batch holds values of a single key, because a
//! proxy request carries exactly one key.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐
//! │  send(...)   │ TopicSender API
//! └──────┬───────┘
//!        │
//!        ▼
//! ┌──────────────────────────────┐
//! │  BatchBuffer                 │ Per-topic buffer
//! │  - key: Option<Value>        │
//! │  - values: Vec<Value>        │
//! │  - created_at: Instant       │
//! └──────┬───────────────────────┘
//!        │
//!        ├─→ Flush on key change (previous key first)
//!        ├─→ Flush on size (max_batch_size values)
//!        ├─→ Flush on age (oldest value older than max_batch_age)
//!        ├─→ Flush on explicit flush() call
//!        │
//!        ▼
//! ┌──────────────────────────────┐
//! │  inner TopicSender           │
//! │  send_batch(key, values[])   │
//! └──────────────────────────────┘
//! ```
//!
//! ## Failure Handling
//!
//! Flushing is all-or-nothing. A batch that fails to send stays buffered and
//! is sent again by the next flush; the failure is returned to the caller
//! that triggered the flush. New records are only buffered once the stuck
//! batch has left, so a buffer never holds more than `max_batch_size` values
//! plus the last appended batch.
//!
//! ## Ordering
//!
//! Each topic buffer sits behind an async mutex that is held while a batch
//! is sent, so batches of the same key leave in submission order.

use crate::connection::ConnectionStatus;
use crate::error::{ClientError, Result};
use crate::sender::{KafkaSender, TopicSender};
use apache_avro::types::Value;
use async_trait::async_trait;
use radar_avro::{AvroTopic, RecordData};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, trace};

/// Batching thresholds.
///
/// # Fields
///
/// * `max_batch_size` - Values per batch before it is sent (default: 1000)
/// * `max_batch_age` - Age of the oldest buffered value before the batch is
///   sent (default: 10s)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    pub max_batch_size: usize,
    pub max_batch_age: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 1000,
            max_batch_age: Duration::from_secs(10),
        }
    }
}

impl BatchConfig {
    pub fn new(max_batch_size: usize, max_batch_age: Duration) -> Self {
        Self {
            max_batch_size,
            max_batch_age,
        }
    }
}

/// Buffer for values of one key destined for a single topic.
///
/// # Lifecycle
///
/// 1. **Create**: Initialize empty buffer
/// 2. **Append**: Add values of the buffered key until a flush trigger
/// 3. **Flush**: Send the batch, then clear the buffer
/// 4. **Repeat**: The next key starts a new batch
///
/// # Thread Safety
///
/// NOT thread-safe. Must be wrapped in Mutex for concurrent access.
#[derive(Debug)]
pub struct BatchBuffer {
    /// Key of the buffered values
    key: Option<Value>,

    /// Buffered values
    values: Vec<Value>,

    /// When the oldest buffered value was appended
    created_at: Instant,

    config: BatchConfig,
}

impl BatchBuffer {
    pub fn new(config: BatchConfig) -> Self {
        Self {
            key: None,
            values: Vec::new(),
            created_at: Instant::now(),
            config,
        }
    }

    /// Whether values of `key` may be appended without flushing first.
    pub fn accepts(&self, key: &Value) -> bool {
        self.key.as_ref().map_or(true, |buffered| buffered == key)
    }

    /// Append values of `key`.
    ///
    /// The caller must have checked [`accepts`](Self::accepts).
    pub fn append(&mut self, key: Value, values: Vec<Value>) {
        if self.values.is_empty() {
            self.created_at = Instant::now();
        }
        self.key = Some(key);
        self.values.extend(values);
        trace!(record_count = self.values.len(), "Appended records to batch");
    }

    /// Whether appending `count` values would take a non-empty buffer past
    /// `max_batch_size`.
    pub fn would_overflow(&self, count: usize) -> bool {
        !self.values.is_empty() && self.values.len() + count > self.config.max_batch_size
    }

    /// Check if this batch should be flushed.
    ///
    /// # Returns
    ///
    /// `true` if the buffer is not empty and ANY of these conditions are met:
    /// - Value count >= max_batch_size
    /// - Age >= max_batch_age
    pub fn should_flush(&self) -> bool {
        if self.values.is_empty() {
            return false;
        }

        if self.values.len() >= self.config.max_batch_size {
            trace!(
                record_count = self.values.len(),
                max_batch_size = self.config.max_batch_size,
                "Batch should flush: size threshold"
            );
            return true;
        }

        let age = self.age();
        if age >= self.config.max_batch_age {
            trace!(
                age_ms = age.as_millis() as u64,
                max_batch_age_ms = self.config.max_batch_age.as_millis() as u64,
                "Batch should flush: time threshold"
            );
            return true;
        }

        false
    }

    /// Copy of the buffered batch, or `None` when empty.
    pub fn records(&self, topic: &Arc<AvroTopic>) -> Result<Option<RecordData>> {
        match &self.key {
            Some(key) if !self.values.is_empty() => Ok(Some(RecordData::new(
                topic.clone(),
                key.clone(),
                self.values.clone(),
            )?)),
            _ => Ok(None),
        }
    }

    /// Drop all buffered values.
    pub fn clear(&mut self) {
        self.key = None;
        self.values.clear();
        self.created_at = Instant::now();
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Time elapsed since the oldest buffered value was appended.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

/// [`TopicSender`] that buffers records and forwards them in batches.
pub struct BatchedTopicSender {
    topic: Arc<AvroTopic>,
    inner: Arc<dyn TopicSender>,
    buffer: Mutex<BatchBuffer>,
}

impl BatchedTopicSender {
    pub fn new(inner: Arc<dyn TopicSender>, config: BatchConfig) -> Self {
        Self {
            topic: inner.topic().clone(),
            inner,
            buffer: Mutex::new(BatchBuffer::new(config)),
        }
    }

    /// Number of buffered values.
    pub async fn buffered(&self) -> usize {
        self.buffer.lock().await.len()
    }

    async fn flush_buffer(&self, buffer: &mut BatchBuffer) -> Result<()> {
        let Some(records) = buffer.records(&self.topic)? else {
            return Ok(());
        };
        let count = records.len();
        match self.inner.send_batch(records).await {
            Ok(()) => {
                buffer.clear();
                debug!(topic = %self.topic.name(), record_count = count, "Flushed batch");
                Ok(())
            }
            Err(e) => {
                error!(
                    topic = %self.topic.name(),
                    record_count = count,
                    error = %e,
                    "Failed to flush batch, keeping records"
                );
                Err(e)
            }
        }
    }
}

#[async_trait]
impl TopicSender for BatchedTopicSender {
    fn topic(&self) -> &Arc<AvroTopic> {
        &self.topic
    }

    /// Buffer a batch, sending buffered records when a flush trigger is met.
    ///
    /// If the buffered batch must leave first (another key, or no room left)
    /// and fails to send, the new records are not buffered and the error is
    /// returned. If the flush after appending fails, the new records stay
    /// buffered.
    async fn send_batch(&self, records: RecordData) -> Result<()> {
        if records.topic().name() != self.topic.name() {
            return Err(ClientError::InvalidRecords(format!(
                "Records of topic {} cannot be sent to topic {}",
                records.topic().name(),
                self.topic.name()
            )));
        }
        let (_, key, values) = records.into_parts();

        let mut buffer = self.buffer.lock().await;
        if !buffer.accepts(&key) {
            trace!(topic = %self.topic.name(), "Key changed, flushing previous batch");
            self.flush_buffer(&mut buffer).await?;
        } else if buffer.would_overflow(values.len()) {
            trace!(topic = %self.topic.name(), "Batch full, flushing before append");
            self.flush_buffer(&mut buffer).await?;
        }
        buffer.append(key, values);
        if buffer.should_flush() {
            self.flush_buffer(&mut buffer).await?;
        }
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let mut buffer = self.buffer.lock().await;
        self.flush_buffer(&mut buffer).await?;
        drop(buffer);
        self.inner.flush().await
    }

    async fn clear(&self) {
        self.buffer.lock().await.clear();
        self.inner.clear().await;
    }
}

/// [`KafkaSender`] decorator that batches records per topic.
///
/// Requesting the sender of the same topic twice returns the same buffer. A
/// topic with the same name but other schemas gets a buffer of its own, and
/// [`flush_all`](Self::flush_all) flushes both.
///
/// # Examples
///
/// ```ignore
/// let sender = BatchedKafkaSender::new(Arc::new(rest_sender), BatchConfig::default());
/// let topic_sender = sender.sender(topic);
/// topic_sender.send(key, value).await?;
/// topic_sender.flush().await?;
/// ```
pub struct BatchedKafkaSender {
    inner: Arc<dyn KafkaSender>,
    config: BatchConfig,
    senders: std::sync::Mutex<HashMap<String, Vec<Arc<BatchedTopicSender>>>>,
}

impl BatchedKafkaSender {
    pub fn new(inner: Arc<dyn KafkaSender>, config: BatchConfig) -> Self {
        Self {
            inner,
            config,
            senders: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Flush the buffers of all topics.
    ///
    /// Every topic is flushed even if one fails; the first error is returned.
    pub async fn flush_all(&self) -> Result<()> {
        let senders: Vec<Arc<BatchedTopicSender>> = self
            .senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .flatten()
            .cloned()
            .collect();

        let mut result = Ok(());
        for sender in senders {
            if let Err(e) = sender.flush().await {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }

    fn batched_sender(&self, topic: Arc<AvroTopic>) -> Arc<BatchedTopicSender> {
        let mut senders = self.senders.lock().unwrap_or_else(PoisonError::into_inner);
        let same_name = senders.entry(topic.name().to_string()).or_default();
        if let Some(sender) = same_name.iter().find(|sender| sender.topic() == &topic) {
            return sender.clone();
        }
        let sender = Arc::new(BatchedTopicSender::new(
            self.inner.sender(topic.clone()),
            self.config.clone(),
        ));
        same_name.push(sender.clone());
        sender
    }
}

#[async_trait]
impl KafkaSender for BatchedKafkaSender {
    fn sender(&self, topic: Arc<AvroTopic>) -> Arc<dyn TopicSender> {
        self.batched_sender(topic)
    }

    async fn reset_connection(&self) -> Result<bool> {
        self.inner.reset_connection().await
    }

    fn connection_state(&self) -> ConnectionStatus {
        self.inner.connection_state()
    }

    fn subscribe_state(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.subscribe_state()
    }
}
