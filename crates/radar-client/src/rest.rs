//! REST Proxy Sender
//!
//! Posts record batches to `{base_url}/topics/{topic}` of a Kafka REST proxy.
//!
//! ## Request Flow
//!
//! ```text
//! send_batch(records)
//!   │
//!   ├─→ Unauthorized? ──yes──→ Err(Authentication), until reset_connection()
//!   │
//!   ├─→ Resolve latest key/value schemas (SchemaCache)
//!   │     └─→ not registered: register the local schema
//!   │
//!   ├─→ Rebind encoder if the registry schemas changed
//!   │
//!   └─→ POST body (binary or JSON, optionally gzipped)
//!         ├─→ 2xx ────────→ Connected
//!         ├─→ 401 / 403 ──→ Unauthorized, token dropped, Err(Authentication)
//!         ├─→ 415 ────────→ downgrade binary → JSON, or Accept → legacy Accept,
//!         │                  and send again
//!         ├─→ 422 ────────→ drop cached latest schemas, Err(Http)
//!         └─→ other ──────→ Disconnected, Err(Http)
//! ```
//!
//! Content negotiation downgrades are remembered per topic sender, so every
//! downgrade happens at most once.

use crate::auth::TokenHolder;
use crate::config::{RestSenderBuilder, RestSenderConfig};
use crate::connection::{ConnectionState, ConnectionStatus};
use crate::content::{
    ContentFormat, RecordEncoder, DEFAULT_PREVIEW_LENGTH, KAFKA_REST_ACCEPT,
    KAFKA_REST_ACCEPT_LEGACY,
};
use crate::error::{ClientError, Result};
use crate::sender::{KafkaSender, TopicSender};
use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use radar_avro::{AvroTopic, RecordData};
use radar_schema_registry::{SchemaCache, SchemaMetadata};
use reqwest::header::{ACCEPT, CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::StatusCode;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

struct SenderShared {
    config: RestSenderConfig,
    http_client: reqwest::Client,
    schema_cache: Arc<SchemaCache>,
    connection: ConnectionState,
    token: Option<TokenHolder>,
}

impl SenderShared {
    async fn authorize(&self, request: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder> {
        match &self.token {
            Some(token) => Ok(request.bearer_auth(token.token().await?)),
            None => Ok(request),
        }
    }

    fn rejected_credentials(&self, status: StatusCode) -> ClientError {
        warn!(status = status.as_u16(), "REST proxy rejected credentials");
        self.connection.was_unauthorized();
        if let Some(token) = &self.token {
            token.invalidate();
        }
        ClientError::Authentication(format!("REST proxy returned HTTP {}", status.as_u16()))
    }

    async fn reset_connection(&self) -> Result<bool> {
        let request = self
            .http_client
            .head(format!("{}/", self.config.base_url));
        let request = self.authorize(request).await?;

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                debug!("REST proxy is reachable");
                self.connection.did_connect();
                Ok(true)
            }
            Ok(response)
                if response.status() == StatusCode::UNAUTHORIZED
                    || response.status() == StatusCode::FORBIDDEN =>
            {
                Err(self.rejected_credentials(response.status()))
            }
            Ok(response) => {
                warn!(status = response.status().as_u16(), "REST proxy is unavailable");
                self.connection.did_disconnect();
                Ok(false)
            }
            Err(e) => {
                warn!(error = %e, "REST proxy is unreachable");
                self.connection.did_disconnect();
                Ok(false)
            }
        }
    }
}

/// [`KafkaSender`] that posts every batch to a Kafka REST proxy immediately.
#[derive(Clone)]
pub struct RestKafkaSender {
    shared: Arc<SenderShared>,
}

impl RestKafkaSender {
    /// Create a builder for a REST sender.
    pub fn builder() -> RestSenderBuilder {
        RestSenderBuilder::new()
    }

    pub(crate) fn from_parts(
        config: RestSenderConfig,
        http_client: reqwest::Client,
        schema_cache: Arc<SchemaCache>,
        connection: ConnectionState,
        token: Option<TokenHolder>,
    ) -> Self {
        Self {
            shared: Arc::new(SenderShared {
                config,
                http_client,
                schema_cache,
                connection,
                token,
            }),
        }
    }

    pub fn config(&self) -> &RestSenderConfig {
        &self.shared.config
    }

    pub fn schema_cache(&self) -> &Arc<SchemaCache> {
        &self.shared.schema_cache
    }

    /// Concrete sender for `topic`.
    pub fn rest_sender(&self, topic: Arc<AvroTopic>) -> RestTopicSender {
        RestTopicSender {
            state: Mutex::new(TopicState {
                encoder: None,
                binary: self.shared.config.binary_content,
                legacy: false,
            }),
            topic,
            shared: self.shared.clone(),
        }
    }
}

#[async_trait]
impl KafkaSender for RestKafkaSender {
    fn sender(&self, topic: Arc<AvroTopic>) -> Arc<dyn TopicSender> {
        Arc::new(self.rest_sender(topic))
    }

    async fn reset_connection(&self) -> Result<bool> {
        self.shared.reset_connection().await
    }

    fn connection_state(&self) -> ConnectionStatus {
        self.shared.connection.state()
    }

    fn subscribe_state(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.connection.subscribe()
    }
}

impl std::fmt::Debug for RestKafkaSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestKafkaSender")
            .field("config", &self.shared.config)
            .field("state", &self.shared.connection.state())
            .finish()
    }
}

struct TopicState {
    encoder: Option<RecordEncoder>,
    /// Binary bodies are still allowed.
    binary: bool,
    /// The proxy only accepted the legacy Accept header.
    legacy: bool,
}

/// [`TopicSender`] of a [`RestKafkaSender`].
///
/// Requests of one topic sender are sent one at a time, in call order.
pub struct RestTopicSender {
    topic: Arc<AvroTopic>,
    shared: Arc<SenderShared>,
    state: Mutex<TopicState>,
}

impl RestTopicSender {
    /// Latest registry metadata of the topic's key or value schema,
    /// registering the local schema if the subject does not exist yet.
    async fn latest_metadata(&self, of_value: bool) -> Result<SchemaMetadata> {
        let cache = &self.shared.schema_cache;
        let topic = self.topic.name();
        match cache.get_by_version(topic, of_value, 0).await {
            Ok(metadata) => Ok(metadata),
            Err(e) if e.is_not_found() => {
                let local = if of_value {
                    self.topic.value_schema()
                } else {
                    self.topic.key_schema()
                };
                info!(topic = %topic, of_value, "Registering local schema");
                let metadata = cache.add_schema(topic, of_value, local).await?;
                // The cached lookup failure would hide the new registration
                cache.invalidate_latest(topic, of_value);
                Ok(metadata)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn prepare_encoder(&self, state: &mut TopicState) -> Result<RecordEncoder> {
        let key_metadata = self.latest_metadata(false).await?;
        let value_metadata = self.latest_metadata(true).await?;

        let encoder = match &state.encoder {
            Some(encoder) if encoder.is_bound_to(&key_metadata, &value_metadata) => {
                return Ok(encoder.clone())
            }
            Some(encoder) => {
                debug!(
                    topic = %self.topic.name(),
                    key_schema_id = key_metadata.id,
                    value_schema_id = value_metadata.id,
                    "Registry schemas changed, rebinding encoder"
                );
                encoder.rebind(key_metadata, value_metadata)?
            }
            None => RecordEncoder::new(self.topic.clone(), key_metadata, value_metadata)?,
        };
        state.encoder = Some(encoder.clone());
        Ok(encoder)
    }

    async fn post(
        &self,
        format: ContentFormat,
        legacy: bool,
        body: Vec<u8>,
    ) -> Result<reqwest::Response> {
        let url = format!("{}/topics/{}", self.shared.config.base_url, self.topic.name());
        let accept = if legacy {
            KAFKA_REST_ACCEPT_LEGACY
        } else {
            KAFKA_REST_ACCEPT
        };
        let mut request = self
            .shared
            .http_client
            .post(url)
            .header(CONTENT_TYPE, format.content_type(legacy))
            .header(ACCEPT, accept);

        let body = if self.shared.config.compression {
            request = request.header(CONTENT_ENCODING, "gzip");
            gzip(&body)?
        } else {
            body
        };

        let request = self.shared.authorize(request).await?;
        request.body(body).send().await.map_err(|e| {
            warn!(topic = %self.topic.name(), error = %e, "Failed to send records");
            self.shared.connection.did_disconnect();
            ClientError::Io(e.to_string())
        })
    }
}

#[async_trait]
impl TopicSender for RestTopicSender {
    fn topic(&self) -> &Arc<AvroTopic> {
        &self.topic
    }

    async fn send_batch(&self, records: RecordData) -> Result<()> {
        if self.shared.connection.state() == ConnectionStatus::Unauthorized {
            return Err(ClientError::Authentication(
                "Sender is unauthorized, reset the connection first".to_string(),
            ));
        }
        if records.topic().name() != self.topic.name() {
            return Err(ClientError::InvalidRecords(format!(
                "Records of topic {} cannot be sent to topic {}",
                records.topic().name(),
                self.topic.name()
            )));
        }

        let mut state = self.state.lock().await;
        let encoder = self.prepare_encoder(&mut state).await?;

        loop {
            let format = if state.binary && encoder.supports_binary() {
                ContentFormat::Binary
            } else {
                ContentFormat::Json
            };
            let body = encoder.encode(format, &records)?;
            let response = self.post(format, state.legacy, body).await?;
            let status = response.status();

            if status.is_success() {
                self.shared.connection.did_connect();
                debug!(
                    topic = %self.topic.name(),
                    records = records.len(),
                    format = ?format,
                    "Sent records"
                );
                return Ok(());
            }

            match status.as_u16() {
                401 | 403 => return Err(self.shared.rejected_credentials(status)),
                415 if format == ContentFormat::Binary => {
                    warn!(topic = %self.topic.name(), "Binary content not supported, using JSON");
                    state.binary = false;
                }
                415 if !state.legacy => {
                    warn!(topic = %self.topic.name(), "Falling back to legacy Accept header");
                    state.legacy = true;
                }
                code => {
                    let response_body =
                        truncate(response.text().await.unwrap_or_default(), DEFAULT_PREVIEW_LENGTH);
                    self.shared.connection.did_disconnect();
                    if code == 415 {
                        return Err(ClientError::UnsupportedMediaType(response_body));
                    }
                    if code == 422 {
                        warn!(topic = %self.topic.name(), "Proxy rejected schemas, refreshing them");
                        self.shared.schema_cache.invalidate_latest(self.topic.name(), false);
                        self.shared.schema_cache.invalidate_latest(self.topic.name(), true);
                    }
                    return Err(ClientError::Http {
                        status: code,
                        request: encoder.preview(format, &records, DEFAULT_PREVIEW_LENGTH),
                        response: response_body,
                    });
                }
            }
        }
    }
}

/// Cut `text` to at most `max_length` bytes on a character boundary.
fn truncate(mut text: String, max_length: usize) -> String {
    if text.len() > max_length {
        let mut end = max_length;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}

fn gzip(body: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(body.len() / 2), Compression::default());
    encoder
        .write_all(body)
        .map_err(|e| ClientError::Io(format!("Failed to compress request: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| ClientError::Io(format!("Failed to compress request: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[test]
    fn test_gzip_round_trip() {
        let body = br#"{"key_schema_id":1,"value_schema_id":2,"records":[]}"#.repeat(20);
        let compressed = gzip(&body).unwrap();
        assert!(compressed.len() < body.len());

        let mut decompressed = Vec::new();
        GzDecoder::new(compressed.as_slice())
            .read_to_end(&mut decompressed)
            .unwrap();
        assert_eq!(decompressed, body);
    }

    #[test]
    fn test_response_body_is_truncated() {
        let body = "x".repeat(5000);
        assert_eq!(truncate(body, DEFAULT_PREVIEW_LENGTH).len(), DEFAULT_PREVIEW_LENGTH);
        assert_eq!(truncate("short".to_string(), DEFAULT_PREVIEW_LENGTH), "short");
        // Never splits a multi-byte character
        assert_eq!(truncate("aé".to_string(), 2), "a");
    }
}
