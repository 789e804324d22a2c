//! Request Body Encoding
//!
//! A [`RecordEncoder`] turns a [`RecordData`] batch into the body of a REST
//! proxy request. It maps every key and value from the topic's local schema
//! to the schema the registry currently holds for the topic, then writes the
//! batch in one of two formats:
//!
//! | Format | Content type | Size |
//! |--------|--------------|------|
//! | [`ContentFormat::Binary`] | `application/vnd.radarbase.avro.v1+binary` | Compact |
//! | [`ContentFormat::Json`] | `application/vnd.kafka.avro.v2+json` | Verbose, universally supported |
//!
//! Binary requires the key to carry a `sourceId`, and a proxy that
//! understands the RADAR binary format. Callers fall back to JSON otherwise.
//!
//! Encoders are immutable. When the registry schemas change, [`rebind`]
//! returns a new encoder and reuses the mappers that are still valid.
//!
//! [`rebind`]: RecordEncoder::rebind

mod binary;
mod json;

use crate::error::{ClientError, Result};
use apache_avro::types::Value;
use apache_avro::Schema;
use base64::Engine;
use radar_avro::{AvroDataMapper, AvroDataMapperFactory, AvroTopic, RecordData};
use radar_schema_registry::SchemaMetadata;
use std::sync::Arc;

/// Latest Accept header for REST proxy responses.
pub const KAFKA_REST_ACCEPT: &str =
    "application/vnd.kafka.v2+json, application/vnd.kafka.v1+json, application/vnd.kafka+json, application/json";

/// Accept header for proxies that only speak the v1 API.
pub const KAFKA_REST_ACCEPT_LEGACY: &str =
    "application/vnd.kafka.v1+json, application/vnd.kafka+json, application/json";

/// Avro JSON request content type.
pub const KAFKA_REST_AVRO_ENCODING: &str = "application/vnd.kafka.avro.v2+json";

/// Avro JSON request content type for v1 proxies.
pub const KAFKA_REST_AVRO_LEGACY_ENCODING: &str = "application/vnd.kafka.avro.v1+json";

/// RADAR binary request content type.
pub const KAFKA_REST_BINARY_ENCODING: &str = "application/vnd.radarbase.avro.v1+binary";

/// Default length of request previews in error messages.
pub const DEFAULT_PREVIEW_LENGTH: usize = 1000;

/// Wire format of a request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentFormat {
    Binary,
    Json,
}

impl ContentFormat {
    /// Request content type; `legacy` selects the v1 JSON content type.
    pub fn content_type(&self, legacy: bool) -> &'static str {
        match (self, legacy) {
            (ContentFormat::Binary, _) => KAFKA_REST_BINARY_ENCODING,
            (ContentFormat::Json, false) => KAFKA_REST_AVRO_ENCODING,
            (ContentFormat::Json, true) => KAFKA_REST_AVRO_LEGACY_ENCODING,
        }
    }
}

/// Encodes record batches of one topic against its registry schemas.
#[derive(Debug, Clone)]
pub struct RecordEncoder {
    topic: Arc<AvroTopic>,
    key_metadata: SchemaMetadata,
    value_metadata: SchemaMetadata,
    key_mapper: AvroDataMapper,
    value_mapper: AvroDataMapper,
}

impl RecordEncoder {
    /// Create an encoder from the topic's local schemas to the given registry
    /// schemas.
    ///
    /// # Errors
    ///
    /// `ClientError::SchemaIncompatible` if local values cannot be mapped to
    /// a registry schema.
    pub fn new(
        topic: Arc<AvroTopic>,
        key_metadata: SchemaMetadata,
        value_metadata: SchemaMetadata,
    ) -> Result<Self> {
        let key_mapper =
            AvroDataMapperFactory::create_mapper(topic.key_schema(), &key_metadata.schema, None)?;
        let value_mapper = AvroDataMapperFactory::create_mapper(
            topic.value_schema(),
            &value_metadata.schema,
            None,
        )?;
        Ok(Self {
            topic,
            key_metadata,
            value_metadata,
            key_mapper,
            value_mapper,
        })
    }

    /// Encoder for new registry schemas. Mappers whose target schema did not
    /// change are reused.
    pub fn rebind(
        &self,
        key_metadata: SchemaMetadata,
        value_metadata: SchemaMetadata,
    ) -> Result<Self> {
        let key_mapper = self.remap(
            &self.key_metadata,
            &key_metadata,
            self.topic.key_schema(),
            &self.key_mapper,
        )?;
        let value_mapper = self.remap(
            &self.value_metadata,
            &value_metadata,
            self.topic.value_schema(),
            &self.value_mapper,
        )?;
        Ok(Self {
            topic: self.topic.clone(),
            key_metadata,
            value_metadata,
            key_mapper,
            value_mapper,
        })
    }

    fn remap(
        &self,
        current: &SchemaMetadata,
        next: &SchemaMetadata,
        local: &Schema,
        mapper: &AvroDataMapper,
    ) -> Result<AvroDataMapper> {
        if Arc::ptr_eq(&current.schema, &next.schema) || current.schema == next.schema {
            Ok(mapper.clone())
        } else {
            Ok(AvroDataMapperFactory::create_mapper(local, &next.schema, None)?)
        }
    }

    pub fn topic(&self) -> &Arc<AvroTopic> {
        &self.topic
    }

    pub fn key_metadata(&self) -> &SchemaMetadata {
        &self.key_metadata
    }

    pub fn value_metadata(&self) -> &SchemaMetadata {
        &self.value_metadata
    }

    /// Whether this encoder was built for the given registry schema IDs.
    pub fn is_bound_to(&self, key_metadata: &SchemaMetadata, value_metadata: &SchemaMetadata) -> bool {
        self.key_metadata.id == key_metadata.id
            && self.key_metadata.version == key_metadata.version
            && self.value_metadata.id == value_metadata.id
            && self.value_metadata.version == value_metadata.version
    }

    /// Whether keys carry the `sourceId` the binary format requires.
    pub fn supports_binary(&self) -> bool {
        match self.topic.key_schema().as_ref() {
            Schema::Record(record) => record.fields.iter().any(|field| {
                field.name == "sourceId"
                    && match &field.schema {
                        Schema::String => true,
                        Schema::Union(union) => union
                            .variants()
                            .iter()
                            .any(|variant| matches!(variant, Schema::String)),
                        _ => false,
                    }
            }),
            _ => false,
        }
    }

    /// Encode a complete batch.
    ///
    /// # Errors
    ///
    /// - `ClientError::InvalidRecords` if the batch belongs to another topic
    ///   or a value does not match its schema
    /// - `ClientError::SchemaIncompatible` if binary encoding is requested
    ///   and the key has no `sourceId`
    pub fn encode(&self, format: ContentFormat, records: &RecordData) -> Result<Vec<u8>> {
        self.check_topic(records)?;
        match format {
            ContentFormat::Binary => binary::encode(self, records, None),
            ContentFormat::Json => json::encode(self, records, None).map(String::into_bytes),
        }
    }

    /// Textual preview of the request body of at most about `max_length`
    /// bytes, for diagnostics. Records that would exceed the budget are left
    /// out; the structure is still closed. Binary bodies are shown as base64.
    pub fn preview(&self, format: ContentFormat, records: &RecordData, max_length: usize) -> String {
        let preview = self.check_topic(records).and_then(|()| match format {
            ContentFormat::Binary => binary::encode(self, records, Some(max_length))
                .map(|body| base64::engine::general_purpose::STANDARD.encode(body)),
            ContentFormat::Json => json::encode(self, records, Some(max_length)),
        });
        preview.unwrap_or_else(|e| format!("<unavailable: {}>", e))
    }

    fn check_topic(&self, records: &RecordData) -> Result<()> {
        if records.topic().name() != self.topic.name() {
            return Err(ClientError::InvalidRecords(format!(
                "Records of topic {} cannot be sent to topic {}",
                records.topic().name(),
                self.topic.name()
            )));
        }
        Ok(())
    }

    fn map_key(&self, key: &Value) -> Result<Value> {
        Ok(self.key_mapper.convert(key.clone())?)
    }

    fn map_value(&self, value: &Value) -> Result<Value> {
        Ok(self.value_mapper.convert(value.clone())?)
    }
}
