//! Core Schema Registry Types

use crate::error::{Result, SchemaError};
use apache_avro::Schema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A schema as known to the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaMetadata {
    /// Globally unique schema ID
    pub id: i32,

    /// Version within the subject, if the registry reported one
    pub version: Option<i32>,

    pub schema: Arc<Schema>,
}

impl SchemaMetadata {
    pub fn new(id: i32, version: Option<i32>, schema: Arc<Schema>) -> Self {
        Self {
            id,
            version,
            schema,
        }
    }

    /// Version to put on the wire; 0 when unknown.
    pub fn wire_version(&self) -> i32 {
        self.version.unwrap_or(0)
    }
}

/// Registry subject of a topic's key or value schema.
///
/// ```
/// use radar_schema_registry::subject;
///
/// assert_eq!(subject("android_phone_acceleration", true), "android_phone_acceleration-value");
/// assert_eq!(subject("android_phone_acceleration", false), "android_phone_acceleration-key");
/// ```
pub fn subject(topic: &str, of_value: bool) -> String {
    if of_value {
        format!("{}-value", topic)
    } else {
        format!("{}-key", topic)
    }
}

/// Full JSON form of a schema, including defaults and documentation.
///
/// This is both what the registry stores and the cache identity of a schema.
pub fn schema_json(schema: &Schema) -> Result<String> {
    serde_json::to_string(schema).map_err(|e| SchemaError::InvalidSchema(e.to_string()))
}

/// Schema registration or lookup request body
#[derive(Debug, Serialize)]
pub(crate) struct SchemaRequest<'a> {
    pub schema: &'a str,
}

/// Response of the registry's subject, version and id endpoints. Which
/// fields are present depends on the endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct SchemaResponse {
    #[serde(default)]
    pub id: Option<i32>,

    #[serde(default)]
    pub version: Option<i32>,

    #[serde(default)]
    pub schema: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_json_keeps_defaults() {
        let schema = Schema::parse_str(
            r#"{"type":"record","name":"Key","fields":[
                {"name":"projectId","type":["null","string"],"default":null},
                {"name":"sourceId","type":"string"}
            ]}"#,
        )
        .unwrap();

        let json = schema_json(&schema).unwrap();
        assert!(json.contains("\"default\":null"));
        assert_eq!(Schema::parse_str(&json).unwrap(), schema);
    }

    #[test]
    fn test_response_with_partial_fields() {
        let response: SchemaResponse = serde_json::from_str(r#"{"id": 12}"#).unwrap();
        assert_eq!(response.id, Some(12));
        assert_eq!(response.version, None);
        assert!(response.schema.is_none());
    }

    #[test]
    fn test_wire_version_defaults_to_zero() {
        let schema = Arc::new(Schema::String);
        assert_eq!(SchemaMetadata::new(1, None, schema.clone()).wire_version(), 0);
        assert_eq!(SchemaMetadata::new(1, Some(3), schema).wire_version(), 3);
    }
}
