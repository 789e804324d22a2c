//! Topics and record batches

use crate::error::{MapperError, Result};
use apache_avro::schema::Schema;
use apache_avro::types::Value;
use std::sync::Arc;

/// A topic with the local schemas its keys and values are written in.
#[derive(Debug, Clone, PartialEq)]
pub struct AvroTopic {
    name: String,
    key_schema: Arc<Schema>,
    value_schema: Arc<Schema>,
}

impl AvroTopic {
    pub fn new(name: impl Into<String>, key_schema: Schema, value_schema: Schema) -> Self {
        Self {
            name: name.into(),
            key_schema: Arc::new(key_schema),
            value_schema: Arc::new(value_schema),
        }
    }

    /// Create a topic from the JSON text of its key and value schemas.
    pub fn parse(name: impl Into<String>, key_schema: &str, value_schema: &str) -> Result<Self> {
        let parse = |text: &str| {
            Schema::parse_str(text).map_err(|e| MapperError::SchemaIncompatible(e.to_string()))
        };
        Ok(Self::new(name, parse(key_schema)?, parse(value_schema)?))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key_schema(&self) -> &Arc<Schema> {
        &self.key_schema
    }

    pub fn value_schema(&self) -> &Arc<Schema> {
        &self.value_schema
    }
}

/// Values for one topic that share a single key.
///
/// Never empty: construction fails without at least one value.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordData {
    topic: Arc<AvroTopic>,
    key: Value,
    values: Vec<Value>,
}

impl RecordData {
    pub fn new(topic: Arc<AvroTopic>, key: Value, values: Vec<Value>) -> Result<Self> {
        if values.is_empty() {
            return Err(MapperError::InvalidValue(format!(
                "Record data for topic {} must contain at least one value",
                topic.name()
            )));
        }
        Ok(Self { topic, key, values })
    }

    pub fn topic(&self) -> &Arc<AvroTopic> {
        &self.topic
    }

    pub fn key(&self) -> &Value {
        &self.key
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Number of values, always at least one.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Always `false`; kept next to [`len`](Self::len).
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_parts(self) -> (Arc<AvroTopic>, Value, Vec<Value>) {
        (self.topic, self.key, self.values)
    }
}

/// Look up a record field by name, looking through a union wrapper.
pub fn record_field<'v>(value: &'v Value, name: &str) -> Option<&'v Value> {
    match value {
        Value::Record(fields) => fields
            .iter()
            .find(|(field_name, _)| field_name == name)
            .map(|(_, value)| value),
        Value::Union(_, inner) => record_field(inner, name),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic() -> Arc<AvroTopic> {
        Arc::new(AvroTopic::new("test", Schema::String, Schema::Int))
    }

    #[test]
    fn test_empty_record_data_is_rejected() {
        let err = RecordData::new(topic(), Value::String("k".to_string()), vec![]).unwrap_err();
        assert!(matches!(err, MapperError::InvalidValue(_)));
    }

    #[test]
    fn test_record_data_is_never_empty() {
        let records =
            RecordData::new(topic(), Value::String("k".to_string()), vec![Value::Int(1)]).unwrap();
        assert_eq!(records.len(), 1);
        assert!(!records.is_empty());
    }

    #[test]
    fn test_record_data_keeps_order() {
        let data = RecordData::new(
            topic(),
            Value::String("k".to_string()),
            vec![Value::Int(1), Value::Int(2)],
        )
        .unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data.values(), &[Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn test_record_field_by_name() {
        let key = Value::Record(vec![
            ("userId".to_string(), Value::String("a".to_string())),
            ("sourceId".to_string(), Value::String("b".to_string())),
        ]);
        assert_eq!(
            record_field(&key, "sourceId"),
            Some(&Value::String("b".to_string()))
        );
        assert_eq!(record_field(&key, "projectId"), None);
        assert_eq!(record_field(&Value::Null, "sourceId"), None);
    }

    #[test]
    fn test_parse_topic() {
        let topic = AvroTopic::parse("t", r#""string""#, r#""long""#).unwrap();
        assert_eq!(topic.name(), "t");
        assert_eq!(**topic.value_schema(), Schema::Long);
        assert!(AvroTopic::parse("t", "not json", r#""long""#).is_err());
    }
}
