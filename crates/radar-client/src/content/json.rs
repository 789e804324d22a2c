//! Kafka REST proxy Avro JSON request format
//!
//! ```json
//! {"key_schema_id":2,"value_schema_id":4,"records":[{"key":{...},"value":{...}}]}
//! ```
//!
//! The key of a batch is encoded once and repeated for every record.

use super::RecordEncoder;
use crate::error::Result;
use radar_avro::{encode_json, RecordData};

const CLOSING: &str = "]}";

pub(super) fn encode(
    encoder: &RecordEncoder,
    records: &RecordData,
    max_length: Option<usize>,
) -> Result<String> {
    let key = encoder.map_key(records.key())?;
    let key_json = encode_json(&key, &encoder.key_metadata().schema)?;

    let mut out = format!(
        "{{\"key_schema_id\":{},\"value_schema_id\":{},\"records\":[",
        encoder.key_metadata().id,
        encoder.value_metadata().id
    );
    for (i, value) in records.values().iter().enumerate() {
        let value = encoder.map_value(value)?;
        let value_json = encode_json(&value, &encoder.value_metadata().schema)?;
        let record = format!("{{\"key\":{},\"value\":{}}}", key_json, value_json);
        if let Some(max) = max_length {
            if out.len() + record.len() + 1 + CLOSING.len() > max {
                break;
            }
        }
        if i > 0 {
            out.push(',');
        }
        out.push_str(&record);
    }
    out.push_str(CLOSING);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::super::tests::{encoder, key, topic, value};
    use super::super::ContentFormat;
    use super::*;

    #[test]
    fn test_json_envelope() {
        let topic = topic();
        let records =
            RecordData::new(topic.clone(), key("a", "b"), vec![value(1.0), value(2.5)]).unwrap();

        let body = encoder(&topic).encode(ContentFormat::Json, &records).unwrap();

        let key = r#"{"projectId":null,"userId":"a","sourceId":"b"}"#;
        let expected = format!(
            r#"{{"key_schema_id":2,"value_schema_id":4,"records":[{{"key":{key},"value":{{"time":1.0,"timeReceived":1.0,"bloodVolumePulse":0.0}}}},{{"key":{key},"value":{{"time":2.5,"timeReceived":2.5,"bloodVolumePulse":0.0}}}}]}}"#,
            key = key
        );
        assert_eq!(String::from_utf8(body).unwrap(), expected);
    }

    #[test]
    fn test_json_body_is_valid_json() {
        let topic = topic();
        let records = RecordData::new(topic.clone(), key("a", "b"), vec![value(1.0)]).unwrap();

        let body = encoder(&topic).encode(ContentFormat::Json, &records).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["records"][0]["key"]["sourceId"], "b");
        assert_eq!(parsed["value_schema_id"], 4);
    }

    #[test]
    fn test_preview_is_truncated_and_closed() {
        let topic = topic();
        let records = RecordData::new(
            topic.clone(),
            key("a", "b"),
            (0..50).map(|i| value(i as f64)).collect(),
        )
        .unwrap();

        let preview = encoder(&topic).preview(ContentFormat::Json, &records, 300);
        assert!(preview.len() <= 300);
        assert!(preview.ends_with("]}"));
        let parsed: serde_json::Value = serde_json::from_str(&preview).unwrap();
        let count = parsed["records"].as_array().unwrap().len();
        assert!(count > 0 && count < 50);
    }
}
