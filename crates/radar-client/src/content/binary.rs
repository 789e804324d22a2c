//! RADAR binary request format
//!
//! ```text
//! ┌─────────────┬───────────────┬───────────┬────────┬──────────┬──────────────────────────┐
//! │ key version │ value version │ projectId │ userId │ sourceId │ records                  │
//! │ int         │ int           │ null (0)  │ null(0)│ string   │ array<bytes>             │
//! └─────────────┴───────────────┴───────────┴────────┴──────────┴──────────────────────────┘
//! ```
//!
//! All integers are Avro zig-zag varints. Versions of 0 mean unknown. Every
//! record is the Avro binary datum of the mapped value, written as `bytes`
//! inside a single array block followed by the terminating 0.

use super::RecordEncoder;
use crate::error::{ClientError, Result};
use apache_avro::to_avro_datum;
use apache_avro::types::Value;
use radar_avro::{record_field, RecordData};
use radar_core::varint::{encode_varint, put_bytes, put_int, put_long, put_string};

/// Upper bound of a varint length prefix.
const MAX_VARINT_LENGTH: usize = 10;

pub(super) fn encode(
    encoder: &RecordEncoder,
    records: &RecordData,
    max_length: Option<usize>,
) -> Result<Vec<u8>> {
    let source_id = source_id(records.key())?;

    let mut buf = Vec::new();
    put_int(&mut buf, encoder.key_metadata().wire_version());
    put_int(&mut buf, encoder.value_metadata().wire_version());
    // projectId and userId are sent as null, the proxy takes them from the token
    encode_varint(&mut buf, 0);
    encode_varint(&mut buf, 0);
    put_string(&mut buf, source_id);

    let mut size = buf.len() + 2 * MAX_VARINT_LENGTH;
    let mut datums = Vec::with_capacity(records.len());
    for value in records.values() {
        let datum = to_avro_datum(&encoder.value_metadata().schema, encoder.map_value(value)?)?;
        size += datum.len() + MAX_VARINT_LENGTH;
        if max_length.is_some_and(|max| size > max) {
            break;
        }
        datums.push(datum);
    }

    if !datums.is_empty() {
        put_long(&mut buf, datums.len() as i64);
        for datum in &datums {
            put_bytes(&mut buf, datum);
        }
    }
    encode_varint(&mut buf, 0);
    Ok(buf)
}

fn source_id(key: &Value) -> Result<&str> {
    match record_field(key, "sourceId") {
        Some(Value::String(source_id)) => Ok(source_id),
        Some(Value::Union(_, inner)) => match inner.as_ref() {
            Value::String(source_id) => Ok(source_id),
            _ => Err(missing_source_id()),
        },
        _ => Err(missing_source_id()),
    }
}

fn missing_source_id() -> ClientError {
    ClientError::SchemaIncompatible(
        "Binary encoding requires a string sourceId in the record key".to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::super::tests::{encoder, key, topic, value};
    use super::super::ContentFormat;
    use super::*;
    use radar_core::varint::{get_bytes, get_int, get_long, get_string};

    #[test]
    fn test_single_record_exact_bytes() {
        let topic = topic();
        let records = RecordData::new(topic.clone(), key("a", "b"), vec![value(0.0)]).unwrap();

        let body = encoder(&topic).encode(ContentFormat::Binary, &records).unwrap();

        let mut expected = vec![2, 4, 0, 0, 2, b'b', 2, 40];
        expected.extend_from_slice(&[0; 20]);
        expected.push(0);
        assert_eq!(body, expected);
    }

    #[test]
    fn test_multiple_records_in_one_block() {
        let topic = topic();
        let records = RecordData::new(
            topic.clone(),
            key("a", "source"),
            vec![value(1.0), value(2.0), value(3.0)],
        )
        .unwrap();

        let body = encoder(&topic).encode(ContentFormat::Binary, &records).unwrap();

        let mut buf = body.as_slice();
        assert_eq!(get_int(&mut buf).unwrap(), 1);
        assert_eq!(get_int(&mut buf).unwrap(), 2);
        assert_eq!(get_long(&mut buf).unwrap(), 0);
        assert_eq!(get_long(&mut buf).unwrap(), 0);
        assert_eq!(get_string(&mut buf).unwrap(), "source");
        assert_eq!(get_long(&mut buf).unwrap(), 3);
        for _ in 0..3 {
            assert_eq!(get_bytes(&mut buf).unwrap().len(), 20);
        }
        assert_eq!(get_long(&mut buf).unwrap(), 0);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_missing_source_id_is_incompatible() {
        assert!(matches!(
            source_id(&Value::Record(vec![(
                "userId".to_string(),
                Value::String("a".to_string())
            )])),
            Err(ClientError::SchemaIncompatible(_))
        ));
        assert_eq!(
            source_id(&Value::Record(vec![(
                "sourceId".to_string(),
                Value::Union(1, Box::new(Value::String("s".to_string())))
            )]))
            .unwrap(),
            "s"
        );
    }

    #[test]
    fn test_preview_drops_records_over_budget() {
        let topic = topic();
        let records = RecordData::new(
            topic.clone(),
            key("a", "b"),
            (0..100).map(|i| value(i as f64)).collect(),
        )
        .unwrap();
        let encoder = encoder(&topic);

        let full = encode(&encoder, &records, None).unwrap();
        let partial = encode(&encoder, &records, Some(200)).unwrap();
        assert!(partial.len() <= 200);
        assert!(partial.len() < full.len());
        // Still a closed array
        assert_eq!(partial.last(), Some(&0));
    }
}
