//! Avro JSON encoding
//!
//! Writes Avro values in the JSON encoding the REST proxy expects:
//!
//! - non-null union values are wrapped as `{"<branch type>": value}`
//! - `bytes` and `fixed` are strings with one ISO-8859-1 character per byte
//! - enums are their symbol
//! - NaN and infinite floats are the strings `"NaN"`, `"Infinity"` and
//!   `"-Infinity"`
//!
//! Map entries are written in key order so output is deterministic.

use crate::error::{MapperError, Result};
use crate::names::{names_of, resolve, Names};
use apache_avro::schema::{Schema, SchemaKind, UnionSchema};
use apache_avro::types::Value;

/// Encode a value of `schema` as Avro JSON.
pub fn encode_json(value: &Value, schema: &Schema) -> Result<String> {
    let names = names_of(schema);
    let mut out = String::new();
    write_value(&mut out, value, schema, &names)?;
    Ok(out)
}

fn write_value<'a>(
    out: &mut String,
    value: &Value,
    schema: &'a Schema,
    names: &Names<'a>,
) -> Result<()> {
    let schema = resolve(schema, names)?;
    match (schema, value) {
        (Schema::Null, Value::Null) => out.push_str("null"),
        (Schema::Boolean, Value::Boolean(b)) => out.push_str(if *b { "true" } else { "false" }),
        (Schema::Int, Value::Int(v))
        | (Schema::Date, Value::Date(v))
        | (Schema::TimeMillis, Value::TimeMillis(v)) => out.push_str(&v.to_string()),
        (Schema::Long, Value::Int(v)) => out.push_str(&v.to_string()),
        (Schema::Long, Value::Long(v))
        | (Schema::TimeMicros, Value::TimeMicros(v))
        | (Schema::TimestampMillis, Value::TimestampMillis(v))
        | (Schema::TimestampMicros, Value::TimestampMicros(v)) => out.push_str(&v.to_string()),
        (Schema::Float, Value::Float(v)) => write_float(out, *v, f64::from(*v))?,
        (Schema::Double, Value::Double(v)) => write_float(out, *v, *v)?,
        (Schema::Double, Value::Float(v)) => write_float(out, *v, f64::from(*v))?,
        (Schema::Bytes, Value::Bytes(bytes)) | (Schema::Fixed(_), Value::Fixed(_, bytes)) => {
            let text: String = bytes.iter().map(|b| char::from(*b)).collect();
            write_string(out, &text)?;
        }
        (Schema::String, Value::String(s)) | (Schema::Enum(_), Value::Enum(_, s)) => {
            write_string(out, s)?
        }
        (Schema::Array(items), Value::Array(values)) => {
            out.push('[');
            for (i, item) in values.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item, items, names)?;
            }
            out.push(']');
        }
        (Schema::Map(values_schema), Value::Map(entries)) => {
            let mut keys: Vec<&String> = entries.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, key)?;
                out.push(':');
                write_value(out, &entries[key], values_schema, names)?;
            }
            out.push('}');
        }
        (Schema::Record(record), Value::Record(fields)) => {
            out.push('{');
            for (i, field) in record.fields.iter().enumerate() {
                let field_value = match fields.get(i) {
                    Some((name, value)) if *name == field.name => value,
                    _ => fields
                        .iter()
                        .find(|(name, _)| *name == field.name)
                        .map(|(_, value)| value)
                        .ok_or_else(|| {
                            MapperError::Encoding(format!(
                                "Record {} lacks field {}",
                                record.name.fullname(None),
                                field.name
                            ))
                        })?,
                };
                if i > 0 {
                    out.push(',');
                }
                write_string(out, &field.name)?;
                out.push(':');
                write_value(out, field_value, &field.schema, names)?;
            }
            out.push('}');
        }
        (Schema::Union(union), value) => write_union(out, value, union, names)?,
        (schema, value) => {
            return Err(MapperError::Encoding(format!(
                "Value {:?} does not match schema type {:?}",
                value,
                SchemaKind::from(schema)
            )))
        }
    }
    Ok(())
}

fn write_union<'a>(
    out: &mut String,
    value: &Value,
    union: &'a UnionSchema,
    names: &Names<'a>,
) -> Result<()> {
    let (branch, inner) = match value {
        Value::Union(index, inner) => {
            let branch = union.variants().get(*index as usize).ok_or_else(|| {
                MapperError::Encoding(format!("Union branch {} out of range", index))
            })?;
            (branch, inner.as_ref())
        }
        // Unwrapped values are accepted when the branch is unambiguous.
        Value::Null => (
            union
                .variants()
                .iter()
                .find(|variant| matches!(variant, Schema::Null))
                .ok_or_else(|| MapperError::Encoding("Union has no null branch".to_string()))?,
            value,
        ),
        other => {
            let mut non_null = union
                .variants()
                .iter()
                .filter(|variant| !matches!(variant, Schema::Null));
            match (non_null.next(), non_null.next()) {
                (Some(branch), None) => (branch, other),
                _ => {
                    return Err(MapperError::Encoding(format!(
                        "Cannot select union branch for {:?}",
                        other
                    )))
                }
            }
        }
    };

    if matches!(branch, Schema::Null) {
        out.push_str("null");
        return Ok(());
    }

    out.push('{');
    write_string(out, &branch_name(branch)?)?;
    out.push(':');
    write_value(out, inner, branch, names)?;
    out.push('}');
    Ok(())
}

/// Type name that identifies a union branch in JSON.
fn branch_name(schema: &Schema) -> Result<String> {
    let name = match schema {
        Schema::Record(record) => return Ok(record.name.fullname(None)),
        Schema::Enum(enum_schema) => return Ok(enum_schema.name.fullname(None)),
        Schema::Fixed(fixed) => return Ok(fixed.name.fullname(None)),
        Schema::Ref { name } => return Ok(name.fullname(None)),
        Schema::Null => "null",
        Schema::Boolean => "boolean",
        Schema::Int => "int",
        Schema::Long => "long",
        Schema::Float => "float",
        Schema::Double => "double",
        Schema::Bytes => "bytes",
        Schema::String => "string",
        Schema::Array(_) => "array",
        Schema::Map(_) => "map",
        other => {
            return Err(MapperError::Encoding(format!(
                "Unsupported union branch type {:?}",
                SchemaKind::from(other)
            )))
        }
    };
    Ok(name.to_string())
}

fn write_string(out: &mut String, text: &str) -> Result<()> {
    let quoted = serde_json::to_string(text).map_err(|e| MapperError::Encoding(e.to_string()))?;
    out.push_str(&quoted);
    Ok(())
}

fn write_float<F: serde::Serialize>(out: &mut String, value: F, wide: f64) -> Result<()> {
    if wide.is_nan() {
        out.push_str("\"NaN\"");
    } else if wide.is_infinite() {
        out.push_str(if wide > 0.0 { "\"Infinity\"" } else { "\"-Infinity\"" });
    } else {
        let text =
            serde_json::to_string(&value).map_err(|e| MapperError::Encoding(e.to_string()))?;
        out.push_str(&text);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_record_with_union_and_enum() {
        let schema = Schema::parse_str(
            r#"{"type": "record", "name": "R", "namespace": "org.radarcns", "fields": [
                {"name": "id", "type": ["null", "string"]},
                {"name": "kind", "type": {"type": "enum", "name": "Kind", "symbols": ["A", "B"]}},
                {"name": "time", "type": "double"}
            ]}"#,
        )
        .unwrap();
        let value = Value::Record(vec![
            ("id".to_string(), Value::Union(1, Box::new(Value::String("x".to_string())))),
            ("kind".to_string(), Value::Enum(1, "B".to_string())),
            ("time".to_string(), Value::Double(1.5)),
        ]);

        assert_eq!(
            encode_json(&value, &schema).unwrap(),
            r#"{"id":{"string":"x"},"kind":"B","time":1.5}"#
        );
    }

    #[test]
    fn test_null_union_branch() {
        let schema = Schema::parse_str(r#"["null", "int"]"#).unwrap();
        assert_eq!(
            encode_json(&Value::Union(0, Box::new(Value::Null)), &schema).unwrap(),
            "null"
        );
        assert_eq!(encode_json(&Value::Int(3), &schema).unwrap(), r#"{"int":3}"#);
    }

    #[test]
    fn test_bytes_as_latin1() {
        let schema = Schema::Bytes;
        assert_eq!(
            encode_json(&Value::Bytes(vec![b'a', 0xe9]), &schema).unwrap(),
            "\"a\u{e9}\""
        );
    }

    #[test]
    fn test_non_finite_floats() {
        assert_eq!(
            encode_json(&Value::Float(f32::NAN), &Schema::Float).unwrap(),
            r#""NaN""#
        );
        assert_eq!(
            encode_json(&Value::Double(f64::NEG_INFINITY), &Schema::Double).unwrap(),
            r#""-Infinity""#
        );
        assert_eq!(encode_json(&Value::Float(0.1), &Schema::Float).unwrap(), "0.1");
    }

    #[test]
    fn test_map_keys_sorted() {
        let schema = Schema::parse_str(r#"{"type": "map", "values": "long"}"#).unwrap();
        let value = Value::Map(HashMap::from([
            ("b".to_string(), Value::Long(2)),
            ("a".to_string(), Value::Long(1)),
        ]));
        assert_eq!(encode_json(&value, &schema).unwrap(), r#"{"a":1,"b":2}"#);
    }

    #[test]
    fn test_mismatched_value_is_error() {
        assert!(matches!(
            encode_json(&Value::String("x".to_string()), &Schema::Int),
            Err(MapperError::Encoding(_))
        ));
    }
}
