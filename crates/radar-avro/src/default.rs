//! Field default values
//!
//! Avro declares defaults as JSON. A default of a union type belongs to the
//! union's first branch; `bytes` and `fixed` defaults are strings whose code
//! points are the byte values (ISO-8859-1).

use crate::error::{MapperError, Result};
use crate::names::{names_of, resolve, Names};
use apache_avro::schema::Schema;
use apache_avro::types::Value;
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Convert a JSON default into an Avro value of `schema`.
///
/// # Errors
/// `MapperError::InvalidValue` if the JSON does not describe a value of the
/// schema.
pub fn default_value(schema: &Schema, json: &JsonValue) -> Result<Value> {
    let names = names_of(schema);
    default_value_in(schema, json, &names)
}

pub(crate) fn default_value_in<'a>(
    schema: &'a Schema,
    json: &JsonValue,
    names: &Names<'a>,
) -> Result<Value> {
    let schema = resolve(schema, names)?;
    let value = match (schema, json) {
        (Schema::Null, JsonValue::Null) => Value::Null,
        (Schema::Boolean, JsonValue::Bool(b)) => Value::Boolean(*b),
        (Schema::Int, JsonValue::Number(n)) => Value::Int(as_int(n, json)?),
        (Schema::Date, JsonValue::Number(n)) => Value::Date(as_int(n, json)?),
        (Schema::TimeMillis, JsonValue::Number(n)) => Value::TimeMillis(as_int(n, json)?),
        (Schema::Long, JsonValue::Number(n)) => Value::Long(as_long(n, json)?),
        (Schema::TimeMicros, JsonValue::Number(n)) => Value::TimeMicros(as_long(n, json)?),
        (Schema::TimestampMillis, JsonValue::Number(n)) => {
            Value::TimestampMillis(as_long(n, json)?)
        }
        (Schema::TimestampMicros, JsonValue::Number(n)) => {
            Value::TimestampMicros(as_long(n, json)?)
        }
        (Schema::Float, JsonValue::Number(n)) => Value::Float(as_double(n, json)? as f32),
        (Schema::Double, JsonValue::Number(n)) => Value::Double(as_double(n, json)?),
        (Schema::Bytes, JsonValue::String(s)) => Value::Bytes(latin1_bytes(s)?),
        (Schema::String, JsonValue::String(s)) => Value::String(s.clone()),
        (Schema::Fixed(fixed), JsonValue::String(s)) => {
            let bytes = latin1_bytes(s)?;
            if bytes.len() != fixed.size {
                return Err(invalid(json, schema));
            }
            Value::Fixed(fixed.size, bytes)
        }
        (Schema::Enum(enum_schema), JsonValue::String(s)) => {
            let index = enum_schema
                .symbols
                .iter()
                .position(|symbol| symbol == s)
                .ok_or_else(|| invalid(json, schema))?;
            Value::Enum(index as u32, s.clone())
        }
        (Schema::Array(items), JsonValue::Array(values)) => Value::Array(
            values
                .iter()
                .map(|v| default_value_in(items, v, names))
                .collect::<Result<Vec<_>>>()?,
        ),
        (Schema::Map(values_schema), JsonValue::Object(entries)) => Value::Map(
            entries
                .iter()
                .map(|(k, v)| -> Result<(String, Value)> {
                    Ok((k.clone(), default_value_in(values_schema, v, names)?))
                })
                .collect::<Result<HashMap<_, _>>>()?,
        ),
        (Schema::Record(record), JsonValue::Object(entries)) => {
            let mut fields = Vec::with_capacity(record.fields.len());
            for field in &record.fields {
                let field_json = entries
                    .get(&field.name)
                    .or(field.default.as_ref())
                    .ok_or_else(|| {
                        MapperError::InvalidValue(format!(
                            "Default for record {} lacks field {}",
                            record.name.fullname(None),
                            field.name
                        ))
                    })?;
                fields.push((
                    field.name.clone(),
                    default_value_in(&field.schema, field_json, names)?,
                ));
            }
            Value::Record(fields)
        }
        (Schema::Union(union), _) => {
            // Defaults belong to the first branch; other branches are
            // accepted for lenience with hand-written schemas.
            union
                .variants()
                .iter()
                .enumerate()
                .find_map(|(index, variant)| {
                    default_value_in(variant, json, names)
                        .ok()
                        .map(|v| Value::Union(index as u32, Box::new(v)))
                })
                .ok_or_else(|| invalid(json, schema))?
        }
        _ => return Err(invalid(json, schema)),
    };
    Ok(value)
}

/// Bytes of an ISO-8859-1 encoded string.
pub(crate) fn latin1_bytes(s: &str) -> Result<Vec<u8>> {
    s.chars()
        .map(|c| {
            u8::try_from(u32::from(c)).map_err(|_| {
                MapperError::InvalidValue(format!("Character {:?} is not a byte value", c))
            })
        })
        .collect()
}

fn as_int(n: &serde_json::Number, json: &JsonValue) -> Result<i32> {
    n.as_i64()
        .and_then(|v| i32::try_from(v).ok())
        .ok_or_else(|| MapperError::InvalidValue(format!("{} is not an int", json)))
}

fn as_long(n: &serde_json::Number, json: &JsonValue) -> Result<i64> {
    n.as_i64()
        .ok_or_else(|| MapperError::InvalidValue(format!("{} is not a long", json)))
}

fn as_double(n: &serde_json::Number, json: &JsonValue) -> Result<f64> {
    n.as_f64()
        .ok_or_else(|| MapperError::InvalidValue(format!("{} is not a number", json)))
}

fn invalid(json: &JsonValue, schema: &Schema) -> MapperError {
    MapperError::InvalidValue(format!(
        "Default {} does not match schema {:?}",
        json,
        apache_avro::schema::SchemaKind::from(schema)
    ))
}
