//! Avro Data Mapper
//!
//! Builds a converter from values of one schema to values of another schema,
//! for sending data written with a local schema to a topic whose registry
//! schema has evolved.
//!
//! Mapper construction is a single recursive pass over both schemas. Rules,
//! first match wins:
//!
//! 1. Equal schemas map by identity.
//! 2. Unions on either side map branch by branch.
//! 3. Enums map by symbol name, to strings, and from strings.
//! 4. Numeric targets accept any numeric source by cast and strings by parsing.
//! 5. Otherwise by source type: records field by field, arrays and maps by
//!    element, bytes and fixed between each other and to base64 strings,
//!    primitives to strings.
//!
//! Whenever a position cannot be mapped but has a default value, the mapper
//! for that position returns the default. This makes added fields, removed
//! fields and enum growth work, but it also hides genuine mismatches behind
//! defaults.
//!
//! Mappers are immutable and cheap to clone; build one per schema pair and
//! reuse it for every value.
//!
//! # Examples
//!
//! ```ignore
//! let mapper = AvroDataMapperFactory::create_mapper(&local_schema, &registry_schema, None)?;
//! let converted = mapper.convert(value)?;
//! ```

use crate::default::default_value_in;
use crate::error::{MapperError, Result};
use crate::names::{names_of, resolve, Names};
use apache_avro::schema::{EnumSchema, RecordSchema, Schema, SchemaKind, UnionSchema};
use apache_avro::types::Value;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

type MapFn = dyn Fn(Value) -> Result<Value> + Send + Sync;

/// Converts values of one schema into values of another.
#[derive(Clone)]
pub enum AvroDataMapper {
    /// Values pass through unchanged.
    Identity,
    /// Every value becomes this one.
    Constant(Value),
    Func(Arc<MapFn>),
}

impl AvroDataMapper {
    fn func<F>(f: F) -> Self
    where
        F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
    {
        AvroDataMapper::Func(Arc::new(f))
    }

    /// Convert a value of the source schema into a value of the target schema.
    pub fn convert(&self, value: Value) -> Result<Value> {
        match self {
            AvroDataMapper::Identity => Ok(value),
            AvroDataMapper::Constant(constant) => Ok(constant.clone()),
            AvroDataMapper::Func(f) => f(value),
        }
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, AvroDataMapper::Identity)
    }
}

impl fmt::Debug for AvroDataMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AvroDataMapper::Identity => write!(f, "AvroDataMapper::Identity"),
            AvroDataMapper::Constant(value) => write!(f, "AvroDataMapper::Constant({:?})", value),
            AvroDataMapper::Func(_) => write!(f, "AvroDataMapper::Func"),
        }
    }
}

/// Entry point for building [`AvroDataMapper`]s.
pub struct AvroDataMapperFactory;

impl AvroDataMapperFactory {
    /// Create a mapper from values of `from` to values of `to`.
    ///
    /// # Arguments
    /// * `from` - Schema of the values that will be converted
    /// * `to` - Schema the converted values must conform to
    /// * `default` - JSON default of the target position, used when the
    ///   schemas cannot be mapped
    ///
    /// # Errors
    /// `MapperError::SchemaIncompatible` if no mapping exists and no default
    /// was given. Recursive record types that differ between the schemas are
    /// always incompatible.
    pub fn create_mapper(
        from: &Schema,
        to: &Schema,
        default: Option<&JsonValue>,
    ) -> Result<AvroDataMapper> {
        let mut builder = MapperBuilder {
            from_names: names_of(from),
            to_names: names_of(to),
            visiting: Vec::new(),
        };
        builder.build(from, to, default)
    }
}

struct MapperBuilder<'a> {
    from_names: Names<'a>,
    to_names: Names<'a>,
    /// Record pairs currently being mapped, to reject recursion.
    visiting: Vec<(String, String)>,
}

enum FieldMapping {
    Source {
        position: usize,
        name: String,
        mapper: AvroDataMapper,
    },
    Constant(Value),
}

#[derive(Clone, Copy)]
enum Numeric {
    Int,
    Long,
    Float,
    Double,
}

impl<'a> MapperBuilder<'a> {
    /// Build a mapper, falling back to the default if the schemas are
    /// incompatible.
    fn build(
        &mut self,
        from: &'a Schema,
        to: &'a Schema,
        default: Option<&JsonValue>,
    ) -> Result<AvroDataMapper> {
        match self.build_strict(from, to, default) {
            Err(MapperError::SchemaIncompatible(reason)) => match default {
                Some(json) => {
                    debug!(reason = %reason, default = %json, "Mapping to constant default");
                    Ok(AvroDataMapper::Constant(self.default_constant(to, json)?))
                }
                None => Err(MapperError::SchemaIncompatible(reason)),
            },
            other => other,
        }
    }

    fn build_strict(
        &mut self,
        from: &'a Schema,
        to: &'a Schema,
        default: Option<&JsonValue>,
    ) -> Result<AvroDataMapper> {
        let from = resolve(from, &self.from_names)?;
        let to = resolve(to, &self.to_names)?;

        if from == to {
            return Ok(AvroDataMapper::Identity);
        }

        match (from, to) {
            (Schema::Union(_), _) | (_, Schema::Union(_)) => self.map_union(from, to, default),
            (Schema::Enum(_), _) | (_, Schema::Enum(_)) => self.map_enum(from, to, default),
            (_, Schema::Int) => self.map_numeric(from, to, Numeric::Int, default),
            (_, Schema::Long) => self.map_numeric(from, to, Numeric::Long, default),
            (_, Schema::Float) => self.map_numeric(from, to, Numeric::Float, default),
            (_, Schema::Double) => self.map_numeric(from, to, Numeric::Double, default),
            _ => self.map_by_source(from, to, default),
        }
    }

    /// The default as a value of the target schema; JSON null becomes Avro
    /// null even where the schema has no null.
    fn default_constant(&self, to: &'a Schema, json: &JsonValue) -> Result<Value> {
        match default_value_in(to, json, &self.to_names) {
            Ok(value) => Ok(value),
            Err(_) if json.is_null() => Ok(Value::Null),
            Err(e) => Err(MapperError::SchemaIncompatible(format!(
                "Unusable default value: {}",
                e
            ))),
        }
    }

    fn optional_default(&self, to: &'a Schema, default: Option<&JsonValue>) -> Result<Option<Value>> {
        default.map(|json| self.default_constant(to, json)).transpose()
    }

    fn map_union(
        &mut self,
        from: &'a Schema,
        to: &'a Schema,
        default: Option<&JsonValue>,
    ) -> Result<AvroDataMapper> {
        match (from, to) {
            (Schema::Union(f), Schema::Union(t)) if same_primitive_branches(f, t) => {
                Ok(AvroDataMapper::Identity)
            }
            (Schema::Union(f), Schema::Union(t)) => self.map_union_to_union(f, t),
            (Schema::Union(f), _) => self.map_union_to_single(f, to, default),
            (_, Schema::Union(t)) => self.map_single_to_union(from, t),
            _ => Err(incompatible(from, to)),
        }
    }

    fn map_union_to_single(
        &mut self,
        from: &'a UnionSchema,
        to: &'a Schema,
        default: Option<&JsonValue>,
    ) -> Result<AvroDataMapper> {
        let json = default.ok_or_else(|| {
            MapperError::SchemaIncompatible(
                "Cannot map a union to a non-union type without a default value".to_string(),
            )
        })?;
        let non_null: Vec<&'a Schema> = from
            .variants()
            .iter()
            .filter(|variant| !matches!(variant, Schema::Null))
            .collect();
        let &[branch] = non_null.as_slice() else {
            return Err(MapperError::SchemaIncompatible(format!(
                "Cannot map a union of {} non-null types to a single type",
                non_null.len()
            )));
        };

        let inner = self.build(branch, to, Some(json))?;
        let fallback = self.default_constant(to, json)?;

        Ok(AvroDataMapper::func(move |value| match unwrap_union(value) {
            Value::Null => Ok(fallback.clone()),
            value => inner.convert(value),
        }))
    }

    fn map_single_to_union(
        &mut self,
        from: &'a Schema,
        to: &'a UnionSchema,
    ) -> Result<AvroDataMapper> {
        let (index, inner) = self.branch_mapper(from, to)?;
        let null_index = null_branch(to);

        Ok(AvroDataMapper::func(move |value| match (value, null_index) {
            (Value::Null, Some(null_index)) => Ok(Value::Union(null_index, Box::new(Value::Null))),
            (value, _) => Ok(Value::Union(index, Box::new(inner.convert(value)?))),
        }))
    }

    fn map_union_to_union(
        &mut self,
        from: &'a UnionSchema,
        to: &'a UnionSchema,
    ) -> Result<AvroDataMapper> {
        let mut branches = Vec::with_capacity(from.variants().len());
        for variant in from.variants() {
            let variant = resolve(variant, &self.from_names)?;
            branches.push(self.branch_mapper(variant, to)?);
        }
        let source_null = null_branch(from);
        let source_single = single_non_null_branch(from);

        Ok(AvroDataMapper::func(move |value| {
            let (index, inner) = match value {
                Value::Union(index, inner) => (index, *inner),
                Value::Null => (
                    source_null
                        .ok_or_else(|| MapperError::InvalidValue("Unexpected null".to_string()))?,
                    Value::Null,
                ),
                other => (
                    source_single.ok_or_else(|| {
                        MapperError::InvalidValue(format!(
                            "Cannot select union branch for {:?}",
                            other
                        ))
                    })?,
                    other,
                ),
            };
            let (target_index, mapper) = branches.get(index as usize).ok_or_else(|| {
                MapperError::InvalidValue(format!("Union branch {} out of range", index))
            })?;
            Ok(Value::Union(*target_index, Box::new(mapper.convert(inner)?)))
        }))
    }

    /// Pick the branch of `to` that values of `from` map into: an equal
    /// branch, then a branch of the same kind, then any branch that maps.
    fn branch_mapper(
        &mut self,
        from: &'a Schema,
        to: &'a UnionSchema,
    ) -> Result<(u32, AvroDataMapper)> {
        if matches!(from, Schema::Null) {
            return null_branch(to)
                .map(|index| (index, AvroDataMapper::Identity))
                .ok_or_else(|| {
                    MapperError::SchemaIncompatible("Target union has no null branch".to_string())
                });
        }

        let mut candidates = Vec::new();
        for (index, variant) in to.variants().iter().enumerate() {
            let variant = resolve(variant, &self.to_names)?;
            if matches!(variant, Schema::Null) {
                continue;
            }
            let rank = if variant == from {
                0
            } else if SchemaKind::from(variant) == SchemaKind::from(from)
                || (is_numeric(variant) && is_numeric(from))
            {
                1
            } else {
                2
            };
            candidates.push((rank, index as u32, variant));
        }
        candidates.sort_by_key(|(rank, index, _)| (*rank, *index));

        for (_, index, variant) in candidates {
            if let Ok(mapper) = self.build(from, variant, None) {
                return Ok((index, mapper));
            }
        }
        Err(MapperError::SchemaIncompatible(format!(
            "No branch of the target union accepts {:?}",
            SchemaKind::from(from)
        )))
    }

    fn map_enum(
        &mut self,
        from: &'a Schema,
        to: &'a Schema,
        default: Option<&JsonValue>,
    ) -> Result<AvroDataMapper> {
        match (from, to) {
            (Schema::Enum(f), Schema::Enum(t)) => {
                let lookup = symbol_lookup(t);
                let fallback = enum_fallback(t, default);
                let all_mapped = f.symbols.iter().all(|s| lookup.contains_key(s));
                if !all_mapped && fallback.is_none() {
                    return Err(MapperError::SchemaIncompatible(format!(
                        "Enum {} lacks symbols of {} and has no default or UNKNOWN symbol",
                        t.name.fullname(None),
                        f.name.fullname(None)
                    )));
                }
                Ok(AvroDataMapper::func(move |value| {
                    map_symbol(value, &lookup, fallback.as_ref())
                }))
            }
            (Schema::Enum(_), Schema::String) => Ok(AvroDataMapper::func(|value| match value {
                Value::Enum(_, symbol) | Value::String(symbol) => Ok(Value::String(symbol)),
                other => Err(MapperError::InvalidValue(format!(
                    "Expected enum symbol, got {:?}",
                    other
                ))),
            })),
            (Schema::String, Schema::Enum(t)) => {
                let lookup = symbol_lookup(t);
                let fallback = enum_fallback(t, default);
                Ok(AvroDataMapper::func(move |value| {
                    map_symbol(value, &lookup, fallback.as_ref())
                }))
            }
            _ => Err(incompatible(from, to)),
        }
    }

    fn map_numeric(
        &mut self,
        from: &'a Schema,
        to: &'a Schema,
        target: Numeric,
        default: Option<&JsonValue>,
    ) -> Result<AvroDataMapper> {
        let fallback = self.optional_default(to, default)?;
        match from {
            Schema::String => Ok(AvroDataMapper::func(move |value| match value {
                Value::String(s) => target
                    .parse(&s)
                    .or_else(|e| fallback.clone().ok_or(e)),
                other => Err(MapperError::InvalidValue(format!(
                    "Expected string, got {:?}",
                    other
                ))),
            })),
            Schema::Int | Schema::Long | Schema::Float | Schema::Double => {
                Ok(AvroDataMapper::func(move |value| {
                    target.cast(value).or_else(|e| fallback.clone().ok_or(e))
                }))
            }
            _ => Err(incompatible(from, to)),
        }
    }

    fn map_by_source(
        &mut self,
        from: &'a Schema,
        to: &'a Schema,
        default: Option<&JsonValue>,
    ) -> Result<AvroDataMapper> {
        match (from, to) {
            (Schema::Record(f), Schema::Record(t)) => self.map_record(f, t),
            (Schema::Array(f), Schema::Array(t)) => {
                let inner = self.build(f, t, None)?;
                if inner.is_identity() {
                    return Ok(AvroDataMapper::Identity);
                }
                Ok(AvroDataMapper::func(move |value| match value {
                    Value::Array(items) => Ok(Value::Array(
                        items
                            .into_iter()
                            .map(|item| inner.convert(item))
                            .collect::<Result<Vec<_>>>()?,
                    )),
                    other => Err(MapperError::InvalidValue(format!(
                        "Expected array, got {:?}",
                        other
                    ))),
                }))
            }
            (Schema::Map(f), Schema::Map(t)) => {
                let inner = self.build(f, t, None)?;
                if inner.is_identity() {
                    return Ok(AvroDataMapper::Identity);
                }
                Ok(AvroDataMapper::func(move |value| match value {
                    Value::Map(entries) => Ok(Value::Map(
                        entries
                            .into_iter()
                            .map(|(k, v)| inner.convert(v).map(|v| (k, v)))
                            .collect::<Result<HashMap<_, _>>>()?,
                    )),
                    other => Err(MapperError::InvalidValue(format!(
                        "Expected map, got {:?}",
                        other
                    ))),
                }))
            }
            (Schema::Fixed(_) | Schema::Bytes, _) => self.map_bytes(from, to, default),
            (Schema::String, Schema::Bytes | Schema::Fixed(_)) => self.map_base64(to, default),
            (Schema::Boolean | Schema::Int | Schema::Long | Schema::Float | Schema::Double, Schema::String) => {
                Ok(AvroDataMapper::func(stringify))
            }
            (f, t) if is_primitive(f) && SchemaKind::from(f) == SchemaKind::from(t) => {
                Ok(AvroDataMapper::Identity)
            }
            _ => Err(incompatible(from, to)),
        }
    }

    fn map_record(
        &mut self,
        from: &'a RecordSchema,
        to: &'a RecordSchema,
    ) -> Result<AvroDataMapper> {
        let key = (from.name.fullname(None), to.name.fullname(None));
        if self.visiting.contains(&key) {
            return Err(MapperError::SchemaIncompatible(format!(
                "Recursive record {} cannot be mapped",
                key.1
            )));
        }
        self.visiting.push(key);
        let result = self.map_fields(from, to);
        self.visiting.pop();
        result
    }

    fn map_fields(
        &mut self,
        from: &'a RecordSchema,
        to: &'a RecordSchema,
    ) -> Result<AvroDataMapper> {
        let mut mappings = Vec::with_capacity(to.fields.len());

        for target in &to.fields {
            let source = from.fields.iter().enumerate().find(|(_, source)| {
                source.name == target.name
                    || target
                        .aliases
                        .as_ref()
                        .is_some_and(|aliases| aliases.contains(&source.name))
            });

            let mapping = match (source, &target.default) {
                (Some((position, source)), default) => FieldMapping::Source {
                    position,
                    name: source.name.clone(),
                    mapper: self.build(&source.schema, &target.schema, default.as_ref())?,
                },
                (None, Some(default)) => {
                    FieldMapping::Constant(self.default_constant(&target.schema, default)?)
                }
                (None, None) => {
                    return Err(MapperError::SchemaIncompatible(format!(
                        "Field {} of {} has no default and is missing from {}",
                        target.name,
                        to.name.fullname(None),
                        from.name.fullname(None)
                    )))
                }
            };
            mappings.push((target.name.clone(), mapping));
        }

        Ok(AvroDataMapper::func(move |value| {
            let mut source = match value {
                Value::Record(fields) => fields,
                other => {
                    return Err(MapperError::InvalidValue(format!(
                        "Expected record, got {:?}",
                        other
                    )))
                }
            };

            let mut fields = Vec::with_capacity(mappings.len());
            for (target_name, mapping) in &mappings {
                let value = match mapping {
                    FieldMapping::Constant(value) => value.clone(),
                    FieldMapping::Source {
                        position,
                        name,
                        mapper,
                    } => {
                        let value = take_field(&mut source, *position, name).ok_or_else(|| {
                            MapperError::InvalidValue(format!("Record lacks field {}", name))
                        })?;
                        mapper.convert(value)?
                    }
                };
                fields.push((target_name.clone(), value));
            }
            Ok(Value::Record(fields))
        }))
    }

    fn map_bytes(
        &mut self,
        from: &'a Schema,
        to: &'a Schema,
        default: Option<&JsonValue>,
    ) -> Result<AvroDataMapper> {
        match (from, to) {
            (Schema::Fixed(f), Schema::Fixed(t)) if f.size == t.size => {
                Ok(AvroDataMapper::Identity)
            }
            (Schema::Fixed(f), Schema::Fixed(t)) => Err(MapperError::SchemaIncompatible(format!(
                "Fixed size {} cannot map to fixed size {}",
                f.size, t.size
            ))),
            (Schema::Fixed(_), Schema::Bytes) => Ok(AvroDataMapper::func(|value| {
                bytes_of(value).map(Value::Bytes)
            })),
            (Schema::Bytes, Schema::Fixed(t)) => {
                let size = t.size;
                let fallback = self.optional_default(to, default)?;
                Ok(AvroDataMapper::func(move |value| {
                    let bytes = bytes_of(value)?;
                    if bytes.len() == size {
                        Ok(Value::Fixed(size, bytes))
                    } else {
                        fallback.clone().ok_or_else(|| {
                            MapperError::InvalidValue(format!(
                                "{} bytes do not fit fixed size {}",
                                bytes.len(),
                                size
                            ))
                        })
                    }
                }))
            }
            (_, Schema::String) => Ok(AvroDataMapper::func(|value| {
                bytes_of(value).map(|bytes| Value::String(STANDARD.encode(bytes)))
            })),
            _ => Err(incompatible(from, to)),
        }
    }

    fn map_base64(&mut self, to: &'a Schema, default: Option<&JsonValue>) -> Result<AvroDataMapper> {
        let fallback = self.optional_default(to, default)?;
        let fixed_size = match to {
            Schema::Fixed(fixed) => Some(fixed.size),
            _ => None,
        };

        Ok(AvroDataMapper::func(move |value| {
            let text = match value {
                Value::String(text) => text,
                other => {
                    return Err(MapperError::InvalidValue(format!(
                        "Expected base64 string, got {:?}",
                        other
                    )))
                }
            };
            let decoded = STANDARD
                .decode(text.as_bytes())
                .map_err(|e| MapperError::InvalidValue(format!("Invalid base64: {}", e)))
                .and_then(|bytes| match fixed_size {
                    None => Ok(Value::Bytes(bytes)),
                    Some(size) if bytes.len() == size => Ok(Value::Fixed(size, bytes)),
                    Some(size) => Err(MapperError::InvalidValue(format!(
                        "{} bytes do not fit fixed size {}",
                        bytes.len(),
                        size
                    ))),
                });
            decoded.or_else(|e| fallback.clone().ok_or(e))
        }))
    }
}

impl Numeric {
    fn parse(self, text: &str) -> Result<Value> {
        let text = text.trim();
        let parsed = match self {
            Numeric::Int => text.parse::<i32>().map(Value::Int).ok(),
            Numeric::Long => text.parse::<i64>().map(Value::Long).ok(),
            Numeric::Float => text.parse::<f32>().map(Value::Float).ok(),
            Numeric::Double => text.parse::<f64>().map(Value::Double).ok(),
        };
        parsed.ok_or_else(|| {
            MapperError::InvalidValue(format!("Cannot parse {:?} as {}", text, self.name()))
        })
    }

    fn cast(self, value: Value) -> Result<Value> {
        let cast = match (self, value) {
            (Numeric::Int, Value::Int(v)) => Some(Value::Int(v)),
            (Numeric::Int, Value::Long(v)) => i32::try_from(v).ok().map(Value::Int),
            (Numeric::Int, Value::Float(v)) => Some(Value::Int(v as i32)),
            (Numeric::Int, Value::Double(v)) => Some(Value::Int(v as i32)),
            (Numeric::Long, Value::Int(v)) => Some(Value::Long(i64::from(v))),
            (Numeric::Long, Value::Long(v)) => Some(Value::Long(v)),
            (Numeric::Long, Value::Float(v)) => Some(Value::Long(v as i64)),
            (Numeric::Long, Value::Double(v)) => Some(Value::Long(v as i64)),
            (Numeric::Float, Value::Int(v)) => Some(Value::Float(v as f32)),
            (Numeric::Float, Value::Long(v)) => Some(Value::Float(v as f32)),
            (Numeric::Float, Value::Float(v)) => Some(Value::Float(v)),
            (Numeric::Float, Value::Double(v)) => Some(Value::Float(v as f32)),
            (Numeric::Double, Value::Int(v)) => Some(Value::Double(f64::from(v))),
            (Numeric::Double, Value::Long(v)) => Some(Value::Double(v as f64)),
            (Numeric::Double, Value::Float(v)) => Some(Value::Double(f64::from(v))),
            (Numeric::Double, Value::Double(v)) => Some(Value::Double(v)),
            (_, other) => {
                return Err(MapperError::InvalidValue(format!(
                    "Expected number, got {:?}",
                    other
                )))
            }
        };
        cast.ok_or_else(|| {
            MapperError::InvalidValue(format!("Number out of range for {}", self.name()))
        })
    }

    fn name(self) -> &'static str {
        match self {
            Numeric::Int => "int",
            Numeric::Long => "long",
            Numeric::Float => "float",
            Numeric::Double => "double",
        }
    }
}

fn incompatible(from: &Schema, to: &Schema) -> MapperError {
    MapperError::SchemaIncompatible(format!(
        "Cannot map {:?} to {:?}",
        SchemaKind::from(from),
        SchemaKind::from(to)
    ))
}

fn is_primitive(schema: &Schema) -> bool {
    matches!(
        schema,
        Schema::Null
            | Schema::Boolean
            | Schema::Int
            | Schema::Long
            | Schema::Float
            | Schema::Double
            | Schema::Bytes
            | Schema::String
    )
}

fn is_numeric(schema: &Schema) -> bool {
    matches!(
        schema,
        Schema::Int | Schema::Long | Schema::Float | Schema::Double
    )
}

fn same_primitive_branches(from: &UnionSchema, to: &UnionSchema) -> bool {
    from.variants().len() == to.variants().len()
        && from
            .variants()
            .iter()
            .zip(to.variants())
            .all(|(f, t)| is_primitive(f) && f == t)
}

fn null_branch(union: &UnionSchema) -> Option<u32> {
    union
        .variants()
        .iter()
        .position(|variant| matches!(variant, Schema::Null))
        .map(|index| index as u32)
}

fn single_non_null_branch(union: &UnionSchema) -> Option<u32> {
    let mut non_null = union
        .variants()
        .iter()
        .enumerate()
        .filter(|(_, variant)| !matches!(variant, Schema::Null));
    match (non_null.next(), non_null.next()) {
        (Some((index, _)), None) => Some(index as u32),
        _ => None,
    }
}

fn unwrap_union(value: Value) -> Value {
    match value {
        Value::Union(_, inner) => *inner,
        other => other,
    }
}

fn symbol_lookup(schema: &EnumSchema) -> HashMap<String, u32> {
    schema
        .symbols
        .iter()
        .enumerate()
        .map(|(index, symbol)| (symbol.clone(), index as u32))
        .collect()
}

/// Symbol substituted for unknown symbols: the default if it is a symbol of
/// the target, otherwise `UNKNOWN` if the target has it.
fn enum_fallback(schema: &EnumSchema, default: Option<&JsonValue>) -> Option<(u32, String)> {
    let find = |name: &str| {
        schema
            .symbols
            .iter()
            .position(|symbol| symbol == name)
            .map(|index| (index as u32, name.to_string()))
    };
    default
        .and_then(JsonValue::as_str)
        .and_then(find)
        .or_else(|| find("UNKNOWN"))
}

fn map_symbol(
    value: Value,
    lookup: &HashMap<String, u32>,
    fallback: Option<&(u32, String)>,
) -> Result<Value> {
    let symbol = match value {
        Value::Enum(_, symbol) | Value::String(symbol) => symbol,
        other => {
            return Err(MapperError::InvalidValue(format!(
                "Expected enum symbol, got {:?}",
                other
            )))
        }
    };
    match lookup.get(&symbol) {
        Some(index) => Ok(Value::Enum(*index, symbol)),
        None => fallback
            .map(|(index, fallback)| Value::Enum(*index, fallback.clone()))
            .ok_or_else(|| MapperError::InvalidValue(format!("Unknown enum symbol {}", symbol))),
    }
}

fn stringify(value: Value) -> Result<Value> {
    let text = match value {
        Value::Boolean(v) => v.to_string(),
        Value::Int(v) => v.to_string(),
        Value::Long(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Double(v) => v.to_string(),
        Value::String(v) => v,
        other => {
            return Err(MapperError::InvalidValue(format!(
                "Cannot convert {:?} to string",
                other
            )))
        }
    };
    Ok(Value::String(text))
}

fn bytes_of(value: Value) -> Result<Vec<u8>> {
    match value {
        Value::Bytes(bytes) | Value::Fixed(_, bytes) => Ok(bytes),
        other => Err(MapperError::InvalidValue(format!(
            "Expected bytes, got {:?}",
            other
        ))),
    }
}

/// Take a field out of a record, trying its schema position before a scan.
fn take_field(fields: &mut [(String, Value)], position: usize, name: &str) -> Option<Value> {
    let index = match fields.get(position) {
        Some((field_name, _)) if field_name == name => position,
        _ => fields.iter().position(|(field_name, _)| field_name == name)?,
    };
    Some(std::mem::replace(&mut fields[index].1, Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(text: &str) -> Schema {
        Schema::parse_str(text).unwrap()
    }

    fn mapper(from: &str, to: &str) -> Result<AvroDataMapper> {
        AvroDataMapperFactory::create_mapper(&parse(from), &parse(to), None)
    }

    #[test]
    fn test_equal_schemas_are_identity() {
        let schema = r#"{"type": "record", "name": "R", "fields": [{"name": "a", "type": "int"}]}"#;
        assert!(mapper(schema, schema).unwrap().is_identity());
    }

    #[test]
    fn test_numeric_widening_and_narrowing() {
        let m = mapper(r#""int""#, r#""double""#).unwrap();
        assert_eq!(m.convert(Value::Int(3)).unwrap(), Value::Double(3.0));

        let m = mapper(r#""long""#, r#""int""#).unwrap();
        assert_eq!(m.convert(Value::Long(7)).unwrap(), Value::Int(7));
        assert!(m.convert(Value::Long(i64::MAX)).is_err());

        let m = mapper(r#""double""#, r#""long""#).unwrap();
        assert_eq!(m.convert(Value::Double(2.9)).unwrap(), Value::Long(2));
    }

    #[test]
    fn test_string_to_number_parses() {
        let m = mapper(r#""string""#, r#""float""#).unwrap();
        assert_eq!(
            m.convert(Value::String(" 1.5".to_string())).unwrap(),
            Value::Float(1.5)
        );
        assert!(m.convert(Value::String("x".to_string())).is_err());

        let with_default = AvroDataMapperFactory::create_mapper(
            &Schema::String,
            &Schema::Int,
            Some(&json!(-1)),
        )
        .unwrap();
        assert_eq!(
            with_default.convert(Value::String("x".to_string())).unwrap(),
            Value::Int(-1)
        );
    }

    #[test]
    fn test_number_to_string() {
        let m = mapper(r#""long""#, r#""string""#).unwrap();
        assert_eq!(m.convert(Value::Long(12)).unwrap(), Value::String("12".to_string()));
    }

    #[test]
    fn test_enum_superset_maps_by_name() {
        let m = mapper(
            r#"{"type": "enum", "name": "E", "symbols": ["B", "C"]}"#,
            r#"{"type": "enum", "name": "E", "symbols": ["A", "B", "C"]}"#,
        )
        .unwrap();
        assert_eq!(
            m.convert(Value::Enum(1, "C".to_string())).unwrap(),
            Value::Enum(2, "C".to_string())
        );
    }

    #[test]
    fn test_enum_unknown_symbol() {
        let from = r#"{"type": "enum", "name": "E", "symbols": ["A", "B"]}"#;
        let m = mapper(from, r#"{"type": "enum", "name": "E", "symbols": ["A", "UNKNOWN"]}"#)
            .unwrap();
        assert_eq!(
            m.convert(Value::Enum(1, "B".to_string())).unwrap(),
            Value::Enum(1, "UNKNOWN".to_string())
        );

        let err = mapper(from, r#"{"type": "enum", "name": "E", "symbols": ["A", "C"]}"#)
            .unwrap_err();
        assert!(matches!(err, MapperError::SchemaIncompatible(_)));
    }

    #[test]
    fn test_enum_default_symbol() {
        let m = AvroDataMapperFactory::create_mapper(
            &parse(r#"{"type": "enum", "name": "E", "symbols": ["A", "B"]}"#),
            &parse(r#"{"type": "enum", "name": "E", "symbols": ["A", "C"]}"#),
            Some(&json!("C")),
        )
        .unwrap();
        assert_eq!(
            m.convert(Value::Enum(1, "B".to_string())).unwrap(),
            Value::Enum(1, "C".to_string())
        );
    }

    #[test]
    fn test_enum_to_string_and_back() {
        let e = r#"{"type": "enum", "name": "E", "symbols": ["A", "B"]}"#;
        let to_string = mapper(e, r#""string""#).unwrap();
        assert_eq!(
            to_string.convert(Value::Enum(0, "A".to_string())).unwrap(),
            Value::String("A".to_string())
        );

        let from_string = mapper(r#""string""#, e).unwrap();
        assert_eq!(
            from_string.convert(Value::String("B".to_string())).unwrap(),
            Value::Enum(1, "B".to_string())
        );
        assert!(from_string.convert(Value::String("Z".to_string())).is_err());
    }

    #[test]
    fn test_enum_to_int_is_incompatible() {
        let err = mapper(r#"{"type": "enum", "name": "E", "symbols": ["A"]}"#, r#""int""#)
            .unwrap_err();
        assert!(matches!(err, MapperError::SchemaIncompatible(_)));
    }

    #[test]
    fn test_primitive_unions_are_identity() {
        assert!(mapper(r#"["null", "int"]"#, r#"["null", "int"]"#)
            .unwrap()
            .is_identity());
    }

    #[test]
    fn test_single_to_nullable_union() {
        let m = mapper(r#""int""#, r#"["null", "long"]"#).unwrap();
        assert_eq!(
            m.convert(Value::Int(4)).unwrap(),
            Value::Union(1, Box::new(Value::Long(4)))
        );
        assert_eq!(
            m.convert(Value::Null).unwrap(),
            Value::Union(0, Box::new(Value::Null))
        );
    }

    #[test]
    fn test_union_to_union_remaps_branches() {
        let m = mapper(r#"["null", "int"]"#, r#"["string", "null", "long"]"#).unwrap();
        assert_eq!(
            m.convert(Value::Union(1, Box::new(Value::Int(2)))).unwrap(),
            Value::Union(2, Box::new(Value::Long(2)))
        );
        assert_eq!(
            m.convert(Value::Union(0, Box::new(Value::Null))).unwrap(),
            Value::Union(1, Box::new(Value::Null))
        );
    }

    #[test]
    fn test_union_to_single_requires_default() {
        assert!(mapper(r#"["null", "int"]"#, r#""int""#).is_err());

        let m = AvroDataMapperFactory::create_mapper(
            &parse(r#"["null", "int"]"#),
            &Schema::Int,
            Some(&json!(0)),
        )
        .unwrap();
        assert_eq!(m.convert(Value::Union(0, Box::new(Value::Null))).unwrap(), Value::Int(0));
        assert_eq!(m.convert(Value::Union(1, Box::new(Value::Int(9)))).unwrap(), Value::Int(9));
    }

    #[test]
    fn test_bytes_and_fixed() {
        let fixed2 = r#"{"type": "fixed", "name": "F", "size": 2}"#;

        let m = mapper(fixed2, r#""bytes""#).unwrap();
        assert_eq!(m.convert(Value::Fixed(2, vec![1, 2])).unwrap(), Value::Bytes(vec![1, 2]));

        let m = mapper(r#""bytes""#, fixed2).unwrap();
        assert_eq!(m.convert(Value::Bytes(vec![1, 2])).unwrap(), Value::Fixed(2, vec![1, 2]));
        assert!(m.convert(Value::Bytes(vec![1])).is_err());

        let m = mapper(r#""bytes""#, r#""string""#).unwrap();
        assert_eq!(
            m.convert(Value::Bytes(b"hi".to_vec())).unwrap(),
            Value::String("aGk=".to_string())
        );

        let m = mapper(r#""string""#, r#""bytes""#).unwrap();
        assert_eq!(
            m.convert(Value::String("aGk=".to_string())).unwrap(),
            Value::Bytes(b"hi".to_vec())
        );
    }

    #[test]
    fn test_incompatible_falls_back_to_default() {
        let m = AvroDataMapperFactory::create_mapper(
            &Schema::Boolean,
            &parse(r#"{"type": "array", "items": "int"}"#),
            Some(&json!([1, 2])),
        )
        .unwrap();
        assert_eq!(
            m.convert(Value::Boolean(true)).unwrap(),
            Value::Array(vec![Value::Int(1), Value::Int(2)])
        );

        let m = AvroDataMapperFactory::create_mapper(&Schema::Boolean, &Schema::Int, Some(&json!(null)))
            .unwrap();
        assert_eq!(m.convert(Value::Boolean(true)).unwrap(), Value::Null);
    }

    #[test]
    fn test_array_and_map_elements() {
        let m = mapper(
            r#"{"type": "array", "items": "int"}"#,
            r#"{"type": "array", "items": "long"}"#,
        )
        .unwrap();
        assert_eq!(
            m.convert(Value::Array(vec![Value::Int(1)])).unwrap(),
            Value::Array(vec![Value::Long(1)])
        );

        let m = mapper(
            r#"{"type": "map", "values": "float"}"#,
            r#"{"type": "map", "values": "double"}"#,
        )
        .unwrap();
        let input = Value::Map(HashMap::from([("a".to_string(), Value::Float(0.5))]));
        assert_eq!(
            m.convert(input).unwrap(),
            Value::Map(HashMap::from([("a".to_string(), Value::Double(0.5))]))
        );

        assert!(mapper(r#"{"type": "array", "items": "int"}"#, r#""int""#).is_err());
    }

    #[test]
    fn test_recursive_records_are_rejected() {
        let from = r#"{"type": "record", "name": "Node", "fields": [
            {"name": "value", "type": "int"},
            {"name": "next", "type": ["null", "Node"]}
        ]}"#;
        let to = r#"{"type": "record", "name": "Node", "fields": [
            {"name": "value", "type": "long"},
            {"name": "next", "type": ["null", "Node"]}
        ]}"#;
        let err = mapper(from, to).unwrap_err();
        assert!(matches!(err, MapperError::SchemaIncompatible(_)));
    }
}
