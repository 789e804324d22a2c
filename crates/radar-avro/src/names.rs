//! Named type lookup for resolving `Schema::Ref`.

use crate::error::{MapperError, Result};
use apache_avro::schema::{EnumSchema, FixedSchema, Name, RecordSchema, Schema};
use std::collections::HashMap;

/// Named types of a root schema, keyed by full name and by simple name.
pub(crate) type Names<'a> = HashMap<String, &'a Schema>;

pub(crate) fn names_of(schema: &Schema) -> Names<'_> {
    let mut names = Names::new();
    collect(schema, &mut names);
    names
}

fn collect<'a>(schema: &'a Schema, names: &mut Names<'a>) {
    match schema {
        Schema::Record(RecordSchema { name, fields, .. }) => {
            if insert(names, name, schema) {
                for field in fields {
                    collect(&field.schema, names);
                }
            }
        }
        Schema::Enum(EnumSchema { name, .. }) | Schema::Fixed(FixedSchema { name, .. }) => {
            insert(names, name, schema);
        }
        Schema::Array(items) | Schema::Map(items) => collect(items, names),
        Schema::Union(union) => {
            for variant in union.variants() {
                collect(variant, names);
            }
        }
        _ => {}
    }
}

/// Returns false if the type was already known.
fn insert<'a>(names: &mut Names<'a>, name: &Name, schema: &'a Schema) -> bool {
    let fullname = name.fullname(None);
    if names.contains_key(&fullname) {
        return false;
    }
    names.insert(fullname, schema);
    names.entry(name.name.clone()).or_insert(schema);
    true
}

/// Follow a `Schema::Ref` to its definition; other schemas are returned as is.
pub(crate) fn resolve<'a>(schema: &'a Schema, names: &Names<'a>) -> Result<&'a Schema> {
    match schema {
        Schema::Ref { name } => names
            .get(&name.fullname(None))
            .or_else(|| names.get(&name.name))
            .copied()
            .ok_or_else(|| {
                MapperError::SchemaIncompatible(format!(
                    "Unknown named type {}",
                    name.fullname(None)
                ))
            }),
        other => Ok(other),
    }
}
