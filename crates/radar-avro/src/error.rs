//! Avro Mapping Error Types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MapperError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MapperError {
    /// No mapper can be built between two schemas and no default value was
    /// available to fall back on.
    #[error("Schemas are incompatible: {0}")]
    SchemaIncompatible(String),

    /// A value does not fit the schema its mapper was built for.
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Encoding error: {0}")]
    Encoding(String),
}

impl From<apache_avro::Error> for MapperError {
    fn from(err: apache_avro::Error) -> Self {
        MapperError::Encoding(err.to_string())
    }
}
