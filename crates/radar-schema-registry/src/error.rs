//! Schema Registry Error Types
//!
//! Errors are `Clone` because failed lookups are cached and replayed to every
//! caller for the cache's exception duration.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SchemaError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// The registry answered 404, or knows the subject but not this schema.
    #[error("Schema not found: {0}")]
    NotFound(String),

    /// Any other non-2xx registry response.
    #[error("Schema registry request failed with status {status}: {body}")]
    Registry { status: u16, body: String },

    /// Transport failure; the request may not have reached the registry.
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),
}

impl SchemaError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, SchemaError::NotFound(_))
    }
}

impl From<reqwest::Error> for SchemaError {
    fn from(err: reqwest::Error) -> Self {
        SchemaError::Io(err.to_string())
    }
}

impl From<apache_avro::Error> for SchemaError {
    fn from(err: apache_avro::Error) -> Self {
        SchemaError::InvalidSchema(err.to_string())
    }
}
