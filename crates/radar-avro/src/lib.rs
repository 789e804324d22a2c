//! Avro support for the RADAR REST producer
//!
//! - [`mapper`]: converters between two versions of a schema
//! - [`default`]: JSON field defaults as Avro values
//! - [`json`]: Avro JSON encoding of values
//! - [`topic`]: topics and single-key record batches

pub mod default;
pub mod error;
pub mod json;
pub mod mapper;
mod names;
pub mod topic;

pub use default::default_value;
pub use error::{MapperError, Result};
pub use json::encode_json;
pub use mapper::{AvroDataMapper, AvroDataMapperFactory};
pub use topic::{record_field, AvroTopic, RecordData};

pub use apache_avro::types::Value;
pub use apache_avro::Schema;
