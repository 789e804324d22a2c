//! Core primitives shared by the RADAR REST producer crates.
//!
//! - [`varint`]: ZigZag varints and the Avro `int`/`long`/`bytes`/`string`
//!   wire primitives
//! - [`cache`]: a lazily computed value with refresh, retry and error TTLs and
//!   single-flight recomputation

pub mod cache;
pub mod error;
pub mod varint;

pub use cache::{CacheConfig, CacheResult, CacheStats, TimedCache};
pub use error::{Error, Result};
