//! Error types for REST sender operations.
//!
//! This module defines all errors that can occur while resolving schemas,
//! encoding records and sending them to the Kafka REST proxy.
//!
//! ## Error Handling Strategy
//!
//! - **Retryable errors**: `Io`, `Http` with a 5xx/408/429 status, transient
//!   `Registry` failures
//! - **Caller errors**: `InvalidRecords`, `SchemaIncompatible`, `Config`
//! - **Authentication errors**: `Authentication`, never retried; the sender
//!   stays unauthorized until `reset_connection()` succeeds
//! - **Negotiation errors**: `UnsupportedMediaType`, after every downgrade
//!   has been tried
//!
//! ## Examples
//!
//! ```ignore
//! use radar_client::{ClientError, TopicSender};
//!
//! match sender.send(key, value).await {
//!     Ok(()) => {}
//!     Err(ClientError::Authentication(msg)) => {
//!         eprintln!("Refresh credentials: {}", msg);
//!     }
//!     Err(e) if e.is_retryable() => eprintln!("Try again later: {}", e),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use radar_avro::MapperError;
use radar_schema_registry::SchemaError;
use thiserror::Error;

/// Convenience type alias for `Result<T, ClientError>`.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Error type for REST sender operations.
///
/// `Clone` so that failures can be cached, for example by the bearer token
/// holder.
///
/// ## Error Categories
///
/// - **Transport**: `Io`, `Http`
/// - **Schemas**: `Registry`, `SchemaIncompatible`
/// - **Access**: `Authentication`
/// - **Protocol**: `UnsupportedMediaType`
/// - **Input**: `InvalidRecords`, `Config`
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClientError {
    /// The request could not be sent or its response could not be read.
    ///
    /// ## Causes
    /// - REST proxy unreachable or DNS failure
    /// - Connection timeout
    /// - Connection reset while reading the response
    ///
    /// ## Resolution
    /// - Retry later, e.g. with `send_batch_with_retry`
    /// - Check `connection_state()`, which is `Disconnected` after this error
    #[error("I/O error: {0}")]
    Io(String),

    /// Schema registry lookup or registration failed.
    #[error("Schema registry error: {0}")]
    Registry(#[from] SchemaError),

    /// The proxy rejected the credentials (HTTP 401 or 403).
    ///
    /// ## Causes
    /// - Bearer token expired or revoked
    /// - Client lacks permission for the topic
    ///
    /// ## Resolution
    /// - Renew credentials and call `reset_connection()`. Until then every
    ///   send fails fast with this error.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Local data cannot be converted to the registry schema.
    ///
    /// ## Causes
    /// - Registry schema requires a field the local schema lacks
    /// - Key has no `sourceId` field for binary encoding
    ///
    /// ## Resolution
    /// - Evolve the schema with defaults for new fields
    #[error("Schema incompatible: {0}")]
    SchemaIncompatible(String),

    /// The proxy rejected every content type and Accept header we offer.
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// The proxy answered with an unexpected status.
    ///
    /// `request` holds a truncated preview of the request body and
    /// `response` the response body, for diagnostics.
    #[error("REST proxy returned HTTP {status}: {response} (request: {request})")]
    Http {
        status: u16,
        request: String,
        response: String,
    },

    /// Records are malformed or do not match their schema.
    #[error("Invalid records: {0}")]
    InvalidRecords(String),

    /// Sender misconfiguration, detected when building it.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Whether the same request may succeed when sent again later.
    ///
    /// # Retryable Errors
    ///
    /// - `Io`: network failures and timeouts
    /// - `Http` with status 408, 429 or 5xx
    /// - `Registry` I/O failures and 5xx responses
    ///
    /// Authentication, schema and input errors are permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Io(_) => true,
            ClientError::Http { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            ClientError::Registry(SchemaError::Io(_)) => true,
            ClientError::Registry(SchemaError::Registry { status, .. }) => *status >= 500,
            _ => false,
        }
    }

    /// Whether this error means the credentials were rejected.
    pub fn is_authentication(&self) -> bool {
        matches!(self, ClientError::Authentication(_))
    }
}

impl From<MapperError> for ClientError {
    fn from(err: MapperError) -> Self {
        match err {
            MapperError::SchemaIncompatible(msg) => ClientError::SchemaIncompatible(msg),
            MapperError::InvalidValue(msg) | MapperError::Encoding(msg) => {
                ClientError::InvalidRecords(msg)
            }
        }
    }
}

impl From<apache_avro::Error> for ClientError {
    fn from(err: apache_avro::Error) -> Self {
        ClientError::InvalidRecords(err.to_string())
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16) -> ClientError {
        ClientError::Http {
            status,
            request: String::new(),
            response: String::new(),
        }
    }

    #[test]
    fn test_transient_errors_are_retryable() {
        assert!(ClientError::Io("reset".to_string()).is_retryable());
        assert!(http(503).is_retryable());
        assert!(http(429).is_retryable());
        assert!(ClientError::Registry(SchemaError::Io("timeout".to_string())).is_retryable());
        assert!(ClientError::Registry(SchemaError::Registry {
            status: 502,
            body: String::new()
        })
        .is_retryable());
    }

    #[test]
    fn test_permanent_errors_are_not_retryable() {
        assert!(!http(400).is_retryable());
        assert!(!ClientError::Authentication("denied".to_string()).is_retryable());
        assert!(!ClientError::SchemaIncompatible("x".to_string()).is_retryable());
        assert!(!ClientError::Registry(SchemaError::NotFound("t-value".to_string())).is_retryable());
        assert!(!ClientError::UnsupportedMediaType("x".to_string()).is_retryable());
    }

    #[test]
    fn test_mapper_errors_convert() {
        assert_eq!(
            ClientError::from(MapperError::SchemaIncompatible("a".to_string())),
            ClientError::SchemaIncompatible("a".to_string())
        );
        assert_eq!(
            ClientError::from(MapperError::InvalidValue("b".to_string())),
            ClientError::InvalidRecords("b".to_string())
        );
    }

    #[test]
    fn test_http_error_display() {
        let err = ClientError::Http {
            status: 500,
            request: "{\"records\"".to_string(),
            response: "boom".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "REST proxy returned HTTP 500: boom (request: {\"records\")"
        );
    }
}
