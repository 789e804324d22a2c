//! HTTP client for a Confluent-compatible Schema Registry
//!
//! Raw REST calls only. Nothing is cached or retried here; see
//! [`SchemaCache`](crate::SchemaCache) for the caching layer.
//!
//! | Operation | Request |
//! |---|---|
//! | [`retrieve_schema_metadata`](SchemaRegistryClient::retrieve_schema_metadata) | `GET /subjects/{subject}/versions/{version\|latest}` |
//! | [`add_schema`](SchemaRegistryClient::add_schema) | `POST /subjects/{subject}/versions` |
//! | [`request_metadata`](SchemaRegistryClient::request_metadata) | `POST /subjects/{subject}` |
//! | [`retrieve_schema_by_id`](SchemaRegistryClient::retrieve_schema_by_id) | `GET /schemas/ids/{id}` |

use crate::error::{Result, SchemaError};
use crate::types::{schema_json, SchemaMetadata, SchemaRequest, SchemaResponse};
use apache_avro::Schema;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;

const REGISTRY_CONTENT_TYPE: &str = "application/vnd.schemaregistry.v1+json";

/// HTTP client for Schema Registry operations
#[derive(Debug, Clone)]
pub struct SchemaRegistryClient {
    base_url: String,
    http_client: reqwest::Client,
}

/// Builder for [`SchemaRegistryClient`].
#[derive(Debug, Clone)]
pub struct SchemaRegistryClientBuilder {
    base_url: String,
    timeout: Duration,
    headers: Vec<(String, String)>,
}

impl SchemaRegistryClientBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Add a header sent with every registry request, e.g. `Authorization`.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn build(self) -> Result<SchemaRegistryClient> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(REGISTRY_CONTENT_TYPE));
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| SchemaError::Io(format!("Invalid header name {}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| SchemaError::Io(format!("Invalid header value: {}", e)))?;
            headers.insert(name, value);
        }

        let http_client = reqwest::Client::builder()
            .timeout(self.timeout)
            .default_headers(headers)
            .build()?;

        Ok(SchemaRegistryClient {
            base_url: self.base_url.trim_end_matches('/').to_string(),
            http_client,
        })
    }
}

impl SchemaRegistryClient {
    /// Create a builder for a client of the registry at `base_url`
    /// (e.g. "http://localhost:8081").
    pub fn builder(base_url: impl Into<String>) -> SchemaRegistryClientBuilder {
        SchemaRegistryClientBuilder {
            base_url: base_url.into(),
            timeout: Duration::from_secs(30),
            headers: Vec::new(),
        }
    }

    /// Create a client with default settings.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::builder(base_url).build()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Retrieve the metadata of a subject's schema version.
    ///
    /// # Arguments
    /// * `subject` - Subject name (e.g., "orders-value")
    /// * `version` - Version number; zero or negative selects the latest
    ///
    /// # Errors
    /// `SchemaError::NotFound` when the subject or version does not exist.
    pub async fn retrieve_schema_metadata(
        &self,
        subject: &str,
        version: i32,
    ) -> Result<SchemaMetadata> {
        let version_path = if version <= 0 {
            "latest".to_string()
        } else {
            version.to_string()
        };
        let url = format!("{}/subjects/{}/versions/{}", self.base_url, subject, version_path);

        let response = self.http_client.get(&url).send().await?;
        let body = check_status(response).await?;

        let id = body.id.ok_or_else(|| {
            SchemaError::InvalidSchema(format!("Registry response for {} has no id", subject))
        })?;
        let schema = parse_schema(body.schema.as_deref())?;

        tracing::debug!(
            subject = subject,
            schema_id = id,
            version = ?body.version,
            "Schema metadata retrieved"
        );

        Ok(SchemaMetadata::new(id, body.version, Arc::new(schema)))
    }

    /// Register a schema under a subject.
    ///
    /// Registering identical content again returns the existing ID. The
    /// registry does not report the version here, so the result has none.
    pub async fn add_schema(&self, subject: &str, schema: &Schema) -> Result<SchemaMetadata> {
        let url = format!("{}/subjects/{}/versions", self.base_url, subject);
        let json = schema_json(schema)?;

        let response = self.post(&url, &json).await?;
        let body = check_status(response).await?;

        let id = body.id.ok_or_else(|| {
            SchemaError::InvalidSchema(format!("Registration of {} returned no id", subject))
        })?;

        tracing::debug!(subject = subject, schema_id = id, "Schema registered");

        Ok(SchemaMetadata::new(id, body.version, Arc::new(schema.clone())))
    }

    /// Look up the ID and version of a schema in a subject without
    /// registering it.
    ///
    /// # Errors
    /// `SchemaError::NotFound` when the registry does not know this schema;
    /// callers may then register it with [`add_schema`](Self::add_schema).
    pub async fn request_metadata(
        &self,
        subject: &str,
        schema: &Schema,
    ) -> Result<SchemaMetadata> {
        let url = format!("{}/subjects/{}", self.base_url, subject);
        let json = schema_json(schema)?;

        let response = self.post(&url, &json).await?;
        let body = check_status(response).await?;

        let id = body.id.ok_or_else(|| {
            SchemaError::NotFound(format!("Schema not registered in subject {}", subject))
        })?;
        let schema = match body.schema.as_deref() {
            Some(text) => Arc::new(Schema::parse_str(text)?),
            None => Arc::new(schema.clone()),
        };

        tracing::debug!(
            subject = subject,
            schema_id = id,
            version = ?body.version,
            "Schema metadata requested"
        );

        Ok(SchemaMetadata::new(id, body.version, schema))
    }

    /// Retrieve a schema by its global ID.
    pub async fn retrieve_schema_by_id(&self, id: i32) -> Result<Schema> {
        let url = format!("{}/schemas/ids/{}", self.base_url, id);

        let response = self.http_client.get(&url).send().await?;
        let body = check_status(response).await?;
        let schema = parse_schema(body.schema.as_deref())?;

        tracing::debug!(schema_id = id, "Schema retrieved by id");

        Ok(schema)
    }

    async fn post(&self, url: &str, schema: &str) -> Result<reqwest::Response> {
        let body = serde_json::to_vec(&SchemaRequest { schema })
            .map_err(|e| SchemaError::InvalidSchema(e.to_string()))?;

        Ok(self
            .http_client
            .post(url)
            .header(CONTENT_TYPE, REGISTRY_CONTENT_TYPE)
            .body(body)
            .send()
            .await?)
    }
}

/// Map a registry response to its decoded body or an error.
async fn check_status(response: reqwest::Response) -> Result<SchemaResponse> {
    let status = response.status();
    let text = response.text().await?;

    if status == StatusCode::NOT_FOUND {
        return Err(SchemaError::NotFound(text));
    }
    if !status.is_success() {
        return Err(SchemaError::Registry {
            status: status.as_u16(),
            body: text,
        });
    }

    serde_json::from_str(&text).map_err(|e| {
        SchemaError::InvalidSchema(format!("Failed to parse registry response: {}", e))
    })
}

fn parse_schema(text: Option<&str>) -> Result<Schema> {
    let text = text.ok_or_else(|| {
        SchemaError::InvalidSchema("Registry response has no schema".to_string())
    })?;
    Ok(Schema::parse_str(text)?)
}
