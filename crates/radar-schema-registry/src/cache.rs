//! Schema Cache
//!
//! Caches registry lookups in three keyed maps of [`TimedCache`]s:
//!
//! - by ID: `id → Schema`
//! - by schema: `(subject, schema JSON) → SchemaMetadata`
//! - by version: `(subject, version) → SchemaMetadata`, where version 0 is
//!   the latest version
//!
//! Every resolved metadata is also written into the other maps, so a schema
//! fetched by version is known by ID and by content without further
//! requests. Entries are dropped lazily by [`SchemaCache::prune_cache`].

use crate::client::SchemaRegistryClient;
use crate::error::{Result, SchemaError};
use crate::types::{schema_json, subject, SchemaMetadata};
use apache_avro::Schema;
use dashmap::DashMap;
use radar_core::{CacheConfig, TimedCache};
use std::hash::Hash;
use std::sync::Arc;
use tracing::debug;

type MetadataCache = Arc<TimedCache<SchemaMetadata, SchemaError>>;
type IdCache = Arc<TimedCache<Arc<Schema>, SchemaError>>;

/// TTL cache in front of a [`SchemaRegistryClient`].
pub struct SchemaCache {
    client: Arc<SchemaRegistryClient>,
    config: CacheConfig,
    by_id: DashMap<i32, IdCache>,
    by_schema: DashMap<(String, String), MetadataCache>,
    by_version: DashMap<(String, i32), MetadataCache>,
}

impl SchemaCache {
    /// Create a cache with the default 1-day refresh and 1-minute retry.
    pub fn new(client: Arc<SchemaRegistryClient>) -> Self {
        Self::with_config(client, CacheConfig::default())
    }

    pub fn with_config(client: Arc<SchemaRegistryClient>, config: CacheConfig) -> Self {
        Self {
            client,
            config,
            by_id: DashMap::new(),
            by_schema: DashMap::new(),
            by_version: DashMap::new(),
        }
    }

    pub fn client(&self) -> &Arc<SchemaRegistryClient> {
        &self.client
    }

    /// Get a schema by its registry ID.
    pub async fn get_by_id(&self, id: i32) -> Result<Arc<Schema>> {
        let cache = self.id_cache(id);
        cache.get().await
    }

    /// Get the metadata of a subject's schema version; `version <= 0` is the
    /// latest version.
    pub async fn get_by_subject_and_version(
        &self,
        subject: &str,
        version: i32,
    ) -> Result<SchemaMetadata> {
        let version = version.max(0);
        let cache = self.version_cache(subject, version);
        let metadata = cache.get().await?;
        self.populate(subject, &metadata);
        Ok(metadata)
    }

    /// Get the metadata of a topic's key or value schema version;
    /// `version <= 0` is the latest version.
    pub async fn get_by_version(
        &self,
        topic: &str,
        of_value: bool,
        version: i32,
    ) -> Result<SchemaMetadata> {
        self.get_by_subject_and_version(&subject(topic, of_value), version)
            .await
    }

    /// Get the registry metadata of a topic's key or value schema by content.
    ///
    /// # Errors
    /// `SchemaError::NotFound` if the schema is not registered under the
    /// topic's subject. It is not registered implicitly; use
    /// [`add_schema`](Self::add_schema).
    pub async fn metadata(
        &self,
        topic: &str,
        of_value: bool,
        schema: &Schema,
    ) -> Result<SchemaMetadata> {
        let subject = subject(topic, of_value);
        let cache = self.schema_cache(&subject, schema)?;
        let metadata = cache.get().await?;
        self.populate(&subject, &metadata);
        Ok(metadata)
    }

    /// Register a topic's key or value schema and cache the result.
    pub async fn add_schema(
        &self,
        topic: &str,
        of_value: bool,
        schema: &Schema,
    ) -> Result<SchemaMetadata> {
        let subject = subject(topic, of_value);
        let metadata = self.client.add_schema(&subject, schema).await?;
        debug!(subject = %subject, schema_id = metadata.id, "Registered schema");
        self.populate(&subject, &metadata);
        Ok(metadata)
    }

    /// Forget the cached latest version of a topic's key or value schema so
    /// the next lookup asks the registry again.
    pub fn invalidate_latest(&self, topic: &str, of_value: bool) {
        let key = (subject(topic, of_value), 0);
        if let Some(cache) = self.by_version.get(&key) {
            debug!(subject = %key.0, "Invalidating cached latest schema");
            cache.clear();
        }
    }

    /// Remove entries that are empty, past their refresh duration, or hold
    /// an expired failure. Entries with a computation in flight are kept.
    pub fn prune_cache(&self) {
        self.by_id.retain(|_, cache| !cache.is_stale());
        self.by_schema.retain(|_, cache| !cache.is_stale());
        self.by_version.retain(|_, cache| !cache.is_stale());
        debug!(
            by_id = self.by_id.len(),
            by_schema = self.by_schema.len(),
            by_version = self.by_version.len(),
            "Pruned schema cache"
        );
    }

    /// Number of cached entries across all maps.
    pub fn len(&self) -> usize {
        self.by_id.len() + self.by_schema.len() + self.by_version.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cross-populate all maps with resolved metadata. Slots already holding
    /// a fresh value are left alone.
    fn populate(&self, subject: &str, metadata: &SchemaMetadata) {
        set_if_absent(&self.id_cache(metadata.id), || Arc::clone(&metadata.schema));

        if let Ok(cache) = self.schema_cache(subject, &metadata.schema) {
            set_if_absent(&cache, || metadata.clone());
        }

        if let Some(version) = metadata.version.filter(|v| *v > 0) {
            set_if_absent(&self.version_cache(subject, version), || metadata.clone());
        }
    }

    fn id_cache(&self, id: i32) -> IdCache {
        let client = Arc::clone(&self.client);
        entry(&self.by_id, id, || {
            TimedCache::new(self.config, move || {
                let client = Arc::clone(&client);
                async move { client.retrieve_schema_by_id(id).await.map(Arc::new) }
            })
        })
    }

    fn version_cache(&self, subject: &str, version: i32) -> MetadataCache {
        let client = Arc::clone(&self.client);
        let owned = subject.to_string();
        entry(&self.by_version, (subject.to_string(), version), || {
            TimedCache::new(self.config, move || {
                let client = Arc::clone(&client);
                let subject = owned.clone();
                async move { client.retrieve_schema_metadata(&subject, version).await }
            })
        })
    }

    fn schema_cache(&self, subject: &str, schema: &Schema) -> Result<MetadataCache> {
        let json = schema_json(schema)?;
        let client = Arc::clone(&self.client);
        let owned_subject = subject.to_string();
        let owned_schema = Arc::new(schema.clone());
        Ok(entry(&self.by_schema, (subject.to_string(), json), || {
            TimedCache::new(self.config, move || {
                let client = Arc::clone(&client);
                let subject = owned_subject.clone();
                let schema = Arc::clone(&owned_schema);
                async move { client.request_metadata(&subject, &schema).await }
            })
        }))
    }
}

fn entry<K, T>(
    map: &DashMap<K, Arc<TimedCache<T, SchemaError>>>,
    key: K,
    create: impl FnOnce() -> TimedCache<T, SchemaError>,
) -> Arc<TimedCache<T, SchemaError>>
where
    K: Eq + Hash,
{
    map.entry(key)
        .or_insert_with(|| Arc::new(create()))
        .value()
        .clone()
}

fn set_if_absent<T>(cache: &TimedCache<T, SchemaError>, value: impl FnOnce() -> T)
where
    T: Clone + Send + Sync + 'static,
{
    if cache.get_cached().is_none() {
        cache.set(value());
    }
}
