use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, FromRow};

use crate::error::{CohortError, Result};
use crate::filter::qualified;
use crate::models::{Source, SourceRole};

/// Opens connection pools for warehouses registered in the metadata store.
#[async_trait]
pub trait WarehouseConnector: Send + Sync {
    async fn connect(&self, source: &Source) -> Result<AnyPool>;
}

/// Treats `source.source_connection` as a database URL understood by the `Any` driver.
pub struct UrlConnector {
    max_connections: u32,
}

impl UrlConnector {
    pub fn new(max_connections: u32) -> Self {
        Self { max_connections }
    }
}

#[async_trait]
impl WarehouseConnector for UrlConnector {
    async fn connect(&self, source: &Source) -> Result<AnyPool> {
        tracing::info!(source_id = source.source_id, source_name = %source.source_name, "Connecting to warehouse");
        let pool = AnyPoolOptions::new()
            .max_connections(self.max_connections)
            .connect(&source.source_connection)
            .await?;
        Ok(pool)
    }
}

/// A live pool plus the schema that qualifies tables for one role.
#[derive(Debug, Clone)]
pub struct DataSource {
    pub source_id: i64,
    pub role: SourceRole,
    pub schema: String,
    pool: AnyPool,
    query_timeout: Duration,
}

impl DataSource {
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn table(&self, name: &str) -> String {
        qualified(&self.schema, name)
    }

    pub async fn fetch_count(&self, sql: &str) -> Result<i64> {
        tracing::debug!(source_id = self.source_id, role = %self.role, sql = %sql, "Running count query");
        bounded(
            self.query_timeout,
            sqlx::query_scalar::<_, i64>(sql).fetch_one(&self.pool),
        )
        .await
    }

    pub async fn fetch_all<T>(&self, sql: &str) -> Result<Vec<T>>
    where
        T: for<'r> FromRow<'r, AnyRow> + Send + Unpin,
    {
        tracing::debug!(source_id = self.source_id, role = %self.role, sql = %sql, "Running query");
        bounded(
            self.query_timeout,
            sqlx::query_as::<_, T>(sql).fetch_all(&self.pool),
        )
        .await
    }

    /// Like [`DataSource::fetch_all`] with one text argument bound to `$1`.
    pub async fn fetch_all_bound<T>(&self, sql: &str, value: &str) -> Result<Vec<T>>
    where
        T: for<'r> FromRow<'r, AnyRow> + Send + Unpin,
    {
        tracing::debug!(source_id = self.source_id, role = %self.role, sql = %sql, "Running query");
        bounded(
            self.query_timeout,
            sqlx::query_as::<_, T>(sql)
                .bind(value.to_string())
                .fetch_all(&self.pool),
        )
        .await
    }
}

/// Applies the per-query ceiling. Timed-out queries are reported, never retried.
pub(crate) async fn bounded<T, F>(limit: Duration, query: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(limit, query).await {
        Ok(result) => Ok(result?),
        Err(_) => {
            tracing::warn!(timeout = ?limit, "Query exceeded timeout");
            Err(CohortError::Timeout(limit))
        }
    }
}

/// Resolves `(source id, role)` to a [`DataSource`].
///
/// Pools and schema qualifiers are cached for the life of the resolver;
/// call [`SourceResolver::invalidate`] after the metadata store changes.
pub struct SourceResolver {
    metadata: AnyPool,
    metadata_schema: String,
    connector: Arc<dyn WarehouseConnector>,
    query_timeout: Duration,
    pools: RwLock<HashMap<i64, AnyPool>>,
    schemas: RwLock<HashMap<(i64, SourceRole), String>>,
}

impl SourceResolver {
    pub fn new(
        metadata: AnyPool,
        metadata_schema: impl Into<String>,
        connector: Arc<dyn WarehouseConnector>,
        query_timeout: Duration,
    ) -> Self {
        Self {
            metadata,
            metadata_schema: metadata_schema.into(),
            connector,
            query_timeout,
            pools: RwLock::new(HashMap::new()),
            schemas: RwLock::new(HashMap::new()),
        }
    }

    /// Pool of the metadata store itself, qualified by `metadata_schema`.
    pub fn metadata(&self) -> DataSource {
        DataSource {
            source_id: 0,
            role: SourceRole::Misc,
            schema: self.metadata_schema.clone(),
            pool: self.metadata.clone(),
            query_timeout: self.query_timeout,
        }
    }

    pub fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    pub async fn source(&self, source_id: i64) -> Result<Source> {
        let sql = format!(
            "SELECT source_id, source_name, source_connection, source_dialect FROM {} WHERE source_id = {}",
            qualified(&self.metadata_schema, "source"),
            source_id
        );
        let mut sources: Vec<Source> = self.metadata().fetch_all(&sql).await?;
        sources.pop().ok_or(CohortError::SourceNotFound(source_id))
    }

    /// Looks a source up by its display name; `None` when no source carries it.
    pub async fn source_by_name(&self, source_name: &str) -> Result<Option<Source>> {
        let sql = format!(
            "SELECT source_id, source_name, source_connection, source_dialect FROM {} WHERE source_name = $1",
            qualified(&self.metadata_schema, "source")
        );
        let mut sources: Vec<Source> = self.metadata().fetch_all_bound(&sql, source_name).await?;
        Ok(sources.pop())
    }

    pub async fn resolve(&self, source_id: i64, role: SourceRole) -> Result<DataSource> {
        let pool = self.pool_for(source_id).await?;
        let schema = self.schema_for(source_id, role).await?;
        Ok(DataSource {
            source_id,
            role,
            schema,
            pool,
            query_timeout: self.query_timeout,
        })
    }

    /// Drops every cached pool and schema qualifier.
    pub fn invalidate(&self) {
        self.pools.write().clear();
        self.schemas.write().clear();
        tracing::info!("Source resolver cache invalidated");
    }

    pub fn cached_schema_count(&self) -> usize {
        self.schemas.read().len()
    }

    async fn pool_for(&self, source_id: i64) -> Result<AnyPool> {
        let cached = self.pools.read().get(&source_id).cloned();
        if let Some(pool) = cached {
            return Ok(pool);
        }

        let source = self.source(source_id).await?;
        let pool = self.connector.connect(&source).await?;

        // A concurrent resolve may have connected first; keep whichever landed.
        let mut pools = self.pools.write();
        let pool = pools.entry(source_id).or_insert(pool).clone();
        Ok(pool)
    }

    async fn schema_for(&self, source_id: i64, role: SourceRole) -> Result<String> {
        let Some(daimon_type) = role.daimon_type() else {
            return role
                .fixed_schema()
                .map(str::to_string)
                .ok_or(CohortError::SchemaNotFound { source_id, role });
        };

        let cached = self.schemas.read().get(&(source_id, role)).cloned();
        if let Some(schema) = cached {
            return Ok(schema);
        }

        let sql = format!(
            "SELECT source_daimon.table_qualifier FROM {source} source \
             INNER JOIN {daimon} source_daimon ON source_daimon.source_id = source.source_id \
             WHERE source.source_id = {source_id} AND source_daimon.daimon_type = {daimon_type}",
            source = qualified(&self.metadata_schema, "source"),
            daimon = qualified(&self.metadata_schema, "source_daimon"),
        );
        let qualifiers: Vec<(String,)> = self.metadata().fetch_all(&sql).await?;
        let schema = qualifiers
            .into_iter()
            .next()
            .map(|(schema,)| schema)
            .ok_or(CohortError::SchemaNotFound { source_id, role })?;

        tracing::debug!(source_id, role = %role, schema = %schema, "Resolved schema");
        self.schemas
            .write()
            .insert((source_id, role), schema.clone());
        Ok(schema)
    }
}
