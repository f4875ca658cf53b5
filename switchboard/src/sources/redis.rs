//! Document store backed by Redis.
//!
//! Each record is a JSON document stored under `{namespace}:{collection}:{id}`.
//! Insertion order is kept in a list at `{namespace}:{collection}`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::Connection;
use deadpool_redis::Pool;
use deadpool_redis::PoolConfig;
use deadpool_redis::PoolError;
use deadpool_redis::Runtime;
use redis::Pipeline;
use uuid::Uuid;

use super::DataSource;
use super::EntityKind;
use super::Filter;
use super::Identity;
use super::Record;
use super::stamp;
use crate::configuration::RedisConfig;
use crate::error::SourceError;
use crate::json_ext::Value;

/// A store keeping records as JSON documents in Redis.
#[derive(Clone)]
pub struct RedisStore {
    name: Arc<String>,
    pool: Pool,
    namespace: Arc<String>,
    acquire_timeout: Duration,
}

impl RedisStore {
    pub fn new(name: &str, config: &RedisConfig) -> Result<Self, SourceError> {
        let mut pool_config = PoolConfig::new(config.pool_size);
        pool_config.timeouts.wait = Some(config.acquire_timeout);
        pool_config.timeouts.create = Some(config.acquire_timeout);
        pool_config.timeouts.recycle = Some(config.acquire_timeout);

        let mut redis_config = deadpool_redis::Config::from_url(config.url.as_str());
        redis_config.pool = Some(pool_config);
        let pool = redis_config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|err| SourceError::store_operation(name, err))?;

        Ok(Self {
            name: Arc::new(name.to_string()),
            pool,
            namespace: Arc::new(config.namespace.clone()),
            acquire_timeout: config.acquire_timeout,
        })
    }

    async fn connection(&self) -> Result<Connection, SourceError> {
        self.pool.get().await.map_err(|err| match err {
            PoolError::Timeout(_) => SourceError::ConnectionTimeout {
                source_name: self.name.to_string(),
                timeout: self.acquire_timeout.into(),
            },
            err => self.store_error(err),
        })
    }

    fn store_error(&self, err: impl std::fmt::Display) -> SourceError {
        tracing::error!(source = %self.name, "redis operation failed: {err}");
        SourceError::store_operation(&self.name, err)
    }

    fn index_key(&self, kind: EntityKind) -> String {
        format!("{}:{}", self.namespace, kind.collection())
    }

    fn record_key(&self, kind: EntityKind, id: &str) -> String {
        format!("{}:{}:{id}", self.namespace, kind.collection())
    }

    fn sequence_key(&self, kind: EntityKind) -> String {
        format!("{}:{}:sequence", self.namespace, kind.collection())
    }

    fn parse_document(&self, document: &str) -> Result<Record, SourceError> {
        serde_json::from_str(document).map_err(|err| self.store_error(err))
    }

    async fn get(
        &self,
        connection: &mut Connection,
        kind: EntityKind,
        id: &str,
    ) -> Result<Option<Record>, SourceError> {
        let document: Option<String> = redis::cmd("GET")
            .arg(self.record_key(kind, id))
            .query_async(connection)
            .await
            .map_err(|err| self.store_error(err))?;
        document
            .map(|document| self.parse_document(&document))
            .transpose()
    }
}

#[async_trait]
impl DataSource for RedisStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find_many(
        &self,
        kind: EntityKind,
        filter: &Filter,
    ) -> Result<Vec<Record>, SourceError> {
        let mut connection = self.connection().await?;
        let ids: Vec<String> = redis::cmd("LRANGE")
            .arg(self.index_key(kind))
            .arg(0)
            .arg(-1)
            .query_async(&mut connection)
            .await
            .map_err(|err| self.store_error(err))?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        // One GET per key rather than MGET keeps this working on clusters.
        let mut pipeline = Pipeline::with_capacity(ids.len());
        for id in &ids {
            pipeline.get(self.record_key(kind, id));
        }
        let documents: Vec<Option<String>> = pipeline
            .query_async(&mut connection)
            .await
            .map_err(|err| self.store_error(err))?;

        let mut records = Vec::with_capacity(documents.len());
        // Index entries without a document are skipped.
        for document in documents.into_iter().flatten() {
            let record = self.parse_document(&document)?;
            if filter.matches(&record) {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn find_one(
        &self,
        kind: EntityKind,
        filter: &Filter,
    ) -> Result<Option<Record>, SourceError> {
        match filter.identifier_lookup(kind) {
            Some(id) => {
                let mut connection = self.connection().await?;
                Ok(self
                    .get(&mut connection, kind, &id)
                    .await?
                    .filter(|record| filter.matches(record)))
            }
            None => Ok(self.find_many(kind, filter).await?.into_iter().next()),
        }
    }

    async fn create(&self, kind: EntityKind, fields: Record) -> Result<Record, SourceError> {
        let mut connection = self.connection().await?;
        let (id, identifier) = match kind.identity() {
            Identity::Opaque => {
                let id = Uuid::new_v4().simple().to_string();
                (id.clone(), Value::String(id.into()))
            }
            Identity::Sequential => {
                let id: u64 = redis::cmd("INCR")
                    .arg(self.sequence_key(kind))
                    .query_async(&mut connection)
                    .await
                    .map_err(|err| self.store_error(err))?;
                (id.to_string(), Value::from(id))
            }
        };

        let record = stamp(kind, fields, identifier);
        let document = serde_json::to_string(&record).map_err(|err| self.store_error(err))?;
        redis::pipe()
            .atomic()
            .set(self.record_key(kind, &id), document)
            .ignore()
            .rpush(self.index_key(kind), &id)
            .ignore()
            .query_async::<()>(&mut connection)
            .await
            .map_err(|err| self.store_error(err))?;
        tracing::debug!(source = %self.name, %kind, %id, "record created");
        Ok(record)
    }

    async fn prepare(&self) -> Result<(), SourceError> {
        let mut connection = self.connection().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut connection)
            .await
            .map_err(|err| self.store_error(err))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;

    fn config(namespace: &str) -> RedisConfig {
        RedisConfig {
            url: std::env::var("SWITCHBOARD_TEST_REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            namespace: namespace.to_string(),
            pool_size: 2,
            acquire_timeout: Duration::from_secs(2),
        }
    }

    #[test]
    fn keys_are_namespaced() {
        let store = RedisStore::new("users", &config("chat")).unwrap();
        assert_eq!(store.index_key(EntityKind::User), "chat:users");
        assert_eq!(store.record_key(EntityKind::User, "abc"), "chat:users:abc");
        assert_eq!(store.sequence_key(EntityKind::Message), "chat:messages:sequence");
    }

    #[tokio::test]
    #[ignore = "requires a redis server on localhost:6379"]
    async fn create_and_find() {
        let namespace = format!("switchboard-test-{}", Uuid::new_v4().simple());
        let store = RedisStore::new("users", &config(&namespace)).unwrap();
        store.prepare().await.unwrap();

        let created = store
            .create(
                EntityKind::User,
                json!({ "email": "ada@example.com", "firstName": "Ada" })
                    .as_object()
                    .cloned()
                    .unwrap(),
            )
            .await
            .unwrap();
        let id = created.get("userID").cloned().unwrap();

        let all = store
            .find_many(EntityKind::User, &Filter::all())
            .await
            .unwrap();
        assert_eq!(all, vec![created.clone()]);

        let found = store
            .find_one(EntityKind::User, &Filter::all().eq("userID", id))
            .await
            .unwrap();
        assert_eq!(found, Some(created));
    }
}
