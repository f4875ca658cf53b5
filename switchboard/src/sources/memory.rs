//! In-process store.
//!
//! Sessions are handed out by a bounded deadpool pool, so acquisition
//! timeouts behave like they do against a real server.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deadpool::Runtime;
use deadpool::managed;
use deadpool::managed::Object;
use deadpool::managed::Pool;
use deadpool::managed::PoolError;
use parking_lot::RwLock;
use uuid::Uuid;

use super::DataSource;
use super::EntityKind;
use super::Filter;
use super::Identity;
use super::Record;
use super::stamp;
use crate::configuration::MemoryConfig;
use crate::error::SourceError;
use crate::json_ext::Value;

#[derive(Debug, Default)]
struct Collection {
    records: Vec<Record>,
    last_id: u64,
}

#[derive(Debug)]
pub(crate) struct Session;

#[derive(Debug)]
pub(crate) struct SessionManager;

impl managed::Manager for SessionManager {
    type Type = Session;
    type Error = Infallible;

    async fn create(&self) -> Result<Session, Self::Error> {
        Ok(Session)
    }

    async fn recycle(
        &self,
        _session: &mut Session,
        _metrics: &managed::Metrics,
    ) -> managed::RecycleResult<Self::Error> {
        Ok(())
    }
}

/// A store keeping records in process memory.
#[derive(Clone)]
pub struct MemoryStore {
    name: Arc<String>,
    collections: Arc<RwLock<HashMap<EntityKind, Collection>>>,
    pool: Pool<SessionManager>,
    acquire_timeout: Duration,
    latency: Option<Duration>,
}

impl MemoryStore {
    pub fn new(name: &str, config: &MemoryConfig) -> Result<Self, SourceError> {
        let pool = Pool::builder(SessionManager)
            .max_size(config.pool_size)
            .wait_timeout(Some(config.acquire_timeout))
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|err| SourceError::store_operation(name, err))?;

        Ok(Self {
            name: Arc::new(name.to_string()),
            collections: Default::default(),
            pool,
            acquire_timeout: config.acquire_timeout,
            latency: config.latency,
        })
    }

    async fn session(&self) -> Result<Object<SessionManager>, SourceError> {
        let session = self.pool.get().await.map_err(|err| match err {
            PoolError::Timeout(_) => SourceError::ConnectionTimeout {
                source_name: self.name.to_string(),
                timeout: self.acquire_timeout.into(),
            },
            err => SourceError::store_operation(&self.name, err),
        })?;
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        Ok(session)
    }
}

#[async_trait]
impl DataSource for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find_many(
        &self,
        kind: EntityKind,
        filter: &Filter,
    ) -> Result<Vec<Record>, SourceError> {
        let _session = self.session().await?;
        let collections = self.collections.read();
        Ok(collections
            .get(&kind)
            .map(|collection| {
                collection
                    .records
                    .iter()
                    .filter(|record| filter.matches(record))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create(&self, kind: EntityKind, fields: Record) -> Result<Record, SourceError> {
        let _session = self.session().await?;
        let mut collections = self.collections.write();
        let collection = collections.entry(kind).or_default();
        let identifier = match kind.identity() {
            Identity::Opaque => Value::String(Uuid::new_v4().simple().to_string().into()),
            Identity::Sequential => {
                collection.last_id += 1;
                Value::from(collection.last_id)
            }
        };
        let record = stamp(kind, fields, identifier);
        collection.records.push(record.clone());
        tracing::debug!(source = %self.name, %kind, "record created");
        Ok(record)
    }

    async fn prepare(&self) -> Result<(), SourceError> {
        self.session().await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;

    fn store(pool_size: usize, acquire_timeout: Duration, latency: Option<Duration>) -> MemoryStore {
        MemoryStore::new(
            "memory",
            &MemoryConfig {
                pool_size,
                acquire_timeout,
                latency,
            },
        )
        .unwrap()
    }

    fn fields(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn sequential_and_opaque_identifiers() {
        let store = store(1, Duration::from_secs(1), None);

        let first = store
            .create(EntityKind::Message, fields(json!({ "text": "a" })))
            .await
            .unwrap();
        let second = store
            .create(EntityKind::Message, fields(json!({ "text": "b" })))
            .await
            .unwrap();
        assert_eq!(first.get("id"), Some(&json!(1)));
        assert_eq!(second.get("id"), Some(&json!(2)));

        let user = store
            .create(EntityKind::User, fields(json!({ "email": "a@b.c" })))
            .await
            .unwrap();
        let id = user.get("userID").and_then(Value::as_str).unwrap();
        assert_eq!(id.len(), 32);
    }

    #[tokio::test]
    async fn find_in_insertion_order() {
        let store = store(2, Duration::from_secs(1), None);
        for text in ["one", "two", "three"] {
            store
                .create(
                    EntityKind::Message,
                    fields(json!({ "text": text, "sentBy": "u1" })),
                )
                .await
                .unwrap();
        }

        let texts: Vec<_> = store
            .find_many(EntityKind::Message, &Filter::all())
            .await
            .unwrap()
            .into_iter()
            .map(|record| record.get("text").cloned().unwrap())
            .collect();
        assert_eq!(texts, [json!("one"), json!("two"), json!("three")]);

        let found = store
            .find_one(EntityKind::Message, &Filter::all().eq("id", "2"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.get("text"), Some(&json!("two")));
        assert!(
            store
                .find_one(EntityKind::User, &Filter::all().eq("userID", "nope"))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn acquire_times_out_when_pool_is_busy() {
        let store = store(
            1,
            Duration::from_millis(20),
            Some(Duration::from_millis(200)),
        );
        let filter = Filter::all();
        let (first, second) = tokio::join!(
            store.find_many(EntityKind::User, &filter),
            store.find_many(EntityKind::User, &filter),
        );
        let timeouts = [&first, &second]
            .into_iter()
            .filter(|result| {
                matches!(result, Err(SourceError::ConnectionTimeout { source_name, .. }) if source_name == "memory")
            })
            .count();
        assert_eq!(timeouts, 1);
        assert!(first.is_ok() || second.is_ok());
    }
}
