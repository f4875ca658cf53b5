//! Data source adapters.
//!
//! Each adapter wraps one store behind [`DataSource`] and owns exactly one
//! connection pool. Records cross the boundary as plain JSON objects.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

use crate::configuration::SourceConfig;
use crate::error::SourceError;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;

pub(crate) mod memory;
pub(crate) mod postgres;
pub(crate) mod redis;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use redis::RedisStore;

/// A stored entity, keyed by attribute name.
pub type Record = Object;

/// The kinds of entity the gateway stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Message,
}

/// How new identifiers are allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
    /// Random opaque strings.
    Opaque,
    /// Increasing integers.
    Sequential,
}

impl EntityKind {
    /// The collection (or table) holding this kind of entity.
    pub fn collection(self) -> &'static str {
        match self {
            EntityKind::User => "users",
            EntityKind::Message => "messages",
        }
    }

    /// The identifying attribute.
    pub fn identifier(self) -> &'static str {
        match self {
            EntityKind::User => "userID",
            EntityKind::Message => "id",
        }
    }

    pub fn identity(self) -> Identity {
        match self {
            EntityKind::User => Identity::Opaque,
            EntityKind::Message => Identity::Sequential,
        }
    }

    /// Whether records carry `createdAt` and `updatedAt` timestamps.
    pub fn timestamped(self) -> bool {
        matches!(self, EntityKind::Message)
    }

    /// Attributes a GraphQL type backed by this entity may expose without a
    /// resolver. Stored secrets are never listed.
    pub fn attributes(self) -> &'static [&'static str] {
        match self {
            EntityKind::User => &["userID", "email", "firstName", "lastName"],
            EntityKind::Message => &["id", "sentBy", "text", "createdAt", "updatedAt"],
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::User => f.write_str("User"),
            EntityKind::Message => f.write_str("Message"),
        }
    }
}

/// A conjunction of attribute equality conditions.
///
/// Values are compared by their identifier form, so `"1"` matches `1`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    /// Matches every record.
    pub fn all() -> Self {
        Self::default()
    }

    /// Adds an `attribute == value` condition.
    pub fn eq(mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((attribute.into(), value.into()));
        self
    }

    pub fn conditions(&self) -> &[(String, Value)] {
        &self.conditions
    }

    pub fn is_all(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.conditions.iter().all(|(attribute, expected)| {
            match (record.get(attribute.as_str()), expected) {
                (None | Some(Value::Null), Value::Null) => true,
                (Some(actual), expected) => match (actual.as_identifier(), expected.as_identifier())
                {
                    (Some(actual), Some(expected)) => actual == expected,
                    _ => actual == expected,
                },
                (None, _) => false,
            }
        })
    }

    /// The identifier value when the filter is exactly an identifier lookup.
    pub(crate) fn identifier_lookup(&self, kind: EntityKind) -> Option<String> {
        match self.conditions.as_slice() {
            [(attribute, value)] if attribute == kind.identifier() => value.as_identifier(),
            _ => None,
        }
    }
}

/// A store of entity records.
///
/// Every method may fail with [`SourceError::ConnectionTimeout`] when no
/// connection is free within the configured acquisition timeout.
#[async_trait]
pub trait DataSource: Send + Sync + 'static {
    /// The source name, used in logs and errors.
    fn name(&self) -> &str;

    /// All records of `kind` matching `filter`, in storage order.
    async fn find_many(&self, kind: EntityKind, filter: &Filter)
    -> Result<Vec<Record>, SourceError>;

    /// The first record of `kind` matching `filter`.
    async fn find_one(
        &self,
        kind: EntityKind,
        filter: &Filter,
    ) -> Result<Option<Record>, SourceError> {
        Ok(self.find_many(kind, filter).await?.into_iter().next())
    }

    /// Stores a new record, returning it with its generated identifier.
    async fn create(&self, kind: EntityKind, fields: Record) -> Result<Record, SourceError>;

    /// Checks connectivity and prepares storage. Called once at startup.
    async fn prepare(&self) -> Result<(), SourceError> {
        Ok(())
    }
}

/// Creates the adapter described by `config`.
pub fn create_source(
    name: &str,
    config: &SourceConfig,
) -> Result<Arc<dyn DataSource>, SourceError> {
    Ok(match config {
        SourceConfig::Memory(config) => Arc::new(MemoryStore::new(name, config)?),
        SourceConfig::Redis(config) => Arc::new(RedisStore::new(name, config)?),
        SourceConfig::Postgres(config) => Arc::new(PostgresStore::new(name, config)?),
    })
}

/// Fills in the identifier (and timestamps) a store does not generate itself.
pub(crate) fn stamp(kind: EntityKind, mut fields: Record, identifier: Value) -> Record {
    fields.insert(kind.identifier(), identifier);
    if kind.timestamped() {
        let now = Value::String(chrono::Utc::now().to_rfc3339().into());
        fields.insert("createdAt", now.clone());
        fields.insert("updatedAt", now);
    }
    fields
}
