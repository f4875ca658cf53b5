//! Relational store backed by PostgreSQL.
//!
//! Tables are created by the migrations under `migrations/`. Rows are read
//! back as `to_jsonb(row)` and their snake_case columns mapped to record
//! attributes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use heck::ToLowerCamelCase;
use heck::ToSnakeCase;
use sqlx::PgPool;
use sqlx::Postgres;
use sqlx::QueryBuilder;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use uuid::Uuid;

use super::DataSource;
use super::EntityKind;
use super::Filter;
use super::Identity;
use super::Record;
use crate::configuration::PostgresConfig;
use crate::error::SourceError;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;

/// Attributes with a column in the entity's table.
fn stored_attributes(kind: EntityKind) -> &'static [&'static str] {
    match kind {
        EntityKind::User => &[
            "userID",
            "email",
            "firstName",
            "lastName",
            "passwordDigest",
            "createdAt",
        ],
        EntityKind::Message => &["id", "sentBy", "text", "createdAt", "updatedAt"],
    }
}

/// A store keeping records as rows in PostgreSQL.
#[derive(Clone)]
pub struct PostgresStore {
    name: Arc<String>,
    pool: PgPool,
    acquire_timeout: Duration,
}

impl PostgresStore {
    /// Creates the pool. Connections are opened on first use.
    pub fn new(name: &str, config: &PostgresConfig) -> Result<Self, SourceError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .connect_lazy(config.url.as_str())
            .map_err(|err| SourceError::store_operation(name, err))?;

        Ok(Self {
            name: Arc::new(name.to_string()),
            pool,
            acquire_timeout: config.acquire_timeout,
        })
    }

    fn sql_error(&self, err: sqlx::Error) -> SourceError {
        match err {
            sqlx::Error::PoolTimedOut => SourceError::ConnectionTimeout {
                source_name: self.name.to_string(),
                timeout: self.acquire_timeout.into(),
            },
            err => {
                tracing::error!(source = %self.name, "postgres operation failed: {err}");
                SourceError::store_operation(&self.name, err)
            }
        }
    }

    fn column(&self, kind: EntityKind, attribute: &str) -> Result<String, SourceError> {
        if stored_attributes(kind).contains(&attribute) {
            Ok(attribute.to_snake_case())
        } else {
            Err(SourceError::store_operation(
                &self.name,
                format!("{kind} records have no '{attribute}' attribute"),
            ))
        }
    }

    fn to_record(&self, kind: EntityKind, row: serde_json::Value) -> Result<Record, SourceError> {
        let serde_json::Value::Object(columns) = row else {
            return Err(SourceError::store_operation(
                &self.name,
                "row is not a JSON object",
            ));
        };
        Ok(columns
            .into_iter()
            .map(|(column, value)| {
                let attribute = stored_attributes(kind)
                    .iter()
                    .find(|attribute| attribute.to_snake_case() == column)
                    .map(|attribute| attribute.to_string())
                    .unwrap_or_else(|| column.to_lower_camel_case());
                (attribute.into(), Value::from(value))
            })
            .collect())
    }
}

fn bind_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        value => Some(value.as_identifier().unwrap_or_else(|| value.to_string())),
    }
}

#[async_trait]
impl DataSource for PostgresStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find_many(
        &self,
        kind: EntityKind,
        filter: &Filter,
    ) -> Result<Vec<Record>, SourceError> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT to_jsonb(t) FROM ");
        builder.push(kind.collection()).push(" AS t");

        let mut separator = " WHERE ";
        for (attribute, value) in filter.conditions() {
            let column = self.column(kind, attribute)?;
            builder.push(separator).push("t.").push(column);
            match bind_text(value) {
                None => builder.push(" IS NULL"),
                Some(text) => builder.push("::text = ").push_bind(text),
            };
            separator = " AND ";
        }
        builder
            .push(" ORDER BY t.created_at, t.")
            .push(self.column(kind, kind.identifier())?);

        let rows: Vec<Json<serde_json::Value>> = builder
            .build_query_scalar()
            .fetch_all(&self.pool)
            .await
            .map_err(|err| self.sql_error(err))?;
        rows.into_iter()
            .map(|Json(row)| self.to_record(kind, row))
            .collect()
    }

    async fn create(&self, kind: EntityKind, mut fields: Record) -> Result<Record, SourceError> {
        if kind.identity() == Identity::Opaque {
            fields.insert(
                kind.identifier(),
                Value::String(Uuid::new_v4().simple().to_string().into()),
            );
        }
        let columns = fields
            .iter()
            .map(|(attribute, value)| Ok((self.column(kind, attribute.as_str())?, bind_text(value))))
            .collect::<Result<Vec<_>, SourceError>>()?;

        let mut builder = QueryBuilder::<Postgres>::new("INSERT INTO ");
        builder.push(kind.collection()).push(" AS t ");
        if columns.is_empty() {
            builder.push("DEFAULT VALUES");
        } else {
            builder.push("(");
            let mut separated = builder.separated(", ");
            for (column, _) in &columns {
                separated.push(column);
            }
            builder.push(") VALUES (");
            let mut separated = builder.separated(", ");
            for (_, value) in columns {
                separated.push_bind(value);
            }
            builder.push(")");
        }
        builder.push(" RETURNING to_jsonb(t)");

        let Json(row) = builder
            .build_query_scalar::<Json<serde_json::Value>>()
            .fetch_one(&self.pool)
            .await
            .map_err(|err| self.sql_error(err))?;
        tracing::debug!(source = %self.name, %kind, "record created");
        self.to_record(kind, row)
    }

    async fn prepare(&self) -> Result<(), SourceError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|err| match err {
                sqlx::migrate::MigrateError::Execute(err) => self.sql_error(err),
                err => SourceError::store_operation(&self.name, err),
            })
    }
}
