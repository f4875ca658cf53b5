//! Per-request context handed to every resolver.
//!
//! A [`Context`] is built fresh for each request by the [`ContextFactory`].
//! It exposes the long-lived data sources and a few request-scoped facts.
//! Nothing written while serving one request is visible to another.

use std::sync::Arc;
use std::time::Instant;

use http::HeaderMap;
use uuid::Uuid;

use crate::configuration::Sources;
use crate::error::SourceError;
use crate::sources::DataSource;
use crate::sources::create_source;

/// Client name header, as sent by Apollo clients.
pub(crate) const CLIENT_NAME_HEADER: &str = "apollographql-client-name";

/// The adapters shared by every request.
#[derive(Clone)]
pub struct DataSources {
    /// Document store owning users.
    pub users: Arc<dyn DataSource>,
    /// Relational store owning messages.
    pub messages: Arc<dyn DataSource>,
}

impl DataSources {
    /// Creates one adapter per configured source.
    pub fn from_configuration(sources: &Sources) -> Result<Self, SourceError> {
        Ok(Self {
            users: create_source("users", &sources.users)?,
            messages: create_source("messages", &sources.messages)?,
        })
    }

    /// Connects to every source and creates missing storage.
    pub async fn prepare(&self) -> Result<(), SourceError> {
        for source in [&self.users, &self.messages] {
            source.prepare().await?;
            tracing::info!(source = source.name(), "data source connected");
        }
        Ok(())
    }
}

impl std::fmt::Debug for DataSources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSources")
            .field("users", &self.users.name())
            .field("messages", &self.messages.name())
            .finish()
    }
}

/// What the context factory needs to know about an inbound request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMetadata {
    pub operation_name: Option<String>,
    pub client_name: Option<String>,
}

impl RequestMetadata {
    pub(crate) fn from_headers(headers: &HeaderMap, operation_name: Option<&str>) -> Self {
        Self {
            operation_name: operation_name.map(str::to_string),
            client_name: headers
                .get(CLIENT_NAME_HEADER)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string),
        }
    }
}

/// Request-scoped handles and metadata.
///
/// Cloning is cheap; clones share the same request.
#[derive(Clone, Debug)]
pub struct Context {
    sources: DataSources,
    inner: Arc<RequestScope>,
}

#[derive(Debug)]
struct RequestScope {
    request_id: Uuid,
    metadata: RequestMetadata,
    created_at: Instant,
}

impl Context {
    /// The document store owning users.
    pub fn users(&self) -> &Arc<dyn DataSource> {
        &self.sources.users
    }

    /// The relational store owning messages.
    pub fn messages(&self) -> &Arc<dyn DataSource> {
        &self.sources.messages
    }

    pub fn request_id(&self) -> Uuid {
        self.inner.request_id
    }

    pub fn operation_name(&self) -> Option<&str> {
        self.inner.metadata.operation_name.as_deref()
    }

    pub fn client_name(&self) -> Option<&str> {
        self.inner.metadata.client_name.as_deref()
    }

    /// When the request started being served.
    pub fn created_at(&self) -> Instant {
        self.inner.created_at
    }
}

/// Builds a [`Context`] per request from the adapters created at boot.
#[derive(Clone, Debug)]
pub struct ContextFactory {
    sources: DataSources,
}

impl ContextFactory {
    pub fn new(sources: DataSources) -> Self {
        Self { sources }
    }

    pub fn sources(&self) -> &DataSources {
        &self.sources
    }

    pub fn build_context(&self, metadata: &RequestMetadata) -> Context {
        Context {
            sources: self.sources.clone(),
            inner: Arc::new(RequestScope {
                request_id: Uuid::new_v4(),
                metadata: metadata.clone(),
                created_at: Instant::now(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;

    use super::*;

    fn factory() -> ContextFactory {
        ContextFactory::new(DataSources::from_configuration(&Sources::default()).unwrap())
    }

    #[tokio::test]
    async fn contexts_are_fresh_per_request() {
        let factory = factory();
        let metadata = RequestMetadata {
            operation_name: Some("Feed".to_string()),
            client_name: None,
        };
        let first = factory.build_context(&metadata);
        let second = factory.build_context(&metadata);

        assert_ne!(first.request_id(), second.request_id());
        assert_eq!(first.operation_name(), Some("Feed"));
        assert!(Arc::ptr_eq(first.users(), second.users()));
        assert!(Arc::ptr_eq(first.messages(), second.messages()));
        assert_eq!(first.users().name(), "users");
        assert_eq!(first.messages().name(), "messages");
    }

    #[test]
    fn metadata_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(CLIENT_NAME_HEADER, HeaderValue::from_static("web"));
        let metadata = RequestMetadata::from_headers(&headers, Some("Feed"));
        assert_eq!(metadata.client_name.as_deref(), Some("web"));
        assert_eq!(metadata.operation_name.as_deref(), Some("Feed"));

        let metadata = RequestMetadata::from_headers(&HeaderMap::new(), None);
        assert_eq!(metadata, RequestMetadata::default());
    }
}
