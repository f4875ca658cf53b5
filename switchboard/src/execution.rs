//! Resolver dispatch.
//!
//! Walks the selections of a parsed operation, calling bound resolvers or
//! reading passthrough attributes, then completes each value against its
//! declared type.
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use futures::future::join_all;
use tracing::Instrument;

use crate::context::Context;
use crate::graphql;
use crate::graphql::Response;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::PathElement;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;
use crate::registry::Registry;
use crate::resolvers::ResolverArgs;
use crate::spec::FieldSelection;
use crate::spec::FieldType;
use crate::spec::OperationKind;
use crate::spec::Query;

/// A null reached a non-null position. The error is already recorded and
/// the nearest nullable ancestor becomes null.
#[derive(Debug)]
struct Nullified;

type Completed = Result<Value, Nullified>;

/// Executes operations against the registry's resolvers.
#[derive(Clone, Debug)]
pub struct DispatchEngine {
    registry: Arc<Registry>,
}

impl DispatchEngine {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Runs `query` to completion.
    ///
    /// Root query fields run concurrently; root mutation fields run one after
    /// the other, each with all its sub-selections completed before the next
    /// one starts. Field failures never abort siblings.
    pub async fn execute(&self, query: &Query, context: Context) -> Response {
        let span = tracing::info_span!(
            "execute",
            "graphql.operation.kind" = %query.kind(),
            "graphql.operation.name" = query.operation_name().unwrap_or_default(),
        );
        async {
            let root = Value::Null;
            let path = Path::empty();
            let mut errors = Vec::new();
            let data = match query.kind() {
                OperationKind::Query => {
                    self.execute_fields(
                        &query.root_type,
                        &root,
                        query.selections(),
                        &path,
                        &context,
                        &mut errors,
                    )
                    .await
                }
                OperationKind::Mutation => {
                    self.execute_fields_serially(
                        &query.root_type,
                        &root,
                        query.selections(),
                        &path,
                        &context,
                        &mut errors,
                    )
                    .await
                }
            };
            if !errors.is_empty() {
                tracing::debug!(errors = errors.len(), "operation completed with errors");
            }
            Response::builder()
                .data(data.map(Value::Object).unwrap_or(Value::Null))
                .errors(errors)
                .build()
        }
        .instrument(span)
        .await
    }

    /// Resolves sibling fields concurrently, reporting them in selection order.
    async fn execute_fields(
        &self,
        type_name: &str,
        parent: &Value,
        selections: &[FieldSelection],
        path: &Path,
        context: &Context,
        errors: &mut Vec<graphql::Error>,
    ) -> Result<Object, Nullified> {
        let fields = join_all(selections.iter().map(|selection| async move {
            let mut field_errors = Vec::new();
            let value = self
                .resolve_field(type_name, parent, selection, path, context, &mut field_errors)
                .await;
            (selection, value, field_errors)
        }))
        .await;

        let mut object = Object::with_capacity(fields.len());
        let mut nullified = false;
        for (selection, value, field_errors) in fields {
            errors.extend(field_errors);
            match value {
                Ok(value) => {
                    object.insert(selection.response_key.as_str(), value);
                }
                Err(Nullified) => nullified = true,
            }
        }
        if nullified { Err(Nullified) } else { Ok(object) }
    }

    /// Resolves sibling fields strictly in selection order.
    async fn execute_fields_serially(
        &self,
        type_name: &str,
        parent: &Value,
        selections: &[FieldSelection],
        path: &Path,
        context: &Context,
        errors: &mut Vec<graphql::Error>,
    ) -> Result<Object, Nullified> {
        let mut object = Object::with_capacity(selections.len());
        let mut nullified = false;
        for selection in selections {
            match self
                .resolve_field(type_name, parent, selection, path, context, errors)
                .await
            {
                Ok(value) => {
                    object.insert(selection.response_key.as_str(), value);
                }
                Err(Nullified) => nullified = true,
            }
        }
        if nullified { Err(Nullified) } else { Ok(object) }
    }

    fn resolve_field<'a>(
        &'a self,
        type_name: &'a str,
        parent: &'a Value,
        selection: &'a FieldSelection,
        path: &'a Path,
        context: &'a Context,
        errors: &'a mut Vec<graphql::Error>,
    ) -> BoxFuture<'a, Completed> {
        async move {
            let path = path.join_key(selection.response_key.as_str());
            if selection.is_typename_field() {
                return Ok(Value::String(type_name.into()));
            }

            let value = match self.registry.lookup_binding(type_name, &selection.name) {
                Some(binding) => {
                    let span = tracing::info_span!(
                        "resolve",
                        "graphql.path" = %path,
                        "graphql.field" = %format_args!("{type_name}.{}", selection.name),
                    );
                    let args = ResolverArgs {
                        parent: parent.clone(),
                        arguments: selection.arguments.clone(),
                        context: context.clone(),
                        path: path.clone(),
                    };
                    match binding.resolve(args).instrument(span).await {
                        Ok(value) => Ok(value),
                        Err(error) => {
                            tracing::debug!(path = %path, "resolver failed: {error}");
                            errors.push(error.to_graphql_error(path.clone()));
                            Err(Nullified)
                        }
                    }
                }
                // Passthrough: read the same-named attribute of the parent record.
                None => Ok(parent
                    .attribute(&selection.name)
                    .cloned()
                    .unwrap_or(Value::Null)),
            };

            match value {
                Ok(value) => {
                    self.complete_value(
                        type_name,
                        &selection.field_type,
                        value,
                        selection,
                        path,
                        context,
                        errors,
                    )
                    .await
                }
                Err(Nullified) if selection.field_type.is_non_null() => Err(Nullified),
                Err(Nullified) => Ok(Value::Null),
            }
        }
        .boxed()
    }

    /// Completes `value` against `ty`, handling nullability.
    ///
    /// A child that was nullified becomes null here when `ty` is nullable and
    /// propagates further otherwise.
    #[allow(clippy::too_many_arguments)]
    fn complete_value<'a>(
        &'a self,
        parent_type: &'a str,
        ty: &'a FieldType,
        value: Value,
        selection: &'a FieldSelection,
        path: Path,
        context: &'a Context,
        errors: &'a mut Vec<graphql::Error>,
    ) -> BoxFuture<'a, Completed> {
        async move {
            let FieldType::NonNull(inner) = ty else {
                return match self
                    .complete_nullable(parent_type, ty, value, selection, &path, context, errors)
                    .await
                {
                    Ok(value) => Ok(value),
                    Err(Nullified) => Ok(Value::Null),
                };
            };

            let completed = self
                .complete_nullable(parent_type, inner, value, selection, &path, context, errors)
                .await?;
            if completed.is_null() {
                let message = match path.last() {
                    Some(PathElement::Index(index)) => format!(
                        "Cannot return null for non-nullable array element of type {inner} at index {index}"
                    ),
                    _ => format!(
                        "Cannot return null for non-nullable field {parent_type}.{}",
                        selection.name
                    ),
                };
                errors.push(
                    graphql::Error::builder()
                        .message(message)
                        .path(path)
                        .extension_code("RESPONSE_VALIDATION_FAILED")
                        .build(),
                );
                return Err(Nullified);
            }
            Ok(completed)
        }
        .boxed()
    }

    /// Completes a value whose type is not wrapped in non-null.
    #[allow(clippy::too_many_arguments)]
    async fn complete_nullable(
        &self,
        parent_type: &str,
        ty: &FieldType,
        value: Value,
        selection: &FieldSelection,
        path: &Path,
        context: &Context,
        errors: &mut Vec<graphql::Error>,
    ) -> Completed {
        if value.is_null() {
            return Ok(Value::Null);
        }
        match ty {
            FieldType::List(item_type) => {
                let Value::Array(items) = value else {
                    errors.push(
                        graphql::Error::builder()
                            .message(format!(
                                "Expected a list, but did not find one for field {parent_type}.{}",
                                selection.name
                            ))
                            .path(path.clone())
                            .extension_code("RESPONSE_VALIDATION_FAILED")
                            .build(),
                    );
                    return Err(Nullified);
                };
                let completed = join_all(items.into_iter().enumerate().map(
                    |(index, item)| async move {
                        let mut item_errors = Vec::new();
                        let item = self
                            .complete_value(
                                parent_type,
                                item_type,
                                item,
                                selection,
                                path.join_index(index),
                                context,
                                &mut item_errors,
                            )
                            .await;
                        (item, item_errors)
                    },
                ))
                .await;

                let mut list = Vec::with_capacity(completed.len());
                let mut nullified = false;
                for (item, item_errors) in completed {
                    errors.extend(item_errors);
                    match item {
                        Ok(item) => list.push(item),
                        Err(Nullified) => nullified = true,
                    }
                }
                if nullified {
                    Err(Nullified)
                } else {
                    Ok(Value::Array(list))
                }
            }
            ty => {
                let type_name = ty.inner_type_name();
                if self.registry.schema().is_scalar(type_name) {
                    return ty.coerce_output(value).map_err(|_| {
                        errors.push(
                            graphql::Error::builder()
                                .message(format!(
                                    "Invalid value for field {path}: expected a value of type '{ty}'"
                                ))
                                .path(path.clone())
                                .extension_code("RESPONSE_VALIDATION_FAILED")
                                .build(),
                        );
                        Nullified
                    });
                }
                if !value.is_object() {
                    errors.push(
                        graphql::Error::builder()
                            .message(format!(
                                "Invalid value for field {path}: expected a '{type_name}' object"
                            ))
                            .path(path.clone())
                            .extension_code("RESPONSE_VALIDATION_FAILED")
                            .build(),
                    );
                    return Err(Nullified);
                }
                self.execute_fields(
                    type_name,
                    &value,
                    &selection.selections,
                    path,
                    context,
                    errors,
                )
                .await
                .map(Value::Object)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use serde_json_bytes::json;

    use super::*;
    use crate::configuration::MemoryConfig;
    use crate::configuration::SourceConfig;
    use crate::configuration::Sources;
    use crate::context::ContextFactory;
    use crate::context::DataSources;
    use crate::context::RequestMetadata;
    use crate::error::FieldError;
    use crate::error::SourceError;
    use crate::graphql::Request;
    use crate::resolvers::ResolverResult;
    use crate::resolvers::Resolvers;
    use crate::spec::Schema;

    const SDL: &str = r#"
        type Item { id: ID! label: String tags: [String!] }
        type Query {
          items: [Item!]!
          item: Item
          required: Item!
          broken: String
          count: Int
          labels: [String]
        }
        type Mutation { first: String second: String }
    "#;

    async fn items(_args: ResolverArgs) -> ResolverResult {
        Ok(json!([
            { "id": 1, "label": "one", "tags": ["a"] },
            { "id": "two", "tags": ["b", "c"] }
        ]))
    }

    async fn item(_args: ResolverArgs) -> ResolverResult {
        Ok(json!({ "label": "no id" }))
    }

    async fn broken(args: ResolverArgs) -> ResolverResult {
        Err(FieldError::from(SourceError::ConnectionTimeout {
            source_name: args.context.messages().name().to_string(),
            timeout: Duration::from_millis(10).into(),
        }))
    }

    async fn count(_args: ResolverArgs) -> ResolverResult {
        Ok(json!("many"))
    }

    async fn sequence(args: ResolverArgs) -> ResolverResult {
        // The first field is slower: run concurrently, the second would see one message.
        let step = args.path.last_key().unwrap_or_default().to_string();
        if step == "first" {
            tokio::time::sleep(Duration::from_millis(30)).await;
        }
        let store = args.context.messages();
        let mut fields = Object::new();
        fields.insert("text", Value::String(step.into()));
        store
            .create(crate::sources::EntityKind::Message, fields)
            .await?;
        let seen = store
            .find_many(crate::sources::EntityKind::Message, &Default::default())
            .await?;
        Ok(Value::from(seen.len().to_string()))
    }

    async fn labels(_args: ResolverArgs) -> ResolverResult {
        Ok(json!("one"))
    }

    fn engine() -> DispatchEngine {
        let resolvers = Resolvers::new()
            .field("Query", "items", items)
            .field("Query", "item", item)
            .field("Query", "required", item)
            .field("Query", "broken", broken)
            .field("Query", "count", count)
            .field("Query", "labels", labels)
            .field("Mutation", "first", sequence)
            .field("Mutation", "second", sequence)
            .with_attributes("Item", ["id", "label", "tags"]);
        let registry = Registry::new(Schema::parse(SDL).unwrap(), resolvers).unwrap();
        DispatchEngine::new(Arc::new(registry))
    }

    fn context() -> Context {
        let sources = Sources {
            users: SourceConfig::Memory(MemoryConfig::default()),
            messages: SourceConfig::Memory(MemoryConfig {
                pool_size: 4,
                ..Default::default()
            }),
        };
        ContextFactory::new(DataSources::from_configuration(&sources).unwrap())
            .build_context(&RequestMetadata::default())
    }

    async fn run(engine: &DispatchEngine, query: &str) -> serde_json_bytes::Value {
        let query = Query::parse(
            engine.registry().schema(),
            &Request::builder().query(query).build(),
        )
        .unwrap();
        let response = engine.execute(&query, context()).await;
        serde_json_bytes::to_value(&response).unwrap()
    }

    #[tokio::test]
    async fn passthrough_and_typename() {
        let response = run(&engine(), "{ items { __typename id label tags } }").await;
        assert_eq!(
            response,
            json!({
                "data": {
                    "items": [
                        { "__typename": "Item", "id": "1", "label": "one", "tags": ["a"] },
                        { "__typename": "Item", "id": "two", "label": null, "tags": ["b", "c"] }
                    ]
                }
            })
        );
    }

    #[tokio::test]
    async fn failing_resolver_keeps_siblings() {
        let response = run(&engine(), "{ broken items { id } }").await;
        assert_eq!(
            response,
            json!({
                "data": { "broken": null, "items": [{ "id": "1" }, { "id": "two" }] },
                "errors": [{
                    "message": "timed out after 10ms waiting for a connection to 'messages'",
                    "path": ["broken"],
                    "extensions": { "code": "CONNECTION_TIMEOUT", "source": "messages" }
                }]
            })
        );
    }

    #[tokio::test]
    async fn null_bubbles_to_nullable_parent() {
        let response = run(&engine(), "{ item { id label } count }").await;
        assert_eq!(
            response,
            json!({
                "data": { "item": null, "count": null },
                "errors": [
                    {
                        "message": "Cannot return null for non-nullable field Item.id",
                        "path": ["item", "id"],
                        "extensions": { "code": "RESPONSE_VALIDATION_FAILED" }
                    },
                    {
                        "message": "Invalid value for field /count: expected a value of type 'Int'",
                        "path": ["count"],
                        "extensions": { "code": "RESPONSE_VALIDATION_FAILED" }
                    }
                ]
            })
        );
    }

    #[tokio::test]
    async fn null_bubbles_to_data() {
        let response = run(&engine(), "{ items { id } required { id } }").await;
        assert_eq!(response["data"], Value::Null);
        assert_eq!(response["errors"][0]["path"], json!(["required", "id"]));
        assert_eq!(response["errors"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn single_value_for_list_field_is_an_error() {
        let response = run(&engine(), "{ labels items { id } }").await;
        assert_eq!(
            response,
            json!({
                "data": { "labels": null, "items": [{ "id": "1" }, { "id": "two" }] },
                "errors": [{
                    "message": "Expected a list, but did not find one for field Query.labels",
                    "path": ["labels"],
                    "extensions": { "code": "RESPONSE_VALIDATION_FAILED" }
                }]
            })
        );
    }

    #[tokio::test]
    async fn mutation_fields_run_in_order() {
        let response = run(&engine(), "mutation { first second }").await;
        assert_eq!(response, json!({ "data": { "first": "1", "second": "2" } }));
    }
}
