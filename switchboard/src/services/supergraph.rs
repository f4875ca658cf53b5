//! Parses, plans and executes one GraphQL request.

use std::task::Poll;

use futures::TryFutureExt;
use futures::future::BoxFuture;
use http::Method;
use http::StatusCode;
use tower::BoxError;
use tower::Service;
use tracing::Instrument;

use super::SupergraphRequest;
use super::SupergraphResponse;
use crate::context::ContextFactory;
use crate::context::RequestMetadata;
use crate::execution::DispatchEngine;
use crate::graphql;
use crate::spec::OperationKind;
use crate::spec::Query;

/// The GraphQL request pipeline: parse, build a context, dispatch.
#[derive(Clone, Debug)]
pub struct SupergraphService {
    engine: DispatchEngine,
    context_factory: ContextFactory,
}

#[buildstructor::buildstructor]
impl SupergraphService {
    #[builder(visibility = "pub")]
    fn new(engine: DispatchEngine, context_factory: ContextFactory) -> Self {
        Self {
            engine,
            context_factory,
        }
    }
}

impl Service<SupergraphRequest> for SupergraphService {
    type Response = SupergraphResponse;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut std::task::Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: SupergraphRequest) -> Self::Future {
        let engine = self.engine.clone();
        let context_factory = self.context_factory.clone();

        let fut = service_call(engine, context_factory, req).or_else(|error: BoxError| async move {
            tracing::error!("request failed: {error}");
            let errors = vec![
                graphql::Error::builder()
                    .message("internal server error")
                    .extension_code("INTERNAL_SERVER_ERROR")
                    .build(),
            ];
            error_response(StatusCode::INTERNAL_SERVER_ERROR, errors)
        });

        Box::pin(fut)
    }
}

fn error_response(
    status: StatusCode,
    errors: Vec<graphql::Error>,
) -> Result<SupergraphResponse, BoxError> {
    Ok(http::Response::builder()
        .status(status)
        .body(graphql::Response::from_errors(errors))?)
}

async fn service_call(
    engine: DispatchEngine,
    context_factory: ContextFactory,
    req: SupergraphRequest,
) -> Result<SupergraphResponse, BoxError> {
    let (parts, request) = req.into_parts();

    let query = match Query::parse(engine.registry().schema(), &request) {
        Ok(query) => query,
        Err(error) => {
            tracing::debug!("request rejected: {error}");
            return error_response(StatusCode::BAD_REQUEST, error.to_graphql_errors());
        }
    };

    if query.kind() == OperationKind::Mutation && parts.method == Method::GET {
        return error_response(
            StatusCode::METHOD_NOT_ALLOWED,
            vec![
                graphql::Error::builder()
                    .message("Mutations can only be sent over HTTP POST")
                    .extension_code("MUTATION_OVER_GET")
                    .build(),
            ],
        );
    }

    let metadata =
        RequestMetadata::from_headers(&parts.headers, request.operation_name.as_deref());
    let context = context_factory.build_context(&metadata);
    tracing::debug!(request_id = %context.request_id(), kind = %query.kind(), "executing operation");

    let response = match query.kind() {
        OperationKind::Query => engine.execute(&query, context).await,
        // A dropped client connection must not leave a mutation half-run.
        OperationKind::Mutation => {
            tokio::spawn(
                async move { engine.execute(&query, context).await }.in_current_span(),
            )
            .await?
        }
    };

    Ok(http::Response::builder()
        .status(StatusCode::OK)
        .body(response)?)
}
