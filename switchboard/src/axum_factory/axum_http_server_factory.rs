//! Axum http server factory. Axum provides routing capability on top of Hyper HTTP.
use std::future::Future;

use axum::Json;
use axum::Router;
use axum::extract::Extension;
use axum::extract::RawQuery;
use axum::extract::rejection::JsonRejection;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use http::Method;
use serde::Serialize;
use tokio::net::TcpListener;
use tower::ServiceExt;
use tower_http::trace::TraceLayer;

use super::utils::RecordResponse;
use super::utils::RequestSpan;
use crate::configuration::Server;
use crate::graphql;
use crate::services::SupergraphService;

/// Routes the GraphQL endpoint and the health check to `service`.
pub(crate) fn make_axum_router(service: SupergraphService, server: &Server) -> Router {
    Router::new()
        .route(
            &server.graphql_path,
            get(handle_get).post(handle_post),
        )
        .route(&server.health_check_path, get(health_check))
        .layer(Extension(service))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(RequestSpan)
                .on_response(RecordResponse),
        )
}

/// Serves `router` on `listener` until `shutdown` resolves.
///
/// In-flight requests are allowed to finish once shutdown starts.
pub(crate) async fn serve_router(
    listener: TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

async fn handle_get(
    Extension(service): Extension<SupergraphService>,
    RawQuery(query): RawQuery,
    header_map: HeaderMap,
) -> Response {
    let Some(request) = query
        .as_deref()
        .and_then(|query| graphql::Request::from_urlencoded_query(query).ok())
    else {
        return invalid_request("Invalid GraphQL request");
    };

    run_graphql_request(service, Method::GET, header_map, request).await
}

async fn handle_post(
    Extension(service): Extension<SupergraphService>,
    header_map: HeaderMap,
    request: Result<Json<graphql::Request>, JsonRejection>,
) -> Response {
    match request {
        Ok(Json(request)) => {
            run_graphql_request(service, Method::POST, header_map, request).await
        }
        Err(rejection) => {
            tracing::debug!("invalid request body: {rejection}");
            invalid_request(&rejection.body_text())
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "UPPERCASE")]
enum HealthStatus {
    Up,
}

#[derive(Debug, Serialize)]
struct Health {
    status: HealthStatus,
}

/// The gateway answers as soon as it listens: sources were prepared before binding.
async fn health_check() -> impl IntoResponse {
    Json(Health {
        status: HealthStatus::Up,
    })
}

fn invalid_request(message: &str) -> Response {
    let errors = vec![
        graphql::Error::builder()
            .message(message)
            .extension_code("INVALID_GRAPHQL_REQUEST")
            .build(),
    ];
    (
        StatusCode::BAD_REQUEST,
        Json(graphql::Response::from_errors(errors)),
    )
        .into_response()
}

async fn run_graphql_request(
    service: SupergraphService,
    method: Method,
    header_map: HeaderMap,
    request: graphql::Request,
) -> Response {
    let mut http_request = http::Request::new(request);
    *http_request.method_mut() = method;
    *http_request.headers_mut() = header_map;

    match service.oneshot(http_request).await {
        Err(e) => {
            tracing::error!("supergraph service call failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "supergraph service call failed",
            )
                .into_response()
        }
        Ok(response) => {
            let (parts, response) = response.into_parts();
            (parts, Json(response)).into_response()
        }
    }
}
