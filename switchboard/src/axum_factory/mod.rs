//! axum factory builds the [`axum::Router`] serving the GraphQL endpoint and the health check.
mod axum_http_server_factory;
pub(crate) mod utils;

pub(crate) use axum_http_server_factory::make_axum_router;
pub(crate) use axum_http_server_factory::serve_router;
