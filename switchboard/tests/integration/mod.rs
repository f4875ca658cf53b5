pub(crate) mod common;
pub(crate) use common::IntegrationTest;

mod chat;
mod http_server;
mod postgres;
mod redis;
