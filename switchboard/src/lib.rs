//! Starts a server that will handle http graphql requests for the chat schema.
//!
//! Users live in a document store, messages in a relational store; one
//! GraphQL schema spans both. The HTTP layer is a thin shell: the core is
//! the [`Registry`], the [`DispatchEngine`] and the [`ContextFactory`].

pub mod json_ext;

mod axum_factory;
pub mod chat;
pub mod configuration;
pub mod context;
pub mod error;
mod executable;
pub mod execution;
pub mod graphql;
pub mod registry;
pub mod resolvers;
mod router;
pub mod services;
pub mod sources;
pub mod spec;

pub use configuration::Configuration;
pub use context::Context;
pub use context::ContextFactory;
pub use executable::Executable;
pub use executable::main;
pub use execution::DispatchEngine;
pub use registry::Registry;
pub use router::Gateway;
pub use router::ShutdownSource;
pub use services::SupergraphService;
