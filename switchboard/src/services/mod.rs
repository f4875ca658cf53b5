//! Implementation of the various steps in the gateway's processing pipeline.

pub(crate) mod supergraph;

pub use supergraph::SupergraphService;

use crate::graphql;

/// An HTTP request carrying a GraphQL request.
pub type SupergraphRequest = http::Request<graphql::Request>;

/// An HTTP response carrying a GraphQL response.
pub type SupergraphResponse = http::Response<graphql::Response>;
