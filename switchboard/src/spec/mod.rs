//! GraphQL schema and operation model.
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

mod field_type;
pub(crate) mod query;
mod schema;
mod selection;

use displaydoc::Display;
pub use field_type::FieldType;
pub(crate) use field_type::*;
pub use query::OperationKind;
pub use query::Query;
pub(crate) use query::TYPENAME;
pub use schema::ArgumentDefinition;
pub use schema::FieldDefinition;
pub use schema::Schema;
pub use schema::TypeDefinition;
pub use selection::FieldSelection;
use thiserror::Error;

use crate::error::ParseErrors;
use crate::error::ValidationErrors;
use crate::graphql;
use crate::graphql::ErrorExtension;
use crate::graphql::IntoGraphQLErrors;

/// GraphQL operation errors.
///
/// These are request errors: the operation is rejected before any resolver runs.
#[derive(Error, Debug, Display, Clone)]
#[non_exhaustive]
pub enum SpecError {
    /// the request does not contain a query
    MissingQuery,
    /// parsing error: {0}
    ParsingError(ParseErrors),
    /// validation error: {0}
    ValidationError(ValidationErrors),
    /// Unknown operation named "{0}"
    UnknownOperation(String),
    /// Must provide operation name if query contains multiple operations.
    MultipleOperationWithoutOperationName,
    /// subscription operation is not supported
    SubscriptionNotSupported,
    /// introspection field '{0}' is not supported
    IntrospectionNotSupported(String),
    /// Variable "${name}" got invalid value: {reason}
    InvalidVariable {
        /// The variable name.
        name: String,
        /// Why the value was rejected.
        reason: String,
    },
    /// the '{0}' operation type is not defined in the schema
    UnsupportedOperationType(OperationKind),
    /// selection processing recursion limit exceeded
    RecursionLimitExceeded,
}

impl ErrorExtension for SpecError {
    fn extension_code(&self) -> String {
        match self {
            SpecError::MissingQuery => "GRAPHQL_MISSING_QUERY",
            SpecError::ParsingError(_) => "GRAPHQL_PARSING_FAILED",
            SpecError::ValidationError(_)
            | SpecError::UnknownOperation(_)
            | SpecError::MultipleOperationWithoutOperationName
            | SpecError::UnsupportedOperationType(_) => "GRAPHQL_VALIDATION_FAILED",
            SpecError::SubscriptionNotSupported => "SUBSCRIPTION_NOT_SUPPORTED",
            SpecError::IntrospectionNotSupported(_) => "INTROSPECTION_DISABLED",
            SpecError::InvalidVariable { .. } => "VALIDATION_INVALID_TYPE_VARIABLE",
            SpecError::RecursionLimitExceeded => "RECURSION_LIMIT_EXCEEDED",
        }
        .to_string()
    }
}

impl IntoGraphQLErrors for SpecError {
    fn into_graphql_errors(self) -> Result<Vec<graphql::Error>, Self> {
        match self {
            SpecError::ParsingError(errors) => {
                errors.into_graphql_errors().map_err(SpecError::ParsingError)
            }
            SpecError::ValidationError(errors) => errors
                .into_graphql_errors()
                .map_err(SpecError::ValidationError),
            _ => Ok(vec![
                graphql::Error::builder()
                    .message(self.to_string())
                    .extension_code(self.extension_code())
                    .build(),
            ]),
        }
    }
}

impl SpecError {
    /// The client facing errors for this request failure.
    pub(crate) fn to_graphql_errors(&self) -> Vec<graphql::Error> {
        self.clone().into_graphql_errors().unwrap_or_else(|error| {
            vec![
                graphql::Error::builder()
                    .message(error.to_string())
                    .extension_code(error.extension_code())
                    .build(),
            ]
        })
    }
}
