//! Switchboard errors.
use apollo_compiler::validation::DiagnosticList;
use apollo_compiler::validation::WithErrors;
use displaydoc::Display;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

pub use crate::configuration::ConfigurationError;
use crate::graphql::Error;
use crate::graphql::ErrorExtension;
use crate::graphql::IntoGraphQLErrors;
use crate::graphql::Location as ErrorLocation;
use crate::json_ext::Path;

/// Error types for data source calls.
///
/// These are never returned to the client as is: [`SourceError::to_graphql_error`]
/// converts them, leaving the store's own failure detail in the logs only.
#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SourceError {
    /// timed out after {timeout} waiting for a connection to '{source_name}'
    ConnectionTimeout {
        /// The data source that could not hand out a connection.
        source_name: String,

        /// The configured acquisition timeout.
        timeout: humantime::Duration,
    },

    /// operation on '{source_name}' failed: {reason}
    StoreOperation {
        /// The data source that failed.
        source_name: String,

        /// The reason the store operation failed.
        reason: String,
    },
}

impl SourceError {
    pub(crate) fn store_operation(source_name: &str, reason: impl ToString) -> Self {
        SourceError::StoreOperation {
            source_name: source_name.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn source_name(&self) -> &str {
        match self {
            SourceError::ConnectionTimeout { source_name, .. }
            | SourceError::StoreOperation { source_name, .. } => source_name,
        }
    }

    /// The message shown to clients.
    fn public_message(&self) -> String {
        match self {
            SourceError::StoreOperation { source_name, .. } => {
                format!("operation on '{source_name}' failed")
            }
            _ => self.to_string(),
        }
    }

    /// Convert the source error to a GraphQL error.
    pub(crate) fn to_graphql_error(&self, path: Option<Path>) -> Error {
        Error::builder()
            .message(self.public_message())
            .and_path(path)
            .extension_code(self.extension_code())
            .extension("source", self.source_name())
            .build()
    }
}

impl ErrorExtension for SourceError {
    fn extension_code(&self) -> String {
        match self {
            SourceError::ConnectionTimeout { .. } => "CONNECTION_TIMEOUT",
            SourceError::StoreOperation { .. } => "STORE_OPERATION_FAILED",
        }
        .to_string()
    }
}

/// Error types for field resolvers.
#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FieldError {
    /// {0}
    Source(SourceError),

    /// missing required argument '{0}'
    MissingArgument(String),

    /// invalid value for argument '{name}': {reason}
    InvalidArgument {
        /// Name of the argument.
        name: String,

        /// Why the value was rejected.
        reason: String,
    },
}

impl From<SourceError> for FieldError {
    fn from(error: SourceError) -> Self {
        FieldError::Source(error)
    }
}

impl FieldError {
    /// Convert the field error to a GraphQL error located at `path`.
    pub(crate) fn to_graphql_error(&self, path: Path) -> Error {
        match self {
            FieldError::Source(source) => source.to_graphql_error(Some(path)),
            _ => Error::builder()
                .message(self.to_string())
                .path(path)
                .extension_code(self.extension_code())
                .build(),
        }
    }
}

impl ErrorExtension for FieldError {
    fn extension_code(&self) -> String {
        match self {
            FieldError::Source(source) => source.extension_code(),
            FieldError::MissingArgument(_) | FieldError::InvalidArgument { .. } => {
                "BAD_USER_INPUT".to_string()
            }
        }
    }
}

/// Error in the schema or in its resolver bindings.
///
/// Any of these prevents the gateway from starting.
#[derive(Debug, Error, Display)]
#[non_exhaustive]
pub enum SchemaError {
    /// GraphQL parser error: {0}
    Parse(ParseErrors),
    /// GraphQL validation error: {0}
    Validate(ValidationErrors),
    /// type '{0}' is declared more than once
    DuplicateType(String),
    /// field '{type_name}.{field}' is declared more than once
    DuplicateField {
        /// The type declaring the field.
        type_name: String,
        /// The duplicated field name.
        field: String,
    },
    /// '{type_name}.{field}' references undeclared type '{referenced}'
    UndeclaredType {
        /// The type declaring the field.
        type_name: String,
        /// The field or argument referencing the type.
        field: String,
        /// The missing type.
        referenced: String,
    },
    /// type '{name}' is {kind}; only object types and scalars are supported
    UnsupportedType {
        /// The type name.
        name: String,
        /// What kind of definition it is.
        kind: &'static str,
    },
    /// field '{type_name}.{field}' has no resolver and '{type_name}' records have no '{field}' attribute
    MissingResolver {
        /// The type declaring the field.
        type_name: String,
        /// The unresolvable field.
        field: String,
    },
    /// a resolver is bound to '{type_name}.{field}' which is not declared in the schema
    UnknownBinding {
        /// The bound type name.
        type_name: String,
        /// The bound field name.
        field: String,
    },
    /// more than one resolver is bound to '{type_name}.{field}'
    DuplicateBinding {
        /// The bound type name.
        type_name: String,
        /// The bound field name.
        field: String,
    },
    /// the schema does not declare a query root type
    MissingQueryType,
}

/// Collection of GraphQL parsing errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseErrors {
    pub(crate) errors: Vec<Diagnostic>,
}

/// Collection of GraphQL validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrors {
    pub(crate) errors: Vec<Diagnostic>,
}

/// A single diagnostic reported by the GraphQL compiler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Diagnostic {
    pub(crate) message: String,
    pub(crate) location: Option<ErrorLocation>,
}

fn diagnostics(errors: &DiagnosticList) -> Vec<Diagnostic> {
    errors
        .iter()
        .map(|diagnostic| Diagnostic {
            message: diagnostic.error.to_string(),
            location: diagnostic.line_column_range().map(|range| ErrorLocation {
                line: range.start.line as u32,
                column: range.start.column as u32,
            }),
        })
        .collect()
}

fn fmt_diagnostics(errors: &[Diagnostic], f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let mut errors = errors.iter();
    for (index, error) in errors.by_ref().take(5).enumerate() {
        if index > 0 {
            f.write_str("\n")?;
        }
        match &error.location {
            Some(location) => write!(
                f,
                "[{}:{}] {}",
                location.line, location.column, error.message
            )?,
            None => write!(f, "{}", error.message)?,
        }
    }
    let remaining = errors.count();
    if remaining > 0 {
        write!(f, "\n...and {remaining} other errors")?;
    }
    Ok(())
}

fn into_errors(errors: Vec<Diagnostic>, code: &'static str) -> Vec<Error> {
    errors
        .into_iter()
        .map(|diagnostic| {
            Error::builder()
                .message(diagnostic.message)
                .locations(diagnostic.location.into_iter().collect::<Vec<_>>())
                .extension_code(code)
                .build()
        })
        .collect()
}

impl From<DiagnosticList> for ParseErrors {
    fn from(errors: DiagnosticList) -> Self {
        Self {
            errors: diagnostics(&errors),
        }
    }
}

impl<T> From<WithErrors<T>> for ParseErrors {
    fn from(WithErrors { errors, .. }: WithErrors<T>) -> Self {
        errors.into()
    }
}

impl std::fmt::Display for ParseErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt_diagnostics(&self.errors, f)
    }
}

impl IntoGraphQLErrors for ParseErrors {
    fn into_graphql_errors(self) -> Result<Vec<Error>, Self> {
        Ok(into_errors(self.errors, "GRAPHQL_PARSING_FAILED"))
    }
}

impl From<DiagnosticList> for ValidationErrors {
    fn from(errors: DiagnosticList) -> Self {
        Self {
            errors: diagnostics(&errors),
        }
    }
}

impl<T> From<WithErrors<T>> for ValidationErrors {
    fn from(WithErrors { errors, .. }: WithErrors<T>) -> Self {
        errors.into()
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt_diagnostics(&self.errors, f)
    }
}

impl IntoGraphQLErrors for ValidationErrors {
    fn into_graphql_errors(self) -> Result<Vec<Error>, Self> {
        Ok(into_errors(self.errors, "GRAPHQL_VALIDATION_FAILED"))
    }
}

/// Error types for the gateway lifecycle.
#[derive(Error, Debug, Display)]
#[non_exhaustive]
pub enum GatewayError {
    /// configuration error: {0}
    Configuration(#[from] ConfigurationError),

    /// schema error: {0}
    Schema(#[from] SchemaError),

    /// could not create data source: {0}
    SourceCreation(#[source] SourceError),

    /// could not bind to {listen}: {error}
    ServerCreation {
        /// The configured listen address.
        listen: std::net::SocketAddr,
        /// The underlying I/O error.
        error: std::io::Error,
    },

    /// server stopped with an error: {0}
    Server(#[source] std::io::Error),
}

impl From<SourceError> for GatewayError {
    fn from(error: SourceError) -> Self {
        GatewayError::SourceCreation(error)
    }
}
