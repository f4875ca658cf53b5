//! Query processing.
//!
//! Parsing, validating and flattening a GraphQL operation into the field
//! selections the dispatch engine walks.

use std::fmt::Display;

use apollo_compiler::ast;
use apollo_compiler::ast::OperationType;
use serde::Deserialize;
use serde::Serialize;

use crate::graphql::Request;
use crate::json_ext::Object;
use crate::spec::FieldSelection;
use crate::spec::FieldType;
use crate::spec::Schema;
use crate::spec::SpecError;
use crate::spec::selection::SelectionCollector;
use crate::spec::selection::value_to_json;

pub(crate) const TYPENAME: &str = "__typename";

/// GraphQL operation type.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub enum OperationKind {
    #[default]
    Query,
    Mutation,
}

impl Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl OperationKind {
    pub(crate) const fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Query => "query",
            OperationKind::Mutation => "mutation",
        }
    }
}

impl From<OperationKind> for OperationType {
    fn from(value: OperationKind) -> Self {
        match value {
            OperationKind::Query => OperationType::Query,
            OperationKind::Mutation => OperationType::Mutation,
        }
    }
}

/// A parsed and validated operation, ready to be executed.
#[derive(Debug, Clone)]
pub struct Query {
    pub(crate) kind: OperationKind,
    pub(crate) operation_name: Option<String>,
    pub(crate) root_type: String,
    pub(crate) selections: Vec<FieldSelection>,
}

impl Query {
    /// Parses and validates the request's operation against `schema`.
    ///
    /// Variables are coerced, `@skip`/`@include` evaluated and fragments
    /// flattened, so the resulting selections only depend on the schema.
    pub fn parse(schema: &Schema, request: &Request) -> Result<Self, SpecError> {
        let query = request
            .query
            .as_deref()
            .filter(|query| !query.trim().is_empty())
            .ok_or(SpecError::MissingQuery)?;

        let document = ast::Document::parse(query, "query.graphql").map_err(|invalid| {
            tracing::debug!(errors = %invalid.errors, "operation failed to parse");
            SpecError::ParsingError(invalid.into())
        })?;

        // Reject operation types we cannot run before validation reports
        // them as missing root types.
        let requested_operation_name = request.operation_name.as_deref();
        for definition in &document.definitions {
            if let ast::Definition::OperationDefinition(operation) = definition
                && (requested_operation_name.is_none()
                    || operation.name.as_deref() == requested_operation_name)
            {
                match operation.operation_type {
                    OperationType::Subscription => {
                        return Err(SpecError::SubscriptionNotSupported);
                    }
                    OperationType::Mutation
                        if schema.root_type(OperationKind::Mutation).is_none() =>
                    {
                        return Err(SpecError::UnsupportedOperationType(
                            OperationKind::Mutation,
                        ));
                    }
                    _ => {}
                }
            }
        }

        let document = document
            .to_executable_validate(schema.definitions())
            .map_err(|invalid| {
                tracing::debug!(errors = %invalid.errors, "operation failed validation");
                SpecError::ValidationError(invalid.into())
            })?;

        let operation = document
            .operations
            .get(requested_operation_name)
            .map_err(|_| match requested_operation_name {
                Some(name) => SpecError::UnknownOperation(name.to_string()),
                None => SpecError::MultipleOperationWithoutOperationName,
            })?;

        let kind = match operation.operation_type {
            OperationType::Query => OperationKind::Query,
            OperationType::Mutation => OperationKind::Mutation,
            OperationType::Subscription => return Err(SpecError::SubscriptionNotSupported),
        };

        let variables = coerce_variables(&operation.variables, &request.variables)?;
        let selections =
            SelectionCollector::new(&document, &variables).collect(&operation.selection_set)?;

        Ok(Query {
            kind,
            operation_name: operation.name.as_ref().map(|name| name.to_string()),
            root_type: operation.selection_set.ty.to_string(),
            selections,
        })
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn operation_name(&self) -> Option<&str> {
        self.operation_name.as_deref()
    }

    /// The root fields, in request order.
    pub fn selections(&self) -> &[FieldSelection] {
        &self.selections
    }
}

fn coerce_variables(
    definitions: &[apollo_compiler::Node<ast::VariableDefinition>],
    provided: &Object,
) -> Result<Object, SpecError> {
    let mut variables = Object::new();
    for definition in definitions {
        let name = definition.name.as_str();
        let ty = FieldType::from(&*definition.ty);
        match (provided.get(name), &definition.default_value) {
            (Some(value), _) => {
                ty.validate_input_value(value)
                    .map_err(|_| SpecError::InvalidVariable {
                        name: name.to_string(),
                        reason: format!("expected a value of type '{ty}'"),
                    })?;
                variables.insert(name, value.clone());
            }
            (None, Some(default)) => {
                variables.insert(name, value_to_json(default, &Object::new()));
            }
            (None, None) if ty.is_non_null() => {
                return Err(SpecError::InvalidVariable {
                    name: name.to_string(),
                    reason: format!("expected a value of type '{ty}', found none"),
                });
            }
            (None, None) => {}
        }
    }
    Ok(variables)
}
