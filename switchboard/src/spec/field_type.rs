use apollo_compiler::ast;
use serde::Deserialize;
use serde::Serialize;

use crate::json_ext::Value;

#[derive(Debug)]
pub(crate) struct InvalidValue;

// Primitives are taken from scalars: https://spec.graphql.org/draft/#sec-Scalars
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    /// Named type {0}
    Named(String),
    /// List type {0}
    List(Box<FieldType>),
    /// Non null type {0}
    NonNull(Box<FieldType>),
    /// String
    String,
    /// Int
    Int,
    /// Float
    Float,
    /// Id
    Id,
    /// Boolean
    Boolean,
}

pub(crate) const BUILT_IN_SCALARS: [&str; 5] = ["String", "Int", "Float", "ID", "Boolean"];

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::Named(ty) => write!(f, "{ty}"),
            FieldType::List(ty) => write!(f, "[{ty}]"),
            FieldType::NonNull(ty) => write!(f, "{ty}!"),
            FieldType::String => write!(f, "String"),
            FieldType::Int => write!(f, "Int"),
            FieldType::Float => write!(f, "Float"),
            FieldType::Id => write!(f, "ID"),
            FieldType::Boolean => write!(f, "Boolean"),
        }
    }
}

impl FieldType {
    /// A named type reference, using the built-in variants for built-in scalars.
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        match name.as_str() {
            "String" => Self::String,
            "Int" => Self::Int,
            "Float" => Self::Float,
            "ID" => Self::Id,
            "Boolean" => Self::Boolean,
            _ => Self::Named(name),
        }
    }

    /// Wraps the type in a non-null marker.
    pub fn non_null(self) -> Self {
        match self {
            FieldType::NonNull(_) => self,
            _ => FieldType::NonNull(Box::new(self)),
        }
    }

    /// Wraps the type in a list.
    pub fn list(self) -> Self {
        FieldType::List(Box::new(self))
    }

    // This function validates input values according to the graphql specification.
    // Each of the values are validated against the "input coercion" rules.
    //
    // Custom scalars accept any value.
    pub(crate) fn validate_input_value(&self, value: &Value) -> Result<(), InvalidValue> {
        match (self, value) {
            (FieldType::NonNull(inner_ty), value) => {
                if value.is_null() {
                    Err(InvalidValue)
                } else {
                    inner_ty.validate_input_value(value)
                }
            }
            // NOTE: graphql's types are all optional by default
            (_, Value::Null) => Ok(()),
            (FieldType::String, Value::String(_)) => Ok(()),
            // Spec: https://spec.graphql.org/June2018/#sec-Int
            (FieldType::Int, value) if is_valid_int(value) => Ok(()),
            // Spec: https://spec.graphql.org/draft/#sec-Float.Input-Coercion
            (FieldType::Float, Value::Number(_)) => Ok(()),
            // In practice Int works for ID too
            (FieldType::Id, Value::String(_)) => Ok(()),
            (FieldType::Id, value) if is_valid_int(value) => Ok(()),
            (FieldType::Boolean, Value::Bool(_)) => Ok(()),
            (FieldType::List(inner_ty), Value::Array(vec)) => vec
                .iter()
                .try_for_each(|x| inner_ty.validate_input_value(x)),
            // For coercion from single value to list
            (FieldType::List(inner_ty), value) => inner_ty.validate_input_value(value),
            (FieldType::Named(_), _) => Ok(()),
            _ => Err(InvalidValue),
        }
    }

    /// Result coercion for leaf values.
    ///
    /// Only called on built-in scalars and custom scalars; custom scalars
    /// are passed through unchanged. `ID` always serializes as a string.
    pub(crate) fn coerce_output(&self, value: Value) -> Result<Value, InvalidValue> {
        match (self, value) {
            (_, Value::Null) => Ok(Value::Null),
            (FieldType::Id, Value::String(s)) => Ok(Value::String(s)),
            (FieldType::Id, Value::Number(n)) if n.is_i64() || n.is_u64() => {
                Ok(Value::String(n.to_string().into()))
            }
            (FieldType::String, Value::String(s)) => Ok(Value::String(s)),
            (FieldType::String, Value::Number(n)) => Ok(Value::String(n.to_string().into())),
            (FieldType::String, Value::Bool(b)) => Ok(Value::String(b.to_string().into())),
            (FieldType::Int, value) if is_valid_int(&value) => Ok(value),
            (FieldType::Float, Value::Number(n)) => Ok(Value::Number(n)),
            (FieldType::Boolean, Value::Bool(b)) => Ok(Value::Bool(b)),
            (FieldType::Named(_), value) => Ok(value),
            _ => Err(InvalidValue),
        }
    }

    /// return the name of the type on which selections happen
    ///
    /// Example if we get the field `list: [User!]!`, it will return "User"
    pub fn inner_type_name(&self) -> &str {
        match self {
            FieldType::Named(name) => name.as_str(),
            FieldType::List(inner) | FieldType::NonNull(inner) => inner.inner_type_name(),
            FieldType::String => "String",
            FieldType::Int => "Int",
            FieldType::Float => "Float",
            FieldType::Id => "ID",
            FieldType::Boolean => "Boolean",
        }
    }

    pub fn is_non_null(&self) -> bool {
        matches!(self, FieldType::NonNull(_))
    }
}

fn is_valid_int(value: &Value) -> bool {
    value
        .as_i64()
        .is_some_and(|int| i32::try_from(int).is_ok())
}

impl From<&'_ ast::Type> for FieldType {
    fn from(ty: &'_ ast::Type) -> Self {
        match ty {
            ast::Type::Named(name) => Self::named(name.as_str()),
            ast::Type::NonNullNamed(name) => Self::named(name.as_str()).non_null(),
            ast::Type::List(inner) => Self::from(&**inner).list(),
            ast::Type::NonNullList(inner) => Self::from(&**inner).list().non_null(),
        }
    }
}
