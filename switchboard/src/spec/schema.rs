//! GraphQL schema.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;

use apollo_compiler::ast;
use apollo_compiler::ast::OperationType;
use apollo_compiler::validation::Valid;
use indexmap::IndexMap;
use indexmap::IndexSet;
use sha2::Digest;
use sha2::Sha256;

use crate::error::SchemaError;
use crate::spec::BUILT_IN_SCALARS;
use crate::spec::FieldType;
use crate::spec::OperationKind;

/// An argument accepted by a field.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgumentDefinition {
    pub name: String,
    pub ty: FieldType,
}

/// A field declared on an object type.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefinition {
    pub name: String,
    pub ty: FieldType,
    pub arguments: Vec<ArgumentDefinition>,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            arguments: Vec::new(),
        }
    }

    pub fn argument(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.arguments.push(ArgumentDefinition {
            name: name.into(),
            ty,
        });
        self
    }
}

/// An object type with its fields in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDefinition {
    pub name: String,
    pub fields: Vec<FieldDefinition>,
}

impl TypeDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|field| field.name == name)
    }
}

/// A GraphQL schema.
///
/// Only object types and scalars are supported. Once built, a schema is
/// immutable and shared between requests.
#[derive(Debug)]
pub struct Schema {
    pub(crate) raw_sdl: Arc<String>,
    types: IndexMap<String, TypeDefinition>,
    scalars: IndexSet<String>,
    query_type: String,
    mutation_type: Option<String>,
    definitions: Valid<apollo_compiler::Schema>,
    pub(crate) schema_id: String,
}

impl Schema {
    /// Builds a schema from SDL text.
    pub fn parse(raw_sdl: &str) -> Result<Self, SchemaError> {
        let document = ast::Document::parse(raw_sdl, "schema.graphql")
            .map_err(|invalid| SchemaError::Parse(invalid.into()))?;

        let mut types = Vec::new();
        let mut scalars = Vec::new();
        let mut query_root = None;
        for definition in &document.definitions {
            match definition {
                ast::Definition::ObjectTypeDefinition(object) => {
                    types.push(TypeDefinition {
                        name: object.name.to_string(),
                        fields: object
                            .fields
                            .iter()
                            .map(|field| FieldDefinition {
                                name: field.name.to_string(),
                                ty: FieldType::from(&field.ty),
                                arguments: field
                                    .arguments
                                    .iter()
                                    .map(|argument| ArgumentDefinition {
                                        name: argument.name.to_string(),
                                        ty: FieldType::from(&*argument.ty),
                                    })
                                    .collect(),
                            })
                            .collect(),
                    });
                }
                ast::Definition::ScalarTypeDefinition(scalar) => {
                    scalars.push(scalar.name.to_string());
                }
                ast::Definition::SchemaDefinition(schema) => {
                    query_root = schema
                        .root_operations
                        .iter()
                        .find(|root| root.0 == OperationType::Query)
                        .map(|root| root.1.to_string());
                }
                ast::Definition::DirectiveDefinition(_) => {}
                other => {
                    let name = other
                        .name()
                        .map(|name| name.to_string())
                        .unwrap_or_default();
                    return Err(SchemaError::UnsupportedType {
                        name,
                        kind: definition_kind(other),
                    });
                }
            }
        }
        check_definitions(&types, &scalars)?;
        let query_root = query_root.as_deref().unwrap_or("Query");
        if !types.iter().any(|ty| ty.name == query_root) {
            return Err(SchemaError::MissingQueryType);
        }

        let definitions = document
            .to_schema_validate()
            .map_err(|errors| SchemaError::Validate(errors.into()))?;

        let query_type = definitions
            .root_operation(OperationType::Query)
            .map(|name| name.to_string())
            .ok_or(SchemaError::MissingQueryType)?;
        let mutation_type = definitions
            .root_operation(OperationType::Mutation)
            .map(|name| name.to_string());

        Ok(Schema {
            raw_sdl: Arc::new(raw_sdl.to_string()),
            types: types
                .into_iter()
                .map(|definition| (definition.name.clone(), definition))
                .collect(),
            scalars: BUILT_IN_SCALARS
                .iter()
                .map(|name| name.to_string())
                .chain(scalars)
                .collect(),
            query_type,
            mutation_type,
            definitions,
            schema_id: Schema::schema_id(raw_sdl),
        })
    }

    /// Builds a schema from type definitions and custom scalar names.
    ///
    /// The definitions are checked, rendered to SDL and parsed back, so both
    /// construction paths produce the same schema.
    pub fn from_definitions(
        types: Vec<TypeDefinition>,
        scalars: Vec<String>,
    ) -> Result<Self, SchemaError> {
        check_definitions(&types, &scalars)?;
        Self::parse(&render_sdl(&types, &scalars))
    }

    pub(crate) fn schema_id(sdl: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(sdl.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// The object type named `name`.
    pub fn object_type(&self, name: &str) -> Option<&TypeDefinition> {
        self.types.get(name)
    }

    pub fn object_types(&self) -> impl Iterator<Item = &TypeDefinition> {
        self.types.values()
    }

    pub fn is_scalar(&self, name: &str) -> bool {
        self.scalars.contains(name)
    }

    /// The name of the root type for an operation kind, if the schema has one.
    pub fn root_type(&self, kind: OperationKind) -> Option<&str> {
        match kind {
            OperationKind::Query => Some(self.query_type.as_str()),
            OperationKind::Mutation => self.mutation_type.as_deref(),
        }
    }

    pub(crate) fn is_root_type(&self, name: &str) -> bool {
        self.query_type == name || self.mutation_type.as_deref() == Some(name)
    }

    pub fn as_sdl(&self) -> &str {
        &self.raw_sdl
    }

    pub(crate) fn definitions(&self) -> &Valid<apollo_compiler::Schema> {
        &self.definitions
    }
}

fn definition_kind(definition: &ast::Definition) -> &'static str {
    match definition {
        ast::Definition::InterfaceTypeDefinition(_) => "interface",
        ast::Definition::UnionTypeDefinition(_) => "union",
        ast::Definition::EnumTypeDefinition(_) => "enum",
        ast::Definition::InputObjectTypeDefinition(_) => "input object",
        ast::Definition::OperationDefinition(_) => "operation",
        ast::Definition::FragmentDefinition(_) => "fragment",
        ast::Definition::SchemaExtension(_) => "schema extension",
        ast::Definition::ScalarTypeExtension(_)
        | ast::Definition::ObjectTypeExtension(_)
        | ast::Definition::InterfaceTypeExtension(_)
        | ast::Definition::UnionTypeExtension(_)
        | ast::Definition::EnumTypeExtension(_)
        | ast::Definition::InputObjectTypeExtension(_) => "type extension",
        _ => "definition",
    }
}

fn check_definitions(types: &[TypeDefinition], scalars: &[String]) -> Result<(), SchemaError> {
    let mut declared = HashSet::new();
    for name in BUILT_IN_SCALARS
        .iter()
        .copied()
        .chain(scalars.iter().map(String::as_str))
        .chain(types.iter().map(|ty| ty.name.as_str()))
    {
        if !declared.insert(name) {
            return Err(SchemaError::DuplicateType(name.to_string()));
        }
    }

    for ty in types {
        let mut fields = HashSet::new();
        for field in &ty.fields {
            if !fields.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateField {
                    type_name: ty.name.clone(),
                    field: field.name.clone(),
                });
            }

            let references = std::iter::once((field.name.clone(), &field.ty)).chain(
                field.arguments.iter().map(|argument| {
                    (format!("{}({}:)", field.name, argument.name), &argument.ty)
                }),
            );
            for (location, referenced) in references {
                if !declared.contains(referenced.inner_type_name()) {
                    return Err(SchemaError::UndeclaredType {
                        type_name: ty.name.clone(),
                        field: location,
                        referenced: referenced.inner_type_name().to_string(),
                    });
                }
            }
        }
    }
    Ok(())
}

fn render_sdl(types: &[TypeDefinition], scalars: &[String]) -> String {
    let mut sdl = String::new();
    for scalar in scalars {
        let _ = writeln!(sdl, "scalar {scalar}\n");
    }
    for ty in types {
        let _ = writeln!(sdl, "type {} {{", ty.name);
        for field in &ty.fields {
            let _ = write!(sdl, "  {}", field.name);
            if !field.arguments.is_empty() {
                let arguments = field
                    .arguments
                    .iter()
                    .map(|argument| format!("{}: {}", argument.name, argument.ty))
                    .collect::<Vec<_>>()
                    .join(", ");
                let _ = write!(sdl, "({arguments})");
            }
            let _ = writeln!(sdl, ": {}", field.ty);
        }
        let _ = writeln!(sdl, "}}\n");
    }
    sdl
}
