//! Schema registry.
//!
//! Pairs the schema with its resolver bindings and checks, once at startup,
//! that every declared field can be resolved.

use std::collections::HashMap;
use std::collections::HashSet;

use crate::error::SchemaError;
use crate::resolvers::ResolverBinding;
use crate::resolvers::Resolvers;
use crate::spec::FieldDefinition;
use crate::spec::Schema;

/// The schema and its resolvers, immutable once built.
#[derive(Debug)]
pub struct Registry {
    schema: Schema,
    bindings: HashMap<(String, String), ResolverBinding>,
    shapes: HashMap<String, HashSet<String>>,
}

impl Registry {
    /// Builds the registry, rejecting any field that could not be resolved.
    ///
    /// Root fields and fields of object type need a binding. Scalar fields
    /// without one are passed through from the parent record, so they must
    /// name an attribute of the record shape declared for their type.
    pub fn new(schema: Schema, resolvers: Resolvers) -> Result<Self, SchemaError> {
        let mut bindings = HashMap::new();
        for binding in resolvers.bindings {
            if schema
                .object_type(&binding.type_name)
                .and_then(|ty| ty.get_field(&binding.field_name))
                .is_none()
            {
                return Err(SchemaError::UnknownBinding {
                    type_name: binding.type_name,
                    field: binding.field_name,
                });
            }
            let key = (binding.type_name.clone(), binding.field_name.clone());
            if bindings.contains_key(&key) {
                return Err(SchemaError::DuplicateBinding {
                    type_name: key.0,
                    field: key.1,
                });
            }
            bindings.insert(key, binding);
        }

        let shapes: HashMap<String, HashSet<String>> = resolvers
            .shapes
            .into_iter()
            .map(|(type_name, attributes)| (type_name, attributes.into_iter().collect()))
            .collect();

        for ty in schema.object_types() {
            let is_root = schema.is_root_type(&ty.name);
            for field in &ty.fields {
                if bindings.contains_key(&(ty.name.clone(), field.name.clone())) {
                    continue;
                }
                let passthrough = !is_root
                    && schema.is_scalar(field.ty.inner_type_name())
                    && shapes
                        .get(&ty.name)
                        .is_some_and(|shape| shape.contains(&field.name));
                if !passthrough {
                    return Err(SchemaError::MissingResolver {
                        type_name: ty.name.clone(),
                        field: field.name.clone(),
                    });
                }
            }
        }

        tracing::debug!(
            bindings = bindings.len(),
            schema_id = %schema.schema_id,
            "schema registry built"
        );
        Ok(Self {
            schema,
            bindings,
            shapes,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn lookup_field(&self, type_name: &str, field_name: &str) -> Option<&FieldDefinition> {
        self.schema
            .object_type(type_name)
            .and_then(|ty| ty.get_field(field_name))
    }

    pub fn lookup_binding(&self, type_name: &str, field_name: &str) -> Option<&ResolverBinding> {
        self.bindings
            .get(&(type_name.to_string(), field_name.to_string()))
    }

    /// Whether an unbound `field_name` of `type_name` is read from the parent record.
    pub fn is_passthrough(&self, type_name: &str, field_name: &str) -> bool {
        self.lookup_binding(type_name, field_name).is_none()
            && self
                .shapes
                .get(type_name)
                .is_some_and(|shape| shape.contains(field_name))
    }
}
