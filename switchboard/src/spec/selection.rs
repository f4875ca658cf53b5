use apollo_compiler::ast;
use apollo_compiler::executable;
use apollo_compiler::executable::ExecutableDocument;
use indexmap::IndexMap;
use indexmap::map::Entry;

use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::spec::FieldType;
use crate::spec::SpecError;
use crate::spec::TYPENAME;

/// A field requested by an operation, after fragments are flattened and
/// `@skip`/`@include` are applied.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSelection {
    /// The key under which the field appears in the response (alias or name).
    pub response_key: String,
    /// The schema field name.
    pub name: String,
    /// The declared type of the field.
    pub field_type: FieldType,
    /// Argument values with variables substituted and defaults applied.
    pub arguments: Object,
    /// Sub-selections, empty for leaf fields.
    pub selections: Vec<FieldSelection>,
}

impl FieldSelection {
    pub(crate) fn is_typename_field(&self) -> bool {
        self.name == TYPENAME
    }

    // Fields sharing a response key have identical names and arguments once
    // validated, so only their sub-selections need merging.
    fn merge(&mut self, other: FieldSelection) {
        let mut selections: IndexMap<String, FieldSelection> = std::mem::take(&mut self.selections)
            .into_iter()
            .map(|selection| (selection.response_key.clone(), selection))
            .collect();
        for selection in other.selections {
            insert_selection(&mut selections, selection);
        }
        self.selections = selections.into_values().collect();
    }
}

fn insert_selection(selections: &mut IndexMap<String, FieldSelection>, selection: FieldSelection) {
    match selections.entry(selection.response_key.clone()) {
        Entry::Occupied(mut entry) => entry.get_mut().merge(selection),
        Entry::Vacant(entry) => {
            entry.insert(selection);
        }
    }
}

/// Flattens a selection set into its fields, keyed by response key in
/// request order.
pub(crate) struct SelectionCollector<'a> {
    document: &'a ExecutableDocument,
    variables: &'a Object,
}

impl<'a> SelectionCollector<'a> {
    pub(crate) fn new(document: &'a ExecutableDocument, variables: &'a Object) -> Self {
        Self {
            document,
            variables,
        }
    }

    pub(crate) fn collect(
        &self,
        selection_set: &executable::SelectionSet,
    ) -> Result<Vec<FieldSelection>, SpecError> {
        let mut fields = IndexMap::new();
        self.collect_into(selection_set, &mut fields, 0)?;
        Ok(fields.into_values().collect())
    }

    fn collect_into(
        &self,
        selection_set: &executable::SelectionSet,
        fields: &mut IndexMap<String, FieldSelection>,
        mut count: usize,
    ) -> Result<(), SpecError> {
        // Bounded well above any legitimate operation depth.
        const RECURSION_LIMIT: usize = 512;
        if count > RECURSION_LIMIT {
            tracing::error!("selection processing recursion limit({RECURSION_LIMIT}) exceeded");
            return Err(SpecError::RecursionLimitExceeded);
        }
        count += 1;

        for selection in &selection_set.selections {
            match selection {
                // Spec: https://spec.graphql.org/draft/#Field
                executable::Selection::Field(field) => {
                    if !self.included(&field.directives) {
                        continue;
                    }
                    if field.name.starts_with("__") && field.name != TYPENAME {
                        return Err(SpecError::IntrospectionNotSupported(field.name.to_string()));
                    }

                    let mut selections = IndexMap::new();
                    self.collect_into(&field.selection_set, &mut selections, count)?;

                    insert_selection(
                        fields,
                        FieldSelection {
                            response_key: field.response_key().to_string(),
                            name: field.name.to_string(),
                            field_type: FieldType::from(field.ty()),
                            arguments: self.arguments(field),
                            selections: selections.into_values().collect(),
                        },
                    );
                }
                // Spec: https://spec.graphql.org/draft/#InlineFragment
                executable::Selection::InlineFragment(inline_fragment) => {
                    if !self.included(&inline_fragment.directives) {
                        continue;
                    }
                    let applies = inline_fragment
                        .type_condition
                        .as_ref()
                        .is_none_or(|condition| *condition == selection_set.ty);
                    if applies {
                        self.collect_into(&inline_fragment.selection_set, fields, count)?;
                    }
                }
                // Spec: https://spec.graphql.org/draft/#FragmentSpread
                executable::Selection::FragmentSpread(fragment_spread) => {
                    if !self.included(&fragment_spread.directives) {
                        continue;
                    }
                    if let Some(fragment) = self
                        .document
                        .fragments
                        .get(&fragment_spread.fragment_name)
                        && *fragment.type_condition() == selection_set.ty
                    {
                        self.collect_into(&fragment.selection_set, fields, count)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Evaluates `@skip(if:)` and `@include(if:)`.
    fn included(&self, directives: &executable::DirectiveList) -> bool {
        let condition = |name: &str| {
            directives
                .get(name)
                .and_then(|directive| directive.specified_argument_by_name("if"))
                .map(|value| match &**value {
                    ast::Value::Boolean(b) => *b,
                    ast::Value::Variable(variable) => self
                        .variables
                        .get(variable.as_str())
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                    _ => false,
                })
        };
        !condition("skip").unwrap_or(false) && condition("include").unwrap_or(true)
    }

    /// Argument values for a field, in declaration order.
    ///
    /// Arguments that are neither provided nor defaulted are absent. A
    /// variable that was not provided counts as not provided.
    fn arguments(&self, field: &executable::Field) -> Object {
        let mut arguments = Object::new();
        for definition in &field.definition.arguments {
            let provided = field
                .arguments
                .iter()
                .find(|argument| argument.name == definition.name)
                .map(|argument| &argument.value)
                .filter(|value| match &***value {
                    ast::Value::Variable(variable) => {
                        self.variables.contains_key(variable.as_str())
                    }
                    _ => true,
                });
            let value = match (provided, &definition.default_value) {
                (Some(value), _) => value_to_json(value, self.variables),
                (None, Some(default)) => value_to_json(default, self.variables),
                (None, None) => continue,
            };
            arguments.insert(definition.name.as_str(), value);
        }
        arguments
    }
}

/// Converts a GraphQL input value literal to JSON.
pub(crate) fn value_to_json(value: &ast::Value, variables: &Object) -> Value {
    match value {
        ast::Value::Null => Value::Null,
        ast::Value::Enum(name) => Value::String(name.as_str().into()),
        ast::Value::Variable(name) => variables
            .get(name.as_str())
            .cloned()
            .unwrap_or(Value::Null),
        ast::Value::String(s) => Value::String(s.as_str().into()),
        ast::Value::Float(f) => f
            .as_str()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ast::Value::Int(i) => match i.as_str().parse::<i64>() {
            Ok(int) => Value::from(int),
            Err(_) => i
                .as_str()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::Null),
        },
        ast::Value::Boolean(b) => Value::Bool(*b),
        ast::Value::List(items) => Value::Array(
            items
                .iter()
                .map(|item| value_to_json(item, variables))
                .collect(),
        ),
        ast::Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(name, value)| (name.as_str().into(), value_to_json(value, variables)))
                .collect(),
        ),
    }
}
