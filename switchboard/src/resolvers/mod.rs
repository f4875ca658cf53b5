//! Field resolvers and their bindings to schema fields.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::context::Context;
use crate::error::FieldError;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;
use crate::sources::EntityKind;

/// The outcome of a field resolver.
pub type ResolverResult = Result<Value, FieldError>;

/// Everything a resolver gets to compute one field value.
#[derive(Clone, Debug)]
pub struct ResolverArgs {
    /// The value of the parent object, `null` for root fields.
    pub parent: Value,
    /// Argument values, coerced and with defaults applied.
    pub arguments: Object,
    /// The request context.
    pub context: Context,
    /// Where the field sits in the response.
    pub path: Path,
}

impl ResolverArgs {
    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.arguments.get(name).filter(|value| !value.is_null())
    }

    /// A required string argument.
    pub fn required_str(&self, name: &str) -> Result<&str, FieldError> {
        match self.argument(name) {
            None => Err(FieldError::MissingArgument(name.to_string())),
            Some(value) => value.as_str().ok_or_else(|| FieldError::InvalidArgument {
                name: name.to_string(),
                reason: "expected a string".to_string(),
            }),
        }
    }

    /// A required `ID` argument, as its string form.
    pub fn required_id(&self, name: &str) -> Result<String, FieldError> {
        match self.argument(name) {
            None => Err(FieldError::MissingArgument(name.to_string())),
            Some(value) => value
                .as_identifier()
                .ok_or_else(|| FieldError::InvalidArgument {
                    name: name.to_string(),
                    reason: "expected a string or an integer".to_string(),
                }),
        }
    }

    /// An attribute of the parent value.
    pub fn parent_attribute(&self, name: &str) -> Option<&Value> {
        self.parent.attribute(name).filter(|value| !value.is_null())
    }
}

/// Computes one schema field.
///
/// Implemented for any `Fn(ResolverArgs) -> impl Future<Output = ResolverResult>`.
pub trait FieldResolver: Send + Sync + 'static {
    fn resolve(&self, args: ResolverArgs) -> BoxFuture<'static, ResolverResult>;
}

impl<F, Fut> FieldResolver for F
where
    F: Fn(ResolverArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ResolverResult> + Send + 'static,
{
    fn resolve(&self, args: ResolverArgs) -> BoxFuture<'static, ResolverResult> {
        Box::pin(self(args))
    }
}

/// A resolver bound to a `(type, field)` pair.
#[derive(Clone)]
pub struct ResolverBinding {
    pub(crate) type_name: String,
    pub(crate) field_name: String,
    resolver: Arc<dyn FieldResolver>,
}

impl ResolverBinding {
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn resolve(&self, args: ResolverArgs) -> BoxFuture<'static, ResolverResult> {
        self.resolver.resolve(args)
    }
}

impl fmt::Debug for ResolverBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResolverBinding({}.{})", self.type_name, self.field_name)
    }
}

/// Resolver bindings plus the record shape behind each object type.
///
/// Unbound scalar fields resolve by passthrough, which is only allowed for
/// attributes of the type's record shape.
#[derive(Default, Clone, Debug)]
pub struct Resolvers {
    pub(crate) bindings: Vec<ResolverBinding>,
    pub(crate) shapes: HashMap<String, Vec<String>>,
}

impl Resolvers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `resolver` to `type_name.field_name`.
    pub fn field(
        mut self,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        resolver: impl FieldResolver,
    ) -> Self {
        self.bindings.push(ResolverBinding {
            type_name: type_name.into(),
            field_name: field_name.into(),
            resolver: Arc::new(resolver),
        });
        self
    }

    /// Declares that values of `type_name` are records of `kind`.
    pub fn backed_by(self, type_name: impl Into<String>, kind: EntityKind) -> Self {
        self.with_attributes(type_name, kind.attributes().iter().copied())
    }

    /// Declares the attributes values of `type_name` carry.
    pub fn with_attributes<I, S>(mut self, type_name: impl Into<String>, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.shapes
            .entry(type_name.into())
            .or_default()
            .extend(attributes.into_iter().map(Into::into));
        self
    }
}
