//! The chat schema: users in the document store, messages in the relational store.

use sha2::Digest;
use sha2::Sha256;

use crate::error::SchemaError;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::registry::Registry;
use crate::resolvers::ResolverArgs;
use crate::resolvers::ResolverResult;
use crate::resolvers::Resolvers;
use crate::sources::EntityKind;
use crate::sources::Filter;
use crate::sources::Record;
use crate::spec::Schema;

/// The chat schema SDL.
pub const SCHEMA: &str = include_str!("chat.graphql");

/// Builds the registry for the chat schema.
pub fn registry() -> Result<Registry, SchemaError> {
    Registry::new(Schema::parse(SCHEMA)?, resolvers())
}

/// The chat resolvers.
pub fn resolvers() -> Resolvers {
    Resolvers::new()
        .field("Query", "users", users)
        .field("Query", "messages", messages)
        .field("Mutation", "addUser", add_user)
        .field("Mutation", "sendMessage", send_message)
        .field("User", "name", user_name)
        .field("Message", "sentBy", message_sender)
        .backed_by("User", EntityKind::User)
        .backed_by("Message", EntityKind::Message)
}

fn records(records: Vec<Record>) -> Value {
    Value::Array(records.into_iter().map(Value::Object).collect())
}

async fn users(args: ResolverArgs) -> ResolverResult {
    let users = args
        .context
        .users()
        .find_many(EntityKind::User, &Filter::all())
        .await?;
    Ok(records(users))
}

async fn messages(args: ResolverArgs) -> ResolverResult {
    let messages = args
        .context
        .messages()
        .find_many(EntityKind::Message, &Filter::all())
        .await?;
    Ok(records(messages))
}

async fn add_user(args: ResolverArgs) -> ResolverResult {
    let mut fields = Object::new();
    for name in ["firstName", "lastName", "email"] {
        fields.insert(name, Value::String(args.required_str(name)?.into()));
    }
    fields.insert(
        "passwordDigest",
        Value::String(password_digest(args.required_str("password")?).into()),
    );

    let user = args.context.users().create(EntityKind::User, fields).await?;
    tracing::info!(user = ?user.get("userID"), "user added");
    Ok(Value::Object(user))
}

async fn send_message(args: ResolverArgs) -> ResolverResult {
    let mut fields = Object::new();
    fields.insert("sentBy", Value::String(args.required_id("sentBy")?.into()));
    fields.insert("text", Value::String(args.required_str("text")?.into()));

    let message = args
        .context
        .messages()
        .create(EntityKind::Message, fields)
        .await?;
    Ok(Value::Object(message))
}

/// `firstName lastName`, or null when either part is missing.
async fn user_name(args: ResolverArgs) -> ResolverResult {
    let first_name = args.parent_attribute("firstName").and_then(Value::as_str);
    let last_name = args.parent_attribute("lastName").and_then(Value::as_str);
    Ok(match (first_name, last_name) {
        (Some(first_name), Some(last_name)) => {
            Value::String(format!("{first_name} {last_name}").into())
        }
        _ => Value::Null,
    })
}

/// The sender is a weak reference: a missing user resolves to null.
async fn message_sender(args: ResolverArgs) -> ResolverResult {
    let Some(sent_by) = args.parent_attribute("sentBy").cloned() else {
        return Ok(Value::Null);
    };
    let user = args
        .context
        .users()
        .find_one(EntityKind::User, &Filter::all().eq("userID", sent_by))
        .await?;
    Ok(user.map(Value::Object).unwrap_or(Value::Null))
}

fn password_digest(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;
    use crate::configuration::Sources;
    use crate::context::ContextFactory;
    use crate::context::DataSources;
    use crate::context::RequestMetadata;
    use crate::json_ext::Path;

    fn args(factory: &ContextFactory, parent: Value, arguments: Value) -> ResolverArgs {
        ResolverArgs {
            parent,
            arguments: arguments.as_object().cloned().unwrap_or_default(),
            context: factory.build_context(&RequestMetadata::default()),
            path: Path::empty(),
        }
    }

    fn factory() -> ContextFactory {
        ContextFactory::new(DataSources::from_configuration(&Sources::default()).unwrap())
    }

    #[test]
    fn registry_builds() {
        let registry = registry().unwrap();
        assert!(registry.is_passthrough("User", "email"));
        assert!(registry.is_passthrough("Message", "text"));
        assert!(registry.lookup_binding("Message", "sentBy").is_some());
    }

    #[test]
    fn digest_is_sha256_hex() {
        assert_eq!(
            password_digest("secret"),
            "2bb80d537b1da3e38bd30361aa855686bde0eacd7162fef6a25fe97bf527a25b"
        );
    }

    #[tokio::test]
    async fn add_user_stores_digest_not_password() {
        let factory = factory();
        let user = add_user(args(
            &factory,
            Value::Null,
            json!({ "firstName": "Ada", "lastName": "Lovelace", "email": "ada@example.com", "password": "secret" }),
        ))
        .await
        .unwrap();
        assert!(user.get("password").is_none());
        assert_eq!(
            user.get("passwordDigest"),
            Some(&json!(password_digest("secret")))
        );
        assert_eq!(user.get("firstName"), Some(&json!("Ada")));

        let stored = factory
            .sources()
            .users
            .find_many(EntityKind::User, &Filter::all())
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn name_needs_both_parts() {
        let factory = factory();
        let name = user_name(args(
            &factory,
            json!({ "firstName": "Ada", "lastName": "Lovelace" }),
            json!({}),
        ))
        .await
        .unwrap();
        assert_eq!(name, json!("Ada Lovelace"));

        let name = user_name(args(&factory, json!({ "firstName": "Ada" }), json!({})))
            .await
            .unwrap();
        assert_eq!(name, Value::Null);
    }

    #[tokio::test]
    async fn unknown_sender_is_null() {
        let factory = factory();
        let sender = message_sender(args(
            &factory,
            json!({ "id": 1, "sentBy": "nobody", "text": "hi" }),
            json!({}),
        ))
        .await
        .unwrap();
        assert_eq!(sender, Value::Null);
    }

    #[tokio::test]
    async fn send_message_requires_arguments() {
        let factory = factory();
        let error = send_message(args(&factory, Value::Null, json!({ "sentBy": "u1" })))
            .await
            .unwrap_err();
        assert_eq!(error.to_string(), "missing required argument 'text'");
    }
}
