use http::StatusCode;
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::Value;
use serde_json::json;

use crate::integration::IntegrationTest;

#[rstest]
#[case::plain("Ada", "Lovelace")]
#[case::unicode("Grace", "Hopper-Müller")]
#[case::spaces("Mary Ann", "van der Berg")]
#[tokio::test]
async fn name_is_first_then_last_name(#[case] first_name: &str, #[case] last_name: &str) {
    let gateway = IntegrationTest::in_memory().await;
    let user_id = gateway.add_user(first_name, last_name).await;

    let (status, body) = gateway.execute_query("{ users { userID name } }").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "data": {
                "users": [{ "userID": user_id, "name": format!("{first_name} {last_name}") }]
            }
        })
    );
}

#[tokio::test]
async fn passwords_never_leave_the_store() {
    let gateway = IntegrationTest::in_memory().await;
    gateway.add_user("Ada", "Lovelace").await;

    let (status, body) = gateway
        .execute_query("{ users { passwordDigest } }")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.get("data").is_none());
    assert_eq!(
        body["errors"][0]["extensions"]["code"],
        "GRAPHQL_VALIDATION_FAILED"
    );
}

#[tokio::test]
async fn sent_message_is_listed_once() {
    let gateway = IntegrationTest::in_memory().await;
    let user_id = gateway.add_user("Ada", "Lovelace").await;
    let before = gateway.execute_query("{ messages { id } }").await.1;
    assert_eq!(before, json!({ "data": { "messages": [] } }));

    let id = gateway.send_message(&user_id, "hello").await;

    let (status, body) = gateway
        .execute_query("{ messages { id text sentBy { userID name } } }")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "data": {
                "messages": [{
                    "id": id,
                    "text": "hello",
                    "sentBy": { "userID": user_id, "name": "Ada Lovelace" }
                }]
            }
        })
    );
}

#[tokio::test]
async fn unknown_sender_is_null_without_error() {
    let gateway = IntegrationTest::in_memory().await;
    gateway.send_message("nobody", "anyone there?").await;

    let (status, body) = gateway
        .execute_query("{ messages { text sentBy { name } } }")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "data": { "messages": [{ "text": "anyone there?", "sentBy": null }] } })
    );
}

#[tokio::test]
async fn mutation_fields_run_in_declaration_order() {
    // A single users session held for 100ms per call. The first field needs it to
    // complete `sentBy`, the second to store the new user: run together, one of
    // them would time out.
    let gateway = IntegrationTest::new(
        r#"
sources:
  users:
    memory:
      pool_size: 1
      acquire_timeout: 10ms
      latency: 100ms
"#,
    )
    .await;
    let user_id = gateway.add_user("Ada", "Lovelace").await;

    let (status, body) = gateway
        .execute(json!({
            "query": "mutation Conversation($sentBy: ID!) {
                first: sendMessage(sentBy: $sentBy, text: \"one\") { id sentBy { name } }
                second: addUser(firstName: \"Alan\", lastName: \"Turing\", email: \"alan@example.com\", password: \"enigma\") { name }
                third: sendMessage(sentBy: $sentBy, text: \"two\") { id }
            }",
            "variables": { "sentBy": user_id },
        }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "data": {
                "first": { "id": "1", "sentBy": { "name": "Ada Lovelace" } },
                "second": { "name": "Alan Turing" },
                "third": { "id": "2" }
            }
        })
    );

    let (_, body) = gateway
        .execute_query("{ users { name } messages { text } }")
        .await;
    assert_eq!(
        body,
        json!({
            "data": {
                "users": [{ "name": "Ada Lovelace" }, { "name": "Alan Turing" }],
                "messages": [{ "text": "one" }, { "text": "two" }]
            }
        })
    );
}

#[tokio::test]
async fn query_siblings_are_independent() {
    let gateway = IntegrationTest::in_memory().await;
    let ada = gateway.add_user("Ada", "Lovelace").await;
    let alan = gateway.add_user("Alan", "Turing").await;
    gateway.send_message(&alan, "hi Ada").await;
    gateway.send_message(&ada, "hi Alan").await;

    let (status, body) = gateway
        .execute_query(
            "query Everything {
                users { name }
                messages { text sentBy { name } }
                people: users { userID }
            }",
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "data": {
                "users": [{ "name": "Ada Lovelace" }, { "name": "Alan Turing" }],
                "messages": [
                    { "text": "hi Ada", "sentBy": { "name": "Alan Turing" } },
                    { "text": "hi Alan", "sentBy": { "name": "Ada Lovelace" } }
                ],
                "people": [{ "userID": ada }, { "userID": alan }]
            }
        })
    );
}

#[tokio::test]
async fn connection_timeout_nulls_only_the_failing_field() {
    // One users session, held for 200ms by whichever sender lookup gets it first.
    let gateway = IntegrationTest::new(
        r#"
sources:
  users:
    memory:
      pool_size: 1
      acquire_timeout: 10ms
      latency: 200ms
"#,
    )
    .await;
    let user_id = gateway.add_user("Ada", "Lovelace").await;
    gateway.send_message(&user_id, "one").await;
    gateway.send_message(&user_id, "two").await;

    let (status, body) = gateway
        .execute_query("{ messages { text sentBy { name } } }")
        .await;
    assert_eq!(status, StatusCode::OK);

    let messages = body["data"]["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["text"], "one");
    assert_eq!(messages[1]["text"], "two");
    let senders: Vec<&Value> = messages.iter().map(|message| &message["sentBy"]).collect();
    assert_eq!(senders.iter().filter(|sender| sender.is_null()).count(), 1);
    assert!(
        senders
            .iter()
            .any(|sender| **sender == json!({ "name": "Ada Lovelace" }))
    );

    let errors = body["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["extensions"]["code"], "CONNECTION_TIMEOUT");
    let index = senders.iter().position(|sender| sender.is_null()).unwrap();
    assert_eq!(errors[0]["path"], json!(["messages", index, "sentBy"]));
}

#[tokio::test]
async fn missing_variables_are_request_errors() {
    let gateway = IntegrationTest::in_memory().await;
    let (status, body) = gateway
        .execute(json!({
            "query": "mutation SendMessage($sentBy: ID!, $text: String!) {
                sendMessage(sentBy: $sentBy, text: $text) { id }
            }",
            "variables": { "sentBy": "u1" },
        }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.get("data").is_none());

    let (_, body) = gateway.execute_query("{ messages { id } }").await;
    assert_eq!(body, json!({ "data": { "messages": [] } }));
}

#[tokio::test]
async fn typename_is_answered_without_a_resolver() {
    let gateway = IntegrationTest::in_memory().await;
    gateway.send_message("nobody", "hi").await;

    let (_, body) = gateway
        .execute_query("{ __typename messages { __typename text } }")
        .await;
    assert_eq!(
        body,
        json!({
            "data": {
                "__typename": "Query",
                "messages": [{ "__typename": "Message", "text": "hi" }]
            }
        })
    );
}
