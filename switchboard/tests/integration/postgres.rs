use http::StatusCode;
use serde_json::Value;
use serde_json::json;

use crate::integration::IntegrationTest;
use crate::integration::common::env_url;
use crate::integration::common::namespace;

async fn gateway() -> IntegrationTest {
    let url = env_url(
        "SWITCHBOARD_TEST_POSTGRES_URL",
        "postgres://postgres@localhost:5432/switchboard",
    );
    IntegrationTest::new(&format!(
        r#"
sources:
  messages:
    postgres:
      url: {url}
      pool_size: 2
      acquire_timeout: 2s
"#
    ))
    .await
}

// The table is shared between runs: assertions only look at this run's texts.
fn with_text<'a>(body: &'a Value, text: &str) -> Vec<&'a Value> {
    body["data"]["messages"]
        .as_array()
        .expect("messages is a list")
        .iter()
        .filter(|message| message["text"] == text)
        .collect()
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a postgres server, see SWITCHBOARD_TEST_POSTGRES_URL"]
async fn sent_message_is_stored_once() {
    let gateway = gateway().await;
    let ada = gateway.add_user("Ada", "Lovelace").await;
    let text = namespace();
    let id = gateway.send_message(&ada, &text).await;

    let (status, body) = gateway
        .execute_query("{ messages { id text sentBy { userID name } } }")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        with_text(&body, &text),
        vec![&json!({
            "id": id,
            "text": text,
            "sentBy": { "userID": ada, "name": "Ada Lovelace" }
        })]
    );
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a postgres server, see SWITCHBOARD_TEST_POSTGRES_URL"]
async fn ids_increase_in_declaration_order() {
    let gateway = gateway().await;
    let text = namespace();

    let (status, body) = gateway
        .execute(json!({
            "query": "mutation Pair($text: String!) {
                first: sendMessage(sentBy: \"nobody\", text: $text) { id }
                second: sendMessage(sentBy: \"nobody\", text: $text) { id }
            }",
            "variables": { "text": text },
        }))
        .await;
    assert_eq!(status, StatusCode::OK);
    let first: i64 = body["data"]["first"]["id"].as_str().unwrap().parse().unwrap();
    let second: i64 = body["data"]["second"]["id"].as_str().unwrap().parse().unwrap();
    assert!(first < second);
}
