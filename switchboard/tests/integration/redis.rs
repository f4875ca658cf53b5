use http::StatusCode;
use serde_json::json;

use crate::integration::IntegrationTest;
use crate::integration::common::env_url;
use crate::integration::common::namespace;

async fn gateway() -> IntegrationTest {
    let url = env_url("SWITCHBOARD_TEST_REDIS_URL", "redis://localhost:6379");
    IntegrationTest::new(&format!(
        r#"
sources:
  users:
    redis:
      url: {url}
      namespace: {namespace}
      pool_size: 2
      acquire_timeout: 2s
"#,
        namespace = namespace(),
    ))
    .await
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a redis server, see SWITCHBOARD_TEST_REDIS_URL"]
async fn users_round_trip_through_redis() {
    let gateway = gateway().await;
    let ada = gateway.add_user("Ada", "Lovelace").await;
    let alan = gateway.add_user("Alan", "Turing").await;

    let (status, body) = gateway.execute_query("{ users { userID name } }").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "data": {
                "users": [
                    { "userID": ada, "name": "Ada Lovelace" },
                    { "userID": alan, "name": "Alan Turing" }
                ]
            }
        })
    );
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a redis server, see SWITCHBOARD_TEST_REDIS_URL"]
async fn senders_are_looked_up_in_redis() {
    let gateway = gateway().await;
    let ada = gateway.add_user("Ada", "Lovelace").await;
    gateway.send_message(&ada, "hello").await;
    gateway.send_message("nobody", "anyone?").await;

    let (status, body) = gateway
        .execute_query("{ messages { text sentBy { name } } }")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "data": {
                "messages": [
                    { "text": "hello", "sentBy": { "name": "Ada Lovelace" } },
                    { "text": "anyone?", "sentBy": null }
                ]
            }
        })
    );
}
