use axum::body::Body;
use http::StatusCode;
use http::header::CONTENT_TYPE;
use serde_json::json;

use crate::integration::IntegrationTest;

#[tokio::test]
async fn health_check_reports_up() {
    let gateway = IntegrationTest::in_memory().await;
    let (status, body) = gateway
        .send(http::Request::get("/health").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "UP" }));
}

#[tokio::test]
async fn queries_over_get() {
    let gateway = IntegrationTest::in_memory().await;
    gateway.send_message("nobody", "hi").await;

    let query = serde_urlencoded::to_string([
        ("query", "query Texts { messages { text } }"),
        ("operationName", "Texts"),
    ])
    .unwrap();
    let (status, body) = gateway
        .send(
            http::Request::get(format!("/?{query}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "data": { "messages": [{ "text": "hi" }] } }));
}

#[tokio::test]
async fn mutations_over_get_are_refused() {
    let gateway = IntegrationTest::in_memory().await;
    let query = serde_urlencoded::to_string([(
        "query",
        r#"mutation { sendMessage(sentBy: "u1", text: "hi") { id } }"#,
    )])
    .unwrap();
    let (status, body) = gateway
        .send(
            http::Request::get(format!("/?{query}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    insta::assert_json_snapshot!(body, @r###"
    {
      "errors": [
        {
          "message": "Mutations can only be sent over HTTP POST",
          "extensions": {
            "code": "MUTATION_OVER_GET"
          }
        }
      ]
    }
    "###);

    // Nothing was written.
    let (_, body) = gateway.execute_query("{ messages { id } }").await;
    assert_eq!(body, json!({ "data": { "messages": [] } }));
}

#[tokio::test]
async fn malformed_bodies_are_bad_requests() {
    let gateway = IntegrationTest::in_memory().await;
    let (status, body) = gateway
        .send(
            http::Request::post("/")
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"query": 42}"#))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.get("data").is_none());
    assert_eq!(
        body["errors"][0]["extensions"]["code"],
        "INVALID_GRAPHQL_REQUEST"
    );
}

#[tokio::test]
async fn unparsable_operations_are_bad_requests() {
    let gateway = IntegrationTest::in_memory().await;
    let (status, body) = gateway.execute_query("{ users { name }").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.get("data").is_none());
    assert_eq!(body["errors"][0]["extensions"]["code"], "GRAPHQL_PARSING_FAILED");
}

#[tokio::test]
async fn subscriptions_are_refused() {
    let gateway = IntegrationTest::in_memory().await;
    let (status, body) = gateway
        .execute_query("subscription { messages { text } }")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.get("data").is_none());
}

#[tokio::test]
async fn operation_name_selects_the_operation() {
    let gateway = IntegrationTest::in_memory().await;
    gateway.add_user("Ada", "Lovelace").await;

    let (status, body) = gateway
        .execute(json!({
            "query": "query Users { users { name } } query Messages { messages { text } }",
            "operationName": "Users",
        }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "data": { "users": [{ "name": "Ada Lovelace" }] } }));

    let (status, body) = gateway
        .execute(json!({
            "query": "query Users { users { name } } query Messages { messages { text } }",
            "operationName": "Nope",
        }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.get("data").is_none());
}
