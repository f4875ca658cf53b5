use axum::body::Body;
use http::StatusCode;
use http::header::CONTENT_TYPE;
use http_body_util::BodyExt;
use serde_json::Value;
use serde_json::json;
use switchboard::Configuration;
use switchboard::Gateway;
use tower::ServiceExt;

/// A prepared gateway driven in-process through its axum router.
pub(crate) struct IntegrationTest {
    router: axum::Router,
}

impl IntegrationTest {
    /// Builds a gateway from a YAML configuration and connects its sources.
    pub(crate) async fn new(config: &str) -> Self {
        let configuration: Configuration = config.parse().expect("valid configuration");
        let gateway = Gateway::new(configuration).expect("gateway builds");
        gateway.prepare().await.expect("sources are reachable");
        Self {
            router: gateway.router(),
        }
    }

    /// Both sources in memory.
    pub(crate) async fn in_memory() -> Self {
        Self::new("").await
    }

    pub(crate) async fn execute_query(&self, query: &str) -> (StatusCode, Value) {
        self.execute(json!({ "query": query })).await
    }

    pub(crate) async fn execute(&self, body: Value) -> (StatusCode, Value) {
        self.send(
            http::Request::post("/")
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .expect("valid request"),
        )
        .await
    }

    pub(crate) async fn send(&self, request: http::Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("body is readable")
            .to_bytes();
        (
            status,
            serde_json::from_slice(&body).expect("body is JSON"),
        )
    }

    /// Adds a user and returns its `userID`.
    pub(crate) async fn add_user(&self, first_name: &str, last_name: &str) -> String {
        let (status, body) = self
            .execute(json!({
                "query": "mutation AddUser($firstName: String!, $lastName: String!) {
                    addUser(firstName: $firstName, lastName: $lastName, email: \"someone@example.com\", password: \"secret\") { userID }
                }",
                "variables": { "firstName": first_name, "lastName": last_name },
            }))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["data"]["addUser"]["userID"]
            .as_str()
            .expect("userID is a string")
            .to_string()
    }

    /// Sends a message and returns its `id`.
    pub(crate) async fn send_message(&self, sent_by: &str, text: &str) -> String {
        let (status, body) = self
            .execute(json!({
                "query": "mutation SendMessage($sentBy: ID!, $text: String!) {
                    sendMessage(sentBy: $sentBy, text: $text) { id }
                }",
                "variables": { "sentBy": sent_by, "text": text },
            }))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["data"]["sendMessage"]["id"]
            .as_str()
            .expect("id is a string")
            .to_string()
    }
}

/// Reads a store URL for the ignored tests, falling back to a local server.
pub(crate) fn env_url(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

/// A namespace no other test run writes to.
pub(crate) fn namespace() -> String {
    format!("switchboard-test-{}", uuid::Uuid::new_v4().simple())
}
