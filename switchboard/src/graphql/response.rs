use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map as JsonMap;

use crate::graphql::Error;
use crate::json_ext::Object;
use crate::json_ext::Value;

/// A graphql primary response.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct Response {
    /// The response data.
    ///
    /// `None` when the request failed before execution started; `Some(Null)`
    /// when a non-null root field failed.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<Value>,

    /// The optional graphql errors encountered.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<Error>,

    /// The optional graphql extensions.
    #[serde(skip_serializing_if = "Object::is_empty", default)]
    pub extensions: Object,
}

#[buildstructor::buildstructor]
impl Response {
    /// Constructor
    #[builder(visibility = "pub")]
    fn new(
        data: Option<Value>,
        errors: Vec<Error>,
        // Skip the `Object` type alias in order to use buildstructor's map special-casing
        extensions: JsonMap<ByteString, Value>,
    ) -> Self {
        Self {
            data,
            errors,
            extensions,
        }
    }

    /// A response carrying only request level errors.
    pub fn from_errors(errors: Vec<Error>) -> Self {
        Self {
            errors,
            ..Response::default()
        }
    }

    /// Whether execution started: request level failures carry no `data`.
    pub fn is_request_error(&self) -> bool {
        self.data.is_none() && !self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;
    use crate::json_ext::Path;

    #[test]
    fn partial_response_serialization() {
        let response = Response::builder()
            .data(json!({ "users": [], "messages": null }))
            .error(
                Error::builder()
                    .message("timed out")
                    .path(Path::from("messages"))
                    .extension_code("CONNECTION_TIMEOUT")
                    .build(),
            )
            .build();

        assert_eq!(
            serde_json_bytes::to_value(&response).unwrap(),
            json!({
                "data": { "users": [], "messages": null },
                "errors": [{
                    "message": "timed out",
                    "path": ["messages"],
                    "extensions": { "code": "CONNECTION_TIMEOUT" }
                }]
            })
        );
        assert!(!response.is_request_error());
    }

    #[test]
    fn request_errors_have_no_data() {
        let response = Response::from_errors(vec![Error::builder().message("bad").build()]);
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(json, r#"{"errors":[{"message":"bad"}]}"#);
        assert!(response.is_request_error());
    }
}
