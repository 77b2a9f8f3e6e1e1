//! Types related to GraphQL requests and responses sent to the composed graph.

use bytes::Bytes;
use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map as JsonMap;

use crate::error::FetchError;
use crate::json_ext::Object;
use crate::json_ext::Value;

/// A GraphQL `Request`, as posted to the composed-graph entry point.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct Request {
    /// The GraphQL operation string.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub query: Option<String>,

    /// The (optional) GraphQL operation name.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub operation_name: Option<String>,

    /// The GraphQL variables, referred to in the `query` with `$variableName`.
    #[serde(skip_serializing_if = "Object::is_empty", default)]
    pub variables: Object,

    /// The (optional) GraphQL `extensions` of a GraphQL request.
    #[serde(skip_serializing_if = "Object::is_empty", default)]
    pub extensions: Object,
}

#[buildstructor::buildstructor]
impl Request {
    #[builder(visibility = "pub")]
    fn new(
        query: Option<String>,
        operation_name: Option<String>,
        // Skip the `Object` type alias in order to use buildstructor’s map special-casing
        variables: JsonMap<ByteString, Value>,
        extensions: JsonMap<ByteString, Value>,
    ) -> Self {
        Self {
            query,
            operation_name,
            variables,
            extensions,
        }
    }
}

/// A [GraphQL error](https://spec.graphql.org/October2021/#sec-Errors)
/// as found in the `errors` field of a [`Response`].
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[non_exhaustive]
pub struct Error {
    /// The error message.
    pub message: String,

    /// If this is a field error, the JSON path to that field in [`Response::data`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Value>,

    /// The optional GraphQL extensions for this error.
    #[serde(skip_serializing_if = "Object::is_empty")]
    pub extensions: Object,
}

#[buildstructor::buildstructor]
impl Error {
    #[builder(visibility = "pub")]
    fn new(message: String, path: Option<Value>, extensions: JsonMap<ByteString, Value>) -> Self {
        Self {
            message,
            path,
            extensions,
        }
    }
}

/// A GraphQL primary response returned by the composed graph.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct Response {
    /// The response data.
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
    #[builder(visibility = "pub")]
    fn new(
        data: Option<Value>,
        errors: Vec<Error>,
        extensions: JsonMap<ByteString, Value>,
    ) -> Self {
        Self {
            data,
            errors,
            extensions,
        }
    }

    /// Create a [`Response`] from the supplied [`Bytes`].
    ///
    /// This will return an error if the input is not a GraphQL response.
    pub(crate) fn from_bytes(b: &Bytes) -> Result<Response, FetchError> {
        let response: Response =
            serde_json::from_slice(b).map_err(|error| FetchError::SubrequestMalformedResponse {
                reason: error.to_string(),
            })?;

        // Graphql spec says:
        // If the data entry in the response is not present, the errors entry in the response
        // must not be empty.
        if response.data.is_none() && response.errors.is_empty() {
            return Err(FetchError::SubrequestMalformedResponse {
                reason: "graphql response without data must contain at least one error"
                    .to_string(),
            });
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json as bjson;
    use test_log::test;

    use super::*;

    #[test]
    fn request_serializes_camel_case() {
        let request = Request::builder()
            .query("query Q($id: ID!) { node(id: $id) { id } }")
            .operation_name("Q")
            .variables(bjson!({"id": "UHJvZHVjdDpza3UtMQ=="}).as_object().cloned().unwrap())
            .build();

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({
                "query": "query Q($id: ID!) { node(id: $id) { id } }",
                "operationName": "Q",
                "variables": {"id": "UHJvZHVjdDpza3UtMQ=="},
            })
        );
    }

    #[test]
    fn response_with_data() {
        let bytes = Bytes::from_static(br#"{"data":{"node":{"id":"1","name":"Widget"}}}"#);
        let response = Response::from_bytes(&bytes).unwrap();
        assert_eq!(
            response.data,
            Some(bjson!({"node": {"id": "1", "name": "Widget"}}))
        );
        assert!(response.errors.is_empty());
    }

    #[test]
    fn response_with_errors_only() {
        let bytes = Bytes::from_static(br#"{"errors":[{"message":"boom"}]}"#);
        let response = Response::from_bytes(&bytes).unwrap();
        assert_eq!(response.data, None);
        assert_eq!(response.errors[0].message, "boom");
    }

    #[test]
    fn response_without_data_or_errors_is_malformed() {
        let bytes = Bytes::from_static(br#"{"extensions":{}}"#);
        assert!(matches!(
            Response::from_bytes(&bytes),
            Err(FetchError::SubrequestMalformedResponse { .. })
        ));
    }

    #[test]
    fn response_not_json_is_malformed() {
        let bytes = Bytes::from_static(b"<html>oops</html>");
        assert!(matches!(
            Response::from_bytes(&bytes),
            Err(FetchError::SubrequestMalformedResponse { .. })
        ));
    }
}
