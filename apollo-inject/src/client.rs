//! Sends sub-queries to the composed-graph entry point.

use std::sync::Arc;
use std::task::Poll;
use std::time::Duration;

use futures::future::BoxFuture;
use http::HeaderValue;
use http::header::ACCEPT;
use http::header::CONTENT_TYPE;
use tower::BoxError;
use tower::Service;
use tower::util::BoxCloneService;
use url::Url;

use crate::error::FetchError;
use crate::graphql;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::subquery::Subquery;

static APPLICATION_JSON_HEADER_VALUE: HeaderValue = HeaderValue::from_static("application/json");
static ACCEPT_GRAPHQL_JSON: HeaderValue =
    HeaderValue::from_static("application/json, application/graphql-response+json");
const GRAPHQL_RESPONSE: &str = "graphql-response";

/// Any service able to answer sub-queries.
///
/// The injection wrapper only sees this boxed form, so tests and custom
/// transports can stand in for [`ComposedQueryClient`].
pub type BoxService = BoxCloneService<Subquery, SubqueryResult, BoxError>;

/// The outcome of a sub-query.
///
/// A failed sub-query is a value, never a raised error: field logic is expected
/// to treat [`SubqueryResult::Unavailable`] as "data unavailable" and degrade.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubqueryResult {
    /// The entity payload for the requested fields.
    Resolved(Object),
    /// The failure marker, with the reason the entity could not be fetched.
    Unavailable(FetchError),
}

impl SubqueryResult {
    pub fn entity(&self) -> Option<&Object> {
        match self {
            SubqueryResult::Resolved(entity) => Some(entity),
            SubqueryResult::Unavailable(_) => None,
        }
    }

    /// A field of the fetched entity, if the sub-query succeeded and selected it.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.entity().and_then(|entity| entity.get(field))
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, SubqueryResult::Unavailable(_))
    }

    pub fn failure(&self) -> Option<&FetchError> {
        match self {
            SubqueryResult::Resolved(_) => None,
            SubqueryResult::Unavailable(error) => Some(error),
        }
    }
}

impl From<Result<Object, FetchError>> for SubqueryResult {
    fn from(result: Result<Object, FetchError>) -> Self {
        match result {
            Ok(entity) => SubqueryResult::Resolved(entity),
            Err(error) => SubqueryResult::Unavailable(error),
        }
    }
}

/// HTTP client for the composed-graph entry point.
#[derive(Clone, Debug)]
pub struct ComposedQueryClient {
    http_client: reqwest::Client,
    endpoint: Arc<Url>,
}

impl ComposedQueryClient {
    /// Construct a client posting to `endpoint`, giving up on requests after `timeout`.
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, BoxError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .tcp_keepalive(Some(Duration::from_secs(5)))
            .build()?;

        Ok(Self {
            http_client,
            endpoint: Arc::new(endpoint),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn boxed(self) -> BoxService {
        BoxCloneService::new(self)
    }

    /// Send `subquery` and extract the entity it asked for.
    ///
    /// Never fails: transport errors, non-success statuses and malformed
    /// bodies all come back as [`SubqueryResult::Unavailable`].
    pub async fn invoke(&self, subquery: Subquery) -> SubqueryResult {
        match self.fetch(&subquery).await {
            Ok(entity) => {
                tracing::debug!(entity = %subquery.key, "resolved sub-query");
                SubqueryResult::Resolved(entity)
            }
            Err(error) => {
                tracing::warn!(
                    entity = %subquery.key,
                    code = error.extension_code(),
                    "sub-query failed, injected data is unavailable: {error}"
                );
                SubqueryResult::Unavailable(error)
            }
        }
    }

    async fn fetch(&self, subquery: &Subquery) -> Result<Object, FetchError> {
        let body = serde_json::to_vec(&subquery.request).map_err(|error| {
            FetchError::DispatchFailed {
                reason: error.to_string(),
            }
        })?;

        let response = self
            .http_client
            .post(self.endpoint.as_str())
            .header(CONTENT_TYPE, APPLICATION_JSON_HEADER_VALUE.clone())
            .header(ACCEPT, ACCEPT_GRAPHQL_JSON.clone())
            .body(body)
            .send()
            .await
            .map_err(|error| FetchError::SubrequestHttpError {
                status_code: error.status().map(|status| status.as_u16()),
                reason: error.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::SubrequestHttpError {
                status_code: Some(status.as_u16()),
                reason: format!("composed graph returned status {status}"),
            });
        }
        ensure_json_content_type(response.headers().get(CONTENT_TYPE))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|error| FetchError::SubrequestHttpError {
                status_code: Some(status.as_u16()),
                reason: error.to_string(),
            })?;
        let graphql = graphql::Response::from_bytes(&bytes)?;

        subquery.extract_entity(graphql)
    }
}

fn ensure_json_content_type(content_type: Option<&HeaderValue>) -> Result<(), FetchError> {
    let media_type = content_type
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<mime::Mime>().ok());
    match media_type {
        Some(media_type)
            if media_type.type_() == mime::APPLICATION
                && (media_type.subtype() == mime::JSON
                    || (media_type.subtype() == GRAPHQL_RESPONSE
                        && media_type.suffix() == Some(mime::JSON))) =>
        {
            Ok(())
        }
        _ => Err(FetchError::SubrequestMalformedResponse {
            reason: format!(
                "composed graph didn't return JSON (expected content-type: {} \
                 or content-type: application/{GRAPHQL_RESPONSE}+json)",
                mime::APPLICATION_JSON.essence_str()
            ),
        }),
    }
}

impl Service<Subquery> for ComposedQueryClient {
    type Response = SubqueryResult;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut std::task::Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, subquery: Subquery) -> Self::Future {
        tracing::debug!(
            entity = %subquery.key,
            endpoint = %self.endpoint,
            "issuing sub-query to the composed graph"
        );
        let client = self.clone();
        Box::pin(async move { Ok(client.invoke(subquery).await) })
    }
}
