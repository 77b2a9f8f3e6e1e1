//! Injection errors.
use displaydoc::Display;
use thiserror::Error;
use tower::BoxError;

pub use crate::configuration::ConfigurationError;

/// An entity key could not be decoded.
///
/// Keys produced by [`crate::EntityKey::encode`] always decode, so this only
/// surfaces for identifiers that were forged or corrupted on the way.
#[derive(Error, Display, Debug, Clone, Eq, PartialEq)]
#[ignore_extra_doc_attributes]
#[non_exhaustive]
pub enum MalformedKey {
    /// entity key is not valid base64: {0}
    InvalidEncoding(String),
    /// entity key is not valid UTF-8
    InvalidUtf8,
    /// entity key has no type separator
    MissingSeparator,
    /// entity key has an unsupported type tag: '{0}'
    UnsupportedType(String),
    /// entity key for '{0}' has an empty primary value
    EmptyPrimaryValue(String),
}

/// Reasons a sub-query against the composed graph did not produce an entity.
///
/// These never reach the execution engine: the client turns them into a
/// [`crate::SubqueryResult::Unavailable`] failure marker that the field logic
/// degrades on.
#[derive(Error, Display, Debug, Clone, Eq, PartialEq)]
#[ignore_extra_doc_attributes]
#[non_exhaustive]
pub enum FetchError {
    /// HTTP fetch from the composed graph failed: {reason}
    ///
    /// note that this relates to a transport error and not a GraphQL error
    SubrequestHttpError {
        /// The HTTP status, if a response was received.
        status_code: Option<u16>,

        /// The reason the fetch failed.
        reason: String,
    },

    /// composed graph response was malformed: {reason}
    SubrequestMalformedResponse {
        /// The reason the deserialization failed.
        reason: String,
    },

    /// composed graph returned errors: {message}
    SubrequestGraphqlErrors {
        /// The GraphQL error messages, joined.
        message: String,
    },

    /// no entity found for identifier '{id}'
    EntityNotFound {
        /// The encoded identifier that was looked up.
        id: String,
    },

    /// parent representation has no value for key field '{field}'
    MissingEntityKey {
        /// The key field that was expected on the representation.
        field: String,
    },

    /// sub-query could not be dispatched: {reason}
    DispatchFailed {
        /// The reason the dispatch failed.
        reason: String,
    },
}

impl FetchError {
    /// The error code reported alongside degraded fields.
    pub fn extension_code(&self) -> &'static str {
        match self {
            FetchError::SubrequestHttpError { .. } => "SUBREQUEST_HTTP_ERROR",
            FetchError::SubrequestMalformedResponse { .. } => "SUBREQUEST_MALFORMED_RESPONSE",
            FetchError::SubrequestGraphqlErrors { .. } => "SUBREQUEST_GRAPHQL_ERRORS",
            FetchError::EntityNotFound { .. } => "ENTITY_NOT_FOUND",
            FetchError::MissingEntityKey { .. } => "MISSING_ENTITY_KEY",
            FetchError::DispatchFailed { .. } => "DISPATCH_FAILED",
        }
    }

    pub(crate) fn from_dispatch(error: impl std::fmt::Display) -> Self {
        FetchError::DispatchFailed {
            reason: error.to_string(),
        }
    }
}

impl From<BoxError> for FetchError {
    fn from(error: BoxError) -> Self {
        Self::from_dispatch(error)
    }
}

/// A failure raised by an original field resolver.
///
/// The injection wrapper never inspects or recovers these, they flow back
/// to the execution engine unchanged.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
#[error("{message}")]
pub struct ResolverError {
    /// The error message.
    pub message: String,
}

impl ResolverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for ResolverError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for ResolverError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Errors raised while building a subgraph schema.
#[derive(Error, Display, Debug, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub enum SchemaError {
    /// invalid field selection '{selection}': {reason}
    InvalidSelection {
        /// The selection as written in the annotation.
        selection: String,
        /// Why it could not be parsed.
        reason: String,
    },
    /// type '{0}' is defined more than once
    DuplicateType(String),
    /// field '{type_name}.{field}' is defined more than once
    DuplicateField {
        /// The type owning the field.
        type_name: String,
        /// The duplicated field.
        field: String,
    },
    /// field '{type_name}.{field}' is annotated with @inject but '{type_name}' has no @key
    MissingKey {
        /// The entity type.
        type_name: String,
        /// The annotated field.
        field: String,
    },
    /// field '{type_name}.{field}' requires '{sibling}', which is not declared on '{type_name}'
    UnknownSibling {
        /// The entity type.
        type_name: String,
        /// The annotated field.
        field: String,
        /// The sibling field that could not be found.
        sibling: String,
    },
    /// field '{type_name}.{field}' uses @inject in {mode} mode without a composed-query client
    MissingClient {
        /// The entity type.
        type_name: String,
        /// The annotated field.
        field: String,
        /// The mode that needs a client.
        mode: crate::InjectMode,
    },
}
