/*!
Correlation errors.
*/
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;
use thiserror::Error;

pub use biscuit::errors::Error as Jose;

/// OAuth 2.0 error returned by the authorization server in an authorization
/// or end session response.
///
/// See [RFC 6749, section 4.1.2.1](http://tools.ietf.org/html/rfc6749#section-4.1.2.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuth2Error {
    /// Error code.
    pub error: OAuth2ErrorCode,

    /// Human-readable text providing additional information about the error.
    pub error_description: Option<String>,

    /// A URI identifying a human-readable web page with information about the error.
    pub error_uri: Option<String>,
}

impl fmt::Display for OAuth2Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        write!(f, "{}", self.error.as_str())?;
        if let Some(ref description) = self.error_description {
            write!(f, ": {}", description)?;
        }
        if let Some(ref uri) = self.error_uri {
            write!(f, " ({})", uri)?;
        }
        Ok(())
    }
}

impl std::error::Error for OAuth2Error {}

/// OAuth 2.0 error codes.
///
/// See [RFC 6749, section 4.1.2.1](http://tools.ietf.org/html/rfc6749#section-4.1.2.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OAuth2ErrorCode {
    /// The request is missing a required parameter, includes an invalid parameter value,
    /// includes a parameter more than once, or is otherwise malformed.
    InvalidRequest,

    /// The client is not authorized to request an authorization code using this method.
    UnauthorizedClient,

    /// The resource owner or authorization server denied the request.
    AccessDenied,

    /// The authorization server does not support obtaining an authorization code using this
    /// method.
    UnsupportedResponseType,

    /// The requested scope is invalid, unknown, or malformed.
    InvalidScope,

    /// The server encountered an unexpected condition that prevented it from fulfilling the
    /// request.
    ServerError,

    /// The server is currently unable to handle the request due to a temporary overloading or
    /// maintenance of the server.
    TemporarilyUnavailable,

    /// An unrecognized error code, not defined in RFC 6749.
    Unrecognized(String),
}

impl OAuth2ErrorCode {
    pub fn as_str(&self) -> &str {
        match self {
            OAuth2ErrorCode::InvalidRequest => "invalid_request",
            OAuth2ErrorCode::UnauthorizedClient => "unauthorized_client",
            OAuth2ErrorCode::AccessDenied => "access_denied",
            OAuth2ErrorCode::UnsupportedResponseType => "unsupported_response_type",
            OAuth2ErrorCode::InvalidScope => "invalid_scope",
            OAuth2ErrorCode::ServerError => "server_error",
            OAuth2ErrorCode::TemporarilyUnavailable => "temporarily_unavailable",
            OAuth2ErrorCode::Unrecognized(s) => s,
        }
    }
}

impl<'a> From<&'a str> for OAuth2ErrorCode {
    fn from(s: &str) -> OAuth2ErrorCode {
        match s {
            "invalid_request" => OAuth2ErrorCode::InvalidRequest,
            "unauthorized_client" => OAuth2ErrorCode::UnauthorizedClient,
            "access_denied" => OAuth2ErrorCode::AccessDenied,
            "unsupported_response_type" => OAuth2ErrorCode::UnsupportedResponseType,
            "invalid_scope" => OAuth2ErrorCode::InvalidScope,
            "server_error" => OAuth2ErrorCode::ServerError,
            "temporarily_unavailable" => OAuth2ErrorCode::TemporarilyUnavailable,
            s => OAuth2ErrorCode::Unrecognized(s.to_owned()),
        }
    }
}

impl Serialize for OAuth2ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("request rejected: transport security is required")]
    InsecureTransport,
    #[error("invalid correlation: {0}")]
    InvalidCorrelation(#[from] Correlation),
    #[error("state mismatch: {0}")]
    StateMismatch(#[from] Mismatch),
    #[error("correlation expired at {0}")]
    Expired(DateTime<Utc>),
    #[error("state store unavailable: {0}")]
    StoreUnavailable(String),
    #[error(transparent)]
    Resolution(#[from] Resolution),
    #[error("authorization server returned an error: {0}")]
    Authority(#[from] OAuth2Error),
    #[error("invalid options: {0}")]
    Options(#[from] validator::ValidationErrors),
    #[error("invalid codec key: {0}")]
    Key(String),
    #[error(transparent)]
    Jose(#[from] Jose),
    #[error("secure random source unavailable: {0}")]
    Random(String),
}

impl From<Store> for Error {
    fn from(e: Store) -> Self {
        match e {
            Store::NotFound => Error::InvalidCorrelation(Correlation::NotFound),
            Store::Unavailable(reason) => Error::StoreUnavailable(reason),
        }
    }
}

impl From<Decode> for Error {
    fn from(e: Decode) -> Self {
        match e {
            Decode::Expired(at) => Error::Expired(at),
            e => Error::InvalidCorrelation(Correlation::Decode(e)),
        }
    }
}

/// Codec failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Decode {
    #[error("token is not a valid encoding")]
    Malformed,
    #[error("token failed authentication under every known key")]
    TamperedOrExpiredKey,
    #[error("token expired at {0}")]
    Expired(DateTime<Utc>),
}

/// State store failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Store {
    /// Never existed and already consumed are deliberately the same value.
    #[error("no correlation record for the given identifier")]
    NotFound,
    #[error("{0}")]
    Unavailable(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Correlation {
    #[error("response carries no state parameter")]
    MissingState,
    #[error("no pending request matches the state parameter")]
    NotFound,
    #[error("{0}")]
    Decode(Decode),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Mismatch {
    #[error("state parameter does not match the correlation identifier")]
    Identifier,
    #[error("record was issued for the {expected} endpoint, not {actual}")]
    RequestType {
        expected: &'static str,
        actual: &'static str,
    },
    #[error("response issuer and correlated issuer mismatch: '{expected}', '{actual}'")]
    Issuer { expected: String, actual: String },
}

/// Client registration lookup failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Resolution {
    #[error("no client registration matches '{0}'")]
    NotFound(String),
    #[error("several client registrations match '{0}', a provider name is required")]
    Ambiguous(String),
    #[error("provider name '{provider_name}' and issuer '{issuer}' designate different registrations")]
    Conflict {
        provider_name: String,
        issuer: String,
    },
    #[error("client registration for '{0}' has no end session endpoint")]
    NoEndSessionEndpoint(String),
}

/// The externally observable form of an [`Error`].
///
/// Every correlation failure renders identically, whatever its internal cause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    #[serde(skip)]
    pub status: u16,
    pub error: OAuth2ErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_uri: Option<String>,
}

impl ErrorResponse {
    fn new(status: u16, error: OAuth2ErrorCode, description: &str) -> Self {
        ErrorResponse {
            status,
            error,
            error_description: Some(description.to_string()),
            error_uri: None,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl Error {
    /// True for the failures produced while correlating a response.
    pub fn is_correlation_failure(&self) -> bool {
        matches!(
            self,
            Error::InvalidCorrelation(_) | Error::StateMismatch(_) | Error::Expired(_)
        )
    }

    pub fn to_response(&self) -> ErrorResponse {
        match self {
            Error::InsecureTransport => ErrorResponse::new(
                400,
                OAuth2ErrorCode::InvalidRequest,
                "This server only accepts HTTPS requests.",
            ),
            e if e.is_correlation_failure() => ErrorResponse::new(
                400,
                OAuth2ErrorCode::InvalidRequest,
                "The authorization response could not be correlated with a pending request.",
            ),
            Error::Authority(err) => ErrorResponse {
                status: 400,
                error: err.error.clone(),
                error_description: err.error_description.clone(),
                error_uri: err.error_uri.clone(),
            },
            Error::StoreUnavailable(_) => ErrorResponse::new(
                503,
                OAuth2ErrorCode::TemporarilyUnavailable,
                "The request cannot be processed at this time.",
            ),
            _ => ErrorResponse::new(
                500,
                OAuth2ErrorCode::ServerError,
                "An internal error occurred while processing the request.",
            ),
        }
    }
}
