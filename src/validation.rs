use crate::{
    error::{Correlation, Error, ErrorResponse, Mismatch, OAuth2Error},
    host::short,
    CorrelationRecord, Host, RequestType, Transaction,
};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use std::collections::HashSet;
use std::fmt;
use subtle::ConstantTimeEq;
use url::{form_urlencoded, Url};

/// Parameters of an authorization or end session response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationResponse {
    pub state: Option<String>,
    pub code: Option<String>,
    /// RFC 9207 issuer identification.
    pub iss: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
    pub error_uri: Option<String>,
}

impl AuthorizationResponse {
    /// Reads the response from a query string or `form_post` body.
    ///
    /// A parameter that appears more than once is treated as absent.
    pub fn from_query(query: &str) -> Self {
        let mut response = AuthorizationResponse::default();
        let mut seen = HashSet::new();
        let mut repeated = HashSet::new();

        for (name, value) in form_urlencoded::parse(query.as_bytes()) {
            if !seen.insert(name.clone()) {
                repeated.insert(name.clone());
            }
            let slot = match name.as_ref() {
                "state" => &mut response.state,
                "code" => &mut response.code,
                "iss" => &mut response.iss,
                "error" => &mut response.error,
                "error_description" => &mut response.error_description,
                "error_uri" => &mut response.error_uri,
                _ => continue,
            };
            *slot = Some(value.into_owned());
        }

        for name in repeated {
            match name.as_ref() {
                "state" => response.state = None,
                "code" => response.code = None,
                "iss" => response.iss = None,
                "error" => response.error = None,
                "error_description" => response.error_description = None,
                "error_uri" => response.error_uri = None,
                _ => {}
            }
        }
        response
    }

    pub fn from_url(url: &Url) -> Self {
        Self::from_query(url.query().unwrap_or_default())
    }

    fn authority_error(&self) -> Option<OAuth2Error> {
        self.error.as_deref().map(|code| OAuth2Error {
            error: code.into(),
            error_description: self.error_description.clone(),
            error_uri: self.error_uri.clone(),
        })
    }
}

/// The original request context, reconstructed from a consumed record.
#[derive(Clone, PartialEq, Eq)]
pub struct CorrelationContext {
    pub request_type: RequestType,
    pub redirect_target: Option<String>,
    pub provider_name: Option<String>,
    pub issuer: Url,
    /// The authorization code to redeem, when the response carries one.
    pub code: Option<String>,
    /// The PKCE verifier to present with the code.
    pub code_verifier: Option<String>,
    /// The nonce the ID token must carry.
    pub nonce: String,
    pub created_at: DateTime<Utc>,
}

impl fmt::Debug for CorrelationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorrelationContext")
            .field("request_type", &self.request_type)
            .field("redirect_target", &self.redirect_target)
            .field("provider_name", &self.provider_name)
            .field("issuer", &self.issuer.as_str())
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// What the embedding server should do with a validated response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Redirect the user agent to `location`.
    Redirect {
        location: String,
        context: CorrelationContext,
    },
    /// Pass-through: hand the request to the application.
    Continue(CorrelationContext),
    /// Error pass-through: let the application render the error.
    Error(ErrorResponse),
}

pub fn validate_state(record: &CorrelationRecord, state: &str) -> Result<(), Error> {
    let matches: bool = record
        .identifier
        .as_bytes()
        .ct_eq(state.as_bytes())
        .into();
    if matches {
        Ok(())
    } else {
        Err(Mismatch::Identifier.into())
    }
}

pub fn validate_request_type(record: &CorrelationRecord, expected: RequestType) -> Result<(), Error> {
    if record.request_type != expected {
        return Err(Mismatch::RequestType {
            expected: expected.as_str(),
            actual: record.request_type.as_str(),
        }
        .into());
    }
    Ok(())
}

/// An `iss` response parameter, when present, must be exactly the correlated
/// issuer identifier (RFC 9207, section 2.4: simple string comparison).
pub fn validate_issuer(record: &CorrelationRecord, iss: Option<&str>) -> Result<(), Error> {
    if let Some(actual) = iss {
        if actual != record.issuer.as_str() {
            let expected = record.issuer.as_str().to_string();
            let actual = actual.to_string();
            return Err(Mismatch::Issuer { expected, actual }.into());
        }
    }
    Ok(())
}

pub fn validate_expiry(record: &CorrelationRecord, now: DateTime<Utc>) -> Result<(), Error> {
    if record.is_expired(now) {
        return Err(Error::Expired(record.expires_at));
    }
    Ok(())
}

impl Host {
    /// Correlates a response with its pending request and consumes the record.
    ///
    /// The record is deleted before any check runs: whatever the result, the
    /// state value cannot be redeemed again.
    pub fn correlate(
        &self,
        transaction: &mut Transaction,
        response: &AuthorizationResponse,
        expected: RequestType,
    ) -> Result<CorrelationContext, Error> {
        self.require_transport_security(transaction)?;

        let state = response
            .state
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(Correlation::MissingState)?;

        let artifact = self.store.take_and_delete(transaction, state)?;
        let now = self.clock.now();
        let record = self.codec.decode(&artifact, now)?;

        validate_state(&record, state)?;
        validate_request_type(&record, expected)?;
        validate_issuer(&record, response.iss.as_deref())?;
        validate_expiry(&record, now)?;

        debug!(
            "consumed {} correlation {}",
            expected.as_str(),
            short(&record.identifier)
        );

        if let Some(error) = response.authority_error() {
            return Err(error.into());
        }

        let nonce = record.request_nonce();
        Ok(CorrelationContext {
            request_type: record.request_type,
            redirect_target: record.redirect_target,
            provider_name: record.provider_name,
            issuer: record.issuer,
            code: response.code.clone(),
            code_verifier: record.code_verifier,
            nonce,
            created_at: record.created_at,
        })
    }

    /// Handles a response at the redirection endpoint.
    pub fn handle_redirection(
        &self,
        transaction: &mut Transaction,
        response: &AuthorizationResponse,
    ) -> Result<Outcome, Error> {
        let passthrough = self.options.enable_redirection_endpoint_passthrough;
        self.handle(transaction, response, RequestType::Authorization, passthrough)
    }

    /// Handles a response at the post-logout redirection endpoint.
    pub fn handle_post_logout_redirection(
        &self,
        transaction: &mut Transaction,
        response: &AuthorizationResponse,
    ) -> Result<Outcome, Error> {
        let passthrough = self.options.enable_post_logout_redirection_endpoint_passthrough;
        self.handle(transaction, response, RequestType::EndSession, passthrough)
    }

    fn handle(
        &self,
        transaction: &mut Transaction,
        response: &AuthorizationResponse,
        expected: RequestType,
        passthrough: bool,
    ) -> Result<Outcome, Error> {
        match self.correlate(transaction, response, expected) {
            Ok(context) if passthrough => Ok(Outcome::Continue(context)),
            Ok(context) => Ok(Outcome::Redirect {
                location: context
                    .redirect_target
                    .clone()
                    .unwrap_or_else(|| "/".to_string()),
                context,
            }),
            Err(err) => {
                warn!("{} response rejected: {}", expected.as_str(), err);
                if self.options.enable_error_passthrough {
                    Ok(Outcome::Error(err.to_response()))
                } else {
                    Err(err)
                }
            }
        }
    }
}
