use crate::{error::Error, pkce, random};
use biscuit::CompactJson;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Which endpoint a correlation record may be redeemed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    /// Issued by a challenge, redeemed at the redirection endpoint.
    Authorization,
    /// Issued by a sign-out, redeemed at the post-logout redirection endpoint.
    EndSession,
}

impl RequestType {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            RequestType::Authorization => "redirection",
            RequestType::EndSession => "post-logout redirection",
        }
    }
}

/// The server-issued, client-held proof binding a response to the request
/// that caused it.
///
/// A record is never marked as consumed: consuming it deletes it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationRecord {
    #[serde(rename = "id")]
    pub identifier: String,
    #[serde(rename = "nce")]
    pub nonce: String,
    #[serde(rename = "cv", default, skip_serializing_if = "Option::is_none")]
    pub code_verifier: Option<String>,
    #[serde(rename = "tgt", default, skip_serializing_if = "Option::is_none")]
    pub redirect_target: Option<String>,
    #[serde(rename = "pn", default, skip_serializing_if = "Option::is_none")]
    pub provider_name: Option<String>,
    #[serde(rename = "iss")]
    pub issuer: Url,
    #[serde(rename = "typ")]
    pub request_type: RequestType,
    #[serde(rename = "iat", with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "exp", with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,
}

impl CompactJson for CorrelationRecord {}

impl CorrelationRecord {
    /// Creates a record with a fresh identifier and nonce, valid for `lifetime` from `now`.
    pub fn generate(
        request_type: RequestType,
        issuer: Url,
        now: DateTime<Utc>,
        lifetime: Duration,
    ) -> Result<Self, Error> {
        let created_at = now.trunc_subsecs(0);
        Ok(CorrelationRecord {
            identifier: random::token()?,
            nonce: random::token()?,
            code_verifier: None,
            redirect_target: None,
            provider_name: None,
            issuer,
            request_type,
            created_at,
            expires_at: created_at + lifetime,
        })
    }

    /// The nonce value sent to the authorization server and expected in the ID token.
    pub fn request_nonce(&self) -> String {
        pkce::s256(&self.nonce)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

// Nonce and verifier stay out of logs.
impl fmt::Debug for CorrelationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorrelationRecord")
            .field("identifier", &self.identifier)
            .field("redirect_target", &self.redirect_target)
            .field("provider_name", &self.provider_name)
            .field("issuer", &self.issuer.as_str())
            .field("request_type", &self.request_type)
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}
