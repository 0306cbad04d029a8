/*!
Correlation cookies and the pluggable strategy that reads and writes them.
*/
use crate::{error::Store, Transaction};
use chrono::{DateTime, Utc};
use cookie::{time, Cookie, Expiration};
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::{Validate, ValidationError};

pub const DEFAULT_COOKIE_NAME: &str = "OpenIddict.Client.State";

/// Largest `Set-Cookie` value user agents are required to store (RFC 6265, section 6.1).
pub const MAX_COOKIE_SIZE: usize = 4096;

/// The `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl From<SameSite> for cookie::SameSite {
    fn from(same_site: SameSite) -> Self {
        match same_site {
            SameSite::Strict => cookie::SameSite::Strict,
            SameSite::Lax => cookie::SameSite::Lax,
            SameSite::None => cookie::SameSite::None,
        }
    }
}

/// Attributes applied to correlation cookies.
///
/// `Path` defaults to `/`: without it the user agent scopes the cookie to the
/// directory of the challenging request, and the redirection endpoint
/// usually lives elsewhere.
///
/// The authorization server redirects back with a cross-site top-level
/// navigation, or a cross-site `POST` for `form_post` responses, so the
/// default is `SameSite=None`. Browsers only accept that together with
/// `Secure`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_same_site"))]
pub struct CookieOptions {
    pub http_only: bool,
    pub secure: bool,
    pub same_site: SameSite,
    pub path: Option<String>,
    pub domain: Option<String>,
}

impl Default for CookieOptions {
    fn default() -> Self {
        CookieOptions {
            http_only: true,
            secure: true,
            same_site: SameSite::None,
            path: Some("/".to_string()),
            domain: None,
        }
    }
}

fn validate_same_site(options: &CookieOptions) -> Result<(), ValidationError> {
    if options.same_site == SameSite::None && !options.secure {
        return Err(ValidationError::new("same_site_none_requires_secure"));
    }
    Ok(())
}

impl CookieOptions {
    fn build(&self, name: &str, value: &str) -> cookie::CookieBuilder<'static> {
        let mut builder = Cookie::build((name.to_string(), value.to_string()))
            .http_only(self.http_only)
            .secure(self.secure)
            .same_site(self.same_site.into());
        if let Some(ref path) = self.path {
            builder = builder.path(path.clone());
        }
        if let Some(ref domain) = self.domain {
            builder = builder.domain(domain.clone());
        }
        builder
    }
}

/// Reads and writes the cookies produced by the client host.
///
/// Alternative transports (a server-side session, an encrypted header) plug in
/// here without touching the correlation logic.
pub trait CookieManager: fmt::Debug + Send + Sync {
    /// Writes a cookie expiring at `expires_at`, or a session cookie when `None`.
    fn append(
        &self,
        transaction: &mut Transaction,
        name: &str,
        value: &str,
        options: &CookieOptions,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), Store>;

    /// Returns the request cookie called `name`. With `delete`, the client is
    /// also instructed to discard it.
    fn retrieve(
        &self,
        transaction: &mut Transaction,
        name: &str,
        options: &CookieOptions,
        delete: bool,
    ) -> Result<Option<String>, Store>;
}

/// Reads the `Cookie` request header and writes `Set-Cookie` response headers.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeaderCookieManager;

impl CookieManager for HeaderCookieManager {
    fn append(
        &self,
        transaction: &mut Transaction,
        name: &str,
        value: &str,
        options: &CookieOptions,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), Store> {
        if transaction.response_started() {
            return Err(Store::Unavailable(
                "response headers were already sent".to_string(),
            ));
        }
        let mut builder = options.build(name, value);
        if let Some(at) = expires_at {
            let at = time::OffsetDateTime::from_unix_timestamp(at.timestamp())
                .map_err(|e| Store::Unavailable(e.to_string()))?;
            builder = builder.expires(Expiration::DateTime(at));
        }
        let cookie = builder.build();
        let size = cookie.to_string().len();
        if size > MAX_COOKIE_SIZE {
            return Err(Store::Unavailable(format!(
                "cookie '{}' is {} bytes, user agents only keep {}",
                name, size, MAX_COOKIE_SIZE
            )));
        }
        transaction.push_response_cookie(cookie);
        Ok(())
    }

    fn retrieve(
        &self,
        transaction: &mut Transaction,
        name: &str,
        options: &CookieOptions,
        delete: bool,
    ) -> Result<Option<String>, Store> {
        let value = match transaction.request_cookie(name) {
            Some(value) => value.to_string(),
            None => return Ok(None),
        };
        if delete {
            if transaction.response_started() {
                return Err(Store::Unavailable(
                    "response headers were already sent".to_string(),
                ));
            }
            let removal = options
                .build(name, "")
                .max_age(time::Duration::seconds(0))
                .expires(Expiration::DateTime(time::OffsetDateTime::UNIX_EPOCH))
                .build();
            transaction.push_response_cookie(removal);
        }
        Ok(Some(value))
    }
}
