use crate::{
    cookies::{CookieManager, CookieOptions, HeaderCookieManager, DEFAULT_COOKIE_NAME},
    deserializers::{bool_from_str_or_bool, seconds},
};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::{Validate, ValidationError};

pub const DEFAULT_AUTHENTICATION_TYPE: &str = "OpenIddict.Client.Owin";

/// Settings of the client host.
///
/// Derives Default, so remember to ..Default::default() after you specify what you want.
/// Options are validated and frozen once a [`Host`](crate::Host) is built from them.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Options {
    /// The authentication type the host itself answers to. Challenges naming
    /// it carry no provider information of their own.
    #[validate(length(min = 1))]
    pub authentication_type: String,

    /// When set, registrations with a provider name are not exposed as
    /// [forwarded authentication types](crate::Host::forwarded_authentication_types):
    /// challenges must then carry the provider name (or the issuer) as a property.
    #[serde(deserialize_with = "bool_from_str_or_bool")]
    pub disable_automatic_authentication_type_forwarding: bool,

    /// Allow challenges, sign-outs and responses over plain HTTP.
    /// Off by default to help mitigate man-in-the-middle attacks.
    #[serde(deserialize_with = "bool_from_str_or_bool")]
    pub disable_transport_security_requirement: bool,

    /// Hand validated post-logout redirection responses to the application
    /// instead of redirecting to the stored target.
    #[serde(deserialize_with = "bool_from_str_or_bool")]
    pub enable_post_logout_redirection_endpoint_passthrough: bool,

    /// Hand validated redirection responses to the application instead of
    /// redirecting to the stored target.
    #[serde(deserialize_with = "bool_from_str_or_bool")]
    pub enable_redirection_endpoint_passthrough: bool,

    /// Return errors of the redirection endpoints as an outcome the application
    /// renders itself. Cannot be combined with status code page interception by
    /// the embedding server.
    #[serde(deserialize_with = "bool_from_str_or_bool")]
    pub enable_error_passthrough: bool,

    #[serde(skip, default = "default_cookie_manager")]
    pub cookie_manager: Arc<dyn CookieManager>,

    /// Prefix of the correlation cookies, which are named `{cookie_name}.{identifier}`.
    #[validate(length(min = 1), custom = "validate_cookie_name")]
    pub cookie_name: String,

    #[validate]
    pub cookie_options: CookieOptions,

    /// How long a pending request may wait for its response.
    #[serde(with = "seconds")]
    #[validate(custom = "validate_lifetime")]
    pub state_lifetime: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            authentication_type: DEFAULT_AUTHENTICATION_TYPE.to_string(),
            disable_automatic_authentication_type_forwarding: false,
            disable_transport_security_requirement: false,
            enable_post_logout_redirection_endpoint_passthrough: false,
            enable_redirection_endpoint_passthrough: false,
            enable_error_passthrough: false,
            cookie_manager: default_cookie_manager(),
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            cookie_options: CookieOptions::default(),
            state_lifetime: Duration::minutes(15),
        }
    }
}

fn default_cookie_manager() -> Arc<dyn CookieManager> {
    Arc::new(HeaderCookieManager)
}

// RFC 6265 token characters.
fn validate_cookie_name(name: &str) -> Result<(), ValidationError> {
    let valid = name.bytes().all(|b| {
        b.is_ascii_graphic()
            && !matches!(
                b,
                b'(' | b')'
                    | b'<'
                    | b'>'
                    | b'@'
                    | b','
                    | b';'
                    | b':'
                    | b'\\'
                    | b'"'
                    | b'/'
                    | b'['
                    | b']'
                    | b'?'
                    | b'='
                    | b'{'
                    | b'}'
            )
    });
    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("cookie_name"))
    }
}

fn validate_lifetime(lifetime: &Duration) -> Result<(), ValidationError> {
    if *lifetime > Duration::zero() {
        Ok(())
    } else {
        Err(ValidationError::new("state_lifetime"))
    }
}
