/*!
# OpenID Connect client request correlation

## Legal

Dual-licensed under `MIT` or the [UNLICENSE](http://unlicense.org/).

## Features

Binds every outgoing OpenID Connect authorization or end session request to the response
that eventually comes back through the user agent. Each request gets a fresh correlation
record holding a random identifier (sent as the `state` parameter), the nonce, the PKCE
verifier and the application's redirect target. The record is sealed with
[biscuit](https://crates.io/crates/biscuit) (JWE, `A256GCMKW` + `A256GCM`) and kept in a
per-request cookie, or in any other [`StateStore`].

When the response arrives the record is taken and deleted before anything else happens, so
a `state` value is redeemable at most once, whatever the result. Responses that do not
correlate (unknown, replayed, tampered, swapped or late) are all rejected with the same
`invalid_request` error.

Implements [RFC 6749](https://www.rfc-editor.org/rfc/rfc6749) `state`,
[RFC 7636](https://www.rfc-editor.org/rfc/rfc7636) PKCE (`S256`) and
[RFC 9207](https://www.rfc-editor.org/rfc/rfc9207) issuer identification checks.

The library is transport agnostic: the embedding server copies the incoming cookies and the
transport security flag into a [`Transaction`] and writes the `Set-Cookie` headers back.

## Usage

Add dependency to Cargo.toml:

```toml
[dependencies]
openid-correlation = "0.1"
```

```rust
use openid_correlation::{
    AuthorizationResponse, ChallengeProperties, Codec, CodecKey, Host, Options, Outcome,
    Registration, Transaction,
};
use url::Url;

# fn main() -> Result<(), openid_correlation::error::Error> {
let issuer = Url::parse("https://accounts.example.com/").unwrap();
let registration = Registration::new(
    issuer.clone(),
    "CLIENT_ID",
    issuer.join("authorize").unwrap(),
    Url::parse("https://app.example.com/signin-oidc").unwrap(),
)
.with_provider_name("example");

let host = Host::new(
    Options::default(),
    vec![registration],
    Codec::new(CodecKey::generate()?),
)?;

// Challenge: redirect the user agent to `request.url`, with `tx.set_cookie_headers()`.
let mut tx = Transaction::new(true);
let request = host.challenge(
    &mut tx,
    &ChallengeProperties {
        redirect_target: Some("/account".to_string()),
        ..Default::default()
    },
)?;

// Redirection endpoint: the user agent comes back with the cookie and the `state`.
let mut callback = tx.follow(true);
let response = AuthorizationResponse::from_query(&format!("code=abc&state={}", request.state));
match host.handle_redirection(&mut callback, &response)? {
    Outcome::Redirect { location, context } => {
        assert_eq!("/account", location);
        assert_eq!(Some("abc".to_string()), context.code);
    }
    _ => unreachable!(),
}
# Ok(())
# }
```
*/
mod challenge;
mod clock;
mod codec;
mod cookies;
mod deserializers;
pub mod error;
mod host;
mod options;
mod pkce;
mod random;
mod record;
mod registration;
mod store;
mod transaction;
mod validation;

pub use challenge::{AuthorizationRequest, ChallengeProperties, EndSessionRequest, SignOutProperties};
pub use clock::{Clock, SystemClock};
pub use codec::{Codec, CodecKey};
pub use cookies::{
    CookieManager, CookieOptions, HeaderCookieManager, SameSite, DEFAULT_COOKIE_NAME,
    MAX_COOKIE_SIZE,
};
pub use error::{ErrorResponse, OAuth2Error, OAuth2ErrorCode};
pub use host::Host;
pub use options::{Options, DEFAULT_AUTHENTICATION_TYPE};
pub use pkce::PkceSha256;
pub use record::{CorrelationRecord, RequestType};
pub use registration::{AuthenticationDescription, Registration};
pub use store::{CookieStateStore, MemoryStateStore, StateStore};
pub use transaction::Transaction;
pub use validation::{
    validate_expiry, validate_issuer, validate_request_type, validate_state,
    AuthorizationResponse, CorrelationContext, Outcome,
};

/// Reimport `biscuit` dependency.
pub mod biscuit {
    pub use biscuit::*;
}
