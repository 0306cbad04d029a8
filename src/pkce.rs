/*!
PKCE - Proof Key for Code Exchange by OAuth Public Clients

The verifier stays inside the encrypted correlation record; only the S256
challenge travels in the authorization request.

See [RFC 7636](https://tools.ietf.org/html/rfc7636) for more details.
*/

use crate::{error::Error, random};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

/// S256 code challenge method.
///
/// The S256 method uses a SHA-256 hash of the code verifier to generate the
/// code challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceSha256 {
    /// A cryptographically random string that is used to correlate the
    /// authorization request to the token request.
    pub code_verifier: String,
    /// A challenge derived from the code verifier that is sent in the
    /// authorization request, to be verified against later.
    pub code_challenge: String,
}

impl PkceSha256 {
    pub const METHOD: &'static str = "S256";

    /// Rebuild the pair from a verifier recovered from a correlation record.
    pub fn replicate(code_verifier: String) -> Self {
        let code_challenge = s256(&code_verifier);
        PkceSha256 {
            code_verifier,
            code_challenge,
        }
    }

    /// Generate a PKCE S256 code verifier and challenge.
    pub fn generate() -> Result<Self, Error> {
        Ok(Self::replicate(random::token()?))
    }
}

/// `BASE64URL(SHA256(value))`, shared by the code challenge and the request nonce.
pub(crate) fn s256(value: &str) -> String {
    URL_SAFE_NO_PAD.encode(hmac_sha256::Hash::hash(value.as_bytes()))
}
