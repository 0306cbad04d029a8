use crate::error::Error;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

/// Size in bytes of identifiers, nonces and code verifiers.
pub(crate) const TOKEN_BYTES: usize = 32;

/// Fills `buf` from the operating system CSPRNG.
pub(crate) fn fill(buf: &mut [u8]) -> Result<(), Error> {
    getrandom::fill(buf).map_err(|e| Error::Random(e.to_string()))
}

/// A base64url encoded string carrying 256 bits of entropy.
pub(crate) fn token() -> Result<String, Error> {
    let mut bytes = [0u8; TOKEN_BYTES];
    fill(&mut bytes)?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}
