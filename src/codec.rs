/*!
Correlation token codec.

Records travel as JWE compact serializations: the content encryption key is
wrapped with `A256GCMKW` under the codec key and the payload is sealed with
`A256GCM`. Decryption either yields the exact record that was encrypted or
fails.
*/
use crate::{
    error::{Decode, Error, Jose},
    random, CorrelationRecord,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use biscuit::jwa::{ContentEncryptionAlgorithm, EncryptionOptions, KeyManagementAlgorithm};
use biscuit::jwe;
use biscuit::jwk::JWK;
use biscuit::Empty;
use chrono::{DateTime, Utc};
use std::fmt;

type Jwe = jwe::Compact<CorrelationRecord, Empty>;

const KEY_BYTES: usize = 32;
const IV_BYTES: usize = 96 / 8;

/// A 256-bit symmetric key protecting correlation records.
#[derive(Clone)]
pub struct CodecKey(JWK<Empty>);

impl CodecKey {
    pub fn new(bytes: [u8; KEY_BYTES]) -> Self {
        CodecKey(JWK::new_octet_key(&bytes, Default::default()))
    }

    /// Generate a key from the operating system CSPRNG.
    pub fn generate() -> Result<Self, Error> {
        let mut bytes = [0u8; KEY_BYTES];
        random::fill(&mut bytes)?;
        Ok(Self::new(bytes))
    }

    /// Load a key from its standard base64 form, as found in configuration files.
    pub fn from_base64(encoded: &str) -> Result<Self, Error> {
        let decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|e| Error::Key(e.to_string()))?;
        let bytes: [u8; KEY_BYTES] = decoded
            .try_into()
            .map_err(|v: Vec<u8>| Error::Key(format!("expected 32 bytes, got {}", v.len())))?;
        Ok(Self::new(bytes))
    }
}

impl fmt::Debug for CodecKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CodecKey(..)")
    }
}

/// Encrypts records with the current key, decrypts with the current key or
/// any retired one.
#[derive(Debug, Clone)]
pub struct Codec {
    current: CodecKey,
    retired: Vec<CodecKey>,
}

impl Codec {
    pub fn new(current: CodecKey) -> Self {
        Codec {
            current,
            retired: Vec::new(),
        }
    }

    /// Keep accepting tokens produced under a previous key.
    pub fn with_retired_key(mut self, key: CodecKey) -> Self {
        self.retired.push(key);
        self
    }

    pub fn encode(&self, record: &CorrelationRecord) -> Result<String, Error> {
        let mut iv = vec![0u8; IV_BYTES];
        random::fill(&mut iv)?;
        let options = EncryptionOptions::AES_GCM { nonce: iv };

        let token = Jwe::new_decrypted(
            From::from(jwe::RegisteredHeader {
                cek_algorithm: KeyManagementAlgorithm::A256GCMKW,
                enc_algorithm: ContentEncryptionAlgorithm::A256GCM,
                ..Default::default()
            }),
            record.clone(),
        );
        let encrypted = token.encrypt(&self.current.0, &options)?;
        Ok(encrypted.encrypted()?.encode())
    }

    /// Decrypts `token` and rejects records that expired before `now`.
    pub fn decode(&self, token: &str, now: DateTime<Utc>) -> Result<CorrelationRecord, Decode> {
        let encrypted = Jwe::new_encrypted(token);
        let mut failure = Decode::Malformed;

        for key in std::iter::once(&self.current).chain(self.retired.iter()) {
            match encrypted.decrypt(
                &key.0,
                KeyManagementAlgorithm::A256GCMKW,
                ContentEncryptionAlgorithm::A256GCM,
            ) {
                Ok(decrypted) => {
                    let record = decrypted.payload().map_err(|_| Decode::Malformed)?;
                    if record.is_expired(now) {
                        return Err(Decode::Expired(record.expires_at));
                    }
                    return Ok(record.clone());
                }
                Err(Jose::UnspecifiedCryptographicError) | Err(Jose::WrongKeyType { .. }) => {
                    failure = Decode::TamperedOrExpiredKey;
                }
                Err(_) => return Err(Decode::Malformed),
            }
        }

        Err(failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RequestType;
    use chrono::{Duration, TimeZone};
    use url::Url;

    fn record() -> CorrelationRecord {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let mut record = CorrelationRecord::generate(
            RequestType::Authorization,
            Url::parse("https://alpha.example.com/").unwrap(),
            now,
            Duration::minutes(15),
        )
        .unwrap();
        record.code_verifier = Some("verifier".to_string());
        record.redirect_target = Some("/account".to_string());
        record.provider_name = Some("alpha".to_string());
        record
    }

    fn within(record: &CorrelationRecord) -> DateTime<Utc> {
        record.created_at + Duration::minutes(1)
    }

    #[test]
    fn round_trip() {
        let codec = Codec::new(CodecKey::generate().unwrap());
        let record = record();
        let token = codec.encode(&record).unwrap();
        assert_eq!(5, token.split('.').count());
        assert_eq!(record, codec.decode(&token, within(&record)).unwrap());
    }

    #[test]
    fn secrets_are_not_visible() {
        let codec = Codec::new(CodecKey::generate().unwrap());
        let record = record();
        let token = codec.encode(&record).unwrap();
        assert!(!token.contains(&record.nonce));
        assert!(!token.contains("verifier"));
    }

    #[test]
    fn encryptions_differ() {
        let codec = Codec::new(CodecKey::generate().unwrap());
        let record = record();
        assert_ne!(codec.encode(&record).unwrap(), codec.encode(&record).unwrap());
    }

    #[test]
    fn any_bit_flip_fails() {
        let codec = Codec::new(CodecKey::generate().unwrap());
        let record = record();
        let token = codec.encode(&record).unwrap();
        let now = within(&record);

        for index in 0..token.len() {
            for bit in [0x01u8, 0x20] {
                let mut bytes = token.clone().into_bytes();
                bytes[index] ^= bit;
                let tampered = String::from_utf8_lossy(&bytes).into_owned();
                assert!(
                    codec.decode(&tampered, now).is_err(),
                    "flip of bit {:#x} at {} was accepted",
                    bit,
                    index
                );
            }
        }
    }

    #[test]
    fn wrong_key_is_rejected() {
        let record = record();
        let token = Codec::new(CodecKey::generate().unwrap())
            .encode(&record)
            .unwrap();
        let other = Codec::new(CodecKey::generate().unwrap());
        assert_eq!(
            Err(Decode::TamperedOrExpiredKey),
            other.decode(&token, within(&record))
        );
    }

    #[test]
    fn retired_key_still_decodes() {
        let old = CodecKey::generate().unwrap();
        let record = record();
        let token = Codec::new(old.clone()).encode(&record).unwrap();

        let rotated = Codec::new(CodecKey::generate().unwrap()).with_retired_key(old);
        assert_eq!(record, rotated.decode(&token, within(&record)).unwrap());
    }

    #[test]
    fn garbage_is_malformed() {
        let codec = Codec::new(CodecKey::generate().unwrap());
        assert_eq!(Err(Decode::Malformed), codec.decode("", Utc::now()));
        assert_eq!(Err(Decode::Malformed), codec.decode("a.b.c", Utc::now()));
    }

    #[test]
    fn expired_record_is_reported() {
        let codec = Codec::new(CodecKey::generate().unwrap());
        let record = record();
        let token = codec.encode(&record).unwrap();
        let late = record.expires_at + Duration::seconds(1);
        assert_eq!(
            Err(Decode::Expired(record.expires_at)),
            codec.decode(&token, late)
        );
    }

    #[test]
    fn key_from_base64() {
        let key = CodecKey::from_base64(&STANDARD.encode([7u8; 32])).unwrap();
        assert_eq!("CodecKey(..)", format!("{:?}", key));
        assert!(matches!(
            CodecKey::from_base64(&STANDARD.encode([7u8; 16])),
            Err(Error::Key(_))
        ));
        assert!(matches!(CodecKey::from_base64("%%%"), Err(Error::Key(_))));
    }
}
