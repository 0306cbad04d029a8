use crate::{
    clock::{Clock, SystemClock},
    error::Error,
    registration::{AuthenticationDescription, Registration, Registrations},
    store::{CookieStateStore, StateStore},
    Codec, CorrelationRecord, Options, Transaction,
};
use log::{debug, info};
use std::sync::Arc;
use validator::Validate;

/// The OpenID Connect client host.
///
/// Built once at startup from validated [`Options`] and the static client
/// registrations; immutable afterwards and safe to share between requests.
#[derive(Debug, Clone)]
pub struct Host {
    pub(crate) options: Arc<Options>,
    pub(crate) registrations: Arc<Registrations>,
    pub(crate) codec: Codec,
    pub(crate) store: Arc<dyn StateStore>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl Host {
    /// Creates a host keeping correlation records in cookies.
    ///
    /// # Examples
    ///
    /// ```
    /// use openid_correlation::{Codec, CodecKey, Host, Options, Registration};
    /// use url::Url;
    ///
    /// let issuer = Url::parse("https://accounts.example.com/").unwrap();
    /// let registration = Registration::new(
    ///     issuer.clone(),
    ///     "CLIENT_ID",
    ///     issuer.join("authorize").unwrap(),
    ///     Url::parse("https://app.example.com/signin-oidc").unwrap(),
    /// )
    /// .with_provider_name("example");
    ///
    /// let host = Host::new(
    ///     Options::default(),
    ///     vec![registration],
    ///     Codec::new(CodecKey::generate().unwrap()),
    /// )
    /// .unwrap();
    ///
    /// assert_eq!(1, host.forwarded_authentication_types().len());
    /// ```
    pub fn new(
        options: Options,
        registrations: Vec<Registration>,
        codec: Codec,
    ) -> Result<Self, Error> {
        let store = Arc::new(CookieStateStore::new(
            options.cookie_manager.clone(),
            &options.cookie_name,
            options.cookie_options.clone(),
        ));
        Self::with_store(options, registrations, codec, store)
    }

    /// Creates a host keeping correlation records in `store`.
    pub fn with_store(
        options: Options,
        registrations: Vec<Registration>,
        codec: Codec,
        store: Arc<dyn StateStore>,
    ) -> Result<Self, Error> {
        options.validate()?;

        let registrations = Registrations::new(
            registrations,
            !options.disable_automatic_authentication_type_forwarding,
        );
        info!(
            "client host '{}' forwarding authentication types: {:?}",
            options.authentication_type,
            registrations
                .forwarded()
                .iter()
                .map(|f| f.authentication_type.as_str())
                .collect::<Vec<_>>()
        );

        Ok(Host {
            options: Arc::new(options),
            registrations: Arc::new(registrations),
            codec,
            store,
            clock: Arc::new(SystemClock),
        })
    }

    /// Replaces the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Provider names the embedding host may use directly as authentication
    /// types. Empty when automatic forwarding is disabled.
    pub fn forwarded_authentication_types(&self) -> &[AuthenticationDescription] {
        self.registrations.forwarded()
    }

    pub(crate) fn require_transport_security(&self, transaction: &Transaction) -> Result<(), Error> {
        if transaction.is_secure() || self.options.disable_transport_security_requirement {
            Ok(())
        } else {
            Err(Error::InsecureTransport)
        }
    }

    /// Encodes `record` and stores it; the record is pending once this returns.
    pub(crate) fn persist(
        &self,
        transaction: &mut Transaction,
        record: &CorrelationRecord,
    ) -> Result<(), Error> {
        let evicted = self.store.evict_expired(record.created_at);
        if evicted > 0 {
            debug!("evicted {} abandoned correlation records", evicted);
        }
        let artifact = self.codec.encode(record)?;
        self.store
            .put(transaction, &record.identifier, &artifact, record.expires_at)?;
        debug!(
            "issued {} correlation {} expiring at {}",
            record.request_type.as_str(),
            short(&record.identifier),
            record.expires_at
        );
        Ok(())
    }
}

/// Enough of an identifier to follow it through logs.
pub(crate) fn short(identifier: &str) -> &str {
    identifier.get(..8).unwrap_or(identifier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::Store, CodecKey, CookieOptions};
    use url::Url;

    fn registration(name: &str) -> Registration {
        let issuer = Url::parse(&format!("https://{}.example.com/", name)).unwrap();
        Registration::new(
            issuer.clone(),
            "app",
            issuer.join("authorize").unwrap(),
            Url::parse("https://app.example.com/callback").unwrap(),
        )
        .with_provider_name(name)
    }

    fn codec() -> Codec {
        Codec::new(CodecKey::generate().unwrap())
    }

    #[test]
    fn invalid_options_are_rejected() {
        let options = Options {
            cookie_options: CookieOptions {
                secure: false,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            Host::new(options, vec![registration("alpha")], codec()),
            Err(Error::Options(_))
        ));
    }

    #[test]
    fn forwarding_can_be_disabled() {
        let host = Host::new(
            Options::default(),
            vec![registration("alpha"), registration("beta")],
            codec(),
        )
        .unwrap();
        assert_eq!(2, host.forwarded_authentication_types().len());

        let host = Host::new(
            Options {
                disable_automatic_authentication_type_forwarding: true,
                ..Default::default()
            },
            vec![registration("alpha"), registration("beta")],
            codec(),
        )
        .unwrap();
        assert!(host.forwarded_authentication_types().is_empty());
    }

    #[test]
    fn persist_fails_once_response_started() {
        let host = Host::new(Options::default(), vec![registration("alpha")], codec()).unwrap();
        let record = CorrelationRecord::generate(
            crate::RequestType::Authorization,
            Url::parse("https://alpha.example.com/").unwrap(),
            chrono::Utc::now(),
            host.options().state_lifetime,
        )
        .unwrap();
        let mut tx = Transaction::new(true);
        tx.mark_response_started();
        let err = host.persist(&mut tx, &record).unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable(_)));
        assert!(matches!(
            Error::from(Store::Unavailable(String::new())).to_response().status,
            503
        ));
    }

    #[test]
    fn short_identifier() {
        assert_eq!("abcdefgh", short("abcdefghijkl"));
        assert_eq!("abc", short("abc"));
    }
}
