use crate::{
    error::{Error, Resolution},
    host::short,
    registration::Selector,
    CorrelationRecord, Host, PkceSha256, RequestType, Transaction,
};
use log::debug;
use url::Url;

/// Properties of an outbound authentication challenge.
///
/// Derives Default, so remember to ..Default::default() after you specify what you want.
#[derive(Debug, Clone, Default)]
pub struct ChallengeProperties {
    /// The authentication type the challenge was issued for. Only forwarded
    /// authentication types select a registration.
    pub authentication_type: Option<String>,
    pub provider_name: Option<String>,
    pub issuer: Option<Url>,
    /// Where to send the user once the response has been validated.
    pub redirect_target: Option<String>,
    /// Scopes requested on top of the registration's. `openid` is always added.
    pub scope: Option<String>,
    pub prompt: Option<String>,
    pub login_hint: Option<String>,
}

/// Properties of an outbound sign-out.
#[derive(Debug, Clone, Default)]
pub struct SignOutProperties {
    pub authentication_type: Option<String>,
    pub provider_name: Option<String>,
    pub issuer: Option<Url>,
    pub redirect_target: Option<String>,
    pub id_token_hint: Option<String>,
}

/// Where to redirect the user agent to start an authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub url: Url,
    /// The `state` parameter carried by `url`.
    pub state: String,
    pub issuer: Url,
    pub provider_name: Option<String>,
}

/// Where to redirect the user agent to end the session at the authorization server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndSessionRequest {
    pub url: Url,
    pub state: String,
    pub issuer: Url,
    pub provider_name: Option<String>,
}

fn scope(registration_scopes: &[String], extra: Option<&str>) -> String {
    let mut scopes: Vec<&str> = vec!["openid"];
    let requested = registration_scopes
        .iter()
        .map(String::as_str)
        .chain(extra.into_iter().flat_map(str::split_whitespace));
    for scope in requested {
        if !scopes.contains(&scope) {
            scopes.push(scope);
        }
    }
    scopes.join(" ")
}

impl Host {
    /// Starts an authorization: persists a correlation record on `transaction`
    /// and returns the authorization request to redirect the user agent to.
    ///
    /// No record is created when the challenge is rejected.
    pub fn challenge(
        &self,
        transaction: &mut Transaction,
        properties: &ChallengeProperties,
    ) -> Result<AuthorizationRequest, Error> {
        self.require_transport_security(transaction)?;

        let registration = self.registrations.resolve(Selector {
            authentication_type: properties.authentication_type.as_deref(),
            provider_name: properties.provider_name.as_deref(),
            issuer: properties.issuer.as_ref(),
        })?;

        let mut record = CorrelationRecord::generate(
            RequestType::Authorization,
            registration.issuer.clone(),
            self.clock.now(),
            self.options.state_lifetime,
        )?;
        record.redirect_target = properties.redirect_target.clone();
        record.provider_name = registration.provider_name.clone();

        let pkce = if registration.pkce {
            Some(PkceSha256::generate()?)
        } else {
            None
        };
        record.code_verifier = pkce.as_ref().map(|p| p.code_verifier.clone());

        self.persist(transaction, &record)?;

        let mut url = registration.authorization_endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("response_type", "code");
            query.append_pair("client_id", &registration.client_id);
            query.append_pair("redirect_uri", registration.redirect_uri.as_str());
            query.append_pair(
                "scope",
                &scope(&registration.scopes, properties.scope.as_deref()),
            );
            query.append_pair("state", &record.identifier);
            query.append_pair("nonce", &record.request_nonce());
            if let Some(ref pkce) = pkce {
                query.append_pair("code_challenge", &pkce.code_challenge);
                query.append_pair("code_challenge_method", PkceSha256::METHOD);
            }
            if let Some(ref prompt) = properties.prompt {
                query.append_pair("prompt", prompt);
            }
            if let Some(ref login_hint) = properties.login_hint {
                query.append_pair("login_hint", login_hint);
            }
        }

        debug!(
            "challenge {} redirects to {}",
            short(&record.identifier),
            registration.authorization_endpoint
        );

        Ok(AuthorizationRequest {
            url,
            state: record.identifier,
            issuer: record.issuer,
            provider_name: record.provider_name,
        })
    }

    /// Starts a sign-out at the authorization server's end session endpoint.
    pub fn sign_out(
        &self,
        transaction: &mut Transaction,
        properties: &SignOutProperties,
    ) -> Result<EndSessionRequest, Error> {
        self.require_transport_security(transaction)?;

        let registration = self.registrations.resolve(Selector {
            authentication_type: properties.authentication_type.as_deref(),
            provider_name: properties.provider_name.as_deref(),
            issuer: properties.issuer.as_ref(),
        })?;
        let endpoint = registration
            .end_session_endpoint
            .as_ref()
            .ok_or_else(|| Resolution::NoEndSessionEndpoint(registration.issuer.to_string()))?;

        let mut record = CorrelationRecord::generate(
            RequestType::EndSession,
            registration.issuer.clone(),
            self.clock.now(),
            self.options.state_lifetime,
        )?;
        record.redirect_target = properties.redirect_target.clone();
        record.provider_name = registration.provider_name.clone();

        self.persist(transaction, &record)?;

        let mut url = endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", &registration.client_id);
            if let Some(ref uri) = registration.post_logout_redirect_uri {
                query.append_pair("post_logout_redirect_uri", uri.as_str());
            }
            query.append_pair("state", &record.identifier);
            if let Some(ref hint) = properties.id_token_hint {
                query.append_pair("id_token_hint", hint);
            }
        }

        Ok(EndSessionRequest {
            url,
            state: record.identifier,
            issuer: record.issuer,
            provider_name: record.provider_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        store::{MemoryStateStore, StateStore},
        Codec, CodecKey, Options, Registration,
    };
    use std::collections::HashMap;
    use std::sync::Arc;

    fn registration() -> Registration {
        let issuer = Url::parse("https://alpha.example.com/").unwrap();
        let mut registration = Registration::new(
            issuer.clone(),
            "app",
            issuer.join("authorize").unwrap(),
            Url::parse("https://app.example.com/callback").unwrap(),
        )
        .with_provider_name("alpha");
        registration.scopes = vec!["profile".to_string(), "email".to_string()];
        registration.end_session_endpoint = Some(issuer.join("logout").unwrap());
        registration.post_logout_redirect_uri =
            Some(Url::parse("https://app.example.com/signed-out").unwrap());
        registration
    }

    fn host(options: Options) -> Host {
        Host::new(
            options,
            vec![registration()],
            Codec::new(CodecKey::generate().unwrap()),
        )
        .unwrap()
    }

    fn query(url: &Url) -> HashMap<String, String> {
        url.query_pairs().into_owned().collect()
    }

    #[test]
    fn scope_always_contains_openid() {
        assert_eq!("openid", scope(&[], None));
        assert_eq!(
            "openid profile email",
            scope(&["profile".to_string()], Some("email openid profile"))
        );
    }

    #[test]
    fn challenge_builds_authorization_request() {
        let host = host(Options::default());
        let mut tx = Transaction::new(true);
        let request = host
            .challenge(
                &mut tx,
                &ChallengeProperties {
                    redirect_target: Some("/account".to_string()),
                    login_hint: Some("user@example.com".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!("/authorize", request.url.path());
        let params = query(&request.url);
        assert_eq!("code", params["response_type"]);
        assert_eq!("app", params["client_id"]);
        assert_eq!("https://app.example.com/callback", params["redirect_uri"]);
        assert_eq!("openid profile email", params["scope"]);
        assert_eq!(request.state, params["state"]);
        assert_eq!("S256", params["code_challenge_method"]);
        assert_eq!("user@example.com", params["login_hint"]);
        assert!(!params.contains_key("prompt"));
        assert_eq!(Some("alpha".to_string()), request.provider_name);

        let cookies = tx.response_cookies();
        assert_eq!(1, cookies.len());
        assert_eq!(
            format!("OpenIddict.Client.State.{}", request.state),
            cookies[0].name()
        );
    }

    #[test]
    fn correlation_cookie_is_site_wide() {
        let host = host(Options::default());
        let mut tx = Transaction::new(true);
        host.challenge(&mut tx, &ChallengeProperties::default())
            .unwrap();

        let header = &tx.set_cookie_headers()[0];
        assert!(header.contains("Path=/"));
        assert!(header.contains("HttpOnly"));
        assert!(header.contains("Secure"));
    }

    #[test]
    fn oversized_challenge_creates_no_record() {
        let host = host(Options::default());
        let mut tx = Transaction::new(true);
        let result = host.challenge(
            &mut tx,
            &ChallengeProperties {
                redirect_target: Some(format!("/search?q={}", "a".repeat(3000))),
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(Error::StoreUnavailable(_))));
        assert!(tx.response_cookies().is_empty());
    }

    #[test]
    fn nonce_and_verifier_stay_out_of_the_url() {
        let store = Arc::new(MemoryStateStore::new());
        let codec = Codec::new(CodecKey::generate().unwrap());
        let host = Host::with_store(
            Options::default(),
            vec![registration()],
            codec.clone(),
            store.clone(),
        )
        .unwrap();
        let mut tx = Transaction::new(true);
        let request = host
            .challenge(&mut tx, &ChallengeProperties::default())
            .unwrap();

        let artifact = store.take_and_delete(&mut tx, &request.state).unwrap();
        let record = codec.decode(&artifact, chrono::Utc::now()).unwrap();
        let url = request.url.as_str();
        let verifier = record.code_verifier.clone().unwrap();

        assert!(!url.contains(&record.nonce));
        assert!(!url.contains(&verifier));
        let params = query(&request.url);
        assert_eq!(record.request_nonce(), params["nonce"]);
        assert_eq!(
            PkceSha256::replicate(verifier).code_challenge,
            params["code_challenge"]
        );
        assert!(tx.response_cookies().is_empty());
    }

    #[test]
    fn challenge_without_pkce() {
        let mut registration = registration();
        registration.pkce = false;
        let host = Host::new(
            Options::default(),
            vec![registration],
            Codec::new(CodecKey::generate().unwrap()),
        )
        .unwrap();
        let request = host
            .challenge(&mut Transaction::new(true), &ChallengeProperties::default())
            .unwrap();
        let params = query(&request.url);
        assert!(!params.contains_key("code_challenge"));
        assert!(!params.contains_key("code_challenge_method"));
    }

    #[test]
    fn insecure_challenge_creates_no_record() {
        let host = host(Options::default());
        let mut tx = Transaction::new(false);
        let result = host.challenge(&mut tx, &ChallengeProperties::default());
        assert!(matches!(result, Err(Error::InsecureTransport)));
        assert!(tx.response_cookies().is_empty());
    }

    #[test]
    fn insecure_challenge_allowed_when_requirement_disabled() {
        let host = host(Options {
            disable_transport_security_requirement: true,
            ..Default::default()
        });
        let mut tx = Transaction::new(false);
        assert!(host
            .challenge(&mut tx, &ChallengeProperties::default())
            .is_ok());
        assert_eq!(1, tx.response_cookies().len());
    }

    #[test]
    fn unresolvable_challenge_creates_no_record() {
        let host = host(Options::default());
        let mut tx = Transaction::new(true);
        let result = host.challenge(
            &mut tx,
            &ChallengeProperties {
                provider_name: Some("gamma".to_string()),
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(Error::Resolution(_))));
        assert!(tx.response_cookies().is_empty());
    }

    #[test]
    fn sign_out_builds_end_session_request() {
        let host = host(Options::default());
        let mut tx = Transaction::new(true);
        let request = host
            .sign_out(
                &mut tx,
                &SignOutProperties {
                    authentication_type: Some("alpha".to_string()),
                    id_token_hint: Some("eyJ...".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!("/logout", request.url.path());
        let params = query(&request.url);
        assert_eq!(request.state, params["state"]);
        assert_eq!(
            "https://app.example.com/signed-out",
            params["post_logout_redirect_uri"]
        );
        assert_eq!("eyJ...", params["id_token_hint"]);
        assert_eq!(1, tx.response_cookies().len());
    }

    #[test]
    fn sign_out_requires_end_session_endpoint() {
        let mut registration = registration();
        registration.end_session_endpoint = None;
        let host = Host::new(
            Options::default(),
            vec![registration],
            Codec::new(CodecKey::generate().unwrap()),
        )
        .unwrap();
        let result = host.sign_out(&mut Transaction::new(true), &SignOutProperties::default());
        assert!(matches!(
            result,
            Err(Error::Resolution(Resolution::NoEndSessionEndpoint(_)))
        ));
    }
}
