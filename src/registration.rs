use crate::error::Resolution;
use serde::{Deserialize, Serialize};
use url::Url;

/// A statically configured OpenID Connect client registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    /// The authorization server's issuer identifier.
    pub issuer: Url,
    /// A short, unique name used by applications to pick this registration.
    #[serde(default)]
    pub provider_name: Option<String>,
    /// A human readable name, shown on provider selection pages.
    #[serde(default)]
    pub provider_display_name: Option<String>,
    pub client_id: String,
    pub authorization_endpoint: Url,
    #[serde(default)]
    pub end_session_endpoint: Option<Url>,
    /// Where the authorization server sends authorization responses.
    pub redirect_uri: Url,
    /// Where the authorization server sends end session responses.
    #[serde(default)]
    pub post_logout_redirect_uri: Option<Url>,
    /// Scopes requested in addition to `openid`.
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Attach a PKCE S256 challenge to authorization requests.
    #[serde(default = "default_pkce")]
    pub pkce: bool,
}

fn default_pkce() -> bool {
    true
}

impl Registration {
    pub fn new(
        issuer: Url,
        client_id: &str,
        authorization_endpoint: Url,
        redirect_uri: Url,
    ) -> Self {
        Registration {
            issuer,
            provider_name: None,
            provider_display_name: None,
            client_id: client_id.to_string(),
            authorization_endpoint,
            end_session_endpoint: None,
            redirect_uri,
            post_logout_redirect_uri: None,
            scopes: Vec::new(),
            pkce: default_pkce(),
        }
    }

    pub fn with_provider_name(mut self, name: &str) -> Self {
        self.provider_name = Some(name.to_string());
        self
    }
}

/// An authentication type the embedding host can challenge or sign out
/// directly, forwarded to the client host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticationDescription {
    pub authentication_type: String,
    pub caption: Option<String>,
}

/// What a challenge or sign-out names to pick its registration.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Selector<'a> {
    pub authentication_type: Option<&'a str>,
    pub provider_name: Option<&'a str>,
    pub issuer: Option<&'a Url>,
}

/// The fixed set of registrations known to a host.
#[derive(Debug, Clone, Default)]
pub(crate) struct Registrations {
    registrations: Vec<Registration>,
    forwarded: Vec<AuthenticationDescription>,
}

impl Registrations {
    pub fn new(registrations: Vec<Registration>, forwarding: bool) -> Self {
        let forwarded = if forwarding {
            registrations
                .iter()
                .filter_map(|r| {
                    r.provider_name
                        .as_ref()
                        .map(|name| AuthenticationDescription {
                            authentication_type: name.clone(),
                            caption: r.provider_display_name.clone(),
                        })
                })
                .collect()
        } else {
            Vec::new()
        };
        Registrations {
            registrations,
            forwarded,
        }
    }

    pub fn forwarded(&self) -> &[AuthenticationDescription] {
        &self.forwarded
    }

    fn by_provider_name(&self, name: &str) -> Result<&Registration, Resolution> {
        self.registrations
            .iter()
            .find(|r| r.provider_name.as_deref() == Some(name))
            .ok_or_else(|| Resolution::NotFound(name.to_string()))
    }

    fn by_issuer(&self, issuer: &Url) -> Result<&Registration, Resolution> {
        let mut matches = self.registrations.iter().filter(|r| &r.issuer == issuer);
        match (matches.next(), matches.next()) {
            (Some(registration), None) => Ok(registration),
            (Some(_), Some(_)) => Err(Resolution::Ambiguous(issuer.to_string())),
            (None, _) => Err(Resolution::NotFound(issuer.to_string())),
        }
    }

    /// Forwarded authentication type, then provider name, then issuer, then
    /// the only registration. A provider name and an issuer given together
    /// must designate the same registration.
    pub fn resolve(&self, selector: Selector<'_>) -> Result<&Registration, Resolution> {
        let forwarded = selector.authentication_type.filter(|kind| {
            self.forwarded
                .iter()
                .any(|f| f.authentication_type == *kind)
        });

        let provider_name = forwarded.or(selector.provider_name);

        if let Some(name) = provider_name {
            let registration = self.by_provider_name(name)?;
            if let Some(issuer) = selector.issuer {
                if &registration.issuer != issuer {
                    return Err(Resolution::Conflict {
                        provider_name: name.to_string(),
                        issuer: issuer.to_string(),
                    });
                }
            }
            return Ok(registration);
        }

        if let Some(issuer) = selector.issuer {
            return self.by_issuer(issuer);
        }

        match self.registrations.as_slice() {
            [only] => Ok(only),
            [] => Err(Resolution::NotFound("<default>".to_string())),
            _ => Err(Resolution::Ambiguous("<default>".to_string())),
        }
    }
}
