use cookie::Cookie;
use std::collections::HashMap;

/// The slice of an HTTP request/response pair the client host works on.
///
/// The embedding web server fills in the request side (transport security and
/// the `Cookie` header) and copies [`Transaction::set_cookie_headers`] onto the
/// response once the host is done.
#[derive(Debug, Default)]
pub struct Transaction {
    secure: bool,
    request_cookies: HashMap<String, String>,
    response_cookies: Vec<Cookie<'static>>,
    response_started: bool,
}

impl Transaction {
    pub fn new(secure: bool) -> Self {
        Transaction {
            secure,
            ..Default::default()
        }
    }

    /// Builds a transaction from the raw `Cookie` request header. Unparseable
    /// pairs are skipped. When a name repeats, the first value wins: user agents
    /// list the cookie with the longest matching path first.
    pub fn from_cookie_header(secure: bool, header: &str) -> Self {
        let mut transaction = Self::new(secure);
        for cookie in Cookie::split_parse(header).flatten() {
            transaction
                .request_cookies
                .entry(cookie.name().to_string())
                .or_insert_with(|| cookie.value().to_string());
        }
        transaction
    }

    pub fn with_request_cookie(mut self, name: &str, value: &str) -> Self {
        self.request_cookies
            .insert(name.to_string(), value.to_string());
        self
    }

    /// Whether the request arrived over an encrypted channel.
    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn request_cookie(&self, name: &str) -> Option<&str> {
        self.request_cookies.get(name).map(String::as_str)
    }

    /// Once headers are flushed no further cookies can be written.
    pub fn mark_response_started(&mut self) {
        self.response_started = true;
    }

    pub fn response_started(&self) -> bool {
        self.response_started
    }

    pub(crate) fn push_response_cookie(&mut self, cookie: Cookie<'static>) {
        self.response_cookies.push(cookie);
    }

    pub fn response_cookies(&self) -> &[Cookie<'static>] {
        &self.response_cookies
    }

    /// `Set-Cookie` header values to emit, in write order.
    pub fn set_cookie_headers(&self) -> Vec<String> {
        self.response_cookies.iter().map(|c| c.to_string()).collect()
    }

    /// Carries the cookies written by this response over to the next request
    /// from the same client, as a browser would. Deletions remove the cookie.
    pub fn follow(&self, secure: bool) -> Transaction {
        let mut next = Transaction::new(secure);
        next.request_cookies = self.request_cookies.clone();
        for cookie in &self.response_cookies {
            let deleted = cookie
                .max_age()
                .map_or(false, |age| age.is_zero() || age.is_negative());
            if deleted {
                next.request_cookies.remove(cookie.name());
            } else {
                next.request_cookies
                    .insert(cookie.name().to_string(), cookie.value().to_string());
            }
        }
        next
    }
}
