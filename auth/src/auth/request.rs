use crate::common::{AuthError, AuthResult};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Url};

/// An outbound request as seen by authentication providers.
///
/// Only the parts a provider needs are modelled: the method, the target URI and
/// a mutable header map. The transport that eventually sends the request owns
/// everything else.
#[derive(Clone, Debug)]
pub struct RequestInformation {
    pub method: Method,
    uri: Option<Url>,
    headers: HeaderMap,
}

impl RequestInformation {
    /// Creates a request without a target. Providers reject it until a URI is set.
    pub fn new(method: Method) -> Self {
        Self {
            method,
            uri: None,
            headers: HeaderMap::new(),
        }
    }

    pub fn with_uri(method: Method, uri: Url) -> Self {
        Self {
            method,
            uri: Some(uri),
            headers: HeaderMap::new(),
        }
    }

    /// Parses `uri` and builds a request targeting it.
    pub fn parse(method: Method, uri: &str) -> AuthResult<Self> {
        let uri = Url::parse(uri)
            .map_err(|e| AuthError::Configuration(format!("Invalid request URI '{uri}': {e}")))?;
        Ok(Self::with_uri(method, uri))
    }

    pub fn uri(&self) -> Option<&Url> {
        self.uri.as_ref()
    }

    pub fn set_uri(&mut self, uri: Url) {
        self.uri = Some(uri);
    }

    /// Host of the target URI, if any.
    pub fn host(&self) -> Option<&str> {
        self.uri.as_ref().and_then(Url::host_str)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Sets `name` to `value`, replacing every existing value of that header.
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    pub fn header(&self, name: &HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn authorization(&self) -> Option<&str> {
        self.header(&AUTHORIZATION)
    }
}
