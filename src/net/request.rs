//! Outgoing crawl requests.
//!
//! A [`Request`] is built once (usually inside a handler), travels through the
//! hook pipeline and the scheduler, and is finally handed to a
//! [`Downloader`](super::Downloader). Its target may be relative; admission
//! resolves it against the final URL of the parent response.

use std::collections::HashMap;
use std::fmt;

use reqwest::Method;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;
use url::Url;

use super::constants::{FORM_CONTENT_TYPE, JSON_CONTENT_TYPE};
use super::error::RequestError;

/// Free-form key/value bag carried from a request into its response.
///
/// Values are JSON so that alternate schedulers can persist them. Type checks
/// on the values are the responsibility of the hooks that read them.
pub type Meta = HashMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Absolute(Url),
    /// Relative or otherwise unparseable input, kept verbatim until resolved.
    Unresolved(String),
}

impl Target {
    fn parse(raw: &str) -> Self {
        match Url::parse(raw) {
            Ok(url) => Self::Absolute(url),
            Err(_) => Self::Unresolved(raw.to_string()),
        }
    }
}

/// An HTTP request scheduled by the crawler.
#[derive(Debug, Clone)]
pub struct Request {
    target: Target,
    method: Method,
    headers: HeaderMap,
    cookies: Vec<(String, String)>,
    body: Vec<u8>,
    proxy: Option<String>,
    depth: Option<u32>,
    response_encoding: Option<String>,
    meta: Meta,
}

impl Request {
    /// Creates a request with an arbitrary method.
    ///
    /// The URL is not validated here: relative URLs are resolved at admission
    /// and anything still unresolvable is reported by the downloader.
    #[must_use]
    pub fn new(method: Method, url: impl AsRef<str>) -> Self {
        Self {
            target: Target::parse(url.as_ref()),
            method,
            headers: HeaderMap::new(),
            cookies: Vec::new(),
            body: Vec::new(),
            proxy: None,
            depth: None,
            response_encoding: None,
            meta: Meta::new(),
        }
    }

    /// Creates a GET request.
    #[must_use]
    pub fn get(url: impl AsRef<str>) -> Self {
        Self::new(Method::GET, url)
    }

    /// Creates a POST request with a raw body.
    #[must_use]
    pub fn post(url: impl AsRef<str>, body: impl Into<Vec<u8>>) -> Self {
        Self::new(Method::POST, url).with_body(body)
    }

    /// Creates a POST request with an url-encoded form body.
    #[must_use]
    pub fn post_form<I, K, V>(url: impl AsRef<str>, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        Self::post(url, body).with_header(CONTENT_TYPE.as_str(), FORM_CONTENT_TYPE)
    }

    /// Creates a POST request with a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Json`] if `value` cannot be serialized.
    pub fn post_json<T: Serialize + ?Sized>(
        url: impl AsRef<str>,
        value: &T,
    ) -> Result<Self, RequestError> {
        let url = url.as_ref();
        let body = serde_json::to_vec(value).map_err(|source| RequestError::Json {
            url: url.to_string(),
            source,
        })?;
        Ok(Self::post(url, body).with_header(CONTENT_TYPE.as_str(), JSON_CONTENT_TYPE))
    }

    /// Returns the absolute URL, or `None` while the target is unresolved.
    #[must_use]
    pub fn url(&self) -> Option<&Url> {
        match &self.target {
            Target::Absolute(url) => Some(url),
            Target::Unresolved(_) => None,
        }
    }

    /// Returns the target as written (absolute or not).
    #[must_use]
    pub fn raw_url(&self) -> &str {
        match &self.target {
            Target::Absolute(url) => url.as_str(),
            Target::Unresolved(raw) => raw,
        }
    }

    /// Returns the host (with explicit port) of an absolute target, lowercased.
    #[must_use]
    pub fn host(&self) -> Option<String> {
        self.url().and_then(host_with_port)
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    #[must_use]
    pub fn cookies(&self) -> &[(String, String)] {
        &self.cookies
    }

    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Returns the per-request proxy override.
    #[must_use]
    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }

    /// Returns the crawl depth; `None` until admission assigns it.
    #[must_use]
    pub fn depth(&self) -> Option<u32> {
        self.depth
    }

    /// Returns the charset label forced for the response body, if any.
    #[must_use]
    pub fn response_encoding(&self) -> Option<&str> {
        self.response_encoding.as_deref()
    }

    #[must_use]
    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut Meta {
        &mut self.meta
    }

    /// Sets a header, replacing any existing values for that name.
    ///
    /// Invalid header names or values are logged and ignored.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.set_header(name, value);
        self
    }

    /// In-place variant of [`with_header`](Self::with_header).
    pub fn set_header(&mut self, name: &str, value: &str) {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => warn!(header = name, url = %self.raw_url(), "ignoring invalid header"),
        }
    }

    /// Sets the `User-Agent` header.
    #[must_use]
    pub fn with_user_agent(self, user_agent: &str) -> Self {
        self.with_header(USER_AGENT.as_str(), user_agent)
    }

    #[must_use]
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Routes this request through the given proxy URL.
    #[must_use]
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Replaces the query string with the url-encoded `params`.
    #[must_use]
    pub fn with_query<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params)
            .finish();
        match &mut self.target {
            Target::Absolute(url) => url.set_query(Some(&query)),
            Target::Unresolved(raw) => {
                let path = raw.split('?').next().unwrap_or_default().to_string();
                *raw = format!("{path}?{query}");
            }
        }
        self
    }

    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Pins the crawl depth instead of deriving it from the parent.
    #[must_use]
    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn set_depth(&mut self, depth: u32) {
        self.depth = Some(depth);
    }

    /// Forces the charset used to decode the response body.
    #[must_use]
    pub fn with_response_encoding(mut self, label: impl Into<String>) -> Self {
        self.response_encoding = Some(label.into());
        self
    }

    /// Resolves the target against `base` without modifying the request.
    #[must_use]
    pub fn resolve(&self, base: Option<&Url>) -> Option<Url> {
        match &self.target {
            Target::Absolute(url) => Some(url.clone()),
            Target::Unresolved(raw) => base.and_then(|base| base.join(raw).ok()),
        }
    }

    /// Resolves a relative target against `base` in place.
    ///
    /// Returns `false` if the target is still unresolved afterwards.
    pub fn resolve_against(&mut self, base: Option<&Url>) -> bool {
        if let Target::Unresolved(_) = self.target
            && let Some(url) = self.resolve(base)
        {
            self.target = Target::Absolute(url);
        }
        matches!(self.target, Target::Absolute(_))
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.raw_url())
    }
}

/// Lowercased `host[:port]` of a URL; the port is only present when explicit.
#[must_use]
pub fn host_with_port(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host,
    })
}
