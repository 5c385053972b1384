//! Fetched pages.
//!
//! The body is decoded to text eagerly (charset detection is cheap next to
//! the network round trip); structured views are parsed only when asked for
//! and their absence is never an error.

use std::sync::{LazyLock, OnceLock};

use encoding_rs::{Encoding, UTF_8};
use regex::Regex;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use serde_json::Value;
use url::Url;

use super::error::DownloadError;
use super::request::{Meta, Request};

/// How many leading body bytes are scanned for an HTML `<meta charset>`.
const META_SNIFF_LEN: usize = 1024;

#[allow(clippy::expect_used)]
static META_CHARSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta[^>]+charset\s*=\s*["']?\s*([a-z0-9_\-:.]+)"#)
        .expect("static charset regex is valid")
});

/// A downloaded page together with the request that produced it.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
    text: String,
    url: Url,
    request: Request,
    meta: Meta,
    json: OnceLock<Option<Value>>,
}

impl Response {
    /// Builds a response for `request`, decoding `body` to text.
    ///
    /// The final URL defaults to the request URL; downloaders that follow
    /// redirects should call [`with_final_url`](Self::with_final_url).
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidUrl`] if the request target is not an
    /// absolute URL.
    pub fn new(
        request: Request,
        status: StatusCode,
        headers: HeaderMap,
        body: impl Into<Vec<u8>>,
    ) -> Result<Self, DownloadError> {
        let Some(url) = request.url().cloned() else {
            return Err(DownloadError::invalid_url(request));
        };
        let body = body.into();
        let text = decode_body(&body, &headers, request.response_encoding());
        let meta = request.meta().clone();
        Ok(Self {
            status,
            headers,
            body,
            text,
            url,
            request,
            meta,
            json: OnceLock::new(),
        })
    }

    /// Sets the URL the response was finally served from.
    #[must_use]
    pub fn with_final_url(mut self, url: Url) -> Self {
        self.url = url;
        self
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the first value of `name` if it is valid visible ASCII.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Returns the charset-normalized body.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the final URL after redirects.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns the request this response answers.
    #[must_use]
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Returns the meta inherited from the request.
    #[must_use]
    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut Meta {
        &mut self.meta
    }

    /// Returns the body parsed as JSON, or `None` if it is not JSON.
    ///
    /// Parsed once and cached.
    pub fn json(&self) -> Option<&Value> {
        self.json
            .get_or_init(|| serde_json::from_slice(&self.body).ok())
            .as_ref()
    }

    /// Parses the decoded text as an HTML document.
    #[must_use]
    pub fn html(&self) -> scraper::Html {
        scraper::Html::parse_document(&self.text)
    }

    /// Resolves `link` against the final URL.
    #[must_use]
    pub fn join(&self, link: &str) -> Option<Url> {
        self.url.join(link).ok()
    }
}

/// Decodes a body: forced label, then the Content-Type charset, then an HTML
/// `<meta charset>` declaration, falling back to UTF-8. A BOM always wins.
fn decode_body(body: &[u8], headers: &HeaderMap, forced: Option<&str>) -> String {
    let encoding = forced
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .or_else(|| content_type_charset(headers))
        .or_else(|| sniff_meta_charset(body))
        .unwrap_or(UTF_8);
    let (text, _, _) = encoding.decode(body);
    text.into_owned()
}

fn content_type_charset(headers: &HeaderMap) -> Option<&'static Encoding> {
    let value = headers.get(CONTENT_TYPE)?.to_str().ok()?;
    value.split(';').skip(1).find_map(|param| {
        let (key, label) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("charset") {
            Encoding::for_label(label.trim().trim_matches('"').as_bytes())
        } else {
            None
        }
    })
}

fn sniff_meta_charset(body: &[u8]) -> Option<&'static Encoding> {
    let head = String::from_utf8_lossy(&body[..body.len().min(META_SNIFF_LEN)]);
    let captures = META_CHARSET.captures(&head)?;
    Encoding::for_label(captures.get(1)?.as_str().as_bytes())
}
