//! The [`Downloader`] capability and its reqwest-backed default.
//!
//! The runtime only ever talks to `dyn Downloader`; [`HttpDownloader`] is the
//! implementation used when the embedder does not supply one.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::cookie::Jar;
use reqwest::header::COOKIE;
use reqwest::{Client, ClientBuilder, Proxy};
use tracing::{debug, instrument};

use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use super::error::DownloadError;
use super::request::Request;
use super::response::Response;
use crate::user_agent;

/// Executes one request and returns the response or a typed error.
///
/// Implementations must attach the originating request to every error and
/// copy request meta into the response ([`Response::new`] does the latter).
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Fetches `request`.
    async fn fetch(&self, request: &Request) -> Result<Response, DownloadError>;
}

/// HTTP downloader with connection pooling.
///
/// Requests without a proxy share one client; each distinct proxy URL gets
/// its own cached client since reqwest binds proxies at build time.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: Client,
    proxied: Arc<DashMap<String, Client>>,
    cookie_jar: Option<Arc<Jar>>,
    connect_timeout_secs: u64,
    read_timeout_secs: u64,
}

impl HttpDownloader {
    /// Creates a downloader with default timeouts.
    ///
    /// Default configuration:
    /// - Connect timeout: 30 seconds
    /// - Read timeout: 60 seconds
    /// - Gzip decompression: enabled
    ///
    /// # Errors
    ///
    /// Returns the reqwest error if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a downloader with explicit timeout values.
    ///
    /// # Errors
    ///
    /// Returns the reqwest error if the client cannot be built.
    pub fn with_timeouts(
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Result<Self, reqwest::Error> {
        Self::build(None, connect_timeout_secs, read_timeout_secs)
    }

    /// Creates a downloader that stores and replays cookies through `jar`.
    ///
    /// # Errors
    ///
    /// Returns the reqwest error if the client cannot be built.
    #[instrument(level = "debug", skip(cookie_jar))]
    pub fn with_cookie_jar(cookie_jar: Arc<Jar>) -> Result<Self, reqwest::Error> {
        Self::build(Some(cookie_jar), CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    fn build(
        cookie_jar: Option<Arc<Jar>>,
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Result<Self, reqwest::Error> {
        let client =
            base_client_builder(cookie_jar.clone(), connect_timeout_secs, read_timeout_secs)
                .build()?;
        Ok(Self {
            client,
            proxied: Arc::new(DashMap::new()),
            cookie_jar,
            connect_timeout_secs,
            read_timeout_secs,
        })
    }

    /// Returns the client to use for `request`, building a proxied one on first use.
    fn client_for(&self, request: &Request) -> Result<Client, DownloadError> {
        let Some(proxy) = request.proxy() else {
            return Ok(self.client.clone());
        };
        if let Some(client) = self.proxied.get(proxy) {
            return Ok(client.clone());
        }

        let client = Proxy::all(proxy)
            .and_then(|resolved| {
                base_client_builder(
                    self.cookie_jar.clone(),
                    self.connect_timeout_secs,
                    self.read_timeout_secs,
                )
                .proxy(resolved)
                .build()
            })
            .map_err(|source| DownloadError::invalid_proxy(request.clone(), proxy, source))?;
        debug!(proxy, "built proxied client");
        Ok(self
            .proxied
            .entry(proxy.to_string())
            .or_insert(client)
            .clone())
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    #[instrument(skip(self, request), fields(method = %request.method(), url = %request.raw_url()))]
    async fn fetch(&self, request: &Request) -> Result<Response, DownloadError> {
        let Some(url) = request.url() else {
            return Err(DownloadError::invalid_url(request.clone()));
        };
        let client = self.client_for(request)?;

        let mut builder = client
            .request(request.method().clone(), url.clone())
            .headers(request.headers().clone());
        if !request.cookies().is_empty() {
            builder = builder.header(COOKIE, cookie_header(request.cookies()));
        }
        if !request.body().is_empty() {
            builder = builder.body(request.body().to_vec());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| DownloadError::from_reqwest(request.clone(), e))?;
        let status = response.status();
        let final_url = response.url().clone();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| DownloadError::from_reqwest(request.clone(), e))?;

        debug!(status = status.as_u16(), bytes = body.len(), "fetched");
        Ok(Response::new(request.clone(), status, headers, body.to_vec())?.with_final_url(final_url))
    }
}

fn base_client_builder(
    cookie_jar: Option<Arc<Jar>>,
    connect_timeout_secs: u64,
    read_timeout_secs: u64,
) -> ClientBuilder {
    let mut builder = Client::builder()
        .connect_timeout(Duration::from_secs(connect_timeout_secs))
        .timeout(Duration::from_secs(read_timeout_secs))
        .gzip(true)
        .user_agent(user_agent::default_user_agent());
    if let Some(jar) = cookie_jar {
        builder = builder.cookie_provider(jar);
    }
    builder
}

fn cookie_header(cookies: &[(String, String)]) -> String {
    cookies
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("; ")
}
