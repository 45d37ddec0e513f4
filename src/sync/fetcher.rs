//! HTTP fetcher implementation
//!
//! This module handles supplier page requests, including:
//! - Building the HTTP client (TLS verification, compression, bounded redirects)
//! - Refusing loopback, private and reserved targets on every hop
//! - Per-request timeout and user agent
//! - Error classification

use crate::url::{is_blocked_host, is_blocked_ip, source_host};
use async_trait::async_trait;
use hyper::client::connect::dns::Name;
use reqwest::dns::{Addrs, Resolve, Resolving};
use reqwest::{redirect::Policy, Client};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Maximum redirect hops followed for one request
pub const MAX_REDIRECTS: usize = 5;

/// Why a request failed before producing a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    Timeout,
    Connect,
    Redirect,
    Blocked,
    Other,
}

impl fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Connect => write!(f, "connection failed"),
            Self::Redirect => write!(f, "too many redirects"),
            Self::Blocked => write!(f, "blocked target"),
            Self::Other => write!(f, "request failed"),
        }
    }
}

/// Result of a fetch operation
#[derive(Debug, Clone, PartialEq)]
pub enum FetchResult {
    /// Successfully fetched the page
    Success {
        /// Final URL after redirects
        final_url: String,
        /// HTTP status code
        status_code: u16,
        /// Page body content
        body: String,
    },

    /// Server answered with a non-2xx status
    HttpError {
        /// The HTTP status code
        status_code: u16,
    },

    /// 2xx response without content
    EmptyBody,

    /// Network error (connection refused, timeout, etc.)
    NetworkError {
        /// Error description
        error: String,
        kind: NetworkErrorKind,
    },
}

impl FetchResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Message recorded against the product when the fetch failed
    pub fn failure_message(&self) -> Option<String> {
        match self {
            Self::Success { .. } => None,
            Self::HttpError { status_code } => Some(format!(
                "Failed to fetch content from URL (HTTP {})",
                status_code
            )),
            Self::EmptyBody => Some("Failed to fetch content from URL (empty response)".to_string()),
            Self::NetworkError { error, kind } => Some(format!(
                "Failed to fetch content from URL ({}: {})",
                kind, error
            )),
        }
    }
}

/// Retrieves supplier pages
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url, timeout: Duration, user_agent: &str) -> FetchResult;
}

/// A request target refused by the redirect policy or the resolver
#[derive(Debug)]
struct BlockedTarget(String);

impl fmt::Display for BlockedTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "refusing to connect to {}", self.0)
    }
}

impl std::error::Error for BlockedTarget {}

/// Follows up to [`MAX_REDIRECTS`] hops, refusing hops to blocked hosts
///
/// Only hop targets that are loopback names or IP literals are judged here;
/// names are checked by [`GuardedResolver`] when the connection is made. A hop
/// back to the first request's own host and port is followed, since the
/// caller vetted that origin.
fn redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() > MAX_REDIRECTS {
            return attempt.error("too many redirects");
        }

        let next = (source_host(attempt.url()), attempt.url().port_or_known_default());
        let origin = attempt
            .previous()
            .first()
            .map(|u| (source_host(u), u.port_or_known_default()));

        match next.0.clone() {
            Some(host) if is_blocked_host(&host) && origin.as_ref() != Some(&next) => {
                tracing::warn!("Refusing redirect to {}", attempt.url());
                attempt.error(BlockedTarget(host))
            }
            _ => attempt.follow(),
        }
    })
}

/// DNS resolver that drops loopback, private and reserved addresses
///
/// Applied to every connection the client makes, so a name that resolves
/// differently at fetch time than when the URL was checked still cannot
/// reach an internal address.
#[derive(Debug, Default, Clone, Copy)]
pub struct GuardedResolver;

impl Resolve for GuardedResolver {
    fn resolve(&self, name: Name) -> Resolving {
        Box::pin(resolve_public(name.as_str().to_string()))
    }
}

async fn resolve_public(host: String) -> Result<Addrs, Box<dyn std::error::Error + Send + Sync>> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), 0))
        .await?
        .filter(|addr| !is_blocked_ip(&addr.ip()))
        .collect();

    if addrs.is_empty() {
        return Err(Box::new(BlockedTarget(host)));
    }
    Ok(Box::new(addrs.into_iter()))
}

/// Builds an HTTP client with proper configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .redirect(redirect_policy())
        .dns_resolver(Arc::new(GuardedResolver))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches a URL with error classification
///
/// # Arguments
///
/// * `client` - The HTTP client to use
/// * `url` - The URL to fetch
/// * `timeout` - Whole-request timeout
/// * `user_agent` - User agent header for this request
///
/// # Returns
///
/// A FetchResult indicating success or the type of failure
pub async fn fetch_url(client: &Client, url: &str, timeout: Duration, user_agent: &str) -> FetchResult {
    let response = client
        .get(url)
        .timeout(timeout)
        .header(reqwest::header::USER_AGENT, user_agent)
        .header(
            reqwest::header::ACCEPT,
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        )
        .send()
        .await;

    match response {
        Ok(response) => {
            let status = response.status();
            let final_url = response.url().to_string();

            if !status.is_success() {
                return FetchResult::HttpError {
                    status_code: status.as_u16(),
                };
            }

            match response.text().await {
                Ok(body) if body.trim().is_empty() => FetchResult::EmptyBody,
                Ok(body) => FetchResult::Success {
                    final_url,
                    status_code: status.as_u16(),
                    body,
                },
                Err(e) => classify_error(&e),
            }
        }
        Err(e) => classify_error(&e),
    }
}

fn is_blocked_target(e: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(e);
    while let Some(err) = source {
        if err.is::<BlockedTarget>() {
            return true;
        }
        source = err.source();
    }
    false
}

fn classify_error(e: &reqwest::Error) -> FetchResult {
    let kind = if is_blocked_target(e) {
        NetworkErrorKind::Blocked
    } else if e.is_timeout() {
        NetworkErrorKind::Timeout
    } else if e.is_connect() {
        NetworkErrorKind::Connect
    } else if e.is_redirect() {
        NetworkErrorKind::Redirect
    } else {
        NetworkErrorKind::Other
    };

    FetchResult::NetworkError {
        error: e.to_string(),
        kind,
    }
}

/// reqwest-backed [`Fetcher`]
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client()?,
        })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, timeout: Duration, user_agent: &str) -> FetchResult {
        let result = fetch_url(&self.client, url.as_str(), timeout, user_agent).await;
        if let Some(message) = result.failure_message() {
            tracing::debug!("Fetch of {} failed: {}", url, message);
        }
        result
    }
}
