//! Page fetching for the catalog crawl
//!
//! The crawl talks to the origin through [`PageFetcher`]. [`HttpFetcher`]
//! is the reqwest implementation; [`RateLimitedFetcher`] paces any fetcher.

use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Client as ReqwestClient, Method};
use tracing::{Instrument, debug, debug_span, instrument};

use crate::catalog::config::CrawlConfig;
use crate::catalog::error::FetchError;

/// An outbound request: target, method and form fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub url: String,
    pub method: Method,
    pub form: Vec<(String, String)>,
}

impl PageRequest {
    /// A plain GET request
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::GET,
            form: Vec::new(),
        }
    }

    /// A form-encoded POST request
    pub fn post_form(url: impl Into<String>, form: Vec<(String, String)>) -> Self {
        Self {
            url: url.into(),
            method: Method::POST,
            form,
        }
    }

    /// Value of a form field
    pub fn form_value(&self, key: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }
}

/// Status and body of a completed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
}

impl FetchResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Whether the status is in the 2xx class
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport used by the crawl
///
/// Non-2xx statuses are returned as responses, not errors; only failures to
/// complete the exchange are errors.
pub trait PageFetcher: Send + Sync {
    fn fetch(
        &self,
        request: &PageRequest,
    ) -> impl Future<Output = Result<FetchResponse, FetchError>> + Send;
}

/// reqwest-backed fetcher
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: ReqwestClient,
}

impl HttpFetcher {
    /// Create a fetcher with the timeout and user agent of `config`
    pub fn new(config: &CrawlConfig) -> Result<Self, FetchError> {
        let client = ReqwestClient::builder()
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }
}

impl PageFetcher for HttpFetcher {
    #[instrument(level = "debug", skip_all, fields(url = %request.url, method = %request.method))]
    async fn fetch(&self, request: &PageRequest) -> Result<FetchResponse, FetchError> {
        let mut builder = self.client.request(request.method.clone(), &request.url);
        if !request.form.is_empty() {
            builder = builder.form(&request.form);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(status, bytes = body.len(), "Fetched");

        Ok(FetchResponse { status, body })
    }
}

/// Fetcher wrapper that waits for a rate limiter before every request
#[derive(Clone)]
pub struct RateLimitedFetcher<F> {
    inner: F,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl<F: PageFetcher> RateLimitedFetcher<F> {
    pub fn new(inner: F, limiter: DefaultDirectRateLimiter) -> Self {
        Self {
            inner,
            limiter: Arc::new(limiter),
        }
    }

    /// Allow at most `requests` per minute
    pub fn per_minute(inner: F, requests: NonZeroU32) -> Self {
        Self::new(inner, RateLimiter::direct(Quota::per_minute(requests)))
    }
}

impl<F: PageFetcher> PageFetcher for RateLimitedFetcher<F> {
    async fn fetch(&self, request: &PageRequest) -> Result<FetchResponse, FetchError> {
        self.limiter.until_ready().instrument(debug_span!("limiter")).await;
        self.inner.fetch(request).await
    }
}
