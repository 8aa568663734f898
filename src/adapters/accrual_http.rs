//! HTTP client for the external accrual calculation service.
//!
//! The wire contract is `GET {base_url}/api/orders/{order_number}`:
//! 200 with a JSON status body, 204/404 when the order is unknown,
//! 409 when it was finalized elsewhere, 429 with `Retry-After` seconds.

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::warn;
use url::Url;

use crate::error::Result;

/// Raw outcome of one GET against the accrual service.
///
/// Decoding the body is left to the caller so that malformed payloads
/// abort the owning job rather than the transport layer.
#[derive(Debug, Clone)]
pub struct AccrualReply {
    pub status: StatusCode,
    /// Parsed `Retry-After` header (seconds), present on 429 responses
    pub retry_after: Option<u64>,
    pub body: Vec<u8>,
}

impl AccrualReply {
    pub fn new(status: StatusCode, retry_after: Option<u64>, body: Vec<u8>) -> Self {
        Self {
            status,
            retry_after,
            body,
        }
    }
}

/// Access to the external accrual calculation service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccrualClient: Send + Sync {
    /// Fetch the current calculation status of one order
    async fn fetch_order(&self, order_number: &str) -> Result<AccrualReply>;
}

/// reqwest-backed accrual service client
#[derive(Clone)]
pub struct HttpAccrualClient {
    http: Client,
    base_url: String,
}

impl HttpAccrualClient {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
        // Validate early so a bad URL fails at startup, not per request
        Url::parse(base_url)?;
        let base_url = base_url.trim_end_matches('/').to_string();

        let http = Client::builder()
            .user_agent("accruald/0.1")
            .timeout(request_timeout)
            .build()?;

        Ok(Self { http, base_url })
    }

    fn order_url(&self, order_number: &str) -> String {
        format!("{}/api/orders/{}", self.base_url, order_number)
    }
}

#[async_trait]
impl AccrualClient for HttpAccrualClient {
    async fn fetch_order(&self, order_number: &str) -> Result<AccrualReply> {
        let response = self.http.get(self.order_url(order_number)).send().await?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());

        if status == StatusCode::TOO_MANY_REQUESTS && retry_after.is_none() {
            warn!(order = order_number, "429 response without a usable Retry-After header");
        }

        let body = response.bytes().await?.to_vec();

        Ok(AccrualReply::new(status, retry_after, body))
    }
}
