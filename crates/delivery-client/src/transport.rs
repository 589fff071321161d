//! HTTP transport seam.

use crate::{DeliveryError, DeliveryResult};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Raw result of one HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// Textual reason for `status`, e.g. `Not Found`.
    pub status_text: String,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            status_text: reason_phrase(status),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parse the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> DeliveryResult<T> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Turn a non-2xx response into [`DeliveryError::Status`].
    pub fn error_for_status(self) -> DeliveryResult<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(DeliveryError::Status {
                status: self.status,
                reason: self.status_text,
            })
        }
    }
}

/// Canonical reason phrase for a status code, or the code itself.
pub fn reason_phrase(status: u16) -> String {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .map(str::to_string)
        .unwrap_or_else(|| status.to_string())
}

/// One request, one response. Implementations must not retry.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// POST `body` as JSON.
    async fn post_json(&self, url: &Url, body: &Value) -> DeliveryResult<HttpResponse>;

    async fn get(&self, url: &Url) -> DeliveryResult<HttpResponse>;
}

/// [`HttpTransport`] over `reqwest`.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Create a transport whose requests are bounded by `timeout`.
    pub fn new(timeout: Duration) -> DeliveryResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    async fn read(response: reqwest::Response) -> DeliveryResult<HttpResponse> {
        let status = response.status();
        let body = response.text().await?;
        Ok(HttpResponse {
            status: status.as_u16(),
            status_text: status
                .canonical_reason()
                .map(str::to_string)
                .unwrap_or_else(|| status.as_u16().to_string()),
            body,
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post_json(&self, url: &Url, body: &Value) -> DeliveryResult<HttpResponse> {
        debug!(url = %url, "POST");
        let response = self
            .client
            .post(url.clone())
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;
        Self::read(response).await
    }

    async fn get(&self, url: &Url) -> DeliveryResult<HttpResponse> {
        debug!(url = %url, "GET");
        let response = self.client.get(url.clone()).send().await?;
        Self::read(response).await
    }
}
