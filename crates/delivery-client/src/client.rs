//! Collection endpoint client.

use crate::{DeliveryResult, HttpTransport};
use payload_normalizer::{CallPath, Envelope};
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// Successful delivery result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryResponse {
    pub status: u16,
    /// Raw response body.
    pub body: String,
}

/// Sends one envelope per call to `<base><path>`.
#[derive(Clone)]
pub struct DeliveryClient {
    transport: Arc<dyn HttpTransport>,
    base_url: Url,
}

impl DeliveryClient {
    /// `base_url` is the collection root, e.g. `https://pipe.plainflow.net/v1`.
    pub fn new(transport: Arc<dyn HttpTransport>, base_url: Url) -> Self {
        Self {
            transport,
            base_url,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn transport(&self) -> Arc<dyn HttpTransport> {
        self.transport.clone()
    }

    /// Full endpoint URL for `path`.
    pub fn endpoint_url(&self, path: CallPath) -> DeliveryResult<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}{path}"))?)
    }

    /// Send `envelope` once.
    ///
    /// A non-2xx status is returned as [`crate::DeliveryError::Status`]
    /// carrying the status's reason phrase.
    pub async fn send(&self, path: CallPath, envelope: &Envelope) -> DeliveryResult<DeliveryResponse> {
        let url = self.endpoint_url(path)?;
        let body = envelope.to_value()?;

        debug!(
            url = %url,
            message_id = envelope.message_id.as_deref().unwrap_or_default(),
            "Sending envelope"
        );

        let response = self
            .transport
            .post_json(&url, &body)
            .await
            .and_then(|response| response.error_for_status());

        match response {
            Ok(response) => Ok(DeliveryResponse {
                status: response.status,
                body: response.body,
            }),
            Err(err) => {
                warn!(url = %url, error = %err, "Delivery failed");
                Err(err)
            }
        }
    }
}
