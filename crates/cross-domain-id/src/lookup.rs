//! Single-domain identifier lookup.

use crate::{ResolveError, ResolveResult};
use delivery_client::{DeliveryError, HttpTransport};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// What one domain said about the visitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    Found(String),
    /// The domain answered but does not know the visitor.
    Empty,
    /// Transport failure, non-2xx status, bad body, or timeout.
    Failed(String),
}

#[derive(Debug, Deserialize)]
struct LookupBody {
    #[serde(default)]
    id: Option<String>,
}

/// `https://<domain>/v1/id/<apiKey>`
pub fn lookup_url(domain: &str, api_key: &str) -> ResolveResult<Url> {
    Url::parse(&format!("https://{domain}/v1/id/{api_key}")).map_err(|err| {
        ResolveError::InvalidDomain {
            domain: domain.to_string(),
            reason: err.to_string(),
        }
    })
}

pub(crate) async fn lookup(
    transport: &dyn HttpTransport,
    url: &Url,
    timeout: Duration,
) -> LookupOutcome {
    let response = match tokio::time::timeout(timeout, transport.get(url)).await {
        Ok(result) => result.and_then(|response| response.error_for_status()),
        Err(_) => Err(DeliveryError::Timeout),
    };

    let outcome = match response {
        Ok(response) => match response.json::<LookupBody>() {
            Ok(LookupBody { id: Some(id) }) if !id.is_empty() => LookupOutcome::Found(id),
            Ok(_) => LookupOutcome::Empty,
            Err(err) => LookupOutcome::Failed(err.to_string()),
        },
        Err(err) => LookupOutcome::Failed(err.to_string()),
    };

    match &outcome {
        LookupOutcome::Failed(reason) => warn!(url = %url, reason = %reason, "Identity lookup failed"),
        other => debug!(url = %url, outcome = ?other, "Identity lookup settled"),
    }
    outcome
}
