//! Fan-out resolver.

use crate::lookup::lookup;
use crate::{lookup_url, LookupOutcome, ResolveError, ResolveResult, ResolverState};
use delivery_client::HttpTransport;
use futures_util::stream::{FuturesUnordered, StreamExt};
use payload_normalizer::generate_id;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Agreed identifier and the domain it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossDomainId {
    pub cross_domain_id: String,
    pub from_domain: String,
}

/// Queries candidate domains for a known visitor identifier.
#[derive(Clone)]
pub struct CrossDomainResolver {
    transport: Arc<dyn HttpTransport>,
    api_key: String,
    servers: Option<Vec<String>>,
    lookup_timeout: Duration,
}

impl CrossDomainResolver {
    /// `servers` is the candidate list in priority order.
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        api_key: impl Into<String>,
        servers: Option<Vec<String>>,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            api_key: api_key.into(),
            servers,
            lookup_timeout,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.servers.as_ref().is_some_and(|s| !s.is_empty())
    }

    /// Candidates to query from `current_host`: configured order, current
    /// host and duplicates removed.
    pub fn candidates(&self, current_host: &str) -> Vec<String> {
        let mut candidates: Vec<String> = Vec::new();
        for server in self.servers.iter().flatten() {
            let server = server.trim();
            if server.is_empty()
                || server.eq_ignore_ascii_case(current_host)
                || candidates.iter().any(|c| c.eq_ignore_ascii_case(server))
            {
                continue;
            }
            candidates.push(server.to_string());
        }
        candidates
    }

    /// Resolve the visitor's cross-domain identifier.
    ///
    /// Waits for every lookup to settle, each bounded by the lookup timeout.
    pub async fn resolve(&self, current_host: &str) -> ResolveResult<CrossDomainId> {
        if !self.is_enabled() {
            return Err(ResolveError::NotEnabled);
        }

        let mut state = ResolverState::new(self.candidates(current_host), generate_id());
        if state.candidates().is_empty() {
            debug!(host = %current_host, "Only the current host is configured, issuing local id");
            return state.finish(current_host);
        }

        // A domain whose lookup URL cannot be built settles as a failure
        // without a request.
        let mut urls = Vec::with_capacity(state.candidates().len());
        let mut unbuildable = Vec::new();
        for (index, domain) in state.candidates().iter().enumerate() {
            match lookup_url(domain, &self.api_key) {
                Ok(url) => urls.push((index, url)),
                Err(err) => {
                    warn!(domain = %domain, error = %err, "Skipping cross-domain lookup");
                    unbuildable.push((index, LookupOutcome::Failed(err.to_string())));
                }
            }
        }
        for (index, outcome) in unbuildable {
            state.record(index, outcome);
        }

        let transport = self.transport.as_ref();
        let timeout = self.lookup_timeout;
        let mut pending: FuturesUnordered<_> = urls
            .iter()
            .map(|(index, url)| async move { (*index, lookup(transport, url, timeout).await) })
            .collect();

        while let Some((index, outcome)) = pending.next().await {
            state.record(index, outcome);
        }

        match state.finish(current_host) {
            Ok(resolved) => {
                info!(
                    from_domain = %resolved.from_domain,
                    "Resolved cross-domain id"
                );
                Ok(resolved)
            }
            Err(err) => {
                warn!(error = %err, "Cross-domain id resolution failed");
                Err(err)
            }
        }
    }
}
