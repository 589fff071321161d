//! The Plainflow integration.

use crate::calls::Call;
use crate::{
    AliasCall, GroupCall, IdentifyCall, Integration, PageCall, PlainflowResult, TrackCall,
};
use async_trait::async_trait;
use chrono::Utc;
use cross_domain_id::{CrossDomainId, CrossDomainResolver};
use delivery_client::{DeliveryClient, DeliveryResponse, HttpTransport, ReqwestTransport};
use envelope_retry_queue::{
    DrainSummary, ProcessedEvent, RetryPolicy, RetryQueue, DEFAULT_QUEUE_NAME,
};
use parking_lot::RwLock;
use payload_normalizer::{
    CallPath, Envelope, HostContext, Normalizer, NormalizerConfig, RuntimeEnvironment,
    StoredVisitor,
};
use plainflow_config::{Paths, PlainflowConfig};
use plainflow_storage::{storage_for_scheme, KeyValueStorage, StorageKeys};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Name reported for this integration in bundling metadata.
pub const INTEGRATION_NAME: &str = "Plainflow";

/// How [`Plainflow::enqueue`] handed off an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Sent immediately and acknowledged.
    Delivered(DeliveryResponse),
    /// Persisted in the retry queue at this sequence.
    Queued { sequence: u64 },
}

/// Tracking SDK instance.
pub struct Plainflow {
    config: PlainflowConfig,
    storage: Arc<dyn KeyValueStorage>,
    visitor: Arc<StoredVisitor>,
    normalizer: Normalizer,
    client: Arc<DeliveryClient>,
    queue: Option<RetryQueue>,
    resolver: CrossDomainResolver,
    environment: RwLock<RuntimeEnvironment>,
}

impl Plainflow {
    /// Build an instance over explicit collaborators.
    ///
    /// When `retryQueue` is enabled, entries persisted by an earlier instance
    /// over the same storage are recovered here. Call [`Plainflow::start`] to
    /// begin draining them.
    pub fn new(
        config: PlainflowConfig,
        storage: Arc<dyn KeyValueStorage>,
        transport: Arc<dyn HttpTransport>,
        environment: RuntimeEnvironment,
    ) -> PlainflowResult<Self> {
        config.validate()?;

        let visitor = Arc::new(StoredVisitor::new(storage.clone()));
        visitor.register_integration(INTEGRATION_NAME);

        let normalizer = Normalizer::new(
            NormalizerConfig {
                add_bundled_metadata: config.add_bundled_metadata,
                unbundled_integrations: config.unbundled_integrations.clone(),
                ..NormalizerConfig::new(config.api_key.clone())
            },
            visitor.clone(),
            storage.clone(),
        );

        let client = Arc::new(DeliveryClient::new(
            transport.clone(),
            config.collection_base_url()?,
        ));

        let queue = if config.retry_queue {
            let policy = RetryPolicy {
                min_delay: config.retry.min_retry_delay(),
                max_delay: config.retry.max_retry_delay(),
                max_attempts: config.retry.max_attempts,
            };
            Some(RetryQueue::open(
                DEFAULT_QUEUE_NAME,
                storage.clone(),
                client.clone(),
                policy,
            )?)
        } else {
            None
        };

        let resolver = CrossDomainResolver::new(
            transport,
            config.api_key.clone(),
            config.cross_domain_id_servers.clone(),
            config.lookup_timeout(),
        );

        info!(
            base_url = %client.base_url(),
            retry_queue = config.retry_queue,
            "Plainflow initialized"
        );

        Ok(Self {
            config,
            storage,
            visitor,
            normalizer,
            client,
            queue,
            resolver,
            environment: RwLock::new(environment),
        })
    }

    /// Build an instance from loaded configuration, with the storage backend
    /// chosen by the environment's scheme and a `reqwest` transport.
    pub fn from_config(
        config: PlainflowConfig,
        paths: &Paths,
        environment: RuntimeEnvironment,
    ) -> PlainflowResult<Self> {
        let scheme = environment.scheme().unwrap_or("file").to_string();
        let storage = storage_for_scheme(&scheme, &paths.storage_file())?;
        let transport = Arc::new(ReqwestTransport::new(config.request_timeout())?);
        Self::new(config, storage, transport, environment)
    }

    pub fn config(&self) -> &PlainflowConfig {
        &self.config
    }

    pub fn storage(&self) -> Arc<dyn KeyValueStorage> {
        self.storage.clone()
    }

    /// Visitor identity used for `anonymousId` and `userId`.
    pub fn visitor(&self) -> &StoredVisitor {
        &self.visitor
    }

    pub fn environment(&self) -> RuntimeEnvironment {
        self.environment.read().clone()
    }

    /// Replace the runtime environment used by later calls.
    pub fn set_environment(&self, environment: RuntimeEnvironment) {
        *self.environment.write() = environment;
    }

    /// Start draining the retry queue. Requires a tokio runtime.
    pub fn start(&self) {
        if let Some(queue) = &self.queue {
            queue.start();
        }
    }

    /// Stop draining. Queued entries stay persisted.
    pub async fn stop(&self) {
        if let Some(queue) = &self.queue {
            queue.stop().await;
        }
    }

    /// `processed` notifications, if queueing is enabled.
    pub fn subscribe(&self) -> Option<broadcast::Receiver<ProcessedEvent>> {
        self.queue.as_ref().map(RetryQueue::subscribe)
    }

    pub fn pending_count(&self) -> PlainflowResult<usize> {
        match &self.queue {
            Some(queue) => Ok(queue.pending_count()?),
            None => Ok(0),
        }
    }

    /// Drain the retry queue inline. See [`RetryQueue::drain`].
    pub async fn drain(&self, timeout: Duration) -> PlainflowResult<DrainSummary> {
        match &self.queue {
            Some(queue) => Ok(queue.drain(timeout).await?),
            None => Ok(DrainSummary::default()),
        }
    }

    /// Normalize `envelope` against the current environment.
    pub fn normalize(&self, envelope: Envelope) -> Envelope {
        let environment = self.environment.read().clone();
        self.normalizer.normalize(envelope, &environment)
    }

    /// Normalize and dispatch one envelope.
    ///
    /// With queueing enabled the envelope is persisted and this returns at
    /// once. Otherwise it is sent immediately and a failed send is returned
    /// as an error.
    pub async fn enqueue(&self, path: CallPath, envelope: Envelope) -> PlainflowResult<Dispatch> {
        let envelope = self.normalize(envelope);

        match &self.queue {
            Some(queue) => {
                let sequence = queue.enqueue(path, envelope).await?;
                Ok(Dispatch::Queued { sequence })
            }
            None => {
                let response = self.client.send(path, &envelope).await?;
                debug!(path = %path, status = response.status, "Delivered without queueing");
                Ok(Dispatch::Delivered(response))
            }
        }
    }

    async fn dispatch<C: Call>(&self, call: C) -> PlainflowResult<Dispatch> {
        let envelope = call.into_envelope(self.visitor.as_ref());
        self.enqueue(C::PATH, envelope).await
    }

    /// Agree on a cross-domain id with the configured domains.
    ///
    /// On success the id is persisted and sent through `identify` as the
    /// `crossDomainId` trait.
    pub async fn retrieve_cross_domain_id(&self) -> PlainflowResult<CrossDomainId> {
        let hostname = self.environment.read().hostname.clone();
        let resolved = self.resolver.resolve(&hostname).await?;

        self.persist_cross_domain_id(&resolved)?;

        let identify = IdentifyCall::new().trait_value("crossDomainId", resolved.cross_domain_id.clone());
        if let Err(err) = self.identify(identify).await {
            warn!(error = %err, "Failed to send cross-domain identify");
        }

        Ok(resolved)
    }

    /// Previously resolved cross-domain id, if any.
    pub fn cross_domain_id(&self) -> PlainflowResult<Option<CrossDomainId>> {
        let id = self.storage.get(StorageKeys::CROSS_DOMAIN_ID)?;
        let domain = self.storage.get(StorageKeys::CROSS_DOMAIN_ID_DOMAIN)?;
        Ok(id.zip(domain).map(|(cross_domain_id, from_domain)| CrossDomainId {
            cross_domain_id,
            from_domain,
        }))
    }

    fn persist_cross_domain_id(&self, resolved: &CrossDomainId) -> PlainflowResult<()> {
        self.storage
            .set(StorageKeys::CROSS_DOMAIN_ID, &resolved.cross_domain_id)?;
        self.storage
            .set(StorageKeys::CROSS_DOMAIN_ID_DOMAIN, &resolved.from_domain)?;
        self.storage.set(
            StorageKeys::CROSS_DOMAIN_ID_TIMESTAMP,
            &Utc::now().timestamp_millis().to_string(),
        )?;
        Ok(())
    }

    /// Clear persisted referrer, AMP, and cross-domain state.
    pub fn reset(&self) -> PlainflowResult<()> {
        for key in [
            StorageKeys::REFERRER,
            StorageKeys::AMP_ID,
            StorageKeys::CROSS_DOMAIN_ID,
            StorageKeys::CROSS_DOMAIN_ID_DOMAIN,
            StorageKeys::CROSS_DOMAIN_ID_TIMESTAMP,
        ] {
            self.storage.remove(key)?;
        }
        Ok(())
    }
}

#[async_trait]
impl Integration for Plainflow {
    fn name(&self) -> &str {
        INTEGRATION_NAME
    }

    async fn page(&self, call: PageCall) -> PlainflowResult<Dispatch> {
        self.dispatch(call).await
    }

    async fn identify(&self, call: IdentifyCall) -> PlainflowResult<Dispatch> {
        self.dispatch(call).await
    }

    async fn track(&self, call: TrackCall) -> PlainflowResult<Dispatch> {
        self.dispatch(call).await
    }

    async fn group(&self, call: GroupCall) -> PlainflowResult<Dispatch> {
        self.dispatch(call).await
    }

    async fn alias(&self, call: AliasCall) -> PlainflowResult<Dispatch> {
        self.dispatch(call).await
    }
}

impl HostContext for Plainflow {
    fn anonymous_id(&self) -> String {
        self.visitor.anonymous_id()
    }

    fn user_id(&self) -> Option<String> {
        self.visitor.user_id()
    }

    fn active_integrations(&self) -> Vec<String> {
        self.visitor.active_integrations()
    }
}
