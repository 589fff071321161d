//! Envelope normalization.

use crate::{
    generate_id, Amp, Context, Envelope, HostContext, Library, Metadata, Referrer,
    RuntimeEnvironment,
};
use chrono::Utc;
use plainflow_storage::{read_json, write_json, KeyValueStorage, StorageKeys};
use std::sync::Arc;
use tracing::{debug, warn};

/// Library name reported in `context.library`.
pub const LIBRARY_NAME: &str = "pfanalytics.js";

/// Library version reported in `context.library`.
pub const LIBRARY_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Settings that shape every envelope.
#[derive(Debug, Clone)]
pub struct NormalizerConfig {
    /// Written to `writeKey`.
    pub api_key: String,
    pub add_bundled_metadata: bool,
    pub unbundled_integrations: Vec<String>,
    /// Default `context.library`.
    pub library: Library,
}

impl NormalizerConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            add_bundled_metadata: false,
            unbundled_integrations: Vec::new(),
            library: Library {
                name: LIBRARY_NAME.to_string(),
                version: LIBRARY_VERSION.to_string(),
            },
        }
    }
}

/// Builds the canonical envelope for outbound calls.
pub struct Normalizer {
    config: NormalizerConfig,
    host: Arc<dyn HostContext>,
    storage: Arc<dyn KeyValueStorage>,
}

impl Normalizer {
    pub fn new(
        config: NormalizerConfig,
        host: Arc<dyn HostContext>,
        storage: Arc<dyn KeyValueStorage>,
    ) -> Self {
        Self {
            config,
            host,
            storage,
        }
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    /// Augment `envelope` in place and return it.
    ///
    /// Fields the caller already set are left alone, except `messageId`,
    /// which is regenerated on every call.
    pub fn normalize(&self, mut envelope: Envelope, env: &RuntimeEnvironment) -> Envelope {
        if envelope.anonymous_id.is_none() {
            envelope.anonymous_id = Some(self.host.anonymous_id());
        }
        if envelope.sent_at.is_none() {
            envelope.sent_at = Some(Utc::now());
        }
        if envelope.user_id.is_none() {
            envelope.user_id = self.host.user_id();
        }
        if envelope.context.is_none() {
            if let Some(options) = envelope.options.take() {
                envelope.context = Some(Context::from_map(options));
            }
        }

        let context = envelope.context.get_or_insert_with(Context::default);

        if context.library.is_none() {
            context.library = Some(self.config.library.clone());
        }
        if context.user_agent.is_none() {
            context.user_agent = env.user_agent.clone();
        }
        if context.page.is_none() {
            context.page = env.page();
        }
        if let Some(derived) = env.campaign() {
            match context.campaign.as_mut() {
                Some(campaign) => campaign.fill_from(derived),
                None => context.campaign = Some(derived),
            }
        }
        if let Some(referrer) = self.resolve_referrer(env) {
            if context.referrer.is_none() {
                context.referrer = Some(referrer);
            }
        }
        if context.amp.is_none() {
            context.amp = self.amp_id().map(|id| Amp { id });
        }

        if envelope.write_key.is_none() {
            envelope.write_key = Some(self.config.api_key.clone());
        }
        envelope.message_id = Some(generate_id());

        if self.config.add_bundled_metadata {
            let mut bundled = self.host.active_integrations();
            bundled.sort();
            envelope.metadata = Some(Metadata {
                bundled,
                unbundled: self.config.unbundled_integrations.clone(),
            });
        }

        debug!(
            message_id = envelope.message_id.as_deref().unwrap_or_default(),
            "envelope normalized"
        );
        envelope
    }

    /// Referrer from the URL (persisted for later calls) or from storage.
    fn resolve_referrer(&self, env: &RuntimeEnvironment) -> Option<Referrer> {
        if let Some(referrer) = env.referrer() {
            if let Err(err) = write_json(self.storage.as_ref(), StorageKeys::REFERRER, &referrer) {
                warn!(error = %err, "failed to persist referrer");
            }
            return Some(referrer);
        }

        match read_json::<Referrer>(self.storage.as_ref(), StorageKeys::REFERRER) {
            Ok(referrer) => referrer,
            Err(err) => {
                warn!(error = %err, "ignoring unreadable stored referrer");
                None
            }
        }
    }

    fn amp_id(&self) -> Option<String> {
        match self.storage.get(StorageKeys::AMP_ID) {
            Ok(id) => id.filter(|id| !id.is_empty()),
            Err(err) => {
                warn!(error = %err, "failed to read AMP id");
                None
            }
        }
    }
}
