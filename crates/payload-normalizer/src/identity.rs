//! Visitor identity and host state consumed by normalization.

use crate::generate_id;
use parking_lot::RwLock;
use plainflow_storage::{KeyValueStorage, StorageKeys};
use std::sync::Arc;
use tracing::warn;

/// Host-owned state the normalizer reads on every call.
pub trait HostContext: Send + Sync {
    /// Stable anonymous identifier for the current visitor.
    fn anonymous_id(&self) -> String;

    /// Known user identifier, if the visitor has been identified.
    fn user_id(&self) -> Option<String>;

    /// Names of the currently active integrations.
    fn active_integrations(&self) -> Vec<String>;
}

/// Storage-backed visitor identity.
///
/// The anonymous id is generated on first use and persisted, so it stays
/// stable across restarts for as long as the storage does.
pub struct StoredVisitor {
    storage: Arc<dyn KeyValueStorage>,
    integrations: RwLock<Vec<String>>,
}

impl StoredVisitor {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self {
            storage,
            integrations: RwLock::new(Vec::new()),
        }
    }

    pub fn set_anonymous_id(&self, anonymous_id: &str) {
        if let Err(err) = self.storage.set(StorageKeys::ANONYMOUS_ID, anonymous_id) {
            warn!(error = %err, "failed to persist anonymous id");
        }
    }

    /// Set or clear the known user id.
    pub fn set_user_id(&self, user_id: Option<&str>) {
        let result = match user_id {
            Some(id) => self.storage.set(StorageKeys::USER_ID, id),
            None => self.storage.remove(StorageKeys::USER_ID).map(|_| ()),
        };
        if let Err(err) = result {
            warn!(error = %err, "failed to persist user id");
        }
    }

    /// Record an active integration name. Duplicates are ignored.
    pub fn register_integration(&self, name: impl Into<String>) {
        let name = name.into();
        let mut integrations = self.integrations.write();
        if !integrations.contains(&name) {
            integrations.push(name);
        }
    }
}

impl HostContext for StoredVisitor {
    fn anonymous_id(&self) -> String {
        match self.storage.get(StorageKeys::ANONYMOUS_ID) {
            Ok(Some(id)) if !id.is_empty() => id,
            Ok(_) => {
                let id = generate_id();
                self.set_anonymous_id(&id);
                id
            }
            Err(err) => {
                warn!(error = %err, "failed to read anonymous id, using a transient one");
                generate_id()
            }
        }
    }

    fn user_id(&self) -> Option<String> {
        match self.storage.get(StorageKeys::USER_ID) {
            Ok(id) => id.filter(|id| !id.is_empty()),
            Err(err) => {
                warn!(error = %err, "failed to read user id");
                None
            }
        }
    }

    fn active_integrations(&self) -> Vec<String> {
        self.integrations.read().clone()
    }
}
