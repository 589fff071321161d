//! Storage key constants.

/// Keys persisted by the SDK.
pub struct StorageKeys;

impl StorageKeys {
    /// Visitor referrer record, `{"id": .., "type": ..}` as JSON
    pub const REFERRER: &'static str = "pf:context.referrer";

    /// AMP identifier (plain string)
    pub const AMP_ID: &'static str = "plainflow_amp_id";

    /// Resolved cross-domain identifier
    pub const CROSS_DOMAIN_ID: &'static str = "pfl_xid";

    /// Domain the cross-domain identifier came from
    pub const CROSS_DOMAIN_ID_DOMAIN: &'static str = "pfl_xid_fd";

    /// Unix time in milliseconds when the cross-domain identifier was resolved
    pub const CROSS_DOMAIN_ID_TIMESTAMP: &'static str = "pfl_xid_ts";

    /// Visitor anonymous identifier
    pub const ANONYMOUS_ID: &'static str = "pf_anonymous_id";

    /// Known user identifier
    pub const USER_ID: &'static str = "pf_user_id";

    /// Prefix for durable retry queues; the queue name is appended.
    pub const QUEUE_PREFIX: &'static str = "pf.queue.";

    /// Storage key for the retry queue called `name`.
    pub fn queue(name: &str) -> String {
        format!("{}{}", Self::QUEUE_PREFIX, name)
    }
}
