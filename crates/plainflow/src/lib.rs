//! Plainflow tracking SDK core.
//!
//! [`Plainflow`] ties the pieces together: host hooks build call bodies, the
//! normalizer turns them into envelopes, and envelopes are either sent at
//! once or handed to the persistent retry queue. Cross-domain identity
//! resolution runs on demand and feeds its result back through `identify`.

mod calls;
mod error;
mod integration;
mod sdk;

pub use calls::{AliasCall, Call, GroupCall, IdentifyCall, PageCall, TrackCall};
pub use error::{PlainflowError, PlainflowResult};
pub use integration::Integration;
pub use sdk::{Dispatch, Plainflow, INTEGRATION_NAME};

pub use cross_domain_id::CrossDomainId;
pub use delivery_client::{DeliveryResponse, HttpTransport};
pub use envelope_retry_queue::{DrainSummary, ProcessedEvent};
pub use payload_normalizer::{CallPath, Envelope, RuntimeEnvironment};
pub use plainflow_config::{Paths, PlainflowConfig};
pub use plainflow_storage::KeyValueStorage;
