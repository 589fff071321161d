//! Payload normalization for Plainflow calls.
//!
//! [`Normalizer::normalize`] turns a call body into the [`Envelope`] that is
//! delivered to the collection endpoint: identity fields, context, write key,
//! a fresh `messageId`, and optional bundling metadata.

mod environment;
mod envelope;
mod identity;
mod normalizer;

pub use environment::{RuntimeEnvironment, REFERRER_MARKERS};
pub use envelope::{
    Amp, CallPath, Campaign, Context, Envelope, Library, Metadata, Page, Referrer,
    UnknownCallPath,
};
pub use identity::{HostContext, StoredVisitor};
pub use normalizer::{Normalizer, NormalizerConfig, LIBRARY_NAME, LIBRARY_VERSION};

/// Generate a 36-character random identifier.
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
