//! Cross-domain identity resolution.
//!
//! [`CrossDomainResolver::resolve`] asks every configured domain (except the
//! current host) for a known identifier, waits for all of them, and picks the
//! answer of the highest-priority domain that has one. If nobody knows the
//! visitor a local identifier is issued with the current host as its source.

mod error;
mod lookup;
mod resolver;
mod state;

pub use error::{ResolveError, ResolveResult};
pub use lookup::{lookup_url, LookupOutcome};
pub use resolver::{CrossDomainId, CrossDomainResolver};
pub use state::ResolverState;
