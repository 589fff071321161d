//! Delivery of one envelope to the collection endpoint.
//!
//! [`DeliveryClient`] resolves `<base><path>` and performs exactly one
//! request through an [`HttpTransport`]. Retries belong to the retry queue.

mod client;
mod error;
#[cfg(any(test, feature = "test-support"))]
pub mod mock;
mod transport;

pub use client::{DeliveryClient, DeliveryResponse};
pub use error::{DeliveryError, DeliveryResult};
pub use transport::{reason_phrase, HttpResponse, HttpTransport, ReqwestTransport};
