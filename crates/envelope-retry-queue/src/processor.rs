//! Delivery seam for the drain task.

use crate::QueueEntry;
use async_trait::async_trait;
use delivery_client::{DeliveryClient, DeliveryResponse, DeliveryResult};

/// Performs one delivery attempt for a queue entry.
#[async_trait]
pub trait QueueProcessor: Send + Sync {
    async fn process(&self, entry: &QueueEntry) -> DeliveryResult<DeliveryResponse>;
}

#[async_trait]
impl QueueProcessor for DeliveryClient {
    async fn process(&self, entry: &QueueEntry) -> DeliveryResult<DeliveryResponse> {
        self.send(entry.path, &entry.envelope).await
    }
}
