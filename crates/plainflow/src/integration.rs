//! Host hook interface.

use crate::{AliasCall, Dispatch, GroupCall, IdentifyCall, PageCall, PlainflowResult, TrackCall};
use async_trait::async_trait;

/// Hooks a host runtime invokes, one per call type.
///
/// Implementations only respond to these calls; they never originate them.
#[async_trait]
pub trait Integration: Send + Sync {
    fn name(&self) -> &str;

    async fn page(&self, call: PageCall) -> PlainflowResult<Dispatch>;

    async fn identify(&self, call: IdentifyCall) -> PlainflowResult<Dispatch>;

    async fn track(&self, call: TrackCall) -> PlainflowResult<Dispatch>;

    async fn group(&self, call: GroupCall) -> PlainflowResult<Dispatch>;

    async fn alias(&self, call: AliasCall) -> PlainflowResult<Dispatch>;
}
