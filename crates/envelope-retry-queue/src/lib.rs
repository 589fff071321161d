//! Persistent retry queue for envelopes.
//!
//! Entries are persisted under `pf.queue.<name>` before [`RetryQueue::add_item`]
//! returns. A single drain task delivers the head entry, removes it on
//! success, and on failure keeps it in place with an exponential backoff
//! until it succeeds or exceeds the attempt limit. Entries left over from a
//! previous process are picked up when the queue is constructed.
//!
//! ```ignore
//! let queue = RetryQueue::open("default", storage, Arc::new(client), RetryPolicy::default())?;
//! let mut processed = queue.subscribe();
//! queue.start();
//! queue.add_item(CallPath::Track, envelope)?;
//! let event = processed.recv().await?;
//! ```

mod backoff;
mod entry;
mod error;
mod processor;
mod queue;
mod store;

pub use backoff::{compute_backoff, RetryPolicy};
pub use entry::{PersistedQueue, QueueEntry};
pub use error::{ProcessedError, QueueError, QueueResult};
pub use processor::QueueProcessor;
pub use queue::{DrainStep, DrainSummary, ProcessedEvent, RetryQueue, DEFAULT_QUEUE_NAME};
pub use store::QueueStore;
