//! Retry queue and its drain task.

use crate::{
    compute_backoff, PersistedQueue, ProcessedError, QueueEntry, QueueError, QueueProcessor,
    QueueResult, QueueStore, RetryPolicy,
};
use chrono::Utc;
use delivery_client::DeliveryResponse;
use parking_lot::Mutex;
use payload_normalizer::{CallPath, Envelope};
use plainflow_storage::KeyValueStorage;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Queue name used by the SDK facade.
pub const DEFAULT_QUEUE_NAME: &str = "default";

/// Capacity of the `processed` broadcast channel.
const EVENT_CAPACITY: usize = 256;

/// How often an idle drain task re-reads storage.
const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Fired once per entry when its delivery concludes, successfully or not.
#[derive(Debug, Clone)]
pub struct ProcessedEvent {
    pub sequence: u64,
    pub path: CallPath,
    pub message_id: Option<String>,
    /// Attempts made, including the concluding one.
    pub attempts: u32,
    pub result: Result<DeliveryResponse, ProcessedError>,
}

impl ProcessedEvent {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Outcome of one drain step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainStep {
    /// Nothing is queued.
    Empty,
    /// The head entry becomes eligible after the given delay.
    NotDue(Duration),
    Delivered(u64),
    /// The head entry failed and stays in place for `delay`.
    Retrying { sequence: u64, delay: Duration },
    /// The head entry exceeded the attempt limit and was dropped.
    Abandoned(u64),
}

/// Totals from [`RetryQueue::drain`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainSummary {
    pub delivered: usize,
    pub abandoned: usize,
    /// Entries still persisted when the drain returned.
    pub remaining: usize,
}

struct Inner {
    name: String,
    store: Arc<QueueStore>,
    processor: Arc<dyn QueueProcessor>,
    policy: RetryPolicy,
    events: broadcast::Sender<ProcessedEvent>,
    wake: Notify,
}

struct Worker {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Durable FIFO of envelopes with a single drain task.
pub struct RetryQueue {
    inner: Arc<Inner>,
    worker: Mutex<Option<Worker>>,
}

impl RetryQueue {
    /// Open the queue `name` and recover any entries persisted earlier.
    pub fn open(
        name: &str,
        storage: Arc<dyn KeyValueStorage>,
        processor: Arc<dyn QueueProcessor>,
        policy: RetryPolicy,
    ) -> QueueResult<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let queue = Self {
            inner: Arc::new(Inner {
                name: name.to_string(),
                store: Arc::new(QueueStore::new(storage, name)),
                processor,
                policy,
                events,
                wake: Notify::new(),
            }),
            worker: Mutex::new(None),
        };
        queue.recover()?;
        Ok(queue)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.inner.policy
    }

    /// Reload the persisted sequence. Returns the number of pending entries.
    pub fn recover(&self) -> QueueResult<usize> {
        let pending = self.inner.store.update(|queue| queue.entries.len())?;
        if pending > 0 {
            info!(queue = %self.inner.name, count = pending, "Recovered pending entries");
        }
        Ok(pending)
    }

    /// Persist `envelope` at the tail and return its sequence.
    pub fn add_item(&self, path: CallPath, envelope: Envelope) -> QueueResult<u64> {
        let sequence = self
            .inner
            .store
            .update(|queue| queue.push(path, envelope))?;
        debug!(queue = %self.inner.name, sequence, path = %path, "Enqueued entry");
        self.inner.wake.notify_one();
        Ok(sequence)
    }

    /// [`RetryQueue::add_item`] with the storage write run on the blocking
    /// pool, for callers on the async runtime.
    pub async fn enqueue(&self, path: CallPath, envelope: Envelope) -> QueueResult<u64> {
        let sequence = self
            .inner
            .update(move |queue| queue.push(path, envelope))
            .await?;
        debug!(queue = %self.inner.name, sequence, path = %path, "Enqueued entry");
        self.inner.wake.notify_one();
        Ok(sequence)
    }

    pub fn pending_count(&self) -> QueueResult<usize> {
        Ok(self.inner.store.load()?.entries.len())
    }

    /// Pending entries in delivery order.
    pub fn entries(&self) -> QueueResult<Vec<QueueEntry>> {
        Ok(self.inner.store.load()?.entries)
    }

    /// Receive `processed` notifications. Subscribe before starting to see
    /// every entry.
    pub fn subscribe(&self) -> broadcast::Receiver<ProcessedEvent> {
        self.inner.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|worker| !worker.handle.is_finished())
    }

    /// Spawn the drain task. Does nothing if it is already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut worker = self.worker.lock();
        if worker
            .as_ref()
            .is_some_and(|worker| !worker.handle.is_finished())
        {
            return;
        }

        let (stop, stop_rx) = watch::channel(false);
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move { inner.run(stop_rx).await });
        *worker = Some(Worker { stop, handle });
    }

    /// Halt the drain task and wait for it to exit.
    ///
    /// An attempt already in flight completes first. Persisted entries are
    /// kept for the next start.
    pub async fn stop(&self) {
        let worker = self.worker.lock().take();
        let Some(worker) = worker else {
            return;
        };
        let _ = worker.stop.send(true);
        if let Err(err) = worker.handle.await {
            warn!(queue = %self.inner.name, error = %err, "Drain task ended abnormally");
        }
    }

    /// Drain inline until the queue is empty or the next wait would pass
    /// `timeout`.
    pub async fn drain(&self, timeout: Duration) -> QueueResult<DrainSummary> {
        if self.is_running() {
            return Err(QueueError::AlreadyRunning(self.inner.name.clone()));
        }

        let deadline = tokio::time::Instant::now() + timeout;
        let mut summary = DrainSummary::default();
        loop {
            match self.inner.step().await? {
                DrainStep::Empty => break,
                DrainStep::Delivered(_) => summary.delivered += 1,
                DrainStep::Abandoned(_) => summary.abandoned += 1,
                DrainStep::NotDue(delay) | DrainStep::Retrying { delay, .. } => {
                    if tokio::time::Instant::now() + delay > deadline {
                        break;
                    }
                    tokio::time::sleep(delay).await;
                }
            }
        }
        summary.remaining = self.inner.load().await?.entries.len();
        Ok(summary)
    }
}

impl Inner {
    async fn run(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        info!(queue = %self.name, "Drain started");

        loop {
            if *stop.borrow() {
                break;
            }

            let pause = match self.step().await {
                Ok(DrainStep::Empty) => {
                    // Entries added through another handle only show up on the poll.
                    tokio::select! {
                        _ = self.wake.notified() => continue,
                        _ = tokio::time::sleep(IDLE_POLL_INTERVAL) => continue,
                        _ = stop.changed() => break,
                    }
                }
                Ok(DrainStep::Delivered(_)) | Ok(DrainStep::Abandoned(_)) => continue,
                Ok(DrainStep::NotDue(delay)) | Ok(DrainStep::Retrying { delay, .. }) => delay,
                Err(err) => {
                    warn!(queue = %self.name, error = %err, "Drain step failed");
                    self.policy.min_delay
                }
            };

            if sleep_or_stop(pause, &mut stop).await {
                break;
            }
        }

        info!(queue = %self.name, "Drain stopped");
    }

    async fn load(&self) -> QueueResult<PersistedQueue> {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.load()).await?
    }

    async fn update<R, F>(&self, f: F) -> QueueResult<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut PersistedQueue) -> R + Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.update(f)).await?
    }

    /// Attempt the head entry if it is due.
    async fn step(&self) -> QueueResult<DrainStep> {
        let now = Utc::now();
        let Some(head) = self.load().await?.head().cloned() else {
            return Ok(DrainStep::Empty);
        };
        if !head.is_due(now) {
            let wait = (head.next_attempt_at - now).to_std().unwrap_or(Duration::ZERO);
            return Ok(DrainStep::NotDue(wait));
        }

        let sequence = head.sequence;
        let attempt = head.attempts.saturating_add(1);
        debug!(queue = %self.name, sequence, attempt, path = %head.path, "Delivering entry");

        match self.processor.process(&head).await {
            Ok(response) => {
                self.update(move |queue| queue.remove(sequence)).await?;
                debug!(queue = %self.name, sequence, attempt, "Entry delivered");
                self.notify(&head, attempt, Ok(response));
                Ok(DrainStep::Delivered(sequence))
            }
            Err(err) => {
                let last_error = err.to_string();

                if self.policy.is_exhausted(attempt) {
                    self.update(move |queue| queue.remove(sequence)).await?;
                    error!(
                        queue = %self.name,
                        sequence,
                        attempts = attempt,
                        error = %last_error,
                        "Abandoning entry after max attempts"
                    );
                    self.notify(
                        &head,
                        attempt,
                        Err(ProcessedError::MaxAttemptsExceeded {
                            attempts: attempt,
                            last_error,
                        }),
                    );
                    return Ok(DrainStep::Abandoned(sequence));
                }

                let backoff = compute_backoff(attempt, &self.policy);
                let next_attempt_at = Utc::now() + backoff;
                let recorded = last_error.clone();
                self.update(move |queue| {
                    if let Some(entry) = queue.get_mut(sequence) {
                        entry.attempts = attempt;
                        entry.next_attempt_at = next_attempt_at;
                        entry.last_error = Some(recorded);
                    }
                })
                .await?;

                let delay = backoff.to_std().unwrap_or(Duration::ZERO);
                warn!(
                    queue = %self.name,
                    sequence,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %last_error,
                    "Delivery failed, retrying"
                );
                Ok(DrainStep::Retrying { sequence, delay })
            }
        }
    }

    fn notify(
        &self,
        entry: &QueueEntry,
        attempts: u32,
        result: Result<DeliveryResponse, ProcessedError>,
    ) {
        // No subscribers is fine.
        let _ = self.events.send(ProcessedEvent {
            sequence: entry.sequence,
            path: entry.path,
            message_id: entry.message_id().map(str::to_string),
            attempts,
            result,
        });
    }
}

/// Sleep for `delay`. Returns true if stop was signalled first.
async fn sleep_or_stop(delay: Duration, stop: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        _ = stop.changed() => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use delivery_client::mock::{MockReply, MockTransport};
    use delivery_client::DeliveryClient;
    use plainflow_storage::{CookieStorage, LocalStorage};
    use url::Url;

    const TRACK: &str = "v1/t";
    const IDENTIFY: &str = "v1/i";

    struct Harness {
        storage: Arc<dyn KeyValueStorage>,
        transport: Arc<MockTransport>,
        client: Arc<DeliveryClient>,
    }

    impl Harness {
        fn new() -> Self {
            let storage: Arc<dyn KeyValueStorage> = Arc::new(CookieStorage::new());
            let transport = Arc::new(MockTransport::new());
            let base = Url::parse("https://collect.example/v1").unwrap();
            let client = Arc::new(DeliveryClient::new(transport.clone(), base));
            Self {
                storage,
                transport,
                client,
            }
        }

        fn open(&self, policy: RetryPolicy) -> RetryQueue {
            RetryQueue::open(
                DEFAULT_QUEUE_NAME,
                self.storage.clone(),
                self.client.clone(),
                policy,
            )
            .unwrap()
        }

        fn request_paths(&self) -> Vec<String> {
            self.transport
                .requests()
                .iter()
                .map(|r| r.url.path().to_string())
                .collect()
        }

        fn request_events(&self) -> Vec<String> {
            self.transport
                .requests()
                .iter()
                .map(|r| r.body.as_ref().unwrap()["event"].as_str().unwrap().to_string())
                .collect()
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            min_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(40),
            max_attempts,
        }
    }

    fn envelope(event: &str, message_id: &str) -> Envelope {
        let mut envelope = Envelope::new().with_field("event", event);
        envelope.message_id = Some(message_id.to_string());
        envelope
    }

    async fn next_event(rx: &mut broadcast::Receiver<ProcessedEvent>) -> ProcessedEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for processed event")
            .expect("processed channel closed")
    }

    #[test]
    fn test_add_item_persists_before_start() {
        let harness = Harness::new();
        let queue = harness.open(fast_policy(10));

        assert_eq!(queue.add_item(CallPath::Track, envelope("a", "m-a")).unwrap(), 0);
        assert_eq!(queue.add_item(CallPath::Page, envelope("b", "m-b")).unwrap(), 1);

        assert_eq!(queue.pending_count().unwrap(), 2);
        assert!(harness.storage.has("pf.queue.default").unwrap());
        assert_eq!(harness.transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_delivered_entry_is_removed_for_good() {
        let harness = Harness::new();
        let queue = harness.open(fast_policy(10));
        let mut processed = queue.subscribe();
        queue.start();

        queue.add_item(CallPath::Track, envelope("my-event", "m-1")).unwrap();
        let event = next_event(&mut processed).await;

        assert!(event.is_success());
        assert_eq!(event.sequence, 0);
        assert_eq!(event.attempts, 1);
        assert_eq!(event.message_id.as_deref(), Some("m-1"));
        assert_eq!(queue.pending_count().unwrap(), 0);
        queue.stop().await;
        drop(queue);

        let reopened = harness.open(fast_policy(10));
        assert_eq!(reopened.pending_count().unwrap(), 0);
        assert_eq!(harness.transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_recovers_leftover_entries_in_order() {
        let harness = Harness::new();
        {
            let previous = harness.open(fast_policy(10));
            previous.add_item(CallPath::Track, envelope("first", "m-1")).unwrap();
            previous.add_item(CallPath::Track, envelope("second", "m-2")).unwrap();
            previous.add_item(CallPath::Track, envelope("third", "m-3")).unwrap();
        }

        let queue = harness.open(fast_policy(10));
        assert_eq!(queue.recover().unwrap(), 3);
        let mut processed = queue.subscribe();
        queue.start();

        let sequences: Vec<u64> = vec![
            next_event(&mut processed).await.sequence,
            next_event(&mut processed).await.sequence,
            next_event(&mut processed).await.sequence,
        ];
        assert_eq!(sequences, vec![0, 1, 2]);
        assert_eq!(harness.request_events(), vec!["first", "second", "third"]);
        queue.stop().await;
    }

    #[tokio::test]
    async fn test_retry_reuses_message_id() {
        let harness = Harness::new();
        harness.transport.route_sequence(
            TRACK,
            vec![MockReply::status(500), MockReply::status(503), MockReply::ok()],
        );
        let queue = harness.open(fast_policy(10));
        let mut processed = queue.subscribe();
        queue.start();

        queue.add_item(CallPath::Track, envelope("retry-me", "m-stable")).unwrap();
        let event = next_event(&mut processed).await;

        assert!(event.is_success());
        assert_eq!(event.attempts, 3);
        let requests = harness.transport.requests();
        assert_eq!(requests.len(), 3);
        for request in requests {
            assert_eq!(request.body.unwrap()["messageId"], "m-stable");
        }
        queue.stop().await;
    }

    #[tokio::test]
    async fn test_failing_head_blocks_later_entries() {
        let harness = Harness::new();
        harness.transport.route_sequence(
            TRACK,
            vec![MockReply::status(500), MockReply::status(500), MockReply::ok()],
        );
        harness.transport.route(IDENTIFY, MockReply::ok());
        let queue = harness.open(fast_policy(10));
        queue.add_item(CallPath::Track, envelope("head", "m-1")).unwrap();
        queue.add_item(CallPath::Identify, envelope("behind", "m-2")).unwrap();

        let mut processed = queue.subscribe();
        queue.start();

        let first = next_event(&mut processed).await;
        let second = next_event(&mut processed).await;
        assert_eq!(first.sequence, 0);
        assert_eq!(first.attempts, 3);
        assert_eq!(second.sequence, 1);
        assert_eq!(harness.request_paths(), vec!["/v1/t", "/v1/t", "/v1/t", "/v1/i"]);
        queue.stop().await;
    }

    #[tokio::test]
    async fn test_abandons_entry_after_max_attempts() {
        let harness = Harness::new();
        harness.transport.route(TRACK, MockReply::status(500));
        let queue = harness.open(fast_policy(3));
        queue.add_item(CallPath::Track, envelope("poison", "m-1")).unwrap();
        queue.add_item(CallPath::Identify, envelope("next", "m-2")).unwrap();

        let mut processed = queue.subscribe();
        queue.start();

        let abandoned = next_event(&mut processed).await;
        assert_eq!(abandoned.sequence, 0);
        assert_eq!(
            abandoned.result.unwrap_err(),
            ProcessedError::MaxAttemptsExceeded {
                attempts: 3,
                last_error: "Internal Server Error".to_string(),
            }
        );

        let delivered = next_event(&mut processed).await;
        assert_eq!(delivered.sequence, 1);
        assert!(delivered.is_success());
        assert_eq!(queue.pending_count().unwrap(), 0);
        assert_eq!(harness.transport.request_count(), 4);
        queue.stop().await;
    }

    #[tokio::test]
    async fn test_stop_keeps_entries_until_restart() {
        let harness = Harness::new();
        let queue = harness.open(fast_policy(10));
        let mut processed = queue.subscribe();

        queue.start();
        assert!(queue.is_running());
        queue.stop().await;
        assert!(!queue.is_running());

        queue.add_item(CallPath::Track, envelope("later", "m-1")).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(harness.transport.request_count(), 0);
        assert_eq!(queue.pending_count().unwrap(), 1);

        queue.start();
        let event = next_event(&mut processed).await;
        assert!(event.is_success());
        assert_eq!(queue.pending_count().unwrap(), 0);
        queue.stop().await;
    }

    #[tokio::test]
    async fn test_failed_attempt_updates_entry() {
        let harness = Harness::new();
        harness.transport.route(TRACK, MockReply::status(500));
        let policy = RetryPolicy {
            min_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(120),
            max_attempts: 10,
        };
        let queue = harness.open(policy);
        queue.add_item(CallPath::Track, envelope("a", "m-1")).unwrap();

        let step = queue.inner.step().await.unwrap();
        assert_eq!(
            step,
            DrainStep::Retrying {
                sequence: 0,
                delay: Duration::from_secs(60)
            }
        );

        let entry = &queue.entries().unwrap()[0];
        assert_eq!(entry.attempts, 1);
        assert_eq!(entry.last_error.as_deref(), Some("Internal Server Error"));
        assert!(entry.next_attempt_at > Utc::now());

        assert!(matches!(queue.inner.step().await.unwrap(), DrainStep::NotDue(_)));
        assert_eq!(harness.transport.request_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_file_backed_queue_from_multi_thread_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let storage: Arc<dyn KeyValueStorage> =
            Arc::new(LocalStorage::open(dir.path().join("store.json")).unwrap());
        let harness = Harness::new();
        let queue = RetryQueue::open(
            DEFAULT_QUEUE_NAME,
            storage.clone(),
            harness.client.clone(),
            fast_policy(3),
        )
        .unwrap();

        assert_eq!(queue.enqueue(CallPath::Track, envelope("a", "m-1")).await.unwrap(), 0);
        assert_eq!(queue.enqueue(CallPath::Track, envelope("b", "m-2")).await.unwrap(), 1);
        assert!(storage.has("pf.queue.default").unwrap());

        let summary = queue.drain(Duration::from_secs(1)).await.unwrap();
        assert_eq!(summary.delivered, 2);
        assert_eq!(summary.remaining, 0);
        assert_eq!(harness.request_events(), vec!["a", "b"]);

        let reopened = RetryQueue::open(
            DEFAULT_QUEUE_NAME,
            storage,
            harness.client.clone(),
            fast_policy(3),
        )
        .unwrap();
        assert_eq!(reopened.pending_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_inline_drain() {
        let harness = Harness::new();
        let queue = harness.open(fast_policy(10));
        queue.add_item(CallPath::Track, envelope("a", "m-1")).unwrap();
        queue.add_item(CallPath::Track, envelope("b", "m-2")).unwrap();

        let summary = queue.drain(Duration::from_secs(1)).await.unwrap();
        assert_eq!(
            summary,
            DrainSummary {
                delivered: 2,
                abandoned: 0,
                remaining: 0
            }
        );

        queue.start();
        assert!(matches!(
            queue.drain(Duration::from_secs(1)).await,
            Err(QueueError::AlreadyRunning(_))
        ));
        queue.stop().await;
    }

    #[tokio::test]
    async fn test_drain_gives_up_at_timeout() {
        let harness = Harness::new();
        harness.transport.route(TRACK, MockReply::status(500));
        let queue = harness.open(RetryPolicy {
            min_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(60),
            max_attempts: 10,
        });
        queue.add_item(CallPath::Track, envelope("a", "m-1")).unwrap();

        let summary = queue.drain(Duration::from_millis(100)).await.unwrap();
        assert_eq!(summary.delivered, 0);
        assert_eq!(summary.remaining, 1);
        assert_eq!(harness.transport.request_count(), 1);
    }
}
