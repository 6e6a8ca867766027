//! Event queue — bounded fan-out channel between executor and subscribers.
//!
//! Each in-flight request owns exactly one [`EventQueue`]. Producers (the
//! agent executor, and the task manager when it re-publishes state it
//! generated) call [`EventQueue::publish`]; consumers (request handler, push
//! fan-out worker) hold an [`EventConsumer`] obtained from
//! [`EventQueue::subscribe`].
//!
//! Delivery contract:
//! - every subscriber receives every event matching its filter exactly once,
//!   in publication order;
//! - publishing is immediate while a subscriber's buffer is under capacity
//!   and blocks the producer when it is full (back-pressure);
//! - a subscriber that stays full past the idle-write timeout is dropped —
//!   the only case where an active subscriber is removed involuntarily;
//! - [`EventQueue::close`] lets subscribers drain buffered events, then
//!   signals end-of-stream; later publishes fail with `QueueClosed`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::error::{A2AError, A2AResult};
use crate::types::Event;

/// Default bounded capacity of each subscriber channel.
pub const DEFAULT_CAPACITY: usize = 256;

/// Default time a publisher may block on one stalled subscriber.
pub const DEFAULT_IDLE_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Predicate over `(task_id, context_id, kind)` used to scope a subscription.
///
/// All criteria are optional; an empty filter matches everything. The request
/// handler uses this to ignore unrelated events when an executor's callback
/// is shared across tasks.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Match only events for this task.
    pub task_id: Option<String>,

    /// Match only events in this context.
    pub context_id: Option<String>,

    /// Match only these `kind` discriminators (`task`, `message`,
    /// `status-update`, `artifact-update`).
    pub kinds: Option<Vec<String>>,
}

impl EventFilter {
    /// Filter to a single task id.
    pub fn for_task(task_id: impl Into<String>) -> Self {
        Self {
            task_id: Some(task_id.into()),
            ..Self::default()
        }
    }

    /// Whether an event passes this filter.
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(ref want) = self.task_id {
            if event.task_id() != Some(want.as_str()) {
                return false;
            }
        }
        if let Some(ref want) = self.context_id {
            if event.context_id() != Some(want.as_str()) {
                return false;
            }
        }
        if let Some(ref kinds) = self.kinds {
            if !kinds.iter().any(|k| k == event.kind_str()) {
                return false;
            }
        }
        true
    }
}

struct Subscriber {
    id: u64,
    filter: EventFilter,
    tx: mpsc::Sender<Event>,
}

struct Inner {
    capacity: usize,
    idle_write_timeout: Duration,
    closed: AtomicBool,
    next_subscriber_id: AtomicU64,
    subscribers: Mutex<Vec<Subscriber>>,
}

/// Bounded fan-out queue for one in-flight request.
///
/// Cheap to clone; clones share the same subscriber set and closed flag.
#[derive(Clone)]
pub struct EventQueue {
    inner: Arc<Inner>,
}

impl EventQueue {
    /// Create a queue with the given per-subscriber capacity and idle-write
    /// timeout.
    pub fn new(capacity: usize, idle_write_timeout: Duration) -> Self {
        assert!(capacity > 0, "capacity must be greater than 0");
        Self {
            inner: Arc::new(Inner {
                capacity,
                idle_write_timeout,
                closed: AtomicBool::new(false),
                next_subscriber_id: AtomicU64::new(0),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Create a queue with the default capacity (256) and idle-write timeout
    /// (10 s).
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_IDLE_WRITE_TIMEOUT)
    }

    /// Subscribe with a filter. The returned consumer observes every
    /// matching event published after this call, in publication order.
    pub async fn subscribe(&self, filter: EventFilter) -> EventConsumer {
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        let id = self.inner.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let mut subscribers = self.inner.subscribers.lock().await;
        subscribers.push(Subscriber { id, filter, tx });
        debug!(subscriber_id = id, "Subscriber registered on event queue");
        EventConsumer { rx }
    }

    /// Subscribe without filtering.
    pub async fn subscribe_all(&self) -> EventConsumer {
        self.subscribe(EventFilter::default()).await
    }

    /// Publish an event to every matching subscriber.
    ///
    /// Blocks when a subscriber's buffer is full; a subscriber that stays
    /// full past the idle-write timeout is unregistered and delivery
    /// continues to the rest. Fails with [`A2AError::QueueClosed`] after
    /// [`close`](Self::close).
    pub async fn publish(&self, event: Event) -> A2AResult<()> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(A2AError::QueueClosed(
                event.task_id().unwrap_or("<unrouted>").to_string(),
            ));
        }

        // Snapshot under the lock, write outside it so one slow subscriber
        // cannot stall registration or unsubscription.
        let snapshot: Vec<(u64, EventFilter, mpsc::Sender<Event>)> = {
            let subscribers = self.inner.subscribers.lock().await;
            subscribers
                .iter()
                .map(|s| (s.id, s.filter.clone(), s.tx.clone()))
                .collect()
        };

        let mut stalled: Vec<u64> = Vec::new();
        for (id, filter, tx) in snapshot {
            if !filter.matches(&event) {
                continue;
            }
            match tokio::time::timeout(self.inner.idle_write_timeout, tx.send(event.clone())).await
            {
                Ok(Ok(())) => {}
                Ok(Err(_)) => {
                    // Receiver dropped — normal disconnect.
                    stalled.push(id);
                }
                Err(_) => {
                    warn!(
                        subscriber_id = id,
                        "Subscriber stalled past idle-write timeout, dropping it"
                    );
                    stalled.push(id);
                }
            }
        }

        if !stalled.is_empty() {
            let mut subscribers = self.inner.subscribers.lock().await;
            subscribers.retain(|s| !stalled.contains(&s.id));
        }

        Ok(())
    }

    /// Close the queue. Buffered events remain readable by subscribers;
    /// once drained each consumer observes end-of-stream. Subsequent
    /// publishes fail with `QueueClosed`.
    pub async fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        // Dropping the senders is what ends the streams: receivers keep
        // yielding buffered events until empty, then see `None`.
        let mut subscribers = self.inner.subscribers.lock().await;
        let drained = subscribers.len();
        subscribers.clear();
        debug!(subscribers = drained, "Event queue closed");
    }

    /// Whether the queue has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Number of currently registered subscribers.
    pub async fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().await.len()
    }
}

impl std::fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventQueue")
            .field("capacity", &self.inner.capacity)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Consumer half of a subscription.
pub struct EventConsumer {
    rx: mpsc::Receiver<Event>,
}

impl EventConsumer {
    /// Next matching event, or `None` once the queue is closed and the
    /// buffer is drained.
    pub async fn next_event(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Drain events until a final one (terminal status update, direct
    /// message, or terminal task snapshot) or end-of-stream. Returns
    /// everything observed, final event included.
    pub async fn collect_until_final(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(event) = self.next_event().await {
            let is_final = event.is_final();
            events.push(event);
            if is_final {
                break;
            }
        }
        events
    }
}

impl std::fmt::Debug for EventConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventConsumer").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TaskState, TaskStatus, TaskStatusUpdateEvent};

    fn status_event(task_id: &str, state: TaskState, r#final: bool) -> Event {
        Event::StatusUpdate(TaskStatusUpdateEvent {
            task_id: task_id.to_string(),
            context_id: "ctx1".to_string(),
            kind: "status-update".to_string(),
            status: TaskStatus::new(state),
            r#final,
            metadata: None,
        })
    }

    #[tokio::test]
    async fn each_subscriber_sees_events_once_in_order() {
        let queue = EventQueue::with_default_capacity();
        let mut a = queue.subscribe_all().await;
        let mut b = queue.subscribe_all().await;

        for state in [TaskState::Submitted, TaskState::Working, TaskState::Completed] {
            queue.publish(status_event("t1", state, false)).await.unwrap();
        }
        queue.close().await;

        for consumer in [&mut a, &mut b] {
            let mut seen = Vec::new();
            while let Some(event) = consumer.next_event().await {
                if let Event::StatusUpdate(update) = event {
                    seen.push(update.status.state);
                }
            }
            assert_eq!(
                seen,
                vec![TaskState::Submitted, TaskState::Working, TaskState::Completed]
            );
        }
    }

    #[tokio::test]
    async fn filter_excludes_unrelated_tasks() {
        let queue = EventQueue::with_default_capacity();
        let mut consumer = queue.subscribe(EventFilter::for_task("t1")).await;

        queue
            .publish(status_event("t2", TaskState::Working, false))
            .await
            .unwrap();
        queue
            .publish(status_event("t1", TaskState::Working, false))
            .await
            .unwrap();
        queue.close().await;

        let events = consumer.collect_until_final().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].task_id(), Some("t1"));
    }

    #[tokio::test]
    async fn kind_filter_selects_discriminators() {
        let queue = EventQueue::with_default_capacity();
        let filter = EventFilter {
            kinds: Some(vec!["status-update".to_string()]),
            ..EventFilter::default()
        };
        let mut consumer = queue.subscribe(filter).await;

        queue
            .publish(Event::Message(crate::types::Message::agent("m1", "hi")))
            .await
            .unwrap();
        queue
            .publish(status_event("t1", TaskState::Working, false))
            .await
            .unwrap();
        queue.close().await;

        let events = consumer.collect_until_final().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind_str(), "status-update");
    }

    #[tokio::test]
    async fn publish_after_close_fails() {
        let queue = EventQueue::with_default_capacity();
        queue.close().await;
        let result = queue
            .publish(status_event("t1", TaskState::Working, false))
            .await;
        assert!(matches!(result, Err(A2AError::QueueClosed(_))));
    }

    #[tokio::test]
    async fn close_drains_buffered_events_before_end_of_stream() {
        let queue = EventQueue::with_default_capacity();
        let mut consumer = queue.subscribe_all().await;

        queue
            .publish(status_event("t1", TaskState::Working, false))
            .await
            .unwrap();
        queue
            .publish(status_event("t1", TaskState::Completed, true))
            .await
            .unwrap();
        queue.close().await;

        assert!(consumer.next_event().await.is_some());
        assert!(consumer.next_event().await.is_some());
        assert!(consumer.next_event().await.is_none());
    }

    #[tokio::test]
    async fn full_subscriber_applies_back_pressure() {
        let queue = EventQueue::new(1, Duration::from_secs(5));
        let mut consumer = queue.subscribe_all().await;

        // Fills the single-slot buffer.
        queue
            .publish(status_event("t1", TaskState::Submitted, false))
            .await
            .unwrap();

        // Second publish must block until the consumer drains a slot.
        let queue2 = queue.clone();
        let publisher = tokio::spawn(async move {
            queue2
                .publish(status_event("t1", TaskState::Working, false))
                .await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!publisher.is_finished());

        assert!(consumer.next_event().await.is_some());
        publisher.await.unwrap().unwrap();
        assert!(consumer.next_event().await.is_some());
    }

    #[tokio::test]
    async fn stalled_subscriber_is_dropped_others_unaffected() {
        let queue = EventQueue::new(1, Duration::from_millis(50));
        let _stalled = queue.subscribe_all().await;
        let mut healthy = queue.subscribe_all().await;

        // First publish fills the stalled subscriber's buffer.
        queue
            .publish(status_event("t1", TaskState::Submitted, false))
            .await
            .unwrap();
        assert_eq!(queue.subscriber_count().await, 2);
        assert!(healthy.next_event().await.is_some());

        // Second publish times out on the stalled subscriber and drops it.
        queue
            .publish(status_event("t1", TaskState::Working, false))
            .await
            .unwrap();
        assert_eq!(queue.subscriber_count().await, 1);
        assert!(healthy.next_event().await.is_some());
    }

    #[tokio::test]
    async fn dropped_consumer_is_unregistered_on_next_publish() {
        let queue = EventQueue::with_default_capacity();
        let consumer = queue.subscribe_all().await;
        drop(consumer);

        queue
            .publish(status_event("t1", TaskState::Working, false))
            .await
            .unwrap();
        assert_eq!(queue.subscriber_count().await, 0);
    }
}
