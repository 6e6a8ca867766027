//! Push-notification manager — SSE client registry and webhook delivery.
//!
//! Every status and artifact event the task manager applies is handed to
//! [`PushNotificationManager::notify`], which fans it out two ways:
//!
//! - **SSE**: registered per-task clients receive a pre-rendered frame
//!   (`event: <kind>\ndata: <json>\n\n`). The registry mutex only guards the
//!   map; writes happen outside it against a snapshot, and a failed write
//!   unregisters that client alone.
//! - **Webhooks**: each active config for the task gets a POST with payload
//!   `{event_type, event_data, timestamp, attempt}`. Failures are retried
//!   with exponential backoff anchored to the chain's first attempt: retry
//!   `n` is due at `t0 + min(base * 2^(n-1), cap)` plus up to 10% jitter
//!   (base 1 s, cap 60 s), so the attempts land at roughly t0, t0+1 s,
//!   t0+2 s, t0+4 s, t0+8 s. After `max_webhook_attempts` total attempts
//!   the config's delivery state goes inactive. A background worker scans
//!   the retry queue on a 1-second tick.
//!
//! Delivery failures never propagate to callers; they are absorbed into the
//! per-config delivery state and the log.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::ServerConfig;
use crate::types::{Event, PushAuthentication, PushNotificationConfig};

use super::task_store::TaskStore;

/// Buffered frames per SSE client before writes start failing.
const SSE_CLIENT_BUFFER: usize = 64;

// ---------------------------------------------------------------------------
// SSE client registry
// ---------------------------------------------------------------------------

/// A rendered Server-Sent-Events frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SseFrame {
    /// The `event:` field (the event's `kind` discriminator).
    pub event: String,
    /// The `data:` field (minified JSON).
    pub data: String,
}

impl SseFrame {
    /// Wire rendering: `event: <type>\ndata: <json>\n\n`.
    pub fn render(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.event, self.data)
    }
}

/// Per-task registry of SSE clients.
pub struct SseClientRegistry {
    clients: Mutex<HashMap<String, HashMap<u64, mpsc::Sender<SseFrame>>>>,
    next_client_id: AtomicU64,
}

impl SseClientRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            next_client_id: AtomicU64::new(0),
        }
    }

    /// Register a client for a task. Returns the client id and the frame
    /// receiver to drive the HTTP response from.
    pub fn register(&self, task_id: &str) -> (u64, mpsc::Receiver<SseFrame>) {
        let (tx, rx) = mpsc::channel(SSE_CLIENT_BUFFER);
        let id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        let mut clients = self.clients.lock().expect("sse registry poisoned");
        clients.entry(task_id.to_string()).or_default().insert(id, tx);
        debug!(task_id = %task_id, client_id = id, "SSE client registered");
        (id, rx)
    }

    /// Remove a client, disposing the task's entry when it empties.
    pub fn unregister(&self, task_id: &str, client_id: u64) {
        let mut clients = self.clients.lock().expect("sse registry poisoned");
        if let Some(for_task) = clients.get_mut(task_id) {
            for_task.remove(&client_id);
            if for_task.is_empty() {
                clients.remove(task_id);
            }
        }
    }

    /// Deliver a frame to every client of a task. Failed writes unregister
    /// the offending client; the rest are unaffected.
    pub fn deliver(&self, task_id: &str, frame: SseFrame) {
        // Snapshot under the lock; writes happen outside it.
        let snapshot: Vec<(u64, mpsc::Sender<SseFrame>)> = {
            let clients = self.clients.lock().expect("sse registry poisoned");
            match clients.get(task_id) {
                Some(for_task) => for_task.iter().map(|(id, tx)| (*id, tx.clone())).collect(),
                None => return,
            }
        };

        for (client_id, tx) in snapshot {
            if tx.try_send(frame.clone()).is_err() {
                warn!(task_id = %task_id, client_id, "SSE write failed, unregistering client");
                self.unregister(task_id, client_id);
            }
        }
    }

    /// Number of clients currently registered for a task.
    pub fn client_count(&self, task_id: &str) -> usize {
        let clients = self.clients.lock().expect("sse registry poisoned");
        clients.get(task_id).map(|m| m.len()).unwrap_or(0)
    }
}

impl Default for SseClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Webhook delivery
// ---------------------------------------------------------------------------

/// Body POSTed to a webhook target.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload {
    /// The originating event's `kind` discriminator.
    pub event_type: String,
    /// The event in wire (camelCase) form.
    pub event_data: serde_json::Value,
    /// UTC ISO-8601 timestamp of this delivery attempt.
    pub timestamp: String,
    /// 1-based attempt counter; recipients use it (with `timestamp`) to
    /// tolerate reordering between retries and newer events.
    pub attempt: u32,
}

/// Delivery bookkeeping for one `(task_id, config_id)` pair.
#[derive(Debug, Clone)]
pub struct DeliveryState {
    /// Whether deliveries are still attempted for this config.
    pub active: bool,
    /// Consecutive failures since the last success.
    pub retry_count: u32,
    /// Description of the most recent failure.
    pub last_error: Option<String>,
    /// Timestamp of the most recent 2xx response.
    pub last_success_at: Option<String>,
    /// Timestamp of the most recent failure.
    pub last_failure_at: Option<String>,
}

impl Default for DeliveryState {
    fn default() -> Self {
        Self {
            active: true,
            retry_count: 0,
            last_error: None,
            last_success_at: None,
            last_failure_at: None,
        }
    }
}

struct RetryEntry {
    due_at: Instant,
    /// Time of the chain's first attempt; every retry offset is computed
    /// from here, not from the previous attempt's fire time.
    anchor: Instant,
    task_id: String,
    config: PushNotificationConfig,
    event_type: String,
    event_data: serde_json::Value,
    attempt: u32,
}

struct Inner {
    store: Arc<dyn TaskStore>,
    config: ServerConfig,
    client: reqwest::Client,
    sse: SseClientRegistry,
    delivery: Mutex<HashMap<(String, String), DeliveryState>>,
    retry_queue: Mutex<Vec<RetryEntry>>,
}

/// Fan-out hub for webhook and SSE delivery.
///
/// Cheap to clone; clones share delivery state and the retry queue.
#[derive(Clone)]
pub struct PushNotificationManager {
    inner: Arc<Inner>,
}

impl PushNotificationManager {
    /// Create a manager and start its retry-scan worker. The worker exits
    /// when the last manager handle is dropped.
    pub fn new(store: Arc<dyn TaskStore>, config: ServerConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.webhook_timeout())
            .build()
            .expect("failed to build webhook HTTP client");

        let manager = Self {
            inner: Arc::new(Inner {
                store,
                config,
                client,
                sse: SseClientRegistry::new(),
                delivery: Mutex::new(HashMap::new()),
                retry_queue: Mutex::new(Vec::new()),
            }),
        };
        manager.spawn_retry_worker();
        manager
    }

    /// The SSE client registry.
    pub fn sse(&self) -> &SseClientRegistry {
        &self.inner.sse
    }

    /// Delivery bookkeeping for one config, if any deliveries were made.
    pub fn delivery_state(&self, task_id: &str, config_id: &str) -> Option<DeliveryState> {
        let delivery = self.inner.delivery.lock().expect("delivery map poisoned");
        delivery
            .get(&(task_id.to_string(), config_id.to_string()))
            .cloned()
    }

    /// Fan an event out to SSE clients and webhook targets. Never fails;
    /// all delivery errors are absorbed into state and logs.
    pub async fn notify(&self, event: &Event) {
        let Some(task_id) = event.task_id() else {
            return;
        };
        let task_id = task_id.to_string();

        let event_data = match serde_json::to_value(event) {
            Ok(value) => value,
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Failed to serialize event for fan-out");
                return;
            }
        };

        // SSE first: the registry write path is synchronous and cheap.
        self.inner.sse.deliver(
            &task_id,
            SseFrame {
                event: event.kind_str().to_string(),
                data: event_data.to_string(),
            },
        );

        if !self.inner.config.push_notifications_enabled {
            return;
        }

        let configs = match self.inner.store.list_push_configs(&task_id).await {
            Ok(configs) => configs,
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Could not load push configs");
                return;
            }
        };

        for config in configs {
            let Some(config_id) = config.id.clone() else {
                continue;
            };
            if !self.is_active(&task_id, &config_id) {
                continue;
            }
            // Attempts for different configs are independent.
            let manager = self.clone();
            let task_id = task_id.clone();
            let event_type = event.kind_str().to_string();
            let event_data = event_data.clone();
            let anchor = Instant::now();
            tokio::spawn(async move {
                manager
                    .attempt_delivery(task_id, config, event_type, event_data, 1, anchor)
                    .await;
            });
        }
    }

    fn is_active(&self, task_id: &str, config_id: &str) -> bool {
        let delivery = self.inner.delivery.lock().expect("delivery map poisoned");
        delivery
            .get(&(task_id.to_string(), config_id.to_string()))
            .map(|s| s.active)
            .unwrap_or(true)
    }

    async fn attempt_delivery(
        &self,
        task_id: String,
        config: PushNotificationConfig,
        event_type: String,
        event_data: serde_json::Value,
        attempt: u32,
        anchor: Instant,
    ) {
        let config_id = config.id.clone().unwrap_or_default();
        let payload = WebhookPayload {
            event_type: event_type.clone(),
            event_data: event_data.clone(),
            timestamp: Utc::now().to_rfc3339(),
            attempt,
        };

        let mut request = self
            .inner
            .client
            .post(&config.url)
            .header("Content-Type", "application/json")
            .header("User-Agent", concat!("A2A/", env!("CARGO_PKG_VERSION")))
            .header("X-A2A-Task-ID", &task_id)
            .header("X-A2A-Config-ID", &config_id)
            .json(&payload);
        request = apply_authentication(request, &config);

        let outcome = match request.send().await {
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) => Err(format!("webhook returned status {}", response.status())),
            Err(e) => Err(format!("webhook request failed: {}", e)),
        };

        match outcome {
            Ok(()) => {
                debug!(task_id = %task_id, config_id = %config_id, attempt, "Webhook delivered");
                let mut delivery = self.inner.delivery.lock().expect("delivery map poisoned");
                let state = delivery.entry((task_id, config_id)).or_default();
                state.retry_count = 0;
                state.last_error = None;
                state.last_success_at = Some(Utc::now().to_rfc3339());
            }
            Err(reason) => {
                self.record_failure(task_id, config, event_type, event_data, attempt, anchor, reason)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn record_failure(
        &self,
        task_id: String,
        config: PushNotificationConfig,
        event_type: String,
        event_data: serde_json::Value,
        attempt: u32,
        anchor: Instant,
        reason: String,
    ) {
        let config_id = config.id.clone().unwrap_or_default();
        let exhausted = attempt >= self.inner.config.max_webhook_attempts;

        {
            let mut delivery = self.inner.delivery.lock().expect("delivery map poisoned");
            let state = delivery
                .entry((task_id.clone(), config_id.clone()))
                .or_default();
            state.retry_count += 1;
            state.last_error = Some(reason.clone());
            state.last_failure_at = Some(Utc::now().to_rfc3339());
            if exhausted {
                state.active = false;
            }
        }

        if exhausted {
            warn!(
                task_id = %task_id,
                config_id = %config_id,
                attempts = attempt,
                error = %reason,
                "Webhook attempts exhausted, marking config inactive"
            );
            return;
        }

        let offset = self.retry_offset(attempt);
        debug!(
            task_id = %task_id,
            config_id = %config_id,
            attempt,
            offset_ms = offset.as_millis() as u64,
            error = %reason,
            "Webhook delivery failed, scheduling retry"
        );
        let entry = RetryEntry {
            due_at: anchor + offset,
            anchor,
            task_id,
            config,
            event_type,
            event_data,
            attempt: attempt + 1,
        };
        let mut queue = self.inner.retry_queue.lock().expect("retry queue poisoned");
        queue.push(entry);
    }

    /// Offset of the next retry from the chain's first attempt:
    /// `min(base * 2^(attempt-1), cap)` plus `uniform(0, 0.1 * offset)`
    /// jitter. Anchoring to the first attempt keeps the absolute schedule
    /// at t0+1 s, t0+2 s, t0+4 s, t0+8 s rather than compounding the
    /// delays.
    fn retry_offset(&self, attempt: u32) -> Duration {
        let base = self.inner.config.retry_base_seconds;
        let cap = self.inner.config.retry_max_seconds;
        let delay = (base * 2f64.powi(attempt.saturating_sub(1) as i32)).min(cap);
        let jitter_max = 0.1 * delay;
        let jitter = if jitter_max > 0.0 {
            rand::thread_rng().gen_range(0.0..jitter_max)
        } else {
            0.0
        };
        Duration::from_secs_f64(delay + jitter)
    }

    fn spawn_retry_worker(&self) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(1));
            loop {
                tick.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let now = Instant::now();
                // Swap due entries out atomically; the rest go back.
                let due: Vec<RetryEntry> = {
                    let mut queue = inner.retry_queue.lock().expect("retry queue poisoned");
                    let (ready, pending): (Vec<_>, Vec<_>) =
                        queue.drain(..).partition(|e| e.due_at <= now);
                    *queue = pending;
                    ready
                };
                for entry in due {
                    let manager = PushNotificationManager {
                        inner: Arc::clone(&inner),
                    };
                    tokio::spawn(async move {
                        manager
                            .attempt_delivery(
                                entry.task_id,
                                entry.config,
                                entry.event_type,
                                entry.event_data,
                                entry.attempt,
                                entry.anchor,
                            )
                            .await;
                    });
                }
            }
        });
    }
}

fn apply_authentication(
    mut request: reqwest::RequestBuilder,
    config: &PushNotificationConfig,
) -> reqwest::RequestBuilder {
    // The verification token wins over the authentication block.
    if let Some(ref token) = config.token {
        return request.bearer_auth(token);
    }
    match &config.authentication {
        Some(PushAuthentication::Bearer { token }) => request.bearer_auth(token),
        Some(PushAuthentication::Basic { username, password }) => {
            request.basic_auth(username, Some(password))
        }
        Some(PushAuthentication::ApiKey { header_name, key }) => request.header(header_name, key),
        Some(PushAuthentication::Custom { headers }) => {
            for (name, value) in headers {
                request = request.header(name, value);
            }
            request
        }
        None => request,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::task_store::InMemoryTaskStore;

    fn manager_with_config(config: ServerConfig) -> PushNotificationManager {
        PushNotificationManager::new(Arc::new(InMemoryTaskStore::new()), config)
    }

    #[tokio::test]
    async fn retry_offsets_double_from_the_anchor_and_cap() {
        let manager = manager_with_config(ServerConfig::default());
        // Jitter adds at most 10%, so check the [offset, 1.1 * offset) band.
        for (attempt, expected) in [(1u32, 1.0f64), (2, 2.0), (3, 4.0), (4, 8.0), (7, 60.0)] {
            let offset = manager.retry_offset(attempt).as_secs_f64();
            assert!(
                offset >= expected && offset < expected * 1.1 + 1e-9,
                "attempt {}: got {}, expected [{}, {})",
                attempt,
                offset,
                expected,
                expected * 1.1
            );
        }
    }

    /// Retries are due at `anchor + offset`, not at failure time + offset:
    /// a failure recorded late in the chain must not push the schedule out.
    #[tokio::test]
    async fn record_failure_schedules_from_the_anchor() {
        let manager = manager_with_config(ServerConfig::default());
        let anchor = Instant::now();
        let config = PushNotificationConfig {
            id: Some("cfg1".to_string()),
            url: "https://unreachable.example/hook".to_string(),
            token: None,
            authentication: None,
        };

        // Pretend the second attempt just failed, long after the anchor.
        tokio::time::sleep(Duration::from_millis(50)).await;
        manager.record_failure(
            "t1".to_string(),
            config,
            "status-update".to_string(),
            serde_json::json!({}),
            2,
            anchor,
            "webhook returned status 500".to_string(),
        );

        let queue = manager.inner.retry_queue.lock().unwrap();
        let entry = queue.first().expect("retry scheduled");
        assert_eq!(entry.attempt, 3);
        let offset = entry.due_at.duration_since(anchor).as_secs_f64();
        // Second-failure offset is 2 s (+≤10% jitter) from the anchor, even
        // though the failure itself landed 50 ms later.
        assert!(
            (2.0..2.3).contains(&offset),
            "due offset from anchor was {}",
            offset
        );
    }

    #[tokio::test]
    async fn sse_registry_register_deliver_unregister() {
        let registry = SseClientRegistry::new();
        let (id_a, mut rx_a) = registry.register("t1");
        let (_id_b, mut rx_b) = registry.register("t1");
        assert_eq!(registry.client_count("t1"), 2);

        let frame = SseFrame {
            event: "status-update".to_string(),
            data: "{}".to_string(),
        };
        registry.deliver("t1", frame.clone());
        assert_eq!(rx_a.recv().await.unwrap(), frame);
        assert_eq!(rx_b.recv().await.unwrap(), frame);

        registry.unregister("t1", id_a);
        assert_eq!(registry.client_count("t1"), 1);
    }

    #[tokio::test]
    async fn failed_sse_write_unregisters_only_that_client() {
        let registry = SseClientRegistry::new();
        let (_dead_id, dead_rx) = registry.register("t1");
        drop(dead_rx);
        let (_live_id, mut live_rx) = registry.register("t1");

        let frame = SseFrame {
            event: "task".to_string(),
            data: "{}".to_string(),
        };
        registry.deliver("t1", frame.clone());

        assert_eq!(registry.client_count("t1"), 1);
        assert_eq!(live_rx.recv().await.unwrap(), frame);
    }

    #[tokio::test]
    async fn delivery_to_unknown_task_is_a_no_op() {
        let registry = SseClientRegistry::new();
        registry.deliver(
            "nobody",
            SseFrame {
                event: "task".to_string(),
                data: "{}".to_string(),
            },
        );
        assert_eq!(registry.client_count("nobody"), 0);
    }

    #[test]
    fn sse_frame_wire_rendering() {
        let frame = SseFrame {
            event: "status-update".to_string(),
            data: r#"{"x":1}"#.to_string(),
        };
        assert_eq!(frame.render(), "event: status-update\ndata: {\"x\":1}\n\n");
    }

    #[test]
    fn webhook_payload_field_names() {
        let payload = WebhookPayload {
            event_type: "status-update".to_string(),
            event_data: serde_json::json!({"taskId": "t1"}),
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            attempt: 2,
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["event_type"], "status-update");
        assert_eq!(value["event_data"]["taskId"], "t1");
        assert_eq!(value["attempt"], 2);
        assert!(value["timestamp"].is_string());
    }

    #[tokio::test]
    async fn unknown_config_defaults_to_active() {
        let manager = manager_with_config(ServerConfig::default());
        assert!(manager.is_active("t1", "cfg1"));
        assert!(manager.delivery_state("t1", "cfg1").is_none());
    }
}
