//! Request handler — binds JSON-RPC methods to executor invocations.
//!
//! [`DefaultRequestHandler`] wires together the [`AgentExecutor`], the
//! [`TaskStore`], the [`TaskManager`], and the [`PushNotificationManager`]:
//!
//! 1. `message/send` / `message/stream` resolve (or create) the task, attach
//!    the task manager to a fresh event queue, publish the task snapshot as
//!    the first frame, and spawn the executor on a separate worker.
//! 2. Blocking sends await the terminal event with a bounded wait (timeout
//!    returns the task in its current state, not an error); streaming
//!    methods hand an [`EventStream`] to the HTTP layer.
//! 3. `tasks/resubscribe` registers an SSE client with the push manager so
//!    a reconnecting caller observes live events without owning the
//!    original request's queue.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::error::{A2AError, A2AResult};
use crate::types::{
    AgentCard, CompletionResult, DeletePushConfigParams, Event, GetPushConfigParams,
    GetTaskParams, Message, PushNotificationConfig, SendMessageParams, SendMessageResult, Task,
    TaskIdParams, TaskPushNotificationConfig, TaskState, TaskStatus, TaskStatusUpdateEvent,
};

use super::capabilities::{CapabilityRegistry, CAP_PUSH_NOTIFICATIONS, CAP_STREAMING};
use super::event_queue::{EventConsumer, EventFilter, EventQueue};
use super::executor::{AgentExecutor, RequestContext, ServerCallContext};
use super::push_notifications::{PushNotificationManager, SseFrame};
use super::task_manager::TaskManager;
use super::task_store::TaskStore;

// ---------------------------------------------------------------------------
// Event streams handed to the HTTP layer
// ---------------------------------------------------------------------------

/// Unregisters an SSE client when the stream is dropped, so client
/// disconnects cannot leak registry entries.
struct SseClientGuard {
    push: PushNotificationManager,
    task_id: String,
    client_id: u64,
}

impl Drop for SseClientGuard {
    fn drop(&mut self) {
        self.push.sse().unregister(&self.task_id, self.client_id);
    }
}

enum StreamSource {
    /// No live source; only the initial frames are replayed.
    Closed,
    /// Events from the request's own queue (`message/stream`).
    Queue(EventConsumer),
    /// Frames from the push manager's SSE registry (`tasks/resubscribe`).
    Registry {
        rx: mpsc::Receiver<SseFrame>,
        _guard: SseClientGuard,
    },
}

/// Ordered event source for a streaming response: buffered initial frames
/// first, then live events until end-of-stream.
pub struct EventStream {
    initial: VecDeque<Event>,
    source: StreamSource,
}

impl EventStream {
    /// Next event, or `None` at end-of-stream. The caller decides when to
    /// stop (on [`Event::is_final`]) and how to frame the wire response.
    pub async fn next_event(&mut self) -> Option<Event> {
        if let Some(event) = self.initial.pop_front() {
            return Some(event);
        }
        match &mut self.source {
            StreamSource::Closed => None,
            StreamSource::Queue(consumer) => consumer.next_event().await,
            StreamSource::Registry { rx, .. } => loop {
                let frame = rx.recv().await?;
                match serde_json::from_str::<Event>(&frame.data) {
                    Ok(event) => return Some(event),
                    Err(e) => {
                        warn!(error = %e, "Skipping undecodable SSE frame");
                    }
                }
            },
        }
    }
}

// ---------------------------------------------------------------------------
// RequestHandler trait
// ---------------------------------------------------------------------------

/// Method-level contract the HTTP entrypoint dispatches to.
///
/// Expected domain errors are returned as [`A2AError`] and become JSON-RPC
/// error envelopes (still HTTP 200) upstream.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// `message/send` — blocking by default, bounded by the configured
    /// sync-send timeout.
    async fn on_message_send(
        &self,
        params: SendMessageParams,
        call: ServerCallContext,
    ) -> A2AResult<SendMessageResult>;

    /// `message/stream` — never blocks; events until terminal.
    async fn on_message_stream(
        &self,
        params: SendMessageParams,
        call: ServerCallContext,
    ) -> A2AResult<EventStream>;

    /// `tasks/get`.
    async fn on_get_task(&self, params: GetTaskParams) -> A2AResult<Task>;

    /// `tasks/cancel`.
    async fn on_cancel_task(&self, params: TaskIdParams) -> A2AResult<Task>;

    /// `tasks/resubscribe` — current state as the first frame, then live
    /// events until terminal.
    async fn on_resubscribe(&self, params: TaskIdParams) -> A2AResult<EventStream>;

    /// `tasks/pushNotificationConfig/set`.
    async fn on_set_push_config(
        &self,
        params: TaskPushNotificationConfig,
    ) -> A2AResult<TaskPushNotificationConfig>;

    /// `tasks/pushNotificationConfig/get`.
    async fn on_get_push_config(
        &self,
        params: GetPushConfigParams,
    ) -> A2AResult<TaskPushNotificationConfig>;

    /// `tasks/pushNotificationConfig/list`.
    async fn on_list_push_configs(
        &self,
        params: TaskIdParams,
    ) -> A2AResult<Vec<PushNotificationConfig>>;

    /// `tasks/pushNotificationConfig/delete`.
    async fn on_delete_push_config(&self, params: DeletePushConfigParams) -> A2AResult<()>;

    /// `agent/getCard`.
    async fn on_get_card(&self) -> A2AResult<AgentCard>;

    /// `agent/getAuthenticatedExtendedCard`.
    async fn on_get_extended_card(&self, call: ServerCallContext) -> A2AResult<AgentCard>;
}

// ---------------------------------------------------------------------------
// DefaultRequestHandler
// ---------------------------------------------------------------------------

struct RunningAgent {
    queue: EventQueue,
    cancellation: CancellationToken,
}

/// Standard [`RequestHandler`] implementation.
pub struct DefaultRequestHandler {
    executor: Arc<dyn AgentExecutor>,
    store: Arc<dyn TaskStore>,
    manager: TaskManager,
    push: PushNotificationManager,
    capabilities: Arc<CapabilityRegistry>,
    config: ServerConfig,
    card: AgentCard,
    extended_card: Option<AgentCard>,
    running: Arc<Mutex<HashMap<String, RunningAgent>>>,
}

impl DefaultRequestHandler {
    /// Wire up a handler: builds the push manager and task manager over the
    /// store and seeds the agent's capability registry from configuration.
    pub fn new(
        executor: Arc<dyn AgentExecutor>,
        store: Arc<dyn TaskStore>,
        card: AgentCard,
        config: ServerConfig,
    ) -> Self {
        let push = PushNotificationManager::new(Arc::clone(&store), config.clone());
        let manager = TaskManager::new(Arc::clone(&store), push.clone());
        let capabilities = CapabilityRegistry::for_agent(&card.name);
        capabilities.seed_from_config(&config);
        Self {
            executor,
            store,
            manager,
            push,
            capabilities,
            config,
            card,
            extended_card: None,
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Configure the card served to authenticated callers of
    /// `agent/getAuthenticatedExtendedCard`.
    pub fn with_extended_card(mut self, card: AgentCard) -> Self {
        self.extended_card = Some(card);
        self
    }

    /// The task manager (exposed for embedders and tests).
    pub fn manager(&self) -> &TaskManager {
        &self.manager
    }

    /// The push-notification manager (exposed for embedders and tests).
    pub fn push(&self) -> &PushNotificationManager {
        &self.push
    }

    /// Resolve the target task for a send: load-and-extend an existing task
    /// or create a fresh one with generated identifiers.
    async fn resolve_task(&self, params: &SendMessageParams) -> A2AResult<Task> {
        params
            .message
            .validate()
            .map_err(A2AError::invalid_params)?;

        let explicit_task_id = params
            .task_id
            .clone()
            .or_else(|| params.message.task_id.clone());

        if let Some(task_id) = explicit_task_id {
            let task = self
                .store
                .get_task(&task_id, None)
                .await?
                .ok_or_else(|| A2AError::task_not_found(&task_id))?;
            if task.status.state.is_terminal() {
                return Err(A2AError::invalid_task_state(format!(
                    "task {} is {} and accepts no further messages",
                    task_id, task.status.state
                )));
            }
            self.store
                .append_message(&task_id, params.message.clone())
                .await?;
            return self
                .store
                .get_task(&task_id, None)
                .await?
                .ok_or_else(|| A2AError::task_not_found(&task_id));
        }

        let context_id = params
            .context_id
            .clone()
            .or_else(|| params.message.context_id.clone());
        let (task_id, context_id) = TaskManager::resolve_ids(None, context_id);
        self.manager
            .create_task(task_id, context_id, &params.message, params.metadata.clone())
            .await
    }

    /// Build the queue for a request, attach the task manager, take the
    /// caller's subscription, publish the task snapshot as the first frame,
    /// and spawn the executor on its own worker.
    async fn launch_executor(
        &self,
        task: &Task,
        message: Message,
        metadata: Option<serde_json::Value>,
        call: ServerCallContext,
    ) -> A2AResult<EventConsumer> {
        let queue = EventQueue::new(
            self.config.event_queue_capacity,
            self.config.idle_write_timeout(),
        );
        self.manager.attach(&queue).await;
        let consumer = queue.subscribe(EventFilter::for_task(&task.id)).await;

        // Identifiers reach the caller in the first response frame.
        queue.publish(Event::Task(task.clone())).await?;

        let cancellation = CancellationToken::new();
        {
            let mut running = self.running.lock().await;
            running.insert(
                task.id.clone(),
                RunningAgent {
                    queue: queue.clone(),
                    cancellation: cancellation.clone(),
                },
            );
        }

        let context = RequestContext {
            task_id: task.id.clone(),
            context_id: task.context_id.clone(),
            message: Some(message),
            task: Some(task.clone()),
            metadata,
            cancellation,
            call,
        };

        let executor = Arc::clone(&self.executor);
        let running = Arc::clone(&self.running);
        let task_id = task.id.clone();
        let context_id = task.context_id.clone();
        tokio::spawn(async move {
            if let Err(e) = executor.execute(context, queue.clone()).await {
                error!(task_id = %task_id, error = %e, "Agent execution failed");
                // An executor error becomes a failed status carrying its
                // message. The manager drops it if a terminal state was
                // already recorded.
                let failed = Event::StatusUpdate(TaskStatusUpdateEvent {
                    task_id: task_id.clone(),
                    context_id,
                    kind: "status-update".to_string(),
                    status: TaskStatus::new(TaskState::Failed).with_error(
                        crate::types::StatusError {
                            kind: "executor_error".to_string(),
                            message: e.to_string(),
                            details: None,
                        },
                    ),
                    r#final: true,
                    metadata: None,
                });
                if let Err(publish_err) = queue.publish(failed).await {
                    warn!(task_id = %task_id, error = %publish_err, "Could not publish failure status");
                }
            }
            // The queue is released on every exit path: subscribers drain
            // buffered events and then observe end-of-stream.
            queue.close().await;
            running.lock().await.remove(&task_id);
        });

        Ok(consumer)
    }

    /// Await the terminal event with a bounded wait and shape the response.
    async fn await_terminal(
        &self,
        task: &Task,
        mut consumer: EventConsumer,
        history_length: Option<usize>,
    ) -> A2AResult<SendMessageResult> {
        let deadline = Instant::now() + self.config.sync_send_timeout();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let event = match tokio::time::timeout(remaining, consumer.next_event()).await {
                Ok(Some(event)) => event,
                // Queue closed without a terminal event, or the wait
                // expired: the current state is the answer, not an error.
                Ok(None) | Err(_) => {
                    let current = self.current_task(task, history_length, None).await;
                    return Ok(SendMessageResult::Task(current));
                }
            };

            if !event.is_final() {
                continue;
            }

            return match event {
                Event::Message(message) => Ok(SendMessageResult::Message(message)),
                Event::StatusUpdate(update) => {
                    let status = update.status;
                    match status.state {
                        TaskState::Completed if status.result.is_some() => {
                            Ok(SendMessageResult::Completion(CompletionResult {
                                task_id: task.id.clone(),
                                context_id: task.context_id.clone(),
                                result: status.result.unwrap_or_default(),
                            }))
                        }
                        TaskState::Failed => {
                            let current =
                                self.current_task(task, history_length, Some(status.clone())).await;
                            let message = status
                                .error
                                .as_ref()
                                .map(|e| e.message.clone())
                                .unwrap_or_else(|| "agent execution failed".to_string());
                            let data = serde_json::to_value(&current).unwrap_or_default();
                            Err(A2AError::internal(message).with_data(data))
                        }
                        _ => {
                            let current =
                                self.current_task(task, history_length, Some(status)).await;
                            Ok(SendMessageResult::Task(current))
                        }
                    }
                }
                Event::Task(final_task) => Ok(SendMessageResult::Task(final_task)),
                Event::ArtifactUpdate(_) => continue,
            };
        }
    }

    /// Read the task back from the store, tolerating store lag by patching
    /// in the status just observed on the event stream.
    async fn current_task(
        &self,
        fallback: &Task,
        history_length: Option<usize>,
        observed_status: Option<TaskStatus>,
    ) -> Task {
        let mut task = match self.store.get_task(&fallback.id, history_length).await {
            Ok(Some(task)) => task,
            _ => fallback.clone(),
        };
        if let Some(status) = observed_status {
            task.status = status;
        }
        task
    }

    fn require_streaming(&self) -> A2AResult<()> {
        if self.capabilities.get(CAP_STREAMING) {
            Ok(())
        } else {
            Err(A2AError::capability_unsupported(
                "streaming is disabled for this agent",
            ))
        }
    }

    fn require_push_notifications(&self) -> A2AResult<()> {
        if self.capabilities.get(CAP_PUSH_NOTIFICATIONS) {
            Ok(())
        } else {
            Err(A2AError::capability_unsupported(
                "push notifications are disabled for this agent",
            ))
        }
    }

    async fn require_task(&self, task_id: &str) -> A2AResult<Task> {
        self.store
            .get_task(task_id, None)
            .await?
            .ok_or_else(|| A2AError::task_not_found(task_id))
    }
}

#[async_trait]
impl RequestHandler for DefaultRequestHandler {
    async fn on_message_send(
        &self,
        params: SendMessageParams,
        call: ServerCallContext,
    ) -> A2AResult<SendMessageResult> {
        let task = self.resolve_task(&params).await?;
        let consumer = self
            .launch_executor(&task, params.message.clone(), params.metadata.clone(), call)
            .await?;

        let blocking = params.blocking.unwrap_or(true);
        if !blocking {
            debug!(task_id = %task.id, "Non-blocking send, returning current task");
            let current = self.current_task(&task, params.history_length, None).await;
            return Ok(SendMessageResult::Task(current));
        }

        self.await_terminal(&task, consumer, params.history_length)
            .await
    }

    async fn on_message_stream(
        &self,
        params: SendMessageParams,
        call: ServerCallContext,
    ) -> A2AResult<EventStream> {
        self.require_streaming()?;
        let task = self.resolve_task(&params).await?;
        let consumer = self
            .launch_executor(&task, params.message.clone(), params.metadata.clone(), call)
            .await?;
        Ok(EventStream {
            initial: VecDeque::new(),
            source: StreamSource::Queue(consumer),
        })
    }

    async fn on_get_task(&self, params: GetTaskParams) -> A2AResult<Task> {
        self.store
            .get_task(&params.id, params.history_length)
            .await?
            .ok_or_else(|| A2AError::task_not_found(&params.id))
    }

    async fn on_cancel_task(&self, params: TaskIdParams) -> A2AResult<Task> {
        let task = self.require_task(&params.id).await?;
        if !task.status.state.is_cancelable() {
            return Err(A2AError::task_not_cancelable(format!(
                "task {} is {}",
                params.id, task.status.state
            )));
        }

        // Reuse the running executor's queue so the canceled status flows
        // through the same pipeline; a task with no live executor gets a
        // fresh managed queue.
        let running_agent = {
            let running = self.running.lock().await;
            running
                .get(&params.id)
                .map(|agent| (agent.queue.clone(), agent.cancellation.clone()))
        };
        let (queue, cancellation) = match running_agent {
            Some((queue, cancellation)) => (queue, Some(cancellation)),
            None => {
                let queue = EventQueue::new(
                    self.config.event_queue_capacity,
                    self.config.idle_write_timeout(),
                );
                self.manager.attach(&queue).await;
                (queue, None)
            }
        };

        let context = RequestContext {
            task_id: task.id.clone(),
            context_id: task.context_id.clone(),
            message: None,
            task: Some(task.clone()),
            metadata: None,
            cancellation: CancellationToken::new(),
            call: ServerCallContext::default(),
        };
        // The canceled status is published before the cooperative signal
        // fires, so the executor cannot close the queue under it.
        if let Err(e) = self.executor.cancel(context, queue).await {
            warn!(task_id = %params.id, error = %e, "Executor cancel reported an error");
        }
        if let Some(cancellation) = cancellation {
            cancellation.cancel();
        }

        // Grace period for the canceled status to land in the store.
        let deadline = Instant::now() + self.config.cancel_grace();
        loop {
            let current = self.require_task(&params.id).await?;
            if current.status.state == TaskState::Canceled || Instant::now() >= deadline {
                return Ok(current);
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }

    async fn on_resubscribe(&self, params: TaskIdParams) -> A2AResult<EventStream> {
        self.require_streaming()?;
        // Register with the SSE fan-out before reading the snapshot so no
        // event published in between is missed.
        let (client_id, rx) = self.push.sse().register(&params.id);
        let guard = SseClientGuard {
            push: self.push.clone(),
            task_id: params.id.clone(),
            client_id,
        };

        let task = match self.require_task(&params.id).await {
            Ok(task) => task,
            Err(e) => return Err(e), // guard unregisters on drop
        };

        let terminal = task.status.state.is_terminal();
        let mut initial = VecDeque::new();
        initial.push_back(Event::Task(task));

        Ok(EventStream {
            initial,
            source: if terminal {
                StreamSource::Closed
            } else {
                StreamSource::Registry { rx, _guard: guard }
            },
        })
    }

    async fn on_set_push_config(
        &self,
        mut params: TaskPushNotificationConfig,
    ) -> A2AResult<TaskPushNotificationConfig> {
        self.require_push_notifications()?;
        self.require_task(&params.task_id).await?;
        params
            .push_notification_config
            .validate()
            .map_err(A2AError::invalid_params)?;
        if params.push_notification_config.id.is_none() {
            params.push_notification_config.id = Some(Uuid::new_v4().to_string());
        }
        self.store.save_push_config(params.clone()).await?;
        debug!(
            task_id = %params.task_id,
            config_id = ?params.push_notification_config.id,
            "Push config saved"
        );
        Ok(params)
    }

    async fn on_get_push_config(
        &self,
        params: GetPushConfigParams,
    ) -> A2AResult<TaskPushNotificationConfig> {
        self.require_push_notifications()?;
        self.require_task(&params.id).await?;
        let config = self
            .store
            .get_push_config(&params.id, params.push_notification_config_id.as_deref())
            .await?
            .ok_or_else(|| {
                A2AError::task_not_found(format!(
                    "no push notification config for task {}",
                    params.id
                ))
            })?;
        Ok(TaskPushNotificationConfig {
            task_id: params.id,
            push_notification_config: config,
        })
    }

    async fn on_list_push_configs(
        &self,
        params: TaskIdParams,
    ) -> A2AResult<Vec<PushNotificationConfig>> {
        self.require_push_notifications()?;
        self.require_task(&params.id).await?;
        self.store.list_push_configs(&params.id).await
    }

    async fn on_delete_push_config(&self, params: DeletePushConfigParams) -> A2AResult<()> {
        self.require_push_notifications()?;
        self.require_task(&params.id).await?;
        let removed = self
            .store
            .delete_push_config(&params.id, &params.push_notification_config_id)
            .await?;
        if removed {
            Ok(())
        } else {
            Err(A2AError::task_not_found(format!(
                "no push notification config {} for task {}",
                params.push_notification_config_id, params.id
            )))
        }
    }

    async fn on_get_card(&self) -> A2AResult<AgentCard> {
        Ok(self.card.clone())
    }

    async fn on_get_extended_card(&self, call: ServerCallContext) -> A2AResult<AgentCard> {
        if !call.is_authenticated() {
            return Err(A2AError::auth_required(
                "the extended card requires an authenticated caller",
            ));
        }
        if !self
            .card
            .supports_authenticated_extended_card
            .unwrap_or(false)
        {
            return Err(A2AError::capability_unsupported(
                "this agent does not serve an extended card",
            ));
        }
        self.extended_card.clone().ok_or_else(|| {
            A2AError::capability_unsupported("no extended card is configured")
        })
    }
}
