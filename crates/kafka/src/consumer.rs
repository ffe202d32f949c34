//! Typed consumer: framed records → mutation callbacks.
//!
//! ```text
//! Created -> Subscribing -> Polling <-> Dispatching -> Stopping -> Stopped
//! ```
//!
//! [`TypedConsumer::start`] subscribes and moves the poll loop onto its own
//! tokio task. Each polled message is framed, resolved against the schema
//! repository, decoded and handed to the callback registered for its
//! operation kind, in the order the transport delivered it. A message that
//! cannot be decoded or resolved is logged and skipped; a failing callback is
//! logged and counted. Neither stops the loop. Offsets are committed after
//! every batch, so delivery is at-least-once.

use crate::config::ConsumerConfig;
use crate::error::{Error, Result};
use crate::transport::{FrameSource, RawMessage, Subscriber};
use mutation_types::{
    frame, reverse, DeleteMutation, InsertMutation, Mutation, SchemaRepository, UpdateMutation,
};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Lifecycle of a typed consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Created,
    Subscribing,
    Polling,
    Dispatching,
    Stopping,
    Stopped,
}

impl fmt::Display for ConsumerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConsumerState::Created => "created",
            ConsumerState::Subscribing => "subscribing",
            ConsumerState::Polling => "polling",
            ConsumerState::Dispatching => "dispatching",
            ConsumerState::Stopping => "stopping",
            ConsumerState::Stopped => "stopped",
        };
        write!(f, "{name}")
    }
}

/// What the loop does after a callback returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Finish the current batch, commit it, then stop.
    StopAfterBatch,
}

impl From<bool> for Flow {
    /// `true` keeps consuming.
    fn from(keep_going: bool) -> Self {
        if keep_going {
            Flow::Continue
        } else {
            Flow::StopAfterBatch
        }
    }
}

/// Counters reported when the consumer completes.
///
/// Every polled message lands in exactly one of `dispatched`, `skipped` and
/// `callback_failures`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub batches: u64,
    pub dispatched: u64,
    pub skipped: u64,
    pub callback_failures: u64,
}

type Callback<T> = Box<dyn FnMut(T) -> anyhow::Result<Flow> + Send>;

#[derive(Default)]
struct Callbacks {
    insert: Option<Callback<InsertMutation>>,
    update: Option<Callback<UpdateMutation>>,
    delete: Option<Callback<DeleteMutation>>,
}

impl Callbacks {
    fn call(&mut self, mutation: Mutation) -> anyhow::Result<Flow> {
        // Kinds without a callback are acknowledged and dropped
        match mutation {
            Mutation::Insert(m) => self.insert.as_mut().map_or(Ok(Flow::Continue), |cb| cb(m)),
            Mutation::Update(m) => self.update.as_mut().map_or(Ok(Flow::Continue), |cb| cb(m)),
            Mutation::Delete(m) => self.delete.as_mut().map_or(Ok(Flow::Continue), |cb| cb(m)),
        }
    }
}

/// Builder for a consumer of one table topic.
pub struct TypedConsumer<S> {
    subscriber: S,
    repository: Arc<SchemaRepository>,
    config: ConsumerConfig,
    callbacks: Callbacks,
}

impl<S: Subscriber> TypedConsumer<S> {
    pub fn new(subscriber: S, repository: Arc<SchemaRepository>, config: ConsumerConfig) -> Self {
        Self {
            subscriber,
            repository,
            config,
            callbacks: Callbacks::default(),
        }
    }

    pub fn on_insert<F>(mut self, callback: F) -> Self
    where
        F: FnMut(InsertMutation) -> anyhow::Result<Flow> + Send + 'static,
    {
        self.callbacks.insert = Some(Box::new(callback));
        self
    }

    pub fn on_update<F>(mut self, callback: F) -> Self
    where
        F: FnMut(UpdateMutation) -> anyhow::Result<Flow> + Send + 'static,
    {
        self.callbacks.update = Some(Box::new(callback));
        self
    }

    pub fn on_delete<F>(mut self, callback: F) -> Self
    where
        F: FnMut(DeleteMutation) -> anyhow::Result<Flow> + Send + 'static,
    {
        self.callbacks.delete = Some(Box::new(callback));
        self
    }

    /// Subscribe and spawn the poll loop.
    ///
    /// A subscription failure is returned here as
    /// [`Error::SubscriptionFailed`]; nothing is spawned in that case.
    pub async fn start(self) -> Result<ConsumerHandle> {
        let (state, state_rx) = watch::channel(ConsumerState::Created);
        let topic = self.config.topic.clone();
        let group_id = self.config.group_id.clone();

        if self.config.batch_size == 0 {
            return Err(Error::InvalidConfig(
                "batch_size must be at least 1".to_string(),
            ));
        }

        state.send_replace(ConsumerState::Subscribing);
        let source = match self.subscriber.subscribe(&topic, &group_id).await {
            Ok(source) => source,
            Err(e) => {
                state.send_replace(ConsumerState::Stopped);
                return Err(Error::SubscriptionFailed {
                    topic,
                    group_id,
                    source: Box::new(e),
                });
            }
        };
        info!("Consumer group '{}' subscribed to topic '{}'", group_id, topic);

        let cancel = CancellationToken::new();
        let poll_loop = PollLoop {
            source,
            repository: self.repository,
            config: self.config,
            callbacks: self.callbacks,
            state,
            cancel: cancel.clone(),
            stats: ConsumerStats::default(),
        };

        Ok(ConsumerHandle {
            cancel,
            state: state_rx,
            task: tokio::spawn(poll_loop.run()),
        })
    }
}

/// Control over a started consumer.
pub struct ConsumerHandle {
    cancel: CancellationToken,
    state: watch::Receiver<ConsumerState>,
    task: JoinHandle<Result<ConsumerStats>>,
}

impl ConsumerHandle {
    /// Ask the loop to stop at the next batch boundary. Idempotent.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// A token that stops the consumer when cancelled, e.g. from a signal
    /// handler.
    pub fn stop_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> ConsumerState {
        *self.state.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait until the consumer reaches `target`.
    pub async fn wait_for_state(&self, target: ConsumerState) -> Result<()> {
        let mut state = self.state.clone();
        state
            .wait_for(|current| *current == target)
            .await
            .map(|_| ())
            .map_err(|_| Error::Consumer(format!("Consumer exited before reaching {target}")))
    }

    /// Wait for the loop to finish.
    ///
    /// Resolves with the stats once the consumer stopped, or with the fatal
    /// error that ended it.
    pub async fn join(self) -> Result<ConsumerStats> {
        self.task
            .await
            .map_err(|e| Error::Consumer(format!("Consumer task failed: {e}")))?
    }

    pub async fn stop_and_join(self) -> Result<ConsumerStats> {
        self.stop();
        self.join().await
    }
}

struct PollLoop {
    source: Box<dyn FrameSource>,
    repository: Arc<SchemaRepository>,
    config: ConsumerConfig,
    callbacks: Callbacks,
    state: watch::Sender<ConsumerState>,
    cancel: CancellationToken,
    stats: ConsumerStats,
}

impl PollLoop {
    async fn run(mut self) -> Result<ConsumerStats> {
        let result = self.poll_until_stopped().await;

        self.state.send_replace(ConsumerState::Stopping);
        if let Err(e) = self.source.unsubscribe().await {
            warn!("Failed to unsubscribe from '{}': {}", self.config.topic, e);
        }
        self.state.send_replace(ConsumerState::Stopped);

        match result {
            Ok(()) => {
                info!(
                    topic = %self.config.topic,
                    batches = self.stats.batches,
                    dispatched = self.stats.dispatched,
                    skipped = self.stats.skipped,
                    callback_failures = self.stats.callback_failures,
                    "Consumer stopped"
                );
                Ok(self.stats)
            }
            Err(e) => {
                tracing::error!("Consumer on '{}' failed: {}", self.config.topic, e);
                Err(e)
            }
        }
    }

    async fn poll_until_stopped(&mut self) -> Result<()> {
        loop {
            if self.cancel.is_cancelled() {
                debug!("Stop requested for consumer on '{}'", self.config.topic);
                return Ok(());
            }

            self.state.send_replace(ConsumerState::Polling);
            let batch = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    // Messages already received by the poll are dropped
                    // uncommitted and redelivered to the group
                    debug!(
                        "Stop requested while polling '{}', abandoning in-flight poll",
                        self.config.topic
                    );
                    return Ok(());
                }
                batch = self.source.poll_batch(self.config.batch_size, self.config.poll_timeout) => batch?,
            };

            if batch.is_empty() {
                continue;
            }

            self.stats.batches += 1;
            self.state.send_replace(ConsumerState::Dispatching);

            let mut stop_after_batch = false;
            for message in &batch {
                if self.handle(message) == Flow::StopAfterBatch {
                    stop_after_batch = true;
                }
            }

            self.source.commit(&batch).await?;

            if stop_after_batch {
                info!(
                    "Callback asked consumer on '{}' to stop after batch",
                    self.config.topic
                );
                return Ok(());
            }
        }
    }

    fn handle(&mut self, message: &RawMessage) -> Flow {
        match self.decode(message) {
            Ok(mutation) => self.dispatch(mutation),
            Err(e) => {
                warn!(
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    "Skipping message: {}",
                    e
                );
                self.stats.skipped += 1;
                Flow::Continue
            }
        }
    }

    fn decode(&self, message: &RawMessage) -> Result<Mutation> {
        let deserialization_failed = |source| Error::DeserializationFailed {
            topic: message.topic.clone(),
            partition: message.partition,
            offset: message.offset,
            source,
        };

        let frame = frame::decode(&message.payload).map_err(deserialization_failed)?;
        let registered =
            self.repository
                .schema_for(frame.schema_id)
                .map_err(|source| Error::UnresolvedSchema {
                    schema_id: frame.schema_id,
                    source,
                })?;

        reverse::decode_mutation(registered.subject.kind, &registered.schema, frame.body)
            .map_err(deserialization_failed)
    }

    fn dispatch(&mut self, mutation: Mutation) -> Flow {
        let subject = mutation.subject();
        let callbacks = &mut self.callbacks;

        let message = match panic::catch_unwind(AssertUnwindSafe(|| callbacks.call(mutation))) {
            Ok(Ok(flow)) => {
                self.stats.dispatched += 1;
                return flow;
            }
            Ok(Err(e)) => format!("{e:#}"),
            Err(payload) => format!("callback panicked: {}", panic_message(payload.as_ref())),
        };

        let err = Error::CallbackFailed { subject, message };
        warn!("{}", err);
        self.stats.callback_failures += 1;
        Flow::Continue
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return message;
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.as_str();
    }
    "unknown panic payload"
}
