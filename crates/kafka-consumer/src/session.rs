use crate::adapter::{AdapterEvent, BrokerAdapter, Connector, InboundMessage};
use crate::config::ConsumerConfig;
use crate::consumer::RdkafkaConnector;
use crate::error::{Error, Result};
use crate::event::ConsumerEvent;
use crate::handler::{ErrorHandler, MessageHandler};
use crate::offset::OffsetTracker;
use crate::state::{SessionState, Transition};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// A Kafka consumer that hands each message to a handler at most once
///
/// Configure it, then [`start`](Self::start) it with a handler. Messages flow
/// from the broker adapter through an [`OffsetTracker`] into the handler on a
/// background tokio task, until [`stop`](Self::stop) is called.
///
/// ```rust,no_run
/// use simple_kafka_consumer::{ConsumerConfig, ConsumerSession};
///
/// # async fn example() -> simple_kafka_consumer::Result<()> {
/// let mut session = ConsumerSession::with_config(ConsumerConfig {
///     brokers: vec!["localhost:9092".to_string()],
///     consumer_group: "test-group".to_string(),
///     topics: vec!["learner-xapi".to_string()],
///     ..Default::default()
/// })?;
///
/// session.start(|topic: &str, offset: i64, message: &str| -> anyhow::Result<()> {
///     println!("{topic}@{offset}: {message}");
///     Ok(())
/// })?;
///
/// // ...
/// session.stop().await?;
/// # Ok(())
/// # }
/// ```
pub struct ConsumerSession<C: Connector = RdkafkaConnector> {
    connector: Arc<C>,
    config: Option<ConsumerConfig>,
    state: Arc<watch::Sender<SessionState>>,
    events: broadcast::Sender<ConsumerEvent>,
    error_handler: Option<ErrorHandler>,
    running: Option<Running>,
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl ConsumerSession<RdkafkaConnector> {
    /// Create an unconfigured session backed by rdkafka
    pub fn new() -> Self {
        Self::with_connector(RdkafkaConnector)
    }

    /// Create a configured session backed by rdkafka
    pub fn with_config(config: ConsumerConfig) -> Result<Self> {
        let mut session = Self::new();
        session.configure(config)?;
        Ok(session)
    }
}

impl Default for ConsumerSession<RdkafkaConnector> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connector> ConsumerSession<C> {
    /// Create an unconfigured session that builds its adapters with `connector`
    pub fn with_connector(connector: C) -> Self {
        let (state, _) = watch::channel(SessionState::Unconfigured);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            connector: Arc::new(connector),
            config: None,
            state: Arc::new(state),
            events,
            error_handler: None,
            running: None,
        }
    }

    /// Validate and store the configuration
    ///
    /// Allowed once per session. Does not contact the brokers.
    pub fn configure(&mut self, config: ConsumerConfig) -> Result<()> {
        self.ensure(Transition::Configure, "configure")?;
        config.validate()?;
        debug!("Configured Kafka consumer: {config:?}");
        self.config = Some(config);
        transition(&self.state, Transition::Configure);
        Ok(())
    }

    pub fn config(&self) -> Option<&ConsumerConfig> {
        self.config.as_ref()
    }

    /// Register an observer for delivery and connectivity errors
    ///
    /// Takes effect on the next [`start`](Self::start).
    pub fn on_error<F>(&mut self, handler: F)
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
    }

    /// Receive lifecycle events published from now on
    pub fn subscribe_events(&self) -> broadcast::Receiver<ConsumerEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Whether partitions have been assigned and messages can flow
    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    /// Whether the broker client has reached the cluster
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Build the broker client, subscribe, and start delivering to `on_message`
    ///
    /// Returns as soon as the delivery loop is spawned; use
    /// [`wait_until_ready`](Self::wait_until_ready) to wait for partition
    /// assignment. Must be called from within a tokio runtime.
    pub fn start<H: MessageHandler>(&mut self, on_message: H) -> Result<()> {
        let config = self.config.clone().ok_or_else(|| {
            Error::InvalidConfig("session must be configured before it is started".to_string())
        })?;
        config.validate()?;
        self.ensure(Transition::Start, "start")?;

        // A loop that ended on its own (unrecoverable crash) has nothing left to release
        self.running = None;

        let adapter = self.connector.connect(&config)?;
        info!("Subscribing to topics {:?}", config.topics);
        if let Err(e) = adapter.subscribe(&config.topics) {
            release(adapter);
            return Err(e);
        }
        transition(&self.state, Transition::Start);

        let cancel = CancellationToken::new();
        let delivery = DeliveryLoop {
            connector: Arc::clone(&self.connector),
            tracker: OffsetTracker::with_topics(&config.topics),
            config,
            handler: on_message,
            state: Arc::clone(&self.state),
            events: self.events.clone(),
            error_handler: self.error_handler.clone(),
            cancel: cancel.clone(),
        };

        info!("Starting consumer process");
        let handle = tokio::spawn(delivery.run(adapter));
        self.running = Some(Running { cancel, handle });
        Ok(())
    }

    /// Wait until the session is ready, failing if it stops first
    pub async fn wait_until_ready(&self, timeout: Duration) -> Result<()> {
        let mut state = self.state.subscribe();
        let settled = tokio::time::timeout(
            timeout,
            state.wait_for(|s| s.is_ready() || !s.is_active()),
        )
        .await
        .map_err(|_| Error::Timeout("consumer readiness"))?
        .map(|s| *s)
        .map_err(|_| Error::Consumer("session state channel closed".to_string()))?;

        if settled.is_ready() {
            Ok(())
        } else {
            Err(Error::Consumer(format!(
                "session is {settled} and will not become ready"
            )))
        }
    }

    /// Halt delivery and release the broker client
    ///
    /// Waits for the delivery loop to exit. A handler call already in progress
    /// completes first. Does nothing when no loop is running.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };

        running.cancel.cancel();
        if let Err(e) = running.handle.await {
            // The loop never reached its own shutdown; settle the state here
            transition(&self.state, Transition::Stop);
            return Err(Error::Consumer(format!("Delivery task failed: {e}")));
        }
        Ok(())
    }

    fn ensure(&self, transition: Transition, action: &'static str) -> Result<()> {
        let state = self.state();
        match state.apply(transition) {
            Some(_) => Ok(()),
            None => Err(Error::InvalidState { action, state }),
        }
    }
}

impl<C: Connector> Drop for ConsumerSession<C> {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            running.cancel.cancel();
        }
    }
}

/// Apply `t` if it is valid from the current state; returns whether it was
fn transition(state: &watch::Sender<SessionState>, t: Transition) -> bool {
    state.send_if_modified(|current| match current.apply(t) {
        Some(next) => {
            *current = next;
            true
        }
        None => false,
    })
}

fn release<A: BrokerAdapter>(adapter: A) {
    if let Err(e) = adapter.stop() {
        warn!("Failed to stop Kafka consumer: {e}");
    }
    if let Err(e) = adapter.disconnect() {
        warn!("Failed to disconnect Kafka consumer: {e}");
    }
}

enum Exit {
    Cancelled,
    Crashed(String),
}

/// State owned by the background task of one started session
struct DeliveryLoop<C: Connector, H> {
    connector: Arc<C>,
    config: ConsumerConfig,
    tracker: OffsetTracker,
    handler: H,
    state: Arc<watch::Sender<SessionState>>,
    events: broadcast::Sender<ConsumerEvent>,
    error_handler: Option<ErrorHandler>,
    cancel: CancellationToken,
}

impl<C: Connector, H: MessageHandler> DeliveryLoop<C, H> {
    async fn run(mut self, mut adapter: C::Adapter) {
        loop {
            let exit = self.pump(&adapter).await;
            release(adapter);

            match exit {
                Exit::Cancelled => break,
                Exit::Crashed(reason) => match self.restart(reason).await {
                    Some(next) => adapter = next,
                    None => break,
                },
            }
        }

        transition(&self.state, Transition::Stop);
        self.publish(ConsumerEvent::Stopped);
        info!("Kafka consumer stopped");
    }

    async fn pump(&mut self, adapter: &C::Adapter) -> Exit {
        loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Exit::Cancelled,
                event = adapter.recv() => event,
            };

            match event {
                Some(AdapterEvent::Message(message)) => self.deliver(adapter, message),
                Some(AdapterEvent::Connected) => self.on_connected(),
                Some(AdapterEvent::GroupJoined) => self.on_group_joined(),
                Some(AdapterEvent::Rebalancing) => {
                    info!("ConsumerGroup rebalancing");
                    self.publish(ConsumerEvent::Rebalancing);
                }
                Some(AdapterEvent::Error(reason)) => {
                    warn!("Kafka client error: {reason}");
                    self.report(&Error::Consumer(reason));
                }
                Some(AdapterEvent::Crashed(reason)) => return Exit::Crashed(reason),
                None => return Exit::Crashed("broker event stream ended".to_string()),
            }
        }
    }

    fn deliver(&mut self, adapter: &C::Adapter, message: InboundMessage) {
        let (topic, partition, offset) = (&message.topic, message.partition, message.offset);
        if !self.tracker.should_deliver(topic, partition, offset) {
            debug!("Skipping already delivered message {topic}[{partition}]@{offset}");
            return;
        }

        let payload = message.payload_str();
        let handler = &mut self.handler;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            handler.handle(topic, offset, &payload)
        }))
        .unwrap_or_else(|cause| {
            Err(anyhow::anyhow!(
                "handler panicked: {}",
                panic_message(cause.as_ref())
            ))
        });

        match outcome {
            Ok(()) => {
                self.tracker.record(topic, partition, offset);
                if let Err(e) = adapter.ack(&message) {
                    warn!("Failed to store offset for {topic}[{partition}]@{offset}: {e}");
                    self.report(&e);
                }
            }
            Err(e) => {
                let reason = format!("{e:#}");
                error!("Error processing message {topic}[{partition}]@{offset}: {reason}");
                self.report(&Error::Delivery {
                    topic: topic.clone(),
                    partition,
                    offset,
                    reason: reason.clone(),
                });
                self.publish(ConsumerEvent::DeliveryFailed {
                    topic: topic.clone(),
                    partition,
                    offset,
                    reason,
                });
                if let Err(e) = adapter.redeliver(&message) {
                    warn!("Failed to rewind {topic}[{partition}] to {offset}: {e}");
                    self.report(&e);
                }
            }
        }
    }

    fn on_connected(&self) {
        if transition(&self.state, Transition::Connect) {
            info!("Connected to Kafka, waiting for broker assignment");
            self.publish(ConsumerEvent::Connected);
        } else {
            debug!("Ignoring connect notice while {}", *self.state.borrow());
        }
    }

    fn on_group_joined(&self) {
        if transition(&self.state, Transition::Assign) {
            info!("Ready for brokers");
            self.publish(ConsumerEvent::GroupJoined);
        } else {
            info!("Consumer group joined again while {}", *self.state.borrow());
        }
    }

    /// Rebuild the adapter after a crash, if the configuration allows it
    async fn restart(&mut self, reason: String) -> Option<C::Adapter> {
        let restarting = self.config.restart_on_crash;
        error!("Kafka consumer crashed: {reason}");
        self.report(&Error::Crashed(reason.clone()));
        self.publish(ConsumerEvent::Crashed { reason, restarting });

        if !restarting {
            return None;
        }

        transition(&self.state, Transition::Reconnect);
        tokio::select! {
            _ = self.cancel.cancelled() => return None,
            _ = tokio::time::sleep(self.config.restart_delay()) => {}
        }

        info!("Restarting Kafka consumer");
        let adapter = match self.connector.connect(&self.config) {
            Ok(adapter) => adapter,
            Err(e) => {
                error!("Failed to rebuild Kafka consumer: {e}");
                self.report(&e);
                return None;
            }
        };
        if let Err(e) = adapter.subscribe(&self.config.topics) {
            error!("Failed to resubscribe Kafka consumer: {e}");
            self.report(&e);
            release(adapter);
            return None;
        }
        Some(adapter)
    }

    fn report(&self, error: &Error) {
        if let Some(handler) = &self.error_handler {
            handler(error);
        }
    }

    fn publish(&self, event: ConsumerEvent) {
        // No subscribers is fine; events are advisory
        let _ = self.events.send(event);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
