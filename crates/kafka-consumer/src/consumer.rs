use crate::adapter::{AdapterEvent, BrokerAdapter, Connector, InboundMessage};
use crate::config::ConsumerConfig;
use crate::error::Result;
use async_trait::async_trait;
use rdkafka::client::ClientContext;
use rdkafka::config::{ClientConfig, RDKafkaLogLevel};
use rdkafka::consumer::{
    Consumer as RdkafkaConsumer, ConsumerContext, Rebalance, StreamConsumer as RdkafkaStreamConsumer,
};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::Offset;
use rdkafka::message::{BorrowedMessage as RdkafkaBorrowedMessage, Message as RdkafkaMessage};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

/// Builds [`RdkafkaAdapter`]s backed by librdkafka
#[derive(Debug, Clone, Copy, Default)]
pub struct RdkafkaConnector;

impl RdkafkaConnector {
    /// librdkafka properties for `config`
    pub fn client_config(config: &ConsumerConfig) -> ClientConfig {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", config.brokers.join(","))
            .set("group.id", &config.consumer_group)
            .set("enable.auto.commit", config.enable_auto_commit.to_string())
            // Offsets are stored only once the handler accepted the message
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", config.start_offset.as_str())
            .set("session.timeout.ms", config.session_timeout_ms.to_string())
            .set("enable.partition.eof", "false")
            .set("allow.auto.create.topics", "false")
            .set("isolation.level", "read_committed")
            .set("security.protocol", config.security_protocol())
            .set_log_level(RDKafkaLogLevel::Warning);

        if let Some(client_id) = &config.client_id {
            client_config.set("client.id", client_id);
        }
        if let Some(credentials) = config.sasl_credentials() {
            client_config
                .set("sasl.mechanism", credentials.mechanism.as_str())
                .set("sasl.username", credentials.username)
                .set("sasl.password", credentials.password);
        }

        client_config
    }
}

impl Connector for RdkafkaConnector {
    type Adapter = RdkafkaAdapter;

    fn connect(&self, config: &ConsumerConfig) -> Result<RdkafkaAdapter> {
        info!(
            brokers = %config.brokers.join(","),
            sasl_user = config.sasl_credentials().map(|c| c.username).unwrap_or("<none>"),
            security_protocol = config.security_protocol(),
            "Targeting Kafka cluster"
        );

        let (lifecycle_tx, lifecycle_rx) = mpsc::unbounded_channel();
        let consumer: RdkafkaStreamConsumer<SessionContext> = Self::client_config(config)
            .create_with_context(SessionContext {
                events: lifecycle_tx,
            })?;

        Ok(RdkafkaAdapter {
            consumer: Arc::new(consumer),
            lifecycle: Mutex::new(lifecycle_rx),
            probed: AtomicBool::new(false),
            metadata_timeout: config.metadata_timeout(),
        })
    }
}

/// Forwards librdkafka callbacks to the adapter as [`AdapterEvent`]s
///
/// Callbacks run on the thread polling the consumer, so they only enqueue.
pub struct SessionContext {
    events: mpsc::UnboundedSender<AdapterEvent>,
}

impl SessionContext {
    fn emit(&self, event: AdapterEvent) {
        // The receiver lives as long as the adapter; a closed channel means shutdown
        let _ = self.events.send(event);
    }
}

impl ClientContext for SessionContext {
    fn error(&self, error: KafkaError, reason: &str) {
        if is_fatal(&error) {
            self.emit(AdapterEvent::Crashed(format!("{error}: {reason}")));
        } else {
            self.emit(AdapterEvent::Error(format!("{error}: {reason}")));
        }
    }
}

impl ConsumerContext for SessionContext {
    fn pre_rebalance(&self, rebalance: &Rebalance<'_>) {
        match rebalance {
            Rebalance::Revoke(tpl) => {
                debug!("Revoking {} partitions", tpl.count());
                self.emit(AdapterEvent::Rebalancing);
            }
            Rebalance::Assign(_) => {}
            Rebalance::Error(e) => self.emit(AdapterEvent::Error(format!("Rebalance error: {e}"))),
        }
    }

    fn post_rebalance(&self, rebalance: &Rebalance<'_>) {
        if let Rebalance::Assign(tpl) = rebalance {
            debug!("Assigned {} partitions", tpl.count());
            self.emit(AdapterEvent::GroupJoined);
        }
    }
}

fn is_fatal(error: &KafkaError) -> bool {
    error.rdkafka_error_code() == Some(RDKafkaErrorCode::Fatal)
}

/// Broker adapter over an rdkafka `StreamConsumer`
pub struct RdkafkaAdapter {
    consumer: Arc<RdkafkaStreamConsumer<SessionContext>>,
    lifecycle: Mutex<mpsc::UnboundedReceiver<AdapterEvent>>,
    probed: AtomicBool,
    metadata_timeout: Duration,
}

impl RdkafkaAdapter {
    /// Fetch cluster metadata once to learn whether the brokers are reachable
    async fn probe_cluster(&self) -> AdapterEvent {
        let consumer = Arc::clone(&self.consumer);
        let timeout = self.metadata_timeout;
        let probe = tokio::task::spawn_blocking(move || {
            consumer
                .fetch_metadata(None, timeout)
                .map(|metadata| metadata.brokers().len())
        })
        .await;

        match probe {
            Ok(Ok(brokers)) => {
                info!("Connected to Kafka cluster ({brokers} brokers)");
                AdapterEvent::Connected
            }
            Ok(Err(e)) => AdapterEvent::Error(format!("Failed to fetch cluster metadata: {e}")),
            Err(e) => AdapterEvent::Error(format!("Cluster metadata probe failed: {e}")),
        }
    }

}

#[async_trait]
impl BrokerAdapter for RdkafkaAdapter {
    fn subscribe(&self, topics: &[String]) -> Result<()> {
        let topics: Vec<&str> = topics.iter().map(String::as_str).collect();
        self.consumer.subscribe(&topics)?;
        Ok(())
    }

    async fn recv(&self) -> Option<AdapterEvent> {
        if !self.probed.swap(true, Ordering::SeqCst) {
            return Some(self.probe_cluster().await);
        }

        let mut lifecycle = self.lifecycle.lock().await;
        tokio::select! {
            biased;
            event = lifecycle.recv() => event,
            message = self.consumer.recv() => Some(match message {
                Ok(msg) => AdapterEvent::Message(to_inbound(&msg)),
                Err(e) if is_fatal(&e) => AdapterEvent::Crashed(format!("Error receiving message: {e}")),
                Err(e) => AdapterEvent::Error(format!("Error receiving message: {e}")),
            }),
        }
    }

    fn ack(&self, message: &InboundMessage) -> Result<()> {
        // The stored offset is the next one to consume
        self.consumer
            .store_offset(&message.topic, message.partition, message.offset + 1)?;
        Ok(())
    }

    fn redeliver(&self, message: &InboundMessage) -> Result<()> {
        // A zero timeout makes the seek asynchronous; fetched messages past it are discarded
        self.consumer.seek(
            &message.topic,
            message.partition,
            Offset::Offset(message.offset),
            Duration::ZERO,
        )?;
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.consumer.unsubscribe();
        Ok(())
    }

    fn disconnect(self) -> Result<()> {
        if Arc::strong_count(&self.consumer) > 1 {
            warn!("Kafka consumer still referenced, it will close once released");
        }
        // Dropping the last handle closes the consumer and leaves the group
        drop(self);
        Ok(())
    }
}

fn to_inbound(msg: &RdkafkaBorrowedMessage<'_>) -> InboundMessage {
    InboundMessage {
        topic: msg.topic().to_string(),
        partition: msg.partition(),
        offset: msg.offset(),
        payload: msg.payload().map(|p| p.to_vec()),
    }
}
