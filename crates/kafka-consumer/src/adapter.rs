//! Seam between the session and the broker client library.
//!
//! A [`Connector`] builds one [`BrokerAdapter`] per run of a session. The
//! adapter owns the network resources and turns the client's callbacks and
//! message stream into a single sequence of [`AdapterEvent`]s.

use crate::config::ConsumerConfig;
use crate::error::Result;
use async_trait::async_trait;
use std::borrow::Cow;

/// A message as received from the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Kafka topic
    pub topic: String,
    /// Kafka partition
    pub partition: i32,
    /// Kafka offset
    pub offset: i64,
    /// Message value, `None` for tombstones
    pub payload: Option<Vec<u8>>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, partition: i32, offset: i64, payload: &str) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            payload: Some(payload.as_bytes().to_vec()),
        }
    }

    /// Payload decoded as UTF-8, replacing invalid sequences
    ///
    /// A missing payload reads as the empty string.
    pub fn payload_str(&self) -> Cow<'_, str> {
        match &self.payload {
            Some(bytes) => String::from_utf8_lossy(bytes),
            None => Cow::Borrowed(""),
        }
    }
}

/// Everything an adapter can report to the delivery loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterEvent {
    Message(InboundMessage),
    Connected,
    GroupJoined,
    Rebalancing,
    /// Non-fatal client error; the client keeps retrying on its own
    Error(String),
    /// Fatal client error; this adapter will not deliver anything else
    Crashed(String),
}

/// Builds broker adapters from a validated configuration
pub trait Connector: Send + Sync + 'static {
    type Adapter: BrokerAdapter;

    /// Create a client for `config`
    ///
    /// Must not block on the network; connection happens in the background
    /// and is reported through [`BrokerAdapter::recv`].
    fn connect(&self, config: &ConsumerConfig) -> Result<Self::Adapter>;
}

#[async_trait]
pub trait BrokerAdapter: Send + Sync + 'static {
    /// Join the consumer group for `topics`
    fn subscribe(&self, topics: &[String]) -> Result<()>;

    /// Wait for the next message or lifecycle notice
    ///
    /// Returns `None` once the adapter can no longer produce events. Must be
    /// cancel safe: dropping the future loses no message.
    async fn recv(&self) -> Option<AdapterEvent>;

    /// Mark `message` as handled so its offset can be committed
    fn ack(&self, message: &InboundMessage) -> Result<()>;

    /// Rewind the partition so `message` is fetched again
    fn redeliver(&self, message: &InboundMessage) -> Result<()>;

    /// Halt message delivery
    fn stop(&self) -> Result<()>;

    /// Release the client and its network resources
    fn disconnect(self) -> Result<()>
    where
        Self: Sized;
}
