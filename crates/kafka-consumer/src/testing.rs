//! In-memory broker adapter for driving a session without a Kafka cluster.
//!
//! Events pushed through a [`ScriptedConnector`] are delivered, in order, by
//! whichever adapter the session currently holds. Adapters rebuilt after a
//! crash read from the same script, which makes redelivery after a reconnect
//! easy to simulate.
//!
//! Acknowledgements and redelivery requests are only recorded; a redelivery
//! has to be scripted explicitly by pushing the message again.

use crate::adapter::{AdapterEvent, BrokerAdapter, Connector, InboundMessage};
use crate::config::ConsumerConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError};
use tokio::sync::{mpsc, Mutex};

struct Script {
    sender: mpsc::UnboundedSender<AdapterEvent>,
    receiver: Mutex<mpsc::UnboundedReceiver<AdapterEvent>>,
    connects: AtomicUsize,
    stops: AtomicUsize,
    disconnects: AtomicUsize,
    refuse_connections: AtomicBool,
    subscriptions: std::sync::Mutex<Vec<Vec<String>>>,
    acks: std::sync::Mutex<Vec<(String, i32, i64)>>,
    redeliveries: std::sync::Mutex<Vec<(String, i32, i64)>>,
}

fn locked<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn position(message: &InboundMessage) -> (String, i32, i64) {
    (message.topic.clone(), message.partition, message.offset)
}

/// Connector whose adapters replay scripted events
#[derive(Clone)]
pub struct ScriptedConnector {
    script: Arc<Script>,
}

impl Default for ScriptedConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedConnector {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            script: Arc::new(Script {
                sender,
                receiver: Mutex::new(receiver),
                connects: AtomicUsize::new(0),
                stops: AtomicUsize::new(0),
                disconnects: AtomicUsize::new(0),
                refuse_connections: AtomicBool::new(false),
                subscriptions: std::sync::Mutex::new(Vec::new()),
                acks: std::sync::Mutex::new(Vec::new()),
                redeliveries: std::sync::Mutex::new(Vec::new()),
            }),
        }
    }

    /// Queue a raw adapter event
    pub fn push(&self, event: AdapterEvent) {
        // The script owns the receiver, so the channel never closes
        let _ = self.script.sender.send(event);
    }

    /// Queue a message with a UTF-8 payload
    pub fn message(&self, topic: &str, partition: i32, offset: i64, payload: &str) {
        self.push(AdapterEvent::Message(InboundMessage::new(
            topic, partition, offset, payload,
        )));
    }

    pub fn connected(&self) {
        self.push(AdapterEvent::Connected);
    }

    pub fn group_joined(&self) {
        self.push(AdapterEvent::GroupJoined);
    }

    pub fn rebalancing(&self) {
        self.push(AdapterEvent::Rebalancing);
    }

    pub fn crash(&self, reason: &str) {
        self.push(AdapterEvent::Crashed(reason.to_string()));
    }

    /// Make subsequent `connect` calls fail, as if the client could not be built
    pub fn refuse_connections(&self, refuse: bool) {
        self.script.refuse_connections.store(refuse, Ordering::SeqCst);
    }

    /// Number of adapters built so far
    pub fn connects(&self) -> usize {
        self.script.connects.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.script.stops.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.script.disconnects.load(Ordering::SeqCst)
    }

    /// Topic lists passed to `subscribe`, one entry per call
    pub fn subscriptions(&self) -> Vec<Vec<String>> {
        locked(&self.script.subscriptions).clone()
    }

    /// `(topic, partition, offset)` of every acknowledged message, in order
    pub fn acks(&self) -> Vec<(String, i32, i64)> {
        locked(&self.script.acks).clone()
    }

    /// `(topic, partition, offset)` of every message the session asked to redeliver
    pub fn redeliveries(&self) -> Vec<(String, i32, i64)> {
        locked(&self.script.redeliveries).clone()
    }
}

impl Connector for ScriptedConnector {
    type Adapter = ScriptedAdapter;

    fn connect(&self, _config: &ConsumerConfig) -> Result<ScriptedAdapter> {
        if self.script.refuse_connections.load(Ordering::SeqCst) {
            return Err(Error::Consumer(
                "Failed to create consumer: connection refused".to_string(),
            ));
        }
        self.script.connects.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedAdapter {
            script: Arc::clone(&self.script),
        })
    }
}

pub struct ScriptedAdapter {
    script: Arc<Script>,
}

#[async_trait]
impl BrokerAdapter for ScriptedAdapter {
    fn subscribe(&self, topics: &[String]) -> Result<()> {
        locked(&self.script.subscriptions).push(topics.to_vec());
        Ok(())
    }

    fn ack(&self, message: &InboundMessage) -> Result<()> {
        locked(&self.script.acks).push(position(message));
        Ok(())
    }

    fn redeliver(&self, message: &InboundMessage) -> Result<()> {
        locked(&self.script.redeliveries).push(position(message));
        Ok(())
    }

    async fn recv(&self) -> Option<AdapterEvent> {
        self.script.receiver.lock().await.recv().await
    }

    fn stop(&self) -> Result<()> {
        self.script.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn disconnect(self) -> Result<()> {
        self.script.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
