//! Kafka consumer facade that delivers each message to a handler at most once per session.
//!
//! Features:
//!
//! - Offset Deduplication: Per topic-partition tracking suppresses redelivered messages
//! - At-least-once Safety: Offsets are recorded only after the handler succeeds
//! - Consumer Groups: Subscribe to several topics under one group, starting from the latest offset
//! - SASL Authentication: PLAIN and SCRAM credentials passed through to librdkafka
//! - Lifecycle Events: Connect, group join, rebalance and crash notices for the host application

/// Broker client seam: connector, adapter and the events they produce
pub mod adapter;
pub mod config;

/// rdkafka-backed broker adapter
pub mod consumer;
pub mod error;
pub mod event;
pub mod handler;

/// Per topic-partition offset deduplication
pub mod offset;

/// High-level API: configure, start, observe and stop a consumer
pub mod session;
pub mod state;

/// Scripted broker adapter for tests and examples
pub mod testing;

// Re-export main types for easy access
pub use adapter::{AdapterEvent, BrokerAdapter, Connector, InboundMessage};
pub use config::{ConsumerConfig, SaslCredentials, SaslMechanism, StartOffset};
pub use consumer::{RdkafkaAdapter, RdkafkaConnector};
pub use error::{Error, Result};
pub use event::ConsumerEvent;
pub use handler::{ErrorHandler, MessageHandler};
pub use offset::OffsetTracker;
pub use session::ConsumerSession;
pub use state::{SessionState, Transition};
