use crate::state::SessionState;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Cannot {action} a session that is {state}")]
    InvalidState {
        action: &'static str,
        state: SessionState,
    },

    #[error("Consumer error: {0}")]
    Consumer(String),

    #[error("Message delivery failed for {topic}[{partition}]@{offset}: {reason}")]
    Delivery {
        topic: String,
        partition: i32,
        offset: i64,
        reason: String,
    },

    #[error("Consumer crashed: {0}")]
    Crashed(String),

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
