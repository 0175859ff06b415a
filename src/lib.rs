//! simple-kafka
//!
//! A small Kafka consumer that invokes a callback for every new message and
//! suppresses redelivered offsets per topic-partition.
//!
//! # Crates
//!
//! - `simple_kafka_consumer` - session manager, offset deduplication and the rdkafka adapter
//! - `simple_kafka_producer` - test producer for publishing string messages
//!
//! # CLI Usage
//!
//! ```bash
//! # Print every new message on two topics
//! simple-kafka-consumer --brokers localhost:9092 --topics learner-xapi,audit \
//!   --consumer-group test-group
//!
//! # SASL credentials from the environment (or a .env file)
//! KAFKA_SASL_USER=kafka-user KAFKA_SASL_PASS=kafka-pass \
//!   simple-kafka-consumer --topics learner-xapi --consumer-group test-group
//!
//! # Everything from a TOML file
//! simple-kafka-consumer --config-file consumer.toml
//! ```

pub mod config;

pub use config::{load_config_file, parse_duration, ConsumerArgs};

// Re-export the consumer crate for convenience
pub use simple_kafka_consumer as consumer;
