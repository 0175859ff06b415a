//! Kafka producer library for testing simple-kafka
//!
//! Publishes plain string messages so consumer tests can observe them arriving
//! through a `ConsumerSession`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use simple_kafka_producer::{KafkaTestProducer, ProducerConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let producer = KafkaTestProducer::new(ProducerConfig::new("localhost:9092"))?;
//!
//!     producer.create_topic_if_not_exists("test-1", 3).await?;
//!     let (partition, offset) = producer.produce_message("test-1", "hello!").await?;
//!     println!("delivered to partition {partition} at offset {offset}");
//!     Ok(())
//! }
//! ```

use anyhow::{Context, Result};
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::ClientConfig;
use std::time::Duration;

/// Connection settings for the test producer
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    /// Kafka brokers (comma-separated list)
    pub brokers: String,
    pub sasl_user: Option<String>,
    pub sasl_pass: Option<String>,
}

impl ProducerConfig {
    pub fn new(brokers: &str) -> Self {
        Self {
            brokers: brokers.to_string(),
            sasl_user: None,
            sasl_pass: None,
        }
    }

    pub fn with_sasl(mut self, user: &str, pass: &str) -> Self {
        self.sasl_user = Some(user.to_string());
        self.sasl_pass = Some(pass.to_string());
        self
    }

    fn client_config(&self) -> ClientConfig {
        let mut client_config = ClientConfig::new();
        client_config.set("bootstrap.servers", &self.brokers);
        if let (Some(user), Some(pass)) = (&self.sasl_user, &self.sasl_pass) {
            client_config
                .set("security.protocol", "SASL_PLAINTEXT")
                .set("sasl.mechanism", "PLAIN")
                .set("sasl.username", user)
                .set("sasl.password", pass);
        }
        client_config
    }
}

/// Kafka producer wrapper for testing
pub struct KafkaTestProducer {
    producer: FutureProducer,
    config: ProducerConfig,
}

impl KafkaTestProducer {
    /// Create a new Kafka test producer
    pub fn new(config: ProducerConfig) -> Result<Self> {
        let producer: FutureProducer = config
            .client_config()
            .set("message.timeout.ms", "5000")
            .create()
            .context("Failed to create Kafka producer")?;

        Ok(Self { producer, config })
    }

    /// Create Kafka topic if it doesn't exist
    pub async fn create_topic_if_not_exists(&self, topic: &str, partitions: i32) -> Result<()> {
        let admin_client: AdminClient<DefaultClientContext> = self
            .config
            .client_config()
            .create()
            .context("Failed to create admin client")?;

        let new_topic = NewTopic::new(topic, partitions, TopicReplication::Fixed(1));
        let opts = AdminOptions::new().operation_timeout(Some(Duration::from_secs(5)));

        let results = admin_client
            .create_topics(&[new_topic], &opts)
            .await
            .context("Failed to create topics")?;

        for result in results {
            match result {
                Ok(topic_name) => {
                    tracing::info!("Topic '{topic_name}' created successfully");
                }
                Err((topic_name, err)) => {
                    if err.to_string().contains("already exists") {
                        tracing::info!("Topic '{topic_name}' already exists");
                    } else {
                        return Err(anyhow::anyhow!("Failed to create topic: {err}"));
                    }
                }
            }
        }

        Ok(())
    }

    /// Publish a string message, returning the partition and offset it landed at
    pub async fn produce_message(&self, topic: &str, message: &str) -> Result<(i32, i64)> {
        let record: FutureRecord<'_, (), str> = FutureRecord::to(topic).payload(message);

        let (partition, offset) = self
            .producer
            .send(record, Duration::from_secs(5))
            .await
            .map_err(|(err, _)| err)
            .with_context(|| format!("Failed to send message to Kafka topic {topic}"))?;

        tracing::debug!("Published message to {topic}[{partition}]@{offset}");
        Ok((partition, offset))
    }
}
