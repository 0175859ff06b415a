//! Command-line, environment and file configuration for the consumer binary.

mod duration;

pub use duration::parse_duration;

use anyhow::Context;
use clap::Parser;
use simple_kafka_consumer::{ConsumerConfig, SaslMechanism, StartOffset};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Consume Kafka topics and print each message once per offset
#[derive(Debug, Clone, Parser)]
#[command(name = "simple-kafka-consumer")]
#[command(long_about = None)]
pub struct ConsumerArgs {
    /// Load the whole consumer configuration from a TOML file instead of flags
    #[arg(long, env = "KAFKA_CONSUMER_CONFIG")]
    pub config_file: Option<PathBuf>,

    /// Kafka brokers (comma-separated or multiple --brokers)
    #[arg(
        long,
        env = "KAFKA_BROKERS",
        value_delimiter = ',',
        default_value = "localhost:9092"
    )]
    pub brokers: Vec<String>,

    /// Use SASL authentication (defaults to whether credentials are given)
    #[arg(long, env = "KAFKA_USE_SASL")]
    pub use_sasl: Option<bool>,

    /// SASL user for the cluster
    #[arg(long, env = "KAFKA_SASL_USER")]
    pub sasl_user: Option<String>,

    /// SASL password for the cluster
    #[arg(long, env = "KAFKA_SASL_PASS", hide_env_values = true)]
    pub sasl_pass: Option<String>,

    /// SASL mechanism: plain, scram-sha-256 or scram-sha-512
    #[arg(long, env = "KAFKA_SASL_MECHANISM", default_value = "plain")]
    pub sasl_mechanism: SaslMechanism,

    /// Connect to the brokers over TLS
    #[arg(long, env = "KAFKA_SSL")]
    pub ssl: bool,

    /// Topics to consume (comma-separated or multiple --topics)
    #[arg(long, env = "KAFKA_TOPICS", value_delimiter = ',')]
    pub topics: Vec<String>,

    /// Single topic, read from older env files when --topics is not given
    #[arg(long, env = "KAFKA_XAPI_TOPIC", hide = true)]
    pub xapi_topic: Option<String>,

    /// Consumer group ID
    #[arg(long, env = "KAFKA_CONSUMER_GROUP")]
    pub consumer_group: Option<String>,

    /// Client ID reported to the brokers
    #[arg(long, env = "KAFKA_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Where a new consumer group starts reading: latest or earliest
    #[arg(long, env = "KAFKA_START_OFFSET", default_value = "latest")]
    pub start_offset: StartOffset,

    /// Session timeout in milliseconds
    #[arg(long, env = "KAFKA_SESSION_TIMEOUT_MS", default_value_t = 30_000)]
    pub session_timeout_ms: u64,

    /// Stop instead of rebuilding the Kafka client after it crashes
    #[arg(long, env = "KAFKA_NO_RESTART_ON_CRASH")]
    pub no_restart_on_crash: bool,

    /// Delay before rebuilding a crashed Kafka client (e.g. "500ms", "2s")
    #[arg(long, env = "KAFKA_RESTART_DELAY", default_value = "1s", value_parser = parse_duration)]
    pub restart_delay: Duration,
}

impl ConsumerArgs {
    /// Resolve the consumer configuration, from the config file if one is given
    pub fn into_config(self) -> anyhow::Result<ConsumerConfig> {
        if let Some(path) = &self.config_file {
            return load_config_file(path);
        }

        let brokers = self
            .brokers
            .iter()
            .flat_map(|b| ConsumerConfig::parse_brokers(b))
            .collect();
        let mut topics: Vec<String> = self
            .topics
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if topics.is_empty() {
            topics.extend(
                self.xapi_topic
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty()),
            );
        }

        Ok(ConsumerConfig {
            brokers,
            use_sasl: self.use_sasl,
            sasl_user: self.sasl_user,
            sasl_pass: self.sasl_pass,
            sasl_mechanism: self.sasl_mechanism,
            ssl: self.ssl,
            consumer_group: self.consumer_group.unwrap_or_default(),
            topics,
            client_id: self.client_id,
            start_offset: self.start_offset,
            session_timeout_ms: self.session_timeout_ms,
            restart_on_crash: !self.no_restart_on_crash,
            restart_delay_ms: u64::try_from(self.restart_delay.as_millis())
                .context("Restart delay is too large")?,
            ..Default::default()
        })
    }
}

/// Read a [`ConsumerConfig`] from a TOML file
pub fn load_config_file(path: &Path) -> anyhow::Result<ConsumerConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {path:?}"))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse config file {path:?}"))
}
