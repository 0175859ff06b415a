use crate::error::{Error, Result};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// SASL mechanism used when authentication is enabled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SaslMechanism {
    #[default]
    Plain,
    #[serde(rename = "scram-sha-256")]
    ScramSha256,
    #[serde(rename = "scram-sha-512")]
    ScramSha512,
}

impl SaslMechanism {
    /// Value for librdkafka's `sasl.mechanism` property
    pub fn as_str(&self) -> &'static str {
        match self {
            SaslMechanism::Plain => "PLAIN",
            SaslMechanism::ScramSha256 => "SCRAM-SHA-256",
            SaslMechanism::ScramSha512 => "SCRAM-SHA-512",
        }
    }
}

impl FromStr for SaslMechanism {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "plain" => Ok(SaslMechanism::Plain),
            "scram-sha-256" => Ok(SaslMechanism::ScramSha256),
            "scram-sha-512" => Ok(SaslMechanism::ScramSha512),
            other => Err(Error::InvalidConfig(format!(
                "unknown SASL mechanism '{other}'"
            ))),
        }
    }
}

/// Where a consumer group without a committed offset starts reading
///
/// New consumers skip the backlog by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartOffset {
    #[default]
    Latest,
    Earliest,
}

impl StartOffset {
    /// Value for librdkafka's `auto.offset.reset` property
    pub fn as_str(&self) -> &'static str {
        match self {
            StartOffset::Latest => "latest",
            StartOffset::Earliest => "earliest",
        }
    }
}

impl FromStr for StartOffset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "latest" => Ok(StartOffset::Latest),
            "earliest" => Ok(StartOffset::Earliest),
            other => Err(Error::InvalidConfig(format!(
                "unknown start offset '{other}', expected 'latest' or 'earliest'"
            ))),
        }
    }
}

/// SASL credentials resolved from a validated configuration
#[derive(Clone, PartialEq, Eq)]
pub struct SaslCredentials<'a> {
    pub mechanism: SaslMechanism,
    pub username: &'a str,
    pub password: &'a str,
}

impl fmt::Debug for SaslCredentials<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaslCredentials")
            .field("mechanism", &self.mechanism)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Configuration for a consumer session
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Kafka broker endpoints (`host:port`), in bootstrap order
    pub brokers: Vec<String>,
    /// Whether to authenticate with SASL
    ///
    /// When unset, SASL is used if and only if both credentials are present.
    pub use_sasl: Option<bool>,
    /// SASL user for the cluster
    pub sasl_user: Option<String>,
    /// SASL password for the cluster
    pub sasl_pass: Option<String>,
    pub sasl_mechanism: SaslMechanism,
    /// Connect over TLS (`SSL` / `SASL_SSL`)
    pub ssl: bool,
    /// Consumer group ID
    pub consumer_group: String,
    /// Topics to consume from
    pub topics: Vec<String>,
    /// Client identifier reported to the brokers
    pub client_id: Option<String>,
    pub start_offset: StartOffset,
    /// Let the client commit delivered offsets in the background
    pub enable_auto_commit: bool,
    pub session_timeout_ms: u64,
    /// Rebuild the broker client after it crashes instead of stopping
    pub restart_on_crash: bool,
    /// Delay before rebuilding a crashed broker client
    pub restart_delay_ms: u64,
    /// Upper bound for the post-connect broker probe
    pub metadata_timeout_ms: u64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
            use_sasl: None,
            sasl_user: None,
            sasl_pass: None,
            sasl_mechanism: SaslMechanism::Plain,
            ssl: false,
            consumer_group: "".to_string(),
            topics: Vec::new(),
            client_id: None,
            start_offset: StartOffset::Latest,
            enable_auto_commit: true,
            session_timeout_ms: 30_000,
            restart_on_crash: true,
            restart_delay_ms: 1_000,
            metadata_timeout_ms: 10_000,
        }
    }
}

impl fmt::Debug for ConsumerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerConfig")
            .field("brokers", &self.brokers)
            .field("use_sasl", &self.use_sasl)
            .field("sasl_user", &self.sasl_user)
            .field("sasl_pass", &self.sasl_pass.as_ref().map(|_| "***"))
            .field("sasl_mechanism", &self.sasl_mechanism)
            .field("ssl", &self.ssl)
            .field("consumer_group", &self.consumer_group)
            .field("topics", &self.topics)
            .field("client_id", &self.client_id)
            .field("start_offset", &self.start_offset)
            .field("enable_auto_commit", &self.enable_auto_commit)
            .field("session_timeout_ms", &self.session_timeout_ms)
            .field("restart_on_crash", &self.restart_on_crash)
            .field("restart_delay_ms", &self.restart_delay_ms)
            .field("metadata_timeout_ms", &self.metadata_timeout_ms)
            .finish()
    }
}

impl ConsumerConfig {
    /// Split a comma-delimited broker list, dropping blank entries
    pub fn parse_brokers(brokers: &str) -> Vec<String> {
        brokers
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Check the configuration before any network activity
    pub fn validate(&self) -> Result<()> {
        if self.brokers.is_empty() {
            return Err(Error::InvalidConfig(
                "at least one broker is required".to_string(),
            ));
        }
        if let Some(broker) = self.brokers.iter().find(|b| b.trim().is_empty()) {
            return Err(Error::InvalidConfig(format!(
                "broker endpoint '{broker}' is blank"
            )));
        }
        if self.consumer_group.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "consumer group must be non-empty".to_string(),
            ));
        }
        if self.topics.is_empty() {
            return Err(Error::InvalidConfig(
                "at least one topic is required".to_string(),
            ));
        }
        if self.topics.iter().any(|t| t.trim().is_empty()) {
            return Err(Error::InvalidConfig(
                "topic names must be non-empty".to_string(),
            ));
        }

        let has_user = self.sasl_user.is_some();
        let has_pass = self.sasl_pass.is_some();
        match self.use_sasl {
            Some(true) if !(has_user && has_pass) => Err(Error::InvalidConfig(
                "SASL is enabled but sasl_user and sasl_pass are not both set".to_string(),
            )),
            None if has_user ^ has_pass => Err(Error::InvalidConfig(
                "Both sasl_user and sasl_pass must be set together".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Credentials to authenticate with, if SASL is in effect
    pub fn sasl_credentials(&self) -> Option<SaslCredentials<'_>> {
        if self.use_sasl == Some(false) {
            return None;
        }
        match (&self.sasl_user, &self.sasl_pass) {
            (Some(username), Some(password)) => Some(SaslCredentials {
                mechanism: self.sasl_mechanism,
                username,
                password,
            }),
            _ => None,
        }
    }

    /// Value for librdkafka's `security.protocol` property
    pub fn security_protocol(&self) -> &'static str {
        match (self.sasl_credentials().is_some(), self.ssl) {
            (true, true) => "SASL_SSL",
            (true, false) => "SASL_PLAINTEXT",
            (false, true) => "SSL",
            (false, false) => "PLAINTEXT",
        }
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_millis(self.metadata_timeout_ms)
    }
}
