use std::fmt;

/// Lifecycle notice published by a running session
///
/// Hosts receive these through
/// [`ConsumerSession::subscribe_events`](crate::ConsumerSession::subscribe_events)
/// to alert, restart or report health.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumerEvent {
    /// Broker client reached the cluster
    Connected,
    /// Consumer group join finished and the session is ready for messages
    GroupJoined,
    /// The consumer group is rebalancing partitions
    Rebalancing,
    /// The broker client failed fatally
    Crashed { reason: String, restarting: bool },
    /// The message handler returned an error; the offset was not recorded
    DeliveryFailed {
        topic: String,
        partition: i32,
        offset: i64,
        reason: String,
    },
    /// The delivery loop exited and the broker client was released
    Stopped,
}

impl ConsumerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ConsumerEvent::Connected => "consumer.connect",
            ConsumerEvent::GroupJoined => "consumer.group_join",
            ConsumerEvent::Rebalancing => "consumer.rebalancing",
            ConsumerEvent::Crashed { .. } => "consumer.crash",
            ConsumerEvent::DeliveryFailed { .. } => "consumer.delivery_failed",
            ConsumerEvent::Stopped => "consumer.stop",
        }
    }
}

impl fmt::Display for ConsumerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsumerEvent::Crashed { reason, restarting } => {
                write!(f, "{} ({reason}, restarting: {restarting})", self.name())
            }
            ConsumerEvent::DeliveryFailed {
                topic,
                partition,
                offset,
                reason,
            } => write!(f, "{} ({topic}[{partition}]@{offset}: {reason})", self.name()),
            _ => f.write_str(self.name()),
        }
    }
}
