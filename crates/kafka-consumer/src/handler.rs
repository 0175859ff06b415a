use crate::error::Error;
use std::sync::Arc;

/// Receives every message that passes offset deduplication
///
/// Returning an error (or panicking) leaves the offset unrecorded and asks the
/// broker to fetch the message again, so the redelivery reaches the handler.
pub trait MessageHandler: Send + 'static {
    fn handle(&mut self, topic: &str, offset: i64, message: &str) -> anyhow::Result<()>;
}

impl<F> MessageHandler for F
where
    F: FnMut(&str, i64, &str) -> anyhow::Result<()> + Send + 'static,
{
    fn handle(&mut self, topic: &str, offset: i64, message: &str) -> anyhow::Result<()> {
        self(topic, offset, message)
    }
}

/// Observer for delivery and connectivity errors
pub type ErrorHandler = Arc<dyn Fn(&Error) + Send + Sync>;
