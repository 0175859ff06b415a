//! Command-line consumer for simple-kafka
//!
//! Subscribes to the configured topics and prints each new message as
//! `topic@offset: message`. Runs until Ctrl-C, or until the consumer stops on
//! its own after an unrecoverable crash.
//!
//! Settings come from flags, environment variables, a `.env` file in the
//! working directory, or a TOML file given with `--config-file`.

use anyhow::Context;
use clap::Parser;
use simple_kafka::consumer::{ConsumerEvent, ConsumerSession};
use simple_kafka::ConsumerArgs;
use tokio::sync::broadcast::error::RecvError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Developer overrides; deployed containers pass real environment variables
    let dotenv = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match dotenv {
        Ok(path) => tracing::info!("Loaded developer environment from {path:?}"),
        Err(e) if e.not_found() => tracing::info!("No .env found, using process environment"),
        Err(e) => return Err(e).context("Failed to load .env file"),
    }

    let args = ConsumerArgs::parse();
    let config = args.into_config()?;
    tracing::info!(
        "Consuming topics {:?} as group {}",
        config.topics,
        config.consumer_group
    );

    let mut session =
        ConsumerSession::with_config(config).context("Invalid consumer configuration")?;
    let mut events = session.subscribe_events();

    session
        .start(|topic: &str, offset: i64, message: &str| -> anyhow::Result<()> {
            println!("{topic}@{offset}: {message}");
            Ok(())
        })
        .context("Failed to start Kafka consumer")?;

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                tracing::info!("Received Ctrl-C, stopping consumer");
                break;
            }
            event = events.recv() => match event {
                Ok(ConsumerEvent::Stopped) => {
                    anyhow::bail!("Kafka consumer stopped unexpectedly");
                }
                Ok(event) => tracing::info!("Consumer event: {event}"),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Missed {skipped} consumer events");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    session.stop().await?;
    Ok(())
}
