use crate::{config, init_logging, next_delivery, next_event, recording_handler, Delivered};
use simple_kafka_consumer::testing::ScriptedConnector;
use simple_kafka_consumer::{ConsumerEvent, ConsumerSession, Error};
use std::sync::{Arc, Mutex};

#[tokio::test]
async fn test_redelivery_after_reconnect_reaches_handler_once() {
    init_logging();

    let connector = ScriptedConnector::new();
    let mut session = ConsumerSession::with_connector(connector.clone());
    session.configure(config(&["t1", "t2"])).unwrap();
    let mut events = session.subscribe_events();

    let (handler, mut delivered) = recording_handler();
    session.start(handler).unwrap();
    assert_eq!(
        connector.subscriptions(),
        vec![vec!["t1".to_string(), "t2".to_string()]]
    );

    connector.group_joined();
    connector.message("t1", 0, 10, "hello!");
    assert_eq!(
        next_delivery(&mut delivered).await,
        Delivered {
            topic: "t1".to_string(),
            offset: 10,
            message: "hello!".to_string(),
        }
    );

    // Simulated reconnect, after which the broker replays offset 10
    connector.crash("broker transport failure");
    connector.message("t1", 0, 10, "hello!");
    connector.message("t1", 0, 11, "sentinel");

    assert_eq!(next_delivery(&mut delivered).await.offset, 11);
    assert!(delivered.try_recv().is_err());
    assert_eq!(connector.connects(), 2);
    assert_eq!(connector.subscriptions().len(), 2);

    assert_eq!(next_event(&mut events).await, ConsumerEvent::GroupJoined);
    assert_eq!(
        next_event(&mut events).await,
        ConsumerEvent::Crashed {
            reason: "broker transport failure".to_string(),
            restarting: true,
        }
    );

    session.stop().await.unwrap();
}

#[tokio::test]
async fn test_duplicates_and_older_offsets_are_suppressed() {
    init_logging();

    let connector = ScriptedConnector::new();
    let mut session = ConsumerSession::with_connector(connector.clone());
    session.configure(config(&["t"])).unwrap();

    let (handler, mut delivered) = recording_handler();
    session.start(handler).unwrap();

    for offset in [0, 0, 1, 3, 2, 3, 4] {
        connector.message("t", 0, offset, "m");
    }
    // Partition 1 has its own offset sequence
    connector.message("t", 1, 0, "p1");

    let mut seen = Vec::new();
    for _ in 0..5 {
        let d = next_delivery(&mut delivered).await;
        seen.push((d.message, d.offset));
    }
    assert_eq!(
        seen,
        vec![
            ("m".to_string(), 0),
            ("m".to_string(), 1),
            ("m".to_string(), 3),
            ("m".to_string(), 4),
            ("p1".to_string(), 0),
        ]
    );
    assert!(delivered.try_recv().is_err());

    session.stop().await.unwrap();
}

#[tokio::test]
async fn test_failed_delivery_is_retried_on_redelivery() {
    init_logging();

    let connector = ScriptedConnector::new();
    let mut session = ConsumerSession::with_connector(connector.clone());
    session.configure(config(&["t"])).unwrap();

    let errors = Arc::new(Mutex::new(Vec::new()));
    {
        let errors = Arc::clone(&errors);
        session.on_error(move |e: &Error| errors.lock().unwrap().push(e.to_string()));
    }
    let mut events = session.subscribe_events();

    let (tx, mut delivered) = tokio::sync::mpsc::unbounded_channel();
    let mut failed_once = false;
    session
        .start(move |_topic: &str, offset: i64, _message: &str| -> anyhow::Result<()> {
            if offset == 7 && !failed_once {
                failed_once = true;
                anyhow::bail!("handler rejected offset {offset}");
            }
            tx.send(offset)?;
            Ok(())
        })
        .unwrap();

    connector.message("t", 0, 7, "first attempt");
    connector.message("t", 0, 7, "redelivery");
    connector.message("t", 0, 8, "next");

    let mut offsets = Vec::new();
    for _ in 0..2 {
        offsets.push(
            tokio::time::timeout(crate::WAIT, delivered.recv())
                .await
                .unwrap()
                .unwrap(),
        );
    }
    assert_eq!(offsets, vec![7, 8]);

    assert_eq!(
        next_event(&mut events).await,
        ConsumerEvent::DeliveryFailed {
            topic: "t".to_string(),
            partition: 0,
            offset: 7,
            reason: "handler rejected offset 7".to_string(),
        }
    );
    assert_eq!(
        errors.lock().unwrap().as_slice(),
        ["Message delivery failed for t[0]@7: handler rejected offset 7"]
    );

    // The session kept running after the failure
    assert!(session.state().is_active());
    session.stop().await.unwrap();

    // Only handled messages are acknowledged; the failed one is rewound
    assert_eq!(
        connector.acks(),
        vec![("t".to_string(), 0, 7), ("t".to_string(), 0, 8)]
    );
    assert_eq!(connector.redeliveries(), vec![("t".to_string(), 0, 7)]);
}

#[tokio::test]
async fn test_unconfigured_topic_is_treated_as_first_seen() {
    let connector = ScriptedConnector::new();
    let mut session = ConsumerSession::with_connector(connector.clone());
    session.configure(config(&["t1"])).unwrap();

    let (handler, mut delivered) = recording_handler();
    session.start(handler).unwrap();

    connector.message("t3", 0, 0, "from an unexpected topic");
    let d = next_delivery(&mut delivered).await;
    assert_eq!((d.topic.as_str(), d.offset), ("t3", 0));

    session.stop().await.unwrap();
}

#[tokio::test]
async fn test_restart_cycle_resets_dedup() {
    let connector = ScriptedConnector::new();
    let mut session = ConsumerSession::with_connector(connector.clone());
    session.configure(config(&["t1"])).unwrap();

    let (handler, mut delivered) = recording_handler();
    session.start(handler).unwrap();
    connector.message("t1", 0, 10, "before restart");
    assert_eq!(next_delivery(&mut delivered).await.offset, 10);
    session.stop().await.unwrap();

    let (handler, mut delivered) = recording_handler();
    session.start(handler).unwrap();
    connector.message("t1", 0, 10, "after restart");
    let d = next_delivery(&mut delivered).await;
    assert_eq!((d.offset, d.message.as_str()), (10, "after restart"));

    session.stop().await.unwrap();
}

#[tokio::test]
async fn test_suppressed_duplicates_are_not_acknowledged_again() {
    let connector = ScriptedConnector::new();
    let mut session = ConsumerSession::with_connector(connector.clone());
    session.configure(config(&["t"])).unwrap();

    let (handler, mut delivered) = recording_handler();
    session.start(handler).unwrap();

    connector.message("t", 2, 40, "once");
    connector.message("t", 2, 40, "once");
    connector.message("t", 2, 41, "twice");
    assert_eq!(next_delivery(&mut delivered).await.offset, 40);
    assert_eq!(next_delivery(&mut delivered).await.offset, 41);
    session.stop().await.unwrap();

    assert_eq!(
        connector.acks(),
        vec![("t".to_string(), 2, 40), ("t".to_string(), 2, 41)]
    );
    assert!(connector.redeliveries().is_empty());
}
