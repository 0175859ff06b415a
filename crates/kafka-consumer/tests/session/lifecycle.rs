use crate::{config, init_logging, next_event, recording_handler};
use simple_kafka_consumer::testing::ScriptedConnector;
use simple_kafka_consumer::{ConsumerEvent, ConsumerSession, Error, SessionState};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[tokio::test]
async fn test_empty_topics_fail_before_connecting() {
    let connector = ScriptedConnector::new();
    let mut session = ConsumerSession::with_connector(connector.clone());

    let err = session.configure(config(&[])).unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)), "got {err:?}");
    assert_eq!(session.state(), SessionState::Unconfigured);

    let (handler, _delivered) = recording_handler();
    let err = session.start(handler).unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)), "got {err:?}");
    assert_eq!(connector.connects(), 0);
    assert!(connector.subscriptions().is_empty());
}

#[tokio::test]
async fn test_configure_only_once() {
    let mut session = ConsumerSession::with_connector(ScriptedConnector::new());
    session.configure(config(&["t1"])).unwrap();
    assert_eq!(session.state(), SessionState::Configured);
    assert_eq!(session.config().unwrap().topics, vec!["t1".to_string()]);

    let err = session.configure(config(&["t2"])).unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidState {
            action: "configure",
            state: SessionState::Configured
        }
    ));
}

#[tokio::test]
async fn test_readiness_milestones() {
    init_logging();

    let connector = ScriptedConnector::new();
    let mut session = ConsumerSession::with_connector(connector.clone());
    assert!(!session.is_ready());
    session.configure(config(&["t1"])).unwrap();
    assert!(!session.is_ready());

    let mut events = session.subscribe_events();
    let (handler, _delivered) = recording_handler();
    session.start(handler).unwrap();
    assert_eq!(session.state(), SessionState::Connecting);
    assert!(!session.is_ready());

    connector.connected();
    assert_eq!(next_event(&mut events).await, ConsumerEvent::Connected);
    assert!(session.is_connected());
    assert!(!session.is_ready());

    connector.group_joined();
    session
        .wait_until_ready(Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(next_event(&mut events).await, ConsumerEvent::GroupJoined);
    assert!(session.is_ready());

    // A second join after a rebalance does not re-announce readiness
    connector.rebalancing();
    connector.group_joined();
    connector.rebalancing();
    assert_eq!(next_event(&mut events).await, ConsumerEvent::Rebalancing);
    assert_eq!(next_event(&mut events).await, ConsumerEvent::Rebalancing);
    assert!(session.is_ready());

    let err = session.start(recording_handler().0).unwrap_err();
    assert!(matches!(err, Error::InvalidState { action: "start", .. }));

    session.stop().await.unwrap();
    assert_eq!(next_event(&mut events).await, ConsumerEvent::Stopped);
    assert_eq!(session.state(), SessionState::Stopped);
    assert!(!session.is_ready());
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let connector = ScriptedConnector::new();
    let mut session = ConsumerSession::with_connector(connector.clone());

    // Nothing running yet
    session.stop().await.unwrap();
    session.configure(config(&["t1"])).unwrap();
    session.stop().await.unwrap();
    assert_eq!(session.state(), SessionState::Configured);

    let (handler, _delivered) = recording_handler();
    session.start(handler).unwrap();
    connector.group_joined();
    session
        .wait_until_ready(Duration::from_secs(5))
        .await
        .unwrap();

    session.stop().await.unwrap();
    session.stop().await.unwrap();
    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(connector.stops(), 1);
    assert_eq!(connector.disconnects(), 1);
}

#[tokio::test]
async fn test_stop_before_ready_cancels_connection() {
    let connector = ScriptedConnector::new();
    let mut session = ConsumerSession::with_connector(connector.clone());
    session.configure(config(&["t1"])).unwrap();

    let (handler, _delivered) = recording_handler();
    session.start(handler).unwrap();
    session.stop().await.unwrap();

    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(connector.disconnects(), 1);
    let err = session
        .wait_until_ready(Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Consumer(_)), "got {err:?}");
}

#[tokio::test]
async fn test_wait_until_ready_times_out() {
    let connector = ScriptedConnector::new();
    let mut session = ConsumerSession::with_connector(connector.clone());
    session.configure(config(&["t1"])).unwrap();
    session.start(recording_handler().0).unwrap();

    let err = session
        .wait_until_ready(Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout(_)), "got {err:?}");

    session.stop().await.unwrap();
}

#[tokio::test]
async fn test_crash_without_restart_stops_session() {
    init_logging();

    let connector = ScriptedConnector::new();
    let mut session = ConsumerSession::with_connector(connector.clone());
    session
        .configure(simple_kafka_consumer::ConsumerConfig {
            restart_on_crash: false,
            ..config(&["t1"])
        })
        .unwrap();

    let errors = Arc::new(Mutex::new(Vec::new()));
    {
        let errors = Arc::clone(&errors);
        session.on_error(move |e: &Error| errors.lock().unwrap().push(e.to_string()));
    }
    let mut events = session.subscribe_events();
    session.start(recording_handler().0).unwrap();

    connector.group_joined();
    connector.crash("fatal error");

    assert_eq!(next_event(&mut events).await, ConsumerEvent::GroupJoined);
    assert_eq!(
        next_event(&mut events).await,
        ConsumerEvent::Crashed {
            reason: "fatal error".to_string(),
            restarting: false,
        }
    );
    assert_eq!(next_event(&mut events).await, ConsumerEvent::Stopped);
    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(connector.connects(), 1);
    assert_eq!(connector.disconnects(), 1);
    assert_eq!(
        errors.lock().unwrap().as_slice(),
        ["Consumer crashed: fatal error"]
    );

    // The loop already exited; stop only reaps it
    session.stop().await.unwrap();
    assert_eq!(connector.stops(), 1);
}

#[tokio::test]
async fn test_failed_rebuild_stops_session() {
    let connector = ScriptedConnector::new();
    let mut session = ConsumerSession::with_connector(connector.clone());
    session.configure(config(&["t1"])).unwrap();

    let errors = Arc::new(Mutex::new(Vec::new()));
    {
        let errors = Arc::clone(&errors);
        session.on_error(move |e: &Error| errors.lock().unwrap().push(e.to_string()));
    }
    let mut events = session.subscribe_events();
    session.start(recording_handler().0).unwrap();

    connector.refuse_connections(true);
    connector.crash("broker transport failure");

    assert!(matches!(
        next_event(&mut events).await,
        ConsumerEvent::Crashed {
            restarting: true,
            ..
        }
    ));
    assert_eq!(next_event(&mut events).await, ConsumerEvent::Stopped);
    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(errors.lock().unwrap().len(), 2);

    // A stopped session can be started again once the broker is reachable
    connector.refuse_connections(false);
    session.start(recording_handler().0).unwrap();
    assert_eq!(session.state(), SessionState::Connecting);
    assert_eq!(connector.connects(), 2);
    session.stop().await.unwrap();
}

#[tokio::test]
async fn test_start_fails_when_client_cannot_be_built() {
    let connector = ScriptedConnector::new();
    connector.refuse_connections(true);
    let mut session = ConsumerSession::with_connector(connector.clone());
    session.configure(config(&["t1"])).unwrap();

    let err = session.start(recording_handler().0).unwrap_err();
    assert!(matches!(err, Error::Consumer(_)), "got {err:?}");
    assert_eq!(session.state(), SessionState::Configured);
}

#[tokio::test]
async fn test_panicking_handler_is_treated_as_failed_delivery() {
    init_logging();

    let connector = ScriptedConnector::new();
    let mut session = ConsumerSession::with_connector(connector.clone());
    session.configure(config(&["t1"])).unwrap();

    let errors = Arc::new(Mutex::new(Vec::new()));
    {
        let errors = Arc::clone(&errors);
        session.on_error(move |e: &Error| errors.lock().unwrap().push(e.to_string()));
    }
    let mut events = session.subscribe_events();

    let (tx, mut delivered) = tokio::sync::mpsc::unbounded_channel();
    session
        .start(move |_topic: &str, offset: i64, _message: &str| -> anyhow::Result<()> {
            if offset == 1 {
                panic!("boom");
            }
            tx.send(offset)?;
            Ok(())
        })
        .unwrap();

    connector.group_joined();
    connector.message("t1", 0, 1, "explodes");
    connector.message("t1", 0, 2, "fine");

    assert_eq!(next_event(&mut events).await, ConsumerEvent::GroupJoined);
    assert_eq!(
        next_event(&mut events).await,
        ConsumerEvent::DeliveryFailed {
            topic: "t1".to_string(),
            partition: 0,
            offset: 1,
            reason: "handler panicked: boom".to_string(),
        }
    );
    let offset = tokio::time::timeout(Duration::from_secs(5), delivered.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(offset, 2);
    assert!(session.is_ready());

    session.stop().await.unwrap();
    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(connector.redeliveries(), vec![("t1".to_string(), 0, 1)]);
    assert_eq!(
        errors.lock().unwrap().as_slice(),
        ["Message delivery failed for t1[0]@1: handler panicked: boom"]
    );

    // The session is not wedged and can run again
    session.start(recording_handler().0).unwrap();
    assert_eq!(session.state(), SessionState::Connecting);
    session.stop().await.unwrap();
}
