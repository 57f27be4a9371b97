#[path = "../helpers/mod.rs"]
mod helpers;

use helpers::fake_source::{RefusingSubscriber, ScriptedSubscriber};
use helpers::mock_sink::RecordingSink;
use helpers::{deployment_event, oom_allocation_event};
use nomad_notifier::consumer::StreamConsumer;
use nomad_notifier::core::{EntityKind, Sink};
use nomad_notifier::dispatcher::Dispatcher;
use nomad_notifier::network::{RawEvent, StreamError, Subscription};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const WAIT: Duration = Duration::from_secs(5);

fn consumer_for(sinks: Vec<Arc<dyn Sink>>) -> Arc<StreamConsumer> {
    Arc::new(StreamConsumer::new(Arc::new(Dispatcher::new(sinks).unwrap())))
}

#[tokio::test]
async fn test_events_are_dispatched_and_bad_frames_skipped() {
    let sink = Arc::new(RecordingSink::new("recording"));
    let consumer = consumer_for(vec![sink.clone()]);
    let (subscriber, batches) = ScriptedSubscriber::new();
    let subscriber = Arc::new(subscriber);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = {
        let subscriber = subscriber.clone();
        tokio::spawn(async move { consumer.run(subscriber.as_ref(), shutdown_rx).await })
    };

    batches.heartbeat();
    batches.error("rpc error: stream reset");
    batches.events(vec![
        deployment_event("d-1", "Deployment is running"),
        // Undecodable payload in the middle of a batch.
        RawEvent {
            topic: "Deployment".to_string(),
            payload: json!({"Deployment": {"ID": 7}}),
            ..Default::default()
        },
        RawEvent {
            topic: "Node".to_string(),
            payload: json!({"Node": {"ID": "n-1"}}),
            ..Default::default()
        },
        oom_allocation_event("a-1"),
    ]);

    sink.wait_for_calls(2, WAIT).await;
    assert_eq!(
        sink.calls(),
        vec![
            (EntityKind::Deployment, "d-1".to_string()),
            (EntityKind::Allocation, "a-1".to_string()),
        ]
    );
    assert_eq!(subscriber.subscriptions(), vec![Subscription::default()]);

    shutdown_tx.send(true).unwrap();
    let result = tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_sink_failures_do_not_stop_the_loop() {
    let broken = Arc::new(RecordingSink::failing("broken"));
    let healthy = Arc::new(RecordingSink::new("healthy"));
    let consumer = consumer_for(vec![broken.clone(), healthy.clone()]);
    let (subscriber, batches) = ScriptedSubscriber::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(async move { consumer.run(&subscriber, shutdown_rx).await });

    batches.events(vec![deployment_event("d-1", "")]);
    batches.events(vec![deployment_event("d-2", "")]);

    healthy.wait_for_calls(2, WAIT).await;
    assert_eq!(broken.calls().len(), 2);

    shutdown_tx.send(true).unwrap();
    assert!(tokio::time::timeout(WAIT, handle).await.unwrap().unwrap().is_ok());
}

#[tokio::test]
async fn test_subscription_failure_is_returned() {
    let consumer = consumer_for(vec![Arc::new(RecordingSink::new("recording"))]);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let err = consumer.run(&RefusingSubscriber, shutdown_rx).await.unwrap_err();
    assert!(matches!(err, StreamError::Status { .. }));
}

#[tokio::test]
async fn test_end_of_stream_is_an_error() {
    let sink = Arc::new(RecordingSink::new("recording"));
    let consumer = consumer_for(vec![sink.clone()]);
    let (subscriber, batches) = ScriptedSubscriber::new();
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    batches.events(vec![deployment_event("d-1", "")]);
    drop(batches);

    let err = tokio::time::timeout(WAIT, consumer.run(&subscriber, shutdown_rx))
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, StreamError::Ended));
    // Events already queued are still delivered before the end is noticed.
    assert_eq!(sink.calls().len(), 1);
}

#[tokio::test]
async fn test_shutdown_while_idle() {
    let consumer = consumer_for(vec![Arc::new(RecordingSink::new("recording"))]);
    let (subscriber, _batches) = ScriptedSubscriber::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(async move { consumer.run(&subscriber, shutdown_rx).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown_tx.send(true).unwrap();

    assert!(tokio::time::timeout(WAIT, handle).await.unwrap().unwrap().is_ok());
}
