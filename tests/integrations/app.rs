#[path = "../helpers/mod.rs"]
mod helpers;

use helpers::fake_source::{RefusingSubscriber, ScriptedSubscriber};
use helpers::mock_sink::RecordingSink;
use helpers::{deployment_event, oom_allocation_event};
use nomad_notifier::app::App;
use nomad_notifier::config::{Config, NomadConfig};
use nomad_notifier::core::{EntityKind, Sink};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_app_runs_until_shutdown() {
    let sink = Arc::new(RecordingSink::new("recording"));
    let (subscriber, batches) = ScriptedSubscriber::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let app = App::builder(Config::default())
        .sinks_override(vec![sink.clone() as Arc<dyn Sink>])
        .subscriber_override(Arc::new(subscriber))
        .build(shutdown_rx)
        .await
        .unwrap();
    assert_eq!(app.sink_names().to_vec(), vec!["recording".to_string()]);
    assert!(app.metrics_addr().is_none());

    let run = tokio::spawn(app.run());

    batches.events(vec![deployment_event("d-1", ""), oom_allocation_event("a-1")]);
    batches.events(vec![deployment_event("d-1", "")]);
    sink.wait_for_calls(3, WAIT).await;
    assert_eq!(
        sink.calls(),
        vec![
            (EntityKind::Deployment, "d-1".to_string()),
            (EntityKind::Allocation, "a-1".to_string()),
            (EntityKind::Deployment, "d-1".to_string()),
        ]
    );

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(WAIT, run).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn test_app_without_sinks_fails_to_build() {
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let err = App::builder(Config::default())
        .build(shutdown_rx)
        .await
        .err()
        .unwrap();
    assert!(err.to_string().contains("no notification sinks are enabled"));
}

#[tokio::test]
async fn test_app_fails_when_subscription_is_refused() {
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let app = App::builder(Config::default())
        .sinks_override(vec![Arc::new(RecordingSink::new("recording")) as Arc<dyn Sink>])
        .subscriber_override(Arc::new(RefusingSubscriber))
        .build(shutdown_rx)
        .await
        .unwrap();

    let err = tokio::time::timeout(WAIT, app.run()).await.unwrap().unwrap_err();
    assert!(format!("{:#}", err).contains("403"));
}

#[tokio::test]
async fn test_app_reads_the_nomad_http_stream() {
    let nomad = MockServer::start().await;
    let body = concat!(
        "{}\n",
        r#"{"Index":5,"Events":[{"Topic":"Deployment","Type":"DeploymentStatusUpdate","Key":"d-9","Index":5,"Payload":{"Deployment":{"ID":"d-9","JobID":"api","Status":"successful","TaskGroups":null}}}]}"#,
        "\n",
    );
    Mock::given(method("GET"))
        .and(path("/v1/event/stream"))
        .and(query_param("topic", "Deployment:*"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(1)
        .mount(&nomad)
        .await;

    let config = Config {
        nomad: NomadConfig {
            address: nomad.uri(),
            ..Default::default()
        },
        ..Default::default()
    };
    let sink = Arc::new(RecordingSink::new("recording"));
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let app = App::builder(config)
        .sinks_override(vec![sink.clone() as Arc<dyn Sink>])
        .build(shutdown_rx)
        .await
        .unwrap();

    // The mock closes the body after the last frame, which ends the stream.
    let err = tokio::time::timeout(WAIT, app.run()).await.unwrap().unwrap_err();
    assert!(format!("{:#}", err).contains("event stream ended"));
    assert_eq!(sink.calls(), vec![(EntityKind::Deployment, "d-9".to_string())]);
}
