//! HTTP-compatibility mode over a real listener.

use std::sync::Arc;
use std::time::Duration;

use conduit_core::fixtures::{EchoUseCase, FailingUseCase};
use conduit_core::UseCase;
use conduit_function::{FunctionAdapter, FunctionSettings};
use conduit_middleware::Handler;
use conduit_server::{ServerConfig, ShutdownSignal};
use tokio::net::TcpListener;

async fn start(use_case: Arc<dyn UseCase>) -> (String, ShutdownSignal, tokio::task::JoinHandle<()>) {
    let handler = Handler::builder(use_case).platform("openfaas").build();
    let adapter = FunctionAdapter::new(Arc::new(handler), FunctionSettings::named("echo"));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let config = ServerConfig::builder()
        .shutdown_timeout(Duration::from_millis(200))
        .build();

    let shutdown = ShutdownSignal::new();
    let task = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            adapter.serve_listener(listener, config, shutdown).await.unwrap();
        }
    });
    (base, shutdown, task)
}

#[tokio::test]
async fn test_invocation_over_http() {
    let (base, shutdown, task) = start(Arc::new(EchoUseCase::new())).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/greet"))
        .header("x-call-id", "call-42")
        .body(r#"{"name":"ada"}"#)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["x-request-id"], "call-42");
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["data"]["name"], "ada");

    shutdown.trigger();
    task.await.unwrap();
}

#[tokio::test]
async fn test_failure_status_over_http() {
    let (base, shutdown, task) = start(Arc::new(FailingUseCase::new("RATE_LIMITED", true))).await;

    let response = reqwest::Client::new()
        .put(format!("{base}/"))
        .body("{}")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 429);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "RATE_LIMITED");
    assert_eq!(body["error"]["retryable"], true);

    shutdown.trigger();
    task.await.unwrap();
}
