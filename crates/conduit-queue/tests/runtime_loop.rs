//! Invocation loop against a mock Lambda Runtime API.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use conduit_core::{ErrorCode, FnUseCase, Request, Response};
use conduit_middleware::Handler;
use conduit_queue::{run, QueueAdapter, QueueAdapterConfig, RuntimeClient};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

struct MockRuntime {
    invocations: Mutex<VecDeque<(&'static str, String)>>,
    posts: mpsc::UnboundedSender<(String, serde_json::Value)>,
}

async fn route(
    runtime: Arc<MockRuntime>,
    request: http::Request<Incoming>,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let path = request.uri().path().to_string();

    if request.method() == http::Method::GET && path.ends_with("/invocation/next") {
        let next = runtime.invocations.lock().pop_front();
        let Some((id, body)) = next else {
            // Long poll with nothing queued.
            std::future::pending::<()>().await;
            unreachable!();
        };
        let deadline = chrono::Utc::now().timestamp_millis() + 30_000;
        let response = http::Response::builder()
            .header("Lambda-Runtime-Aws-Request-Id", id)
            .header("Lambda-Runtime-Deadline-Ms", deadline.to_string())
            .header("Lambda-Runtime-Trace-Id", "Root=1-5759e988-bd862e3fe1be46a994272793")
            .body(Full::new(Bytes::from(body)))
            .unwrap();
        return Ok(response);
    }

    let body = request.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    runtime.posts.send((path, json)).unwrap();

    Ok(http::Response::builder()
        .status(202)
        .body(Full::new(Bytes::new()))
        .unwrap())
}

async fn start_mock(
    invocations: Vec<(&'static str, String)>,
) -> (String, mpsc::UnboundedReceiver<(String, serde_json::Value)>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    let runtime = Arc::new(MockRuntime {
        invocations: Mutex::new(invocations.into()),
        posts: tx,
    });

    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            let runtime = Arc::clone(&runtime);
            tokio::spawn(async move {
                let service = service_fn(move |req| route(Arc::clone(&runtime), req));
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    (addr.to_string(), rx)
}

fn adapter(partial_batch_failure: bool) -> QueueAdapter {
    let use_case = FnUseCase::new(|_scope, request: Request| async move {
        if request.id == "m-2" {
            Ok(Response::failure(ErrorCode::Temporary, "try later", true))
        } else {
            Ok(Response::success(request.payload))
        }
    });
    let handler = Handler::builder(Arc::new(use_case)).platform("sqs").build();
    QueueAdapter::new(
        Arc::new(handler),
        QueueAdapterConfig {
            partial_batch_failure,
            ..QueueAdapterConfig::default()
        },
    )
}

const BATCH: &str = r#"{"Records":[
    {"messageId":"m-1","body":"{\"n\":1}"},
    {"messageId":"m-2","body":"{\"n\":2}"}
]}"#;

#[tokio::test]
async fn test_loop_reports_partial_batch_failure() {
    let (api, mut posts) = start_mock(vec![("inv-1", BATCH.to_string())]).await;
    let client = RuntimeClient::new(&api).unwrap();
    let adapter = adapter(true);
    let shutdown = CancellationToken::new();

    let loop_shutdown = shutdown.clone();
    let task = tokio::spawn(async move { run(&adapter, &client, loop_shutdown).await });

    let (path, body) = tokio::time::timeout(Duration::from_secs(5), posts.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(path, "/2018-06-01/runtime/invocation/inv-1/response");
    assert_eq!(
        body,
        serde_json::json!({"batchItemFailures": [{"itemIdentifier": "m-2"}]})
    );

    shutdown.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_loop_reports_batch_abort_and_bad_events() {
    let (api, mut posts) = start_mock(vec![
        ("inv-1", BATCH.to_string()),
        ("inv-2", "not json".to_string()),
    ])
    .await;
    let client = RuntimeClient::new(&api).unwrap();
    let adapter = adapter(false);
    let shutdown = CancellationToken::new();

    let loop_shutdown = shutdown.clone();
    let task = tokio::spawn(async move { run(&adapter, &client, loop_shutdown).await });

    let (path, body) = posts.recv().await.unwrap();
    assert_eq!(path, "/2018-06-01/runtime/invocation/inv-1/error");
    assert_eq!(body["errorType"], "BatchFailed");

    let (path, body) = posts.recv().await.unwrap();
    assert_eq!(path, "/2018-06-01/runtime/invocation/inv-2/error");
    assert_eq!(body["errorType"], "InvalidEvent");

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}
