//! Lambda Runtime API client and invocation loop.
//!
//! The loop long-polls `invocation/next`, processes the batch with the
//! invocation's deadline as the scope deadline, and posts either the batch
//! response or an error report back.

use std::time::Duration;

use bytes::Bytes;
use chrono::{TimeZone, Utc};
use conduit_core::RequestScope;
use http::HeaderMap;
use reqwest::Client;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::adapter::QueueAdapter;
use crate::error::{QueueError, QueueResult};
use crate::event::SqsEvent;

/// Environment variable holding the runtime API host and port.
pub const RUNTIME_API_ENV: &str = "AWS_LAMBDA_RUNTIME_API";

/// Runtime API version prefix.
pub const API_VERSION: &str = "2018-06-01";

const REQUEST_ID_HEADER: &str = "lambda-runtime-aws-request-id";
const DEADLINE_HEADER: &str = "lambda-runtime-deadline-ms";
const TRACE_ID_HEADER: &str = "lambda-runtime-trace-id";
const FUNCTION_ARN_HEADER: &str = "lambda-runtime-invoked-function-arn";

/// One invocation fetched from the runtime API.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Runtime-assigned request id.
    pub request_id: String,

    /// Deadline as milliseconds since the Unix epoch.
    pub deadline_ms: Option<i64>,

    /// X-Ray trace header.
    pub trace_id: Option<String>,

    /// ARN of the invoked function.
    pub function_arn: Option<String>,

    /// Raw event payload.
    pub payload: Bytes,
}

impl Invocation {
    fn from_parts(headers: &HeaderMap, payload: Bytes) -> QueueResult<Self> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        Ok(Self {
            request_id: header(REQUEST_ID_HEADER).ok_or(QueueError::MissingHeader(REQUEST_ID_HEADER))?,
            deadline_ms: header(DEADLINE_HEADER).and_then(|v| v.parse().ok()),
            trace_id: header(TRACE_ID_HEADER),
            function_arn: header(FUNCTION_ARN_HEADER),
            payload,
        })
    }

    /// Returns the time left before the deadline, or `None` without one.
    pub fn remaining(&self) -> Option<Duration> {
        let deadline = Utc.timestamp_millis_opt(self.deadline_ms?).single()?;
        Some((deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO))
    }
}

/// Error body posted to the runtime API.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    /// Human-readable message.
    pub error_message: String,
    /// Error classification.
    pub error_type: String,
}

impl From<&QueueError> for ErrorReport {
    fn from(error: &QueueError) -> Self {
        Self {
            error_message: error.to_string(),
            error_type: error.error_type().to_string(),
        }
    }
}

/// Client for the Lambda Runtime API.
#[derive(Debug, Clone)]
pub struct RuntimeClient {
    client: Client,
    base_url: String,
}

impl RuntimeClient {
    /// Creates a client for `api` (`host:port`, as found in
    /// [`RUNTIME_API_ENV`]).
    ///
    /// The client sets no request timeout: `next` long-polls.
    pub fn new(api: &str) -> QueueResult<Self> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            base_url: format!("http://{api}/{API_VERSION}/runtime"),
        })
    }

    /// Creates a client from [`RUNTIME_API_ENV`], if set.
    pub fn from_env() -> Option<QueueResult<Self>> {
        std::env::var(RUNTIME_API_ENV)
            .ok()
            .filter(|api| !api.is_empty())
            .map(|api| Self::new(&api))
    }

    /// Returns the base URL, ending in `/runtime`.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Waits for the next invocation.
    pub async fn next(&self) -> QueueResult<Invocation> {
        let response = self
            .client
            .get(format!("{}/invocation/next", self.base_url))
            .send()
            .await?;
        let response = Self::check(response).await?;
        let headers = response.headers().clone();
        let payload = response.bytes().await?;
        Invocation::from_parts(&headers, payload)
    }

    /// Posts the result of an invocation.
    pub async fn respond<T: Serialize + ?Sized>(&self, request_id: &str, body: &T) -> QueueResult<()> {
        let response = self
            .client
            .post(format!("{}/invocation/{request_id}/response", self.base_url))
            .json(body)
            .send()
            .await?;
        Self::check(response).await.map(drop)
    }

    /// Reports a failed invocation.
    pub async fn fail(&self, request_id: &str, report: &ErrorReport) -> QueueResult<()> {
        let response = self
            .client
            .post(format!("{}/invocation/{request_id}/error", self.base_url))
            .header("Lambda-Runtime-Function-Error-Type", report.error_type.as_str())
            .json(report)
            .send()
            .await?;
        Self::check(response).await.map(drop)
    }

    async fn check(response: reqwest::Response) -> QueueResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(QueueError::RuntimeStatus {
            status: status.as_u16(),
            body,
        })
    }
}

/// Serves invocations until `shutdown` is cancelled.
///
/// Each batch runs under a scope whose deadline is the invocation deadline.
/// Batch aborts and malformed events are reported through the error
/// endpoint; failures talking to the runtime API end the loop.
pub async fn run(
    adapter: &QueueAdapter,
    client: &RuntimeClient,
    shutdown: CancellationToken,
) -> QueueResult<()> {
    tracing::info!(runtime = client.base_url(), "queue adapter polling runtime API");

    loop {
        let invocation = tokio::select! {
            () = shutdown.cancelled() => break,
            next = client.next() => next?,
        };
        handle_invocation(adapter, client, &shutdown, &invocation).await?;
    }

    tracing::info!("queue adapter stopped");
    Ok(())
}

async fn handle_invocation(
    adapter: &QueueAdapter,
    client: &RuntimeClient,
    shutdown: &CancellationToken,
    invocation: &Invocation,
) -> QueueResult<()> {
    let request_id = invocation.request_id.as_str();
    let base = RequestScope::with_token(shutdown.child_token());
    let scope = match invocation.remaining() {
        Some(remaining) => base.with_timeout(remaining),
        None => base,
    };

    let outcome = match serde_json::from_slice::<SqsEvent>(&invocation.payload) {
        Ok(event) => {
            adapter
                .process_traced(&scope, &event, invocation.trace_id.as_deref())
                .await
        }
        Err(e) => Err(QueueError::from(e)),
    };

    match outcome {
        Ok(batch) => client.respond(request_id, &batch).await,
        Err(e) => {
            tracing::error!(request_id, error = %e, "invocation failed");
            client.fail(request_id, &ErrorReport::from(&e)).await
        }
    }
}
