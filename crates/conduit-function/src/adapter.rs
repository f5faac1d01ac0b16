//! Stdin/stdout function adapter.
//!
//! One process invocation handles one request: the whole input is read,
//! translated, dispatched through the [`Handler`], and exactly one JSON
//! [`Response`] is written to the output. Operational problems go to the
//! diagnostics stream so the output framing never changes.

use std::sync::Arc;

use conduit_core::{ErrorCode, RequestScope, Response};
use conduit_middleware::Handler;
use conduit_server::{ServerConfig, ServerError, ShutdownSignal};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::env::FunctionEnv;
use crate::error::{FunctionError, FunctionResult};
use crate::http_mode::FunctionHttp;
use crate::translate::{request_from_input, FunctionSettings};

/// The function adapter.
#[derive(Debug, Clone)]
pub struct FunctionAdapter {
    handler: Arc<Handler>,
    settings: FunctionSettings,
}

impl FunctionAdapter {
    /// Creates an adapter around `handler`.
    pub fn new(handler: Arc<Handler>, settings: FunctionSettings) -> Self {
        Self { handler, settings }
    }

    /// Returns the wired handler.
    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    /// Returns the function identity.
    pub fn settings(&self) -> &FunctionSettings {
        &self.settings
    }

    /// Translates `input`, dispatches it, and returns the response to
    /// report. Handler errors are folded into their failure response.
    pub async fn dispatch(&self, scope: &RequestScope, input: &[u8], env: &FunctionEnv) -> Response {
        let request = request_from_input(input, env, &self.settings);
        let request_id = request.id.clone();
        tracing::debug!(
            request_id,
            request_type = request.request_type.as_str(),
            "dispatching function invocation"
        );

        match self.handler.handle(scope, request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(request_id, error = %e, "function invocation failed");
                e.into_response()
            }
        }
    }

    /// Runs one invocation over explicit streams.
    ///
    /// Reads `input` to the end, writes exactly one JSON response to
    /// `output`, and reports operational problems on `diagnostics`. An
    /// unreadable input still produces an `INVALID_REQUEST` response.
    ///
    /// # Errors
    ///
    /// Returns an error only if the response cannot be encoded or written.
    pub async fn invoke<R, W, E>(
        &self,
        scope: &RequestScope,
        env: &FunctionEnv,
        mut input: R,
        mut output: W,
        mut diagnostics: E,
    ) -> FunctionResult<Response>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
        E: AsyncWrite + Unpin,
    {
        let mut buf = Vec::new();
        let response = match input.read_to_end(&mut buf).await {
            Ok(_) => self.dispatch(scope, &buf, env).await,
            Err(e) => {
                tracing::error!(error = %e, "failed to read function input");
                report(&mut diagnostics, &format!("failed to read input: {e}")).await;
                Response::failure(
                    ErrorCode::InvalidRequest,
                    format!("failed to read input: {e}"),
                    false,
                )
            }
        };

        if let Some(error) = response.error() {
            report(
                &mut diagnostics,
                &format!("request failed: {}: {}", error.code, error.message),
            )
            .await;
        }

        let body = serde_json::to_vec(&response)?;
        output.write_all(&body).await.map_err(FunctionError::Write)?;
        output.flush().await.map_err(FunctionError::Write)?;
        Ok(response)
    }

    /// Runs one invocation over the process's standard streams and
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the response cannot be written to stdout.
    pub async fn run_stdio(&self, shutdown: CancellationToken) -> FunctionResult<Response> {
        let scope = RequestScope::with_token(shutdown.child_token());
        self.invoke(
            &scope,
            &FunctionEnv::from_process(),
            tokio::io::stdin(),
            tokio::io::stdout(),
            tokio::io::stderr(),
        )
        .await
    }

    /// Binds the configured address and serves invocations over HTTP until
    /// `shutdown` fires.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or cannot be bound.
    pub async fn serve_http(self, config: ServerConfig, shutdown: ShutdownSignal) -> FunctionResult<()> {
        let addr = config.socket_addr().map_err(|e| ServerError::InvalidAddress {
            addr: config.addr().to_string(),
            reason: e.to_string(),
        })?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        self.serve_listener(listener, config, shutdown).await
    }

    /// Serves invocations over HTTP from an already bound listener.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener's local address cannot be read.
    pub async fn serve_listener(
        self,
        listener: TcpListener,
        config: ServerConfig,
        shutdown: ShutdownSignal,
    ) -> FunctionResult<()> {
        let service = FunctionHttp::new(self, config.max_request_size());
        conduit_server::serve_with(Arc::new(service), listener, &config, shutdown).await?;
        Ok(())
    }
}

async fn report<E: AsyncWrite + Unpin>(diagnostics: &mut E, line: &str) {
    let line = format!("{line}\n");
    if let Err(e) = diagnostics.write_all(line.as_bytes()).await {
        tracing::warn!(error = %e, "failed to write diagnostics");
    }
}
