//! Conduit echo worker.
//!
//! Echoes every payload back under whichever platform the environment
//! selects. Useful for smoke-testing a deployment.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use conduit::config::{ConfigLoader, ENV_PREFIX};
use conduit::{async_trait, HandlerResult, Request, RequestScope, Response, UseCase};

/// Returns the payload with the request id in the metadata.
struct Echo;

#[async_trait]
impl UseCase for Echo {
    async fn execute(&self, scope: &RequestScope, request: Request) -> HandlerResult {
        let mut response = Response::success(request.payload);
        if let Some(id) = scope.request_id() {
            response = response.with_metadata("echo-id", id);
        }
        Ok(response)
    }
}

/// Command-line arguments.
struct Args {
    /// Path to configuration file.
    config: Option<PathBuf>,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut config = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    config = args.next().map(PathBuf::from);
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("conduit-echo {}", env!("CARGO_PKG_VERSION"));
                    std::process::exit(0);
                }
                other => {
                    eprintln!("Unknown argument: {other}");
                    eprintln!("Use --help for usage information");
                    std::process::exit(1);
                }
            }
        }

        Self { config }
    }
}

fn print_help() {
    println!(
        r"conduit-echo - echo worker for every Conduit platform

USAGE:
    conduit-echo [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Path to configuration file (TOML or JSON)
    -h, --help             Print help information
    -v, --version          Print version information

PLATFORM DETECTION:
    AWS_LAMBDA_RUNTIME_API    SQS batches through the Lambda runtime API
    fprocess                  OpenFaaS function over stdin/stdout
    RABBITMQ_URL / AMQP_URL   RabbitMQ consumer
    (none)                    HTTP server
    CONDUIT__WORKER__PLATFORM forces one of http, sqs, rabbitmq, openfaas

CONFIGURATION OVERRIDES:
    CONDUIT__<SECTION>__<KEY>, e.g. CONDUIT__HTTP__ADDR=0.0.0.0:9000
"
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut loader = ConfigLoader::new().with_defaults();
    if let Some(path) = &args.config {
        loader = loader
            .with_file(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
    }
    let config = loader
        .with_dotenv()?
        .with_env_prefix(ENV_PREFIX)
        .load()
        .context("invalid configuration")?;

    conduit::run(Arc::new(Echo), config).await?;
    Ok(())
}
