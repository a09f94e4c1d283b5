//! Reqmux - command line front end for the batch coordinator
//!
//! Reads a JSON list of request specs, executes them through a coordinator
//! against a live batch endpoint, and prints the demultiplexed results.

use clap::{Arg, Command};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reqmux_coordinator::{
    ApiRequest, BatchCoordinator, CoordinatorConfig, HttpMethod, VERSION,
};

/// One request as described in the input file
#[derive(Debug, Deserialize)]
struct RequestSpec {
    endpoint: String,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    params: Option<HashMap<String, Value>>,
    #[serde(default)]
    body: Option<Value>,
    #[serde(default)]
    headers: Option<HashMap<String, String>>,
    #[serde(default)]
    ignore_errors: bool,
}

impl RequestSpec {
    fn into_request(self) -> anyhow::Result<ApiRequest> {
        let method: HttpMethod = match &self.method {
            Some(name) => name.parse()?,
            None => HttpMethod::Get,
        };

        let mut request = ApiRequest::new(method, self.endpoint);
        if let Some(id) = self.id {
            request = request.with_id(id);
        }
        request.params = self.params;
        request.body = self.body;
        request.headers = self.headers;
        request.ignore_errors = self.ignore_errors;
        Ok(request)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = Command::new("reqmux")
        .version(VERSION)
        .about("Reqmux - batched API request execution")
        .arg(
            Arg::new("requests")
                .short('r')
                .long("requests")
                .value_name("FILE")
                .help("JSON file containing the request list")
                .required(true),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config/reqmux"),
        )
        .arg(
            Arg::new("batch-url")
                .long("batch-url")
                .value_name("URL")
                .help("Override the batch endpoint URL"),
        )
        .arg(
            Arg::new("base-url")
                .long("base-url")
                .value_name("URL")
                .help("Override the fallback base URL"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)")
                .default_value("info"),
        )
        .arg(
            Arg::new("stats")
                .long("stats")
                .help("Print coordinator statistics after execution")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let log_level = matches.get_one::<String>("log-level").map(String::as_str);
    init_logging(log_level.unwrap_or("info"));

    info!(version = VERSION, "Starting reqmux");

    // Load configuration and apply command line overrides
    let mut config = load_config(matches.get_one::<String>("config").map(String::as_str))?;
    if let Some(url) = matches.get_one::<String>("batch-url") {
        config.endpoint.batch_url = url.clone();
    }
    if let Some(url) = matches.get_one::<String>("base-url") {
        config.endpoint.base_url = url.clone();
    }

    // Read and parse the request list
    let requests_path = matches
        .get_one::<String>("requests")
        .map(String::as_str)
        .unwrap_or_default();
    let raw = std::fs::read_to_string(requests_path)?;
    let specs: Vec<RequestSpec> = serde_json::from_str(&raw)?;
    let requests = specs
        .into_iter()
        .map(RequestSpec::into_request)
        .collect::<anyhow::Result<Vec<_>>>()?;

    info!(
        request_count = requests.len(),
        batch_url = config.endpoint.batch_url.as_str(),
        "Executing request list"
    );

    let coordinator = BatchCoordinator::new(config).await?;

    let labeled: Vec<(String, String)> = requests
        .iter()
        .map(|r| (r.id.clone(), r.endpoint.clone()))
        .collect();

    let futures: Vec<_> = requests
        .into_iter()
        .map(|request| coordinator.submit(request))
        .collect();

    let outcomes = tokio::select! {
        outcomes = futures::future::join_all(futures) => outcomes,
        _ = shutdown_signal() => {
            warn!("Interrupted, cancelling pending requests");
            coordinator.cancel_all_pending().await;
            coordinator.shutdown().await;
            return Ok(());
        }
    };

    let report: Vec<Value> = labeled
        .into_iter()
        .zip(outcomes)
        .map(|((id, endpoint), outcome)| match outcome {
            Ok(data) => json!({"id": id, "endpoint": endpoint, "ok": true, "data": data}),
            Err(error) => {
                json!({"id": id, "endpoint": endpoint, "ok": false, "error": error.to_string()})
            }
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&report)?);

    if matches.get_flag("stats") {
        let stats = coordinator.statistics().await;
        eprintln!("{}", serde_json::to_string_pretty(&stats)?);
    }

    coordinator.shutdown().await;
    info!("Reqmux finished");
    Ok(())
}

/// Initialize logging with the specified level
fn init_logging(log_level: &str) {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => {
            eprintln!("Invalid log level: {}. Using 'info'", log_level);
            tracing::Level::INFO
        }
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("reqmux_coordinator={}", level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Load configuration from file and environment
fn load_config(config_path: Option<&str>) -> anyhow::Result<CoordinatorConfig> {
    let config = match config_path {
        Some(path) => CoordinatorConfig::load_from(path)?,
        None => CoordinatorConfig::load()?,
    };
    config.validate()?;
    Ok(config)
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if signal::ctrl_c().await.is_err() {
            warn!("Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => {
                warn!("Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
