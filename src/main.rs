//! `dispatchnet` command line: fire N requests at one URL through the
//! bounded dispatcher and report every outcome.

use anyhow::Context;
use clap::Parser;
use dispatchnet::dispatch::{await_all, Canceller, PrintCallback, ShutdownMode, Summary};
use dispatchnet::http::RequestTimeouts;
use dispatchnet::{Client, RequestDescriptor};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const EXIT_FAILURES: u8 = 1;
const EXIT_CONFIG: u8 = 2;

/// Bounded-concurrency HTTP request dispatcher
#[derive(Parser, Debug)]
#[command(name = "dispatchnet", version, about, long_about = None)]
struct Cli {
    /// Target URL (http only)
    url: String,

    /// Number of requests to send
    #[arg(short = 'n', long, env = "DISPATCHNET_COUNT", default_value_t = 10)]
    count: usize,

    /// Maximum concurrent connections overall
    #[arg(long, env = "DISPATCHNET_MAX_TOTAL", default_value_t = 4)]
    max_total: usize,

    /// Maximum concurrent connections to one destination
    #[arg(long, env = "DISPATCHNET_MAX_PER_DESTINATION", default_value_t = 4)]
    max_per_destination: usize,

    /// Runtime worker threads
    #[arg(long, env = "DISPATCHNET_WORKERS", default_value_t = 4,
          value_parser = clap::value_parser!(u16).range(1..))]
    workers: u16,

    /// Response deadline in milliseconds, from lease granted to full body
    #[arg(long, env = "DISPATCHNET_TIMEOUT_MS")]
    timeout_ms: Option<u64>,

    /// TCP connect deadline in milliseconds
    #[arg(long, env = "DISPATCHNET_CONNECT_TIMEOUT_MS")]
    connect_timeout_ms: Option<u64>,

    /// How long a request may wait for a pool slot, in milliseconds
    #[arg(long, env = "DISPATCHNET_ACQUIRE_TIMEOUT_MS")]
    acquire_timeout_ms: Option<u64>,

    /// Append `_=<i>` to each request so caches never answer
    #[arg(long, env = "DISPATCHNET_CACHE_BUST", default_value_t = false)]
    cache_bust: bool,

    /// Exit 0 even if some requests failed or were cancelled
    #[arg(long, env = "DISPATCHNET_ALLOW_FAILURES", default_value_t = false)]
    allow_failures: bool,

    /// Emit logs and the final summary as JSON
    #[arg(long, env = "DISPATCHNET_JSON", default_value_t = false)]
    json: bool,
}

impl Cli {
    fn timeouts(&self) -> RequestTimeouts {
        let defaults = RequestTimeouts::dispatcher_defaults();
        let ms = |value: Option<u64>| value.map(Duration::from_millis);
        RequestTimeouts {
            acquire: ms(self.acquire_timeout_ms).or(defaults.acquire),
            connect: ms(self.connect_timeout_ms).or(defaults.connect),
            response: ms(self.timeout_ms).or(defaults.response),
        }
    }
}

/// Logs go to stderr; stdout carries the per-request lines.
fn init_logging(json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

fn build_client(cli: &Cli) -> anyhow::Result<Client> {
    Client::builder()
        .max_total(cli.max_total)
        .max_per_destination(cli.max_per_destination)
        .timeouts(cli.timeouts())
        .shutdown_mode(ShutdownMode::Cancel)
        .user_agent(concat!("dispatchnet/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("invalid dispatcher configuration")
}

fn build_requests(cli: &Cli, client: &Client) -> anyhow::Result<Vec<RequestDescriptor>> {
    (0..cli.count)
        .map(|i| {
            let mut builder = client.get(&cli.url).accept_gzip();
            if cli.cache_bust {
                builder = builder.query("_", &i.to_string());
            }
            builder.build().with_context(|| format!("invalid request for {}", cli.url))
        })
        .collect()
}

fn print_summary(summary: &Summary, json: bool) {
    if json {
        match serde_json::to_string(summary) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::error!(error = %e, "failed to encode summary"),
        }
    } else {
        println!(
            "succeeded={} failed={} cancelled={}",
            summary.succeeded, summary.failed, summary.cancelled
        );
    }
}

async fn run(cli: Cli) -> ExitCode {
    let prepared = build_client(&cli).and_then(|client| {
        let requests = build_requests(&cli, &client)?;
        Ok((client, requests))
    });
    let (client, requests) = match prepared {
        Ok(prepared) => prepared,
        Err(e) => {
            tracing::error!("{e:#}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let handles = match client.dispatcher().submit_all(requests, PrintCallback) {
        Ok(handles) => handles,
        Err(e) => {
            tracing::error!(error = %e, "submission failed");
            return ExitCode::from(EXIT_FAILURES);
        }
    };
    tracing::info!(count = handles.len(), url = %cli.url, "requests submitted");

    let cancellers: Vec<Canceller> = handles.iter().map(|h| h.canceller()).collect();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling pending requests");
            for canceller in &cancellers {
                canceller.cancel();
            }
        }
    });

    let completed = await_all(handles).await;
    interrupt.abort();
    client.close().await;

    let summary = Summary::from(completed.as_slice());
    let stats = client.pool().stats();
    tracing::info!(
        peak_total = stats.peak_total,
        peak_per_destination = stats.peak_per_destination(),
        "pool usage"
    );
    print_summary(&summary, cli.json);

    if summary.all_succeeded() || cli.allow_failures {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_FAILURES)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.json);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(usize::from(cli.workers))
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "failed to start runtime");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    runtime.block_on(run(cli))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_defaults_and_timeouts() {
        let cli = Cli::try_parse_from(["dispatchnet", "http://127.0.0.1:8080/", "-n", "3", "--timeout-ms", "250"])
            .unwrap();
        assert_eq!(cli.count, 3);
        assert_eq!(cli.workers, 4);
        assert!(!cli.cache_bust);

        let timeouts = cli.timeouts();
        assert_eq!(timeouts.response, Some(Duration::from_millis(250)));
        assert_eq!(timeouts.connect, RequestTimeouts::dispatcher_defaults().connect);
    }

    #[test]
    fn test_cli_rejects_zero_workers() {
        assert!(Cli::try_parse_from(["dispatchnet", "http://x/", "--workers", "0"]).is_err());
    }
}
