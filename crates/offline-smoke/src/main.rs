//! Offline worker smoke harness
//!
//! Runs one worker generation against a live origin: install (precache),
//! activate (reap), then replays a list of page requests through the
//! interception policy and prints a JSON summary of where each answer came
//! from. Optionally delivers a push and a notification click.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use offline_common::{init_logging, LogConfig, LogFormat, OfflineError, Result, ResultExt};
use offline_net::{Destination, HttpNetwork, LoaderConfig, Request, Url};
use offline_sw::{
    ClientWindows, FetchOutcome, MemoryCacheStorage, NotificationClick, NotificationId,
    NotificationOptions, NotificationSink, OfflineConfig, OfflineWorker, PushMessage, WorkerHost,
};
use serde_json::json;
use tracing::{error, info};

/// Performance timing collector for tracking operation durations.
struct PerfTiming {
    timings: RefCell<HashMap<&'static str, Vec<Duration>>>,
}

impl PerfTiming {
    fn new() -> Self {
        Self {
            timings: RefCell::new(HashMap::new()),
        }
    }

    fn record(&self, operation: &'static str, duration: Duration) {
        self.timings
            .borrow_mut()
            .entry(operation)
            .or_default()
            .push(duration);
    }

    fn summary(&self) -> serde_json::Value {
        let timings = self.timings.borrow();
        let mut summary = serde_json::Map::new();

        for (op, durations) in timings.iter() {
            if durations.is_empty() {
                continue;
            }

            let count = durations.len();
            let total_ms: f64 = durations.iter().map(|d| d.as_secs_f64() * 1000.0).sum();
            let max_ms = durations
                .iter()
                .map(|d| d.as_secs_f64() * 1000.0)
                .fold(f64::NEG_INFINITY, f64::max);

            summary.insert(
                op.to_string(),
                json!({
                    "count": count,
                    "total_ms": (total_ms * 100.0).round() / 100.0,
                    "avg_ms": (total_ms / count as f64 * 100.0).round() / 100.0,
                    "max_ms": (max_ms * 100.0).round() / 100.0,
                }),
            );
        }

        serde_json::Value::Object(summary)
    }
}

/// Parse command line arguments
struct Args {
    config: Option<String>,
    origin: Option<String>,
    version: Option<String>,
    log_format: LogFormat,
    /// 0 = info, 1 = debug, 2+ = trace.
    verbosity: u8,
    fetches: Vec<String>,
    push: Option<String>,
    click: Option<String>,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut parsed = Self {
            config: None,
            origin: None,
            version: None,
            log_format: LogFormat::Pretty,
            verbosity: 0,
            fetches: Vec::new(),
            push: None,
            click: None,
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => parsed.config = args.next(),
                "--origin" => parsed.origin = args.next(),
                "--version" => parsed.version = args.next(),
                "--log-format" => {
                    if let Some(val) = args.next() {
                        parsed.log_format = val.parse().unwrap_or_else(|e| {
                            eprintln!("Warning: {e}, using pretty");
                            LogFormat::Pretty
                        });
                    }
                }
                "--verbose" | "-v" => parsed.verbosity = parsed.verbosity.max(1),
                "--trace" | "-vv" => parsed.verbosity = 2,
                "--fetch" => {
                    if let Some(path) = args.next() {
                        parsed.fetches.push(path);
                    }
                }
                "--push" => parsed.push = args.next(),
                "--click" => parsed.click = args.next(),
                other => eprintln!("Warning: ignoring unknown argument {other}"),
            }
        }

        parsed
    }

    fn load_config(&self) -> Result<OfflineConfig> {
        let mut config = match self.config {
            Some(ref path) => OfflineConfig::load(path)?,
            None => OfflineConfig::default(),
        };
        if let Some(ref origin) = self.origin {
            config.origin = Url::parse(origin).map_err(|e| {
                OfflineError::config_with_source(format!("invalid origin {origin}"), e)
            })?;
        }
        if let Some(ref version) = self.version {
            config = config.with_version(version.clone());
        }
        config.validate()?;
        Ok(config)
    }
}

/// Prints notifications instead of displaying them.
struct ConsoleNotifications {
    next_id: std::sync::atomic::AtomicU32,
}

#[async_trait]
impl NotificationSink for ConsoleNotifications {
    async fn show_notification(
        &self,
        title: &str,
        options: NotificationOptions,
    ) -> Result<NotificationId> {
        let n = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let id = NotificationId(format!("smoke-{n}"));
        info!(id = %id.0, title, body = %options.body, "Notification shown");
        Ok(id)
    }

    async fn close(&self, id: &NotificationId) -> Result<()> {
        info!(id = %id.0, "Notification closed");
        Ok(())
    }
}

/// Logs window requests instead of opening them.
struct ConsoleWindows;

#[async_trait]
impl ClientWindows for ConsoleWindows {
    async fn open_window(&self, url: &Url) -> Result<()> {
        info!(%url, "Window opened");
        Ok(())
    }
}

fn describe(outcome: &Result<FetchOutcome>) -> serde_json::Value {
    match outcome {
        Ok(FetchOutcome::Respond { response, source }) => json!({
            "outcome": "respond",
            "source": format!("{source:?}").to_lowercase(),
            "status": response.status.as_u16(),
            "bytes": response.body_len(),
        }),
        Ok(FetchOutcome::Passthrough) => json!({ "outcome": "passthrough" }),
        Ok(FetchOutcome::NoResponse) => json!({ "outcome": "no_response" }),
        Err(e) => json!({ "outcome": "error", "category": e.category(), "error": e.to_string() }),
    }
}

async fn run(args: Args) -> Result<String> {
    let perf = PerfTiming::new();
    let config = args.load_config()?;

    info!(
        version = %config.version,
        origin = %config.origin,
        entries = config.precache.len(),
        "Starting offline smoke run"
    );

    let network = HttpNetwork::new(LoaderConfig::default(), config.origin.clone())?;
    let worker = OfflineWorker::new(
        config.clone(),
        Arc::new(MemoryCacheStorage::new()),
        Arc::new(network),
        Arc::new(ConsoleNotifications {
            next_id: std::sync::atomic::AtomicU32::new(1),
        }),
        Arc::new(ConsoleWindows),
    )?;
    let host = WorkerHost::new(worker);

    let start = Instant::now();
    let (precache, reap) = host.start().await?;
    perf.record("lifecycle", start.elapsed());

    let client = config.scope_url()?;
    let mut fetches = Vec::with_capacity(args.fetches.len());
    for path in &args.fetches {
        let url = config.resolve(path)?;
        let request = if path.ends_with('/') || !path.contains('.') {
            Request::navigate(url)
        } else {
            Request::get(url).with_destination(Destination::Other)
        };

        let fetch_start = Instant::now();
        let outcome = host.fetch(&request, Some(&client)).await;
        perf.record("fetch", fetch_start.elapsed());

        if let Err(ref e) = outcome {
            error!(path = %path, error = %e, "Fetch failed");
        }
        let mut entry = describe(&outcome);
        entry["path"] = json!(path);
        fetches.push(entry);
    }

    let notification = match args.push {
        Some(text) => {
            let id = host.push(PushMessage::text(text)).await?;
            let opened = match args.click {
                Some(action) => {
                    host.notification_click(NotificationClick {
                        notification_id: id.clone(),
                        action: Some(action),
                    })
                    .await?
                }
                None => false,
            };
            json!({ "id": id.0, "window_opened": opened })
        }
        None => serde_json::Value::Null,
    };

    let summary = json!({
        "version": config.version,
        "state": format!("{:?}", host.state().await),
        "precached": precache.map(|r| r.stored.len()),
        "reaped": reap.deleted,
        "reap_failures": reap.failed.len(),
        "fetches": fetches,
        "notification": notification,
        "perf": perf.summary(),
    });
    serde_json::to_string_pretty(&summary).context("rendering summary")
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let log_config = match args.verbosity {
        0 => LogConfig::default(),
        1 => LogConfig::debug(),
        _ => LogConfig::trace(),
    };
    init_logging(log_config.with_format(args.log_format));

    match run(args).await {
        Ok(summary) => println!("{}", summary),
        Err(e) => {
            error!(error = %e, category = e.category(), "Smoke run failed");
            std::process::exit(1);
        }
    }
}
