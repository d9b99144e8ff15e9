//! Logging setup
//!
//! Installs the global `tracing` subscriber:
//! - a console layer whose filter follows `-v` / `-q`
//! - an optional log file layer at debug level
//! - an optional alert layer that forwards warnings and errors as private
//!   messages through the API

use crate::api::ApiClient;
use crate::config::{AlertSinkConfig, ApiConfig, LoggingConfig};
use crate::CrawlError;
use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Target used for the alert sink's own diagnostics, never forwarded
const ALERT_TARGET: &str = "alert_sink";

/// Crate prefix of the events the alert sink forwards
const CRATE_TARGET: &str = "group_graph";

/// Keeps the background parts of the logging stack alive
///
/// Call [`LoggingGuard::shutdown`] before exiting so queued alerts are
/// delivered.
#[derive(Debug, Default)]
pub struct LoggingGuard {
    alert: Option<AlertHandle>,
}

impl LoggingGuard {
    /// Stops accepting alerts and waits for the queued ones to be sent
    pub async fn shutdown(self) {
        if let Some(alert) = self.alert {
            alert.shutdown().await;
        }
    }
}

/// Console filter for a verbosity level
pub fn console_filter(verbose: u8, quiet: bool) -> EnvFilter {
    if quiet {
        return EnvFilter::new("error");
    }

    match verbose {
        0 => EnvFilter::new("group_graph=info,warn"),
        1 => EnvFilter::new("group_graph=debug,info"),
        2 => EnvFilter::new("group_graph=trace,debug"),
        _ => EnvFilter::new("trace"),
    }
}

/// Sets up the global subscriber
///
/// # Arguments
///
/// * `verbose` - Number of `-v` flags
/// * `quiet` - Only show errors on the console
/// * `logging` - Optional file and alert sinks
/// * `api` - Endpoint settings reused by the alert sink
///
/// # Returns
///
/// * `Ok(LoggingGuard)` - Subscriber installed
/// * `Err(CrawlError)` - The log file could not be opened or the alert
///   client could not be built
pub fn setup_logging(
    verbose: u8,
    quiet: bool,
    logging: &LoggingConfig,
    api: &ApiConfig,
) -> Result<LoggingGuard, CrawlError> {
    let console_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_filter(console_filter(verbose, quiet));

    let file_layer = if logging.file.enabled {
        if let Some(parent) = logging.file.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&logging.file.path)?;

        Some(
            fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_filter(EnvFilter::new("group_graph=debug,info")),
        )
    } else {
        None
    };

    let (alert_layer, alert) = if logging.alert.enabled {
        let (layer, handle) = spawn_alert_sink(&logging.alert, api)?;
        (Some(layer), Some(handle))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .with(alert_layer)
        .init();

    Ok(LoggingGuard { alert })
}

/// Builds the alert layer and starts the task delivering its messages
///
/// Alerts are sent from a background task, concurrently with crawl requests.
/// The task owns its own `ApiClient` built with the alert token, so it keeps
/// its own request spacing and never delays or consumes the crawl's rate
/// budget. Crawl requests themselves stay strictly sequential.
fn spawn_alert_sink(
    config: &AlertSinkConfig,
    api: &ApiConfig,
) -> Result<(AlertLayer, AlertHandle), CrawlError> {
    let client = ApiClient::with_token(api, &config.access_token)?;
    let (sender, receiver) = mpsc::unbounded_channel();
    let layer = AlertLayer::new(sender);

    let task = tokio::spawn(forward_alerts(client, config.user_id, receiver));

    Ok((
        layer.clone(),
        AlertHandle {
            sender: layer.sender,
            task,
        },
    ))
}

/// Sends queued alerts one by one until the queue is closed
async fn forward_alerts(client: ApiClient, user_id: u64, mut receiver: UnboundedReceiver<String>) {
    while let Some(message) = receiver.recv().await {
        if let Err(e) = client.messages_send(user_id, &message).await {
            tracing::warn!(target: ALERT_TARGET, "Failed to deliver alert: {}", e);
        }
    }
}

/// Handle to the alert delivery task
#[derive(Debug)]
pub struct AlertHandle {
    sender: Arc<Mutex<Option<UnboundedSender<String>>>>,
    task: JoinHandle<()>,
}

impl AlertHandle {
    /// Closes the alert queue and waits until every queued alert is sent
    pub async fn shutdown(self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
        if let Err(e) = self.task.await {
            eprintln!("Alert delivery task failed: {}", e);
        }
    }
}

/// Layer queuing warnings and errors of this crate for delivery
#[derive(Debug, Clone)]
pub struct AlertLayer {
    sender: Arc<Mutex<Option<UnboundedSender<String>>>>,
}

impl AlertLayer {
    pub fn new(sender: UnboundedSender<String>) -> Self {
        Self {
            sender: Arc::new(Mutex::new(Some(sender))),
        }
    }

    fn is_forwarded(event: &Event<'_>) -> bool {
        let metadata = event.metadata();
        *metadata.level() <= Level::WARN
            && metadata.target() != ALERT_TARGET
            && metadata.target().starts_with(CRATE_TARGET)
    }
}

impl<S: Subscriber> Layer<S> for AlertLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if !Self::is_forwarded(event) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let alert = format_alert(event.metadata().level(), &visitor.message);

        if let Ok(sender) = self.sender.lock() {
            if let Some(sender) = sender.as_ref() {
                // A closed queue means shutdown already started
                let _ = sender.send(alert);
            }
        }
    }
}

/// Formats an alert as `LEVEL - message`
pub fn format_alert(level: &Level, message: &str) -> String {
    format!("{} - {}", level, message)
}

/// Collects the message and any extra fields of an event
#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.message, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            let _ = write!(self.message, " {}={:?}", field.name(), value);
        }
    }
}
