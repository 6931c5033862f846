//! # msgq
//!
//! Command-line front end for the message queue engine.
//!
//! Commands:
//! - `process` runs a flush and/or consume pass over one queue. Deferred
//!   command launchers invoke the binary this way.
//! - `send` enqueues one message and then runs the deferred pass.
//! - `interfaces` prints the configured interfaces in routing order.

use clap::{Parser, Subcommand};
use message_queue::settings::NamedInterface;
use message_queue::{
    Body, ConfigurationError, DeferredReport, Envelope, Header, MessageQueue,
    MessageQueueSettings, ProcessOutcome, QueueError, ShutdownActions,
};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// ============================================================================
// CLI Structure
// ============================================================================

/// msgq - send, inspect and process message queues
#[derive(Parser, Debug)]
#[command(name = "msgq")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Send, inspect and process message queues")]
pub struct Cli {
    /// Settings file (YAML, TOML or JSON)
    #[arg(short, long, env = "MSGQ_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log filter, e.g. `info` or `message_queue=debug`
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Flush and/or consume one queue
    Process {
        /// Queue to process
        #[arg(long)]
        queue: String,

        /// `flush`, `consume`, `flush,consume`, `all` or `none`
        #[arg(long, default_value = "all")]
        actions: ShutdownActions,

        /// Maximum number of messages to consume
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Send a message
    Send {
        /// Destination queue
        queue: String,

        /// Message body, sent as text unless `--json` is given
        body: String,

        /// Parse the body as JSON
        #[arg(long)]
        json: bool,

        /// Header entry as `key=value` (repeatable)
        #[arg(long = "header", value_parser = parse_header)]
        headers: Vec<(String, String)>,

        /// Bypass the interface's send buffer
        #[arg(long)]
        unbuffered: bool,
    },

    /// List interfaces in routing order
    Interfaces {
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// One tab separated line per interface
    Text,
    Json,
    Yaml,
}

fn parse_header(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((key, entry)) if !key.is_empty() => Ok((key.to_string(), entry.to_string())),
        _ => Err(format!("expected key=value, got '{}'", value)),
    }
}

// ============================================================================
// CLI Error Types
// ============================================================================

/// CLI-specific errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Command failed: {message}")]
    CommandFailed { message: String },

    #[error("Invalid argument: {arg} - {message}")]
    InvalidArgument { arg: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No messages on queue '{queue}'")]
    NoMessages { queue: String },
}

impl CliError {
    /// Process exit code for this error.
    ///
    /// Configuration problems surfaced by the engine share the code of
    /// configuration problems found while loading settings.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 1,
            Self::Queue(e) if e.is_fatal() => 1,
            Self::Queue(_) => 2,
            Self::CommandFailed { .. } => 3,
            Self::InvalidArgument { .. } => 4,
            Self::Io(_) => 5,
            Self::NoMessages { .. } => 6,
        }
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

/// Parse arguments, initialise logging and run the selected command
pub async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();
    initialize_logging(&cli)?;
    execute(cli).await
}

/// Run an already parsed command line
pub async fn execute(cli: Cli) -> Result<(), CliError> {
    let settings = MessageQueueSettings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Process {
            queue,
            actions,
            limit,
        } => execute_process_command(&settings, &queue, actions, limit).await,
        Commands::Send {
            queue,
            body,
            json,
            headers,
            unbuffered,
        } => execute_send_command(&settings, &queue, &body, json, headers, unbuffered).await,
        Commands::Interfaces { format } => {
            let rendered = render_interfaces(&settings, format)?;
            print!("{}", rendered);
            Ok(())
        }
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `--log-level`.
/// Logs go to stderr so command output on stdout stays machine readable.
pub fn initialize_logging(cli: &Cli) -> Result<(), CliError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .map_err(|e| CliError::InvalidArgument {
            arg: "log-level".to_string(),
            message: e.to_string(),
        })?;

    let layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(filter);
    let result = if cli.json_logs {
        registry.with(layer.json()).try_init()
    } else {
        registry.with(layer).try_init()
    };

    result.map_err(|e| CliError::CommandFailed {
        message: format!("failed to initialise logging: {}", e),
    })
}

// ============================================================================
// Command Implementations
// ============================================================================

/// A running engine and, with the worker launcher, its deferred worker
struct Engine {
    queue: Arc<MessageQueue>,
    worker: Option<JoinHandle<usize>>,
}

impl Engine {
    async fn start(settings: &MessageQueueSettings) -> Result<Self, CliError> {
        let builder = settings.builder().await?;

        if settings.uses_worker() {
            let (queue, worker) = builder.build_with_worker()?;
            return Ok(Self {
                queue,
                worker: Some(worker),
            });
        }

        Ok(Self {
            queue: Arc::new(builder.build()?),
            worker: None,
        })
    }

    /// Run the deferred pass and wait for the worker to drain
    async fn shutdown(self) -> Result<DeferredReport, CliError> {
        let report = self.queue.shutdown();
        for (queue, reason) in &report.failed {
            warn!(queue = %queue, reason = %reason, "Deferred consumer was not launched");
        }

        if let Some(worker) = self.worker {
            let completed = worker.await.map_err(|e| CliError::CommandFailed {
                message: format!("deferred worker failed: {}", e),
            })?;
            info!(completed, "Deferred worker finished");
        }

        Ok(report)
    }
}

/// Process one queue. Deferred dispatch stays off so a consumer pass never
/// launches further passes.
async fn execute_process_command(
    settings: &MessageQueueSettings,
    queue: &str,
    actions: ShutdownActions,
    limit: Option<usize>,
) -> Result<(), CliError> {
    info!(queue = %queue, actions = %actions, limit = ?limit, "Processing queue");

    let engine = settings
        .builder()
        .await?
        .deferred_enabled(false)
        .build()?;

    match engine.process(queue, actions, limit).await? {
        ProcessOutcome::NoMessages => Err(CliError::NoMessages {
            queue: queue.to_string(),
        }),
        ProcessOutcome::Processed { flushed, consumed } => {
            info!(queue = %queue, flushed, consumed, "Queue processed");
            Ok(())
        }
    }
}

async fn execute_send_command(
    settings: &MessageQueueSettings,
    queue: &str,
    body: &str,
    json: bool,
    headers: Vec<(String, String)>,
    unbuffered: bool,
) -> Result<(), CliError> {
    let envelope = build_envelope(body, json, headers)?;
    let engine = Engine::start(settings).await?;

    let sent = if unbuffered {
        engine.queue.send_unbuffered(queue, envelope).await
    } else {
        engine.queue.send(queue, envelope).await
    };
    let report = engine.shutdown().await;

    sent?;
    let report = report?;
    info!(
        queue = %queue,
        deferred = report.launched.len(),
        "Message sent"
    );
    Ok(())
}

fn build_envelope(
    body: &str,
    json: bool,
    headers: Vec<(String, String)>,
) -> Result<Envelope, CliError> {
    let body = if json {
        let value: Value = serde_json::from_str(body).map_err(|e| CliError::InvalidArgument {
            arg: "body".to_string(),
            message: e.to_string(),
        })?;
        Body::from(value)
    } else {
        Body::from(body)
    };

    let header: Header = headers
        .into_iter()
        .map(|(key, value)| (key, Value::String(value)))
        .collect();

    let mut envelope = Envelope::new(body);
    envelope.merge_header(header);
    Ok(envelope)
}

fn render_interfaces(
    settings: &MessageQueueSettings,
    format: OutputFormat,
) -> Result<String, CliError> {
    let interfaces: Vec<NamedInterface> = settings
        .effective_interfaces()?
        .into_iter()
        .map(|(name, config)| NamedInterface { name, config })
        .collect();

    let rendered = match format {
        OutputFormat::Text => interfaces
            .iter()
            .map(|entry| {
                format!(
                    "{}\t{}\t{}\t{}\n",
                    entry.name,
                    entry.config.queues,
                    entry.config.backend.as_deref().unwrap_or("-"),
                    entry.config.encoding
                )
            })
            .collect(),
        OutputFormat::Json => {
            let mut json = serde_json::to_string_pretty(&interfaces).map_err(|e| {
                CliError::CommandFailed {
                    message: e.to_string(),
                }
            })?;
            json.push('\n');
            json
        }
        OutputFormat::Yaml => {
            serde_yaml::to_string(&interfaces).map_err(|e| CliError::CommandFailed {
                message: e.to_string(),
            })?
        }
    };
    Ok(rendered)
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
