//! Streams push notifications to the gateway
//!
//! Messages are read as JSON lines, one message per line, from a file or from
//! stdin. Lines that are not valid messages are logged and skipped.
//!
//! Pulling the next message blocks on the input, so the delivery runs on its
//! own thread and runtime while the main task waits for it or for Ctrl-C.

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
    time::Duration,
};

use clap::Parser;
use pushwire_common::{
    logging,
    tracing::{debug, info, warn},
};
use pushwire_delivery::{Callbacks, Delivery, DeliveryConfig, Message};
use tokio::sync::oneshot;

const CONFIG_ENV: &str = "PUSHWIRE_CONFIG";

/// Stream push notifications to the gateway
#[derive(Parser, Debug)]
#[command(name = "pushwire")]
#[command(about = "Stream push notifications to the gateway", long_about = None)]
#[command(version)]
struct Cli {
    /// JSON-lines file of messages; stdin when omitted or `-`
    messages: Option<PathBuf>,

    /// Configuration file, taking precedence over `PUSHWIRE_CONFIG`
    #[arg(short, long)]
    config: Option<PathBuf>,
}

/// Counters of a finished run, sent back from the delivery thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Summary {
    success: u64,
    failure: u64,
    consecutive_failures: u32,
    /// The run stopped on the consecutive failure limit.
    stopped_early: bool,
    elapsed: Duration,
}

impl Summary {
    fn of<I: Iterator<Item = Message>>(delivery: &Delivery<I>) -> Self {
        let state = delivery.state();
        Self {
            success: state.success_count(),
            failure: state.failure_count(),
            consecutive_failures: state.consecutive_failure_count(),
            stopped_early: !delivery
                .policy()
                .should_continue(state.consecutive_failure_count()),
            elapsed: delivery.elapsed(),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Finished(Summary),
    Interrupted,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init();

    let config_path = find_config_file(
        cli.config,
        std::env::var(CONFIG_ENV).ok(),
        &default_config_paths(),
    )?;
    let config_content = std::fs::read_to_string(&config_path).map_err(|e| {
        anyhow::anyhow!(
            "Failed to read config from {}: {}",
            config_path.display(),
            e
        )
    })?;
    let config = DeliveryConfig::from_toml(&config_content)?;
    debug!(path = %config_path.display(), ?config, "Loaded configuration");

    let reader: Box<dyn BufRead + Send> = match cli.messages {
        Some(path) if path != Path::new("-") => Box::new(BufReader::new(
            File::open(&path)
                .map_err(|e| anyhow::anyhow!("Failed to open {}: {}", path.display(), e))?,
        )),
        _ => Box::new(BufReader::new(std::io::stdin())),
    };

    let delivery = Delivery::new(read_messages(reader), config)?.with_callbacks(callbacks());
    let finished = spawn_delivery(delivery)?;

    // The delivery thread is left behind on interrupt and ends with the process
    let summary = match supervise(finished, interrupted()).await? {
        Outcome::Finished(summary) => summary,
        Outcome::Interrupted => {
            warn!("Interrupted, stopping delivery");
            anyhow::bail!("Delivery interrupted");
        }
    };

    info!(
        success = summary.success,
        failure = summary.failure,
        elapsed_ms = summary.elapsed.as_millis(),
        "Done"
    );

    if summary.stopped_early {
        anyhow::bail!(
            "Delivery stopped after {} consecutive failures",
            summary.consecutive_failures
        );
    }

    Ok(())
}

/// Runs `delivery` to completion on a dedicated thread with its own runtime.
fn spawn_delivery<I>(mut delivery: Delivery<I>) -> anyhow::Result<oneshot::Receiver<Summary>>
where
    I: Iterator<Item = Message> + Send + 'static,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to start delivery runtime: {e}"))?;
    let (done, finished) = oneshot::channel();

    std::thread::Builder::new()
        .name("delivery".to_string())
        .spawn(move || {
            runtime.block_on(delivery.process());
            if done.send(Summary::of(&delivery)).is_err() {
                debug!("Delivery finished after the run was abandoned");
            }
        })
        .map_err(|e| anyhow::anyhow!("Failed to start delivery thread: {e}"))?;

    Ok(finished)
}

/// Waits for the delivery thread to report, or for `interrupt` to resolve.
async fn supervise(
    finished: oneshot::Receiver<Summary>,
    interrupt: impl Future<Output = ()> + Send,
) -> anyhow::Result<Outcome> {
    tokio::select! {
        summary = finished => summary
            .map(Outcome::Finished)
            .map_err(|_| anyhow::anyhow!("Delivery thread exited without a summary")),
        () = interrupt => Ok(Outcome::Interrupted),
    }
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn interrupted() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(error = %error, "Unable to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

fn callbacks() -> Callbacks {
    Callbacks::new()
        .on_write(|_, message| debug!(message_id = message.message_id(), "Message written"))
        .on_exception(|state, error| {
            warn!(
                attempt = state.exception_count() + 1,
                error = %error,
                "Write failed"
            );
        })
        .on_read_exception(|_, error| debug!(error = %error, "Error check failed"))
        .on_error(|_, message_id, status| {
            warn!(message_id, status = %status, "Gateway rejected message");
        })
        .on_failure(|_, message| {
            warn!(message_id = message.message_id(), "Message could not be delivered");
        })
}

/// Lazily parses JSON-lines messages, skipping lines that do not parse and
/// stopping at the first read error.
fn read_messages(reader: impl BufRead) -> impl Iterator<Item = Message> {
    reader
        .lines()
        .map_while(|line| {
            line.map_err(|e| warn!(error = %e, "Failed to read messages"))
                .ok()
        })
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(index, line)| {
            serde_json::from_str(&line)
                .map_err(|e| warn!(line = index + 1, error = %e, "Skipping invalid message"))
                .ok()
        })
}

fn default_config_paths() -> Vec<PathBuf> {
    vec![
        PathBuf::from("./pushwire.toml"),
        PathBuf::from("/etc/pushwire/pushwire.toml"),
    ]
}

/// Find the configuration file using the following precedence:
/// 1. `--config`
/// 2. `PUSHWIRE_CONFIG` environment variable
/// 3. ./pushwire.toml (current working directory)
/// 4. /etc/pushwire/pushwire.toml (system-wide config)
fn find_config_file(
    explicit: Option<PathBuf>,
    env_path: Option<String>,
    default_paths: &[PathBuf],
) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!("Config file does not exist: {}", path.display());
    }

    if let Some(env_path) = env_path {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!(
            "{CONFIG_ENV} points to non-existent file: {}",
            path.display()
        );
    }

    for path in default_paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    let paths_tried = default_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - {CONFIG_ENV} environment variable\n{paths_tried}"
    )
}
