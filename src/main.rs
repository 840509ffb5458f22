//! sage-bridge - host event runner
//!
//! # Input (via stdin)
//! Newline-delimited JSON host events: `chat.message`, `message.part.updated`,
//! `message.updated`, `session.created`, `tui.prompt.append`.
//!
//! # Output (via stdout)
//! Newline-delimited JSON host calls: `app.log` and `tui.appendPrompt`.
//!
//! Errors never block the host: they are logged to stderr and the process
//! exits 0.

use async_trait::async_trait;
use clap::Parser;
use sage_bridge::{
    BridgeConfig, CliSink, Host, HostEvent, LogEntry, Result, SuggestionBridge, SystemClock,
};
use serde_json::json;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Arguments
// ============================================================================

/// Suggestion scheduling and feedback correlation for chat sessions
#[derive(Parser, Debug, Clone)]
#[command(name = "sage-bridge")]
#[command(version, about, long_about = None)]
struct Args {
    /// Config file (default: $CONFIG_DIR/sage/bridge.json when present)
    #[arg(long, env = "SAGE_BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Maximum suggestion candidates per fetch
    #[arg(long, env = "SAGE_BRIDGE_LIMIT")]
    limit: Option<usize>,

    /// Debounce interval for UI triggers, in milliseconds
    #[arg(long, env = "SAGE_BRIDGE_DEBOUNCE_MS")]
    debounce_ms: Option<u64>,

    /// Ask the tool to provision skill content
    #[arg(long)]
    provision: bool,

    /// Disable all feedback emission
    #[arg(long)]
    no_feedback: bool,

    /// Never invoke the external tool
    #[arg(long, env = "SAGE_BRIDGE_DRY_RUN")]
    dry_run: bool,

    /// External tool program
    #[arg(long, env = "SAGE_BRIDGE_CLI")]
    cli: Option<String>,

    /// Source tag sent with captures and feedback
    #[arg(long)]
    source: Option<String>,

    /// Workspace reported with prompt captures
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// Debug logging on stderr
    #[arg(short = 'v', long)]
    verbose: bool,
}

impl Args {
    /// Flags win over the file; unset flags leave it alone
    fn apply(&self, mut config: BridgeConfig) -> BridgeConfig {
        if let Some(limit) = self.limit {
            config.limit = limit;
        }
        if let Some(debounce_ms) = self.debounce_ms {
            config.debounce_ms = debounce_ms;
        }
        if self.provision {
            config.provision = true;
        }
        if self.no_feedback {
            config.feedback_enabled = false;
        }
        if self.dry_run {
            config.dry_run = true;
        }
        if let Some(cli) = &self.cli {
            config.cli_program = cli.clone();
        }
        if let Some(source) = &self.source {
            config.source = source.clone();
        }
        if let Some(workspace) = &self.workspace {
            config.workspace = Some(workspace.clone());
        }
        config.validate()
    }
}

// ============================================================================
// Host over stdio
// ============================================================================

struct StdioHost;

fn emit(value: &serde_json::Value) -> Result<()> {
    let mut out = std::io::stdout().lock();
    writeln!(out, "{}", value)?;
    out.flush()?;
    Ok(())
}

#[async_trait]
impl Host for StdioHost {
    async fn log(&self, entry: LogEntry) -> Result<()> {
        emit(&json!({"type": "app.log", "body": entry}))
    }

    async fn append_prompt(&self, text: &str) -> Result<()> {
        emit(&json!({"type": "tui.appendPrompt", "body": {"text": text}}))
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(args).await {
        error!("Error: {}", e);
        std::process::exit(0); // Exit 0 to not block the host
    }
}

async fn run(args: Args) -> Result<()> {
    let config = args.apply(BridgeConfig::load(args.config.as_deref())?);
    info!(
        "Starting bridge (cli: {}, limit: {}, debounce: {}ms, dry run: {})",
        config.cli_program, config.limit, config.debounce_ms, config.dry_run
    );

    let sink = Arc::new(CliSink::new(config.cli_program.clone()));
    let bridge = Arc::new(SuggestionBridge::new(
        config,
        sink,
        Arc::new(StdioHost),
        Arc::new(SystemClock),
    ));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    // Captures, feedback and debounce timers started by earlier events
    let mut pending: Vec<JoinHandle<()>> = Vec::new();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match HostEvent::from_json(line) {
            Ok(event) => {
                debug!("Received {}", event.name());
                if let Some(task) = bridge.handle(event).await {
                    pending.retain(|t| !t.is_finished());
                    pending.push(task);
                }
            }
            Err(e) => warn!("Skipping line: {}", e),
        }
    }

    // Let in-flight work finish before exiting
    for task in pending {
        if let Err(e) = task.await {
            warn!("Background task failed: {}", e);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_default_values() {
        let args = Args::parse_from(["sage-bridge"]);
        assert!(!args.provision);
        assert!(!args.no_feedback);
        assert!(!args.verbose);
        assert_eq!(args.apply(BridgeConfig::default()), BridgeConfig::default());
    }

    #[test]
    fn test_args_override_config() {
        let args = Args::parse_from([
            "sage-bridge",
            "--limit",
            "5",
            "--debounce-ms",
            "120",
            "--provision",
            "--no-feedback",
            "--dry-run",
            "--cli",
            "/opt/sage",
            "--source",
            "tui",
        ]);
        let config = args.apply(BridgeConfig::default());
        assert_eq!(config.limit, 5);
        assert_eq!(config.debounce_ms, 120);
        assert!(config.provision);
        assert!(!config.feedback_enabled);
        assert!(config.dry_run);
        assert_eq!(config.cli_program, "/opt/sage");
        assert_eq!(config.source, "tui");
    }

    #[test]
    fn test_args_zero_limit_clamped() {
        let args = Args::parse_from(["sage-bridge", "--limit", "0"]);
        assert_eq!(args.apply(BridgeConfig::default()).limit, 1);
    }
}
