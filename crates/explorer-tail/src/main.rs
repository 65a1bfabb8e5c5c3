mod cli;
mod error;
mod output;

use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;
use strum::IntoEnumIterator;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tracing_subscriber::EnvFilter;

use explorer_stream::{DisconnectReason, EventKind, Notification, StreamClient, StreamConfig};

use crate::cli::{Cli, Command, GlobalOpts, WatchArgs};
use crate::error::CliError;
use crate::output::{Printer, should_color};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Watch(args) => watch(&cli.global, &args).await,

        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "explorer-tail", &mut std::io::stdout());
            Ok(())
        }
    }
}

// ── watch ────────────────────────────────────────────────────────────

/// Extra wait past the debounce window before giving up on a dropped stream.
const DRAIN_SLACK: Duration = Duration::from_millis(50);

async fn watch(global: &GlobalOpts, args: &WatchArgs) -> Result<(), CliError> {
    let only = parse_kinds(&args.only)?;
    let config = build_stream_config(global, args)?;
    let url = config
        .endpoint()
        .map_or_else(|_| config.base_url.clone(), |u| u.to_string());

    let drain_window = config.event_debounce + DRAIN_SLACK;
    let client = StreamClient::new(config);
    let printer = Printer::new(args.output, should_color(global.color));

    // Handlers only forward; printing happens on this task.
    let (tx, mut rx) = mpsc::unbounded_channel::<Notification>();
    for kind in EventKind::iter() {
        let tx = tx.clone();
        client.subscribe(kind, move |n| tx.send(n.clone()).map_err(Into::into));
    }
    drop(tx);

    let server_info = client
        .connect()
        .await
        .map_err(|e| CliError::from_stream(e, &url))?;
    tracing::info!(%url, %server_info, "watching explorer events");

    let mut printed = 0usize;
    // Set once the stream drops for good; coalesced events still flush.
    let mut gone_at: Option<Instant> = None;
    loop {
        tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => {
                tracing::debug!("interrupted");
                client.disconnect();
                return Ok(());
            }
            next = rx.recv() => {
                let Some(notification) = next else {
                    return Ok(());
                };
                if only.is_empty() || only.contains(&notification.kind()) {
                    printer.print(&notification)?;
                    printed += 1;
                }
                match notification {
                    Notification::ReconnectFailed { attempts } => {
                        client.disconnect();
                        return Err(CliError::ReconnectFailed { attempts });
                    }
                    Notification::Disconnected {
                        reason: DisconnectReason::Error,
                    } if args.no_reconnect => {
                        gone_at = Some(Instant::now() + drain_window);
                    }
                    _ => {}
                }
                if args.max_events.is_some_and(|max| printed >= max) {
                    client.disconnect();
                    return Ok(());
                }
            }
            () = sleep_until(gone_at.unwrap_or_else(Instant::now)), if gone_at.is_some() => {
                client.disconnect();
                return Err(CliError::StreamLost { url });
            }
        }
    }
}

fn parse_kinds(names: &[String]) -> Result<HashSet<EventKind>, CliError> {
    names
        .iter()
        .map(|name| {
            EventKind::from_str(name.trim()).map_err(|_| CliError::Validation {
                field: "--only".into(),
                reason: format!(
                    "unknown event kind '{name}' (expected one of: {})",
                    EventKind::iter()
                        .map(|k| k.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            })
        })
        .collect()
}

/// Config file + profile + environment, then flag overrides.
fn build_stream_config(global: &GlobalOpts, args: &WatchArgs) -> Result<StreamConfig, CliError> {
    let cfg = match global.config {
        Some(ref path) => explorer_stream_config::load_config_from(path)?,
        None => explorer_stream_config::load_config()?,
    };
    let mut settings = cfg.settings(global.profile.as_deref())?;

    if let Some(ref url) = global.url {
        settings.base_url.clone_from(url);
    }
    if args.no_reconnect {
        settings.auto_reconnect = false;
    }
    if let Some(ms) = args.debounce_ms {
        settings.event_debounce_ms = ms;
    }
    Ok(settings.to_stream_config()?)
}
