//! Clap derive structures for the `explorer-tail` CLI.
//!
//! Kept free of workspace crates so `build.rs` can render man pages from it.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// explorer-tail -- follow a file-explorer event stream
#[derive(Debug, Parser)]
#[command(
    name = "explorer-tail",
    version,
    about = "Follow a file-explorer event stream from the command line",
    long_about = "Connects to a server's explorer event stream, prints every notification\n\
        it delivers, and reconnects with exponential backoff when the stream drops.\n\n\
        Settings come from the config file, EXPLORER_STREAM_* variables, and flags,\n\
        in increasing order of precedence.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "EXPLORER_TAIL_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Server profile to use
    #[arg(long, short = 'p', env = "EXPLORER_TAIL_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Server base URL (overrides profile)
    #[arg(long, short = 'u', global = true)]
    pub url: Option<String>,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable, one notification per line
    Text,
    /// JSON lines
    Json,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Stream notifications until interrupted
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Only print these event kinds (state_change, connected, message,
    /// file_change, structure_update, disconnected, error,
    /// reconnect_failed, unknown)
    #[arg(long, value_delimiter = ',')]
    pub only: Vec<String>,

    /// Output format
    #[arg(long, short = 'o', default_value = "text")]
    pub output: OutputFormat,

    /// Disconnect and exit after printing this many notifications
    #[arg(long, short = 'n')]
    pub max_events: Option<usize>,

    /// Do not reconnect when the stream drops
    #[arg(long)]
    pub no_reconnect: bool,

    /// Coalescing quiet period in milliseconds
    #[arg(long)]
    pub debounce_ms: Option<u64>,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
