//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Drive a cookie-session API from the command line.
///
/// Runs a session script: one command per argument or, when no commands are
/// given, one per line on stdin. Each command prints one JSON line.
///
/// Commands: `init`, `login <email> <password>`, `me`, `get <path>`,
/// `post|put|patch <path> [json]`, `delete <path>`, `search <query>`,
/// `guard <route> [permission]`, `logout`.
#[derive(Parser, Debug)]
#[command(name = "xsrf-session")]
#[command(author, version, about)]
pub struct Args {
    /// Session script commands (read from stdin when omitted)
    pub commands: Vec<String>,

    /// API base URL (e.g. http://localhost:8000/api)
    #[arg(short = 'b', long)]
    pub base_url: Option<String>,

    /// Config file to read instead of the default location
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// File holding the "was authenticated" hint
    #[arg(long, conflicts_with = "no_hint_file")]
    pub hint_file: Option<PathBuf>,

    /// Keep the session hint in memory only
    #[arg(long)]
    pub no_hint_file: bool,

    /// Milliseconds to wait for the token cookie after requesting it (0 reads immediately)
    #[arg(long, value_parser = clap::value_parser!(u64).range(0..=10000))]
    pub settle_ms: Option<u64>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Disable colored log output
    #[arg(long)]
    pub no_color: bool,
}
