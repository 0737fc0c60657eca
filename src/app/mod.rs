//! CLI runtime: logging, configuration assembly and the script loop.

use std::io::{self, IsTerminal, Read};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use xsrf_session::config::DEFAULT_BASE_URL;
use xsrf_session::{
    ApiClient, AuthSession, ClientConfig, FileHintStore, HintStore, MemoryHintStore, Navigator,
    Route, SearchService, SettleStrategy,
};

use crate::cli::Args;

pub mod config_file;
pub mod script;

use config_file::FileConfig;
use script::{ScriptRunner, parse_line};

/// Navigator for a headless run: navigation requests are only logged.
#[derive(Debug, Clone, Copy)]
struct LogNavigator;

impl Navigator for LogNavigator {
    fn navigate(&self, route: Route) {
        info!(route = route.name(), "navigate");
    }
}

pub(crate) fn init_tracing(default_level: &str, no_color: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(!no_color)
        .with_env_filter(filter)
        .try_init();
}

fn default_log_level(args: &Args) -> &'static str {
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Builds the client configuration: CLI flags override the file, the file
/// overrides built-in defaults.
pub fn build_client_config(args: &Args, file: &FileConfig) -> Result<ClientConfig> {
    let base_url = args
        .base_url
        .as_deref()
        .or(file.base_url.as_deref())
        .unwrap_or(DEFAULT_BASE_URL);
    let mut config = ClientConfig::new(base_url)?;

    if let Some(path) = &file.csrf_path {
        config = config.with_csrf_path(path.clone());
    }
    if file.csrf_cookie.is_some() || file.csrf_header.is_some() {
        let cookie = file
            .csrf_cookie
            .clone()
            .unwrap_or_else(|| config.csrf_cookie().to_string());
        let header = file
            .csrf_header
            .clone()
            .unwrap_or_else(|| config.csrf_header().to_string());
        config = config.with_csrf_names(cookie, header)?;
    }
    if file.identity_path.is_some() || file.login_path.is_some() || file.logout_path.is_some() {
        let identity = file
            .identity_path
            .clone()
            .unwrap_or_else(|| config.identity_path().to_string());
        let login = file
            .login_path
            .clone()
            .unwrap_or_else(|| config.login_path().to_string());
        let logout = file
            .logout_path
            .clone()
            .unwrap_or_else(|| config.logout_path().to_string());
        config = config.with_auth_paths(identity, login, logout);
    }
    if file.connect_timeout_secs.is_some() || file.read_timeout_secs.is_some() {
        let connect = file
            .connect_timeout_secs
            .map_or(config.connect_timeout(), Duration::from_secs);
        let read = file
            .read_timeout_secs
            .map_or(config.read_timeout(), Duration::from_secs);
        config = config.with_timeouts(connect, read);
    }

    let settle = match args.settle_ms {
        Some(0) => Some(SettleStrategy::Immediate),
        Some(ms) => Some(SettleStrategy::Poll {
            interval: Duration::from_millis(ms.clamp(1, 25)),
            timeout: Duration::from_millis(ms),
        }),
        None => file.settle_strategy(),
    };
    if let Some(settle) = settle {
        config = config.with_settle(settle);
    }
    Ok(config)
}

fn hint_store(args: &Args, file: &FileConfig) -> Arc<dyn HintStore> {
    if args.no_hint_file {
        return Arc::new(MemoryHintStore::default());
    }
    if let Some(path) = args.hint_file.as_ref().or(file.hint_file.as_ref()) {
        return Arc::new(FileHintStore::new(path));
    }
    match FileHintStore::at_default_location() {
        Ok(store) => Arc::new(store),
        Err(err) => {
            warn!(error = %err, "session hint will not persist");
            Arc::new(MemoryHintStore::default())
        }
    }
}

fn read_script(args: &Args) -> Result<Option<String>> {
    if !args.commands.is_empty() {
        return Ok(Some(args.commands.join("\n")));
    }
    if io::stdin().is_terminal() {
        return Ok(None);
    }
    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("failed to read session script from stdin")?;
    Ok(Some(buffer))
}

/// Runs the CLI. Exits non-zero when any command failed.
pub async fn run(args: Args) -> Result<ExitCode> {
    init_tracing(default_log_level(&args), args.no_color);
    debug!(?args, "CLI arguments parsed");

    let file = config_file::load_file_config(args.config.as_deref())?;
    let config = build_client_config(&args, &file)?;

    let Some(script) = read_script(&args)? else {
        info!("No commands provided. Pass commands as arguments or pipe a script via stdin.");
        info!("Example: xsrf-session init me");
        return Ok(ExitCode::SUCCESS);
    };

    let commands = script
        .lines()
        .enumerate()
        .filter_map(|(index, line)| {
            parse_line(line)
                .with_context(|| format!("script line {}", index + 1))
                .transpose()
        })
        .collect::<Result<Vec<_>>>()?;

    let client = ApiClient::new(config).context("failed to build HTTP client")?;
    let session = AuthSession::new(client.clone(), hint_store(&args, &file), Arc::new(LogNavigator));
    let runner = ScriptRunner::new(session, SearchService::new(client));

    let mut failures = 0_usize;
    for command in &commands {
        let report = runner.execute(command).await;
        println!("{}", report.output);
        if !report.ok {
            failures += 1;
        }
    }

    info!(commands = commands.len(), failures, "script complete");
    Ok(if failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
