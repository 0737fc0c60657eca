//! Configuration file loading for CLI defaults.
//!
//! The file lives at `$XDG_CONFIG_HOME/xsrf-session/config.toml` (or
//! `$HOME/.config/xsrf-session/config.toml`) and holds flat `key = value`
//! lines. Command-line flags override anything set here.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use xsrf_session::SettleStrategy;

/// File configuration for client defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// API base URL.
    pub base_url: Option<String>,
    /// Token-issuing endpoint path.
    pub csrf_path: Option<String>,
    /// Token cookie name.
    pub csrf_cookie: Option<String>,
    /// Token header name.
    pub csrf_header: Option<String>,
    /// Identity endpoint path.
    pub identity_path: Option<String>,
    /// Login endpoint path.
    pub login_path: Option<String>,
    /// Logout endpoint path.
    pub logout_path: Option<String>,
    /// HTTP connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// HTTP read timeout in seconds.
    pub read_timeout_secs: Option<u64>,
    /// Cookie settle mode: `immediate`, `fixed` or `poll`.
    pub settle: Option<SettleMode>,
    /// Fixed delay, or poll timeout, in milliseconds.
    pub settle_ms: Option<u64>,
    /// Poll interval in milliseconds.
    pub poll_interval_ms: Option<u64>,
    /// Session hint file.
    pub hint_file: Option<PathBuf>,
}

/// Cookie settle modes accepted in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleMode {
    Immediate,
    Fixed,
    Poll,
}

impl SettleMode {
    /// Returns the stable string label for display output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::Fixed => "fixed",
            Self::Poll => "poll",
        }
    }
}

const DEFAULT_SETTLE_MS: u64 = 500;
const DEFAULT_POLL_INTERVAL_MS: u64 = 25;

impl FileConfig {
    /// Validates config values against runtime constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(base_url) = &self.base_url
            && url::Url::parse(base_url).is_err()
        {
            bail!("Invalid config value for `base_url`: '{base_url}' is not a URL");
        }
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("read_timeout_secs", self.read_timeout_secs)?;
        if let Some(settle_ms) = self.settle_ms
            && settle_ms > 10_000
        {
            bail!("Invalid config value for `settle_ms`: {settle_ms}. Expected range: 0..=10000");
        }
        if let Some(interval) = self.poll_interval_ms
            && !(1..=1_000).contains(&interval)
        {
            bail!(
                "Invalid config value for `poll_interval_ms`: {interval}. Expected range: 1..=1000"
            );
        }
        for (field, value) in [
            ("csrf_cookie", &self.csrf_cookie),
            ("csrf_header", &self.csrf_header),
        ] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                bail!("Invalid config value for `{field}`: must not be empty");
            }
        }
        Ok(())
    }

    /// Settle strategy described by the file, if it names one.
    #[must_use]
    pub fn settle_strategy(&self) -> Option<SettleStrategy> {
        let wait = Duration::from_millis(self.settle_ms.unwrap_or(DEFAULT_SETTLE_MS));
        match self.settle? {
            SettleMode::Immediate => Some(SettleStrategy::Immediate),
            SettleMode::Fixed => Some(SettleStrategy::Fixed(wait)),
            SettleMode::Poll => Some(SettleStrategy::Poll {
                interval: Duration::from_millis(
                    self.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS),
                ),
                timeout: wait,
            }),
        }
    }
}

fn validate_timeout_secs(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=3600");
    }
    Ok(())
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/xsrf-session/config.toml`
/// 2. `$HOME/.config/xsrf-session/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("xsrf-session")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("xsrf-session")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from `path`, or from the default path when `None`.
///
/// A missing file yields the empty config; an explicitly named file must
/// exist.
pub fn load_file_config(path: Option<&Path>) -> Result<FileConfig> {
    let (path, explicit) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => match resolve_default_config_path() {
            Some(path) => (path, false),
            None => return Ok(FileConfig::default()),
        },
    };
    if !explicit && !path.exists() {
        return Ok(FileConfig::default());
    }

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!(
                "Invalid config syntax on line {}: expected key = value",
                line_index + 1
            );
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let line_no = line_index + 1;
        let string_value = || {
            parse_string_literal(value)
                .with_context(|| format!("Invalid `{key}` value on line {line_no}"))
        };
        let integer_value = || {
            parse_integer_u64(value)
                .with_context(|| format!("Invalid `{key}` value on line {line_no}"))
        };

        match key {
            "base_url" => cfg.base_url = Some(string_value()?),
            "csrf_path" => cfg.csrf_path = Some(string_value()?),
            "csrf_cookie" => cfg.csrf_cookie = Some(string_value()?),
            "csrf_header" => cfg.csrf_header = Some(string_value()?),
            "identity_path" => cfg.identity_path = Some(string_value()?),
            "login_path" => cfg.login_path = Some(string_value()?),
            "logout_path" => cfg.logout_path = Some(string_value()?),
            "hint_file" => cfg.hint_file = Some(PathBuf::from(string_value()?)),
            "connect_timeout_secs" => cfg.connect_timeout_secs = Some(integer_value()?),
            "read_timeout_secs" => cfg.read_timeout_secs = Some(integer_value()?),
            "settle_ms" => cfg.settle_ms = Some(integer_value()?),
            "poll_interval_ms" => cfg.poll_interval_ms = Some(integer_value()?),
            "settle" => {
                let parsed = string_value()?;
                cfg.settle = Some(parse_settle_mode(&parsed).with_context(|| {
                    format!("Invalid `settle` value '{parsed}' on line {line_no}")
                })?);
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_no}");
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

fn parse_settle_mode(value: &str) -> Result<SettleMode> {
    match value {
        "immediate" => Ok(SettleMode::Immediate),
        "fixed" => Ok(SettleMode::Fixed),
        "poll" => Ok(SettleMode::Poll),
        _ => bail!("Expected one of: immediate, fixed, poll"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_partial_fields() {
        let cfg = parse_config_str(
            r#"
base_url = "http://127.0.0.1:8000/api"
read_timeout_secs = 15
"#,
        )
        .expect("partial config should parse");
        assert_eq!(cfg.base_url.as_deref(), Some("http://127.0.0.1:8000/api"));
        assert_eq!(cfg.read_timeout_secs, Some(15));
        assert!(cfg.csrf_path.is_none());
        assert!(cfg.settle_strategy().is_none());
    }

    #[test]
    fn test_parse_config_supports_inline_comments() {
        let cfg = parse_config_str(
            r##"
csrf_cookie = "XSRF-TOKEN" # cookie name
csrf_header = "X-XSRF-#TOKEN" # hash inside quotes is kept
"##,
        )
        .expect("config with comments should parse");
        assert_eq!(cfg.csrf_cookie.as_deref(), Some("XSRF-TOKEN"));
        assert_eq!(cfg.csrf_header.as_deref(), Some("X-XSRF-#TOKEN"));
    }

    #[test]
    fn test_parse_config_rejects_unknown_key() {
        let err = parse_config_str("concurrency = 4").expect_err("unknown key expected");
        assert!(err.to_string().contains("Unknown configuration key"));
    }

    #[test]
    fn test_parse_config_rejects_invalid_timeout() {
        let err = parse_config_str("connect_timeout_secs = 0").expect_err("invalid timeout");
        assert!(err.to_string().contains("connect_timeout_secs"));
    }

    #[test]
    fn test_parse_config_rejects_unquoted_string() {
        let err = parse_config_str("base_url = http://x").expect_err("unquoted string");
        assert!(format!("{err:#}").contains("base_url"));
    }

    #[test]
    fn test_parse_config_rejects_invalid_base_url() {
        let err = parse_config_str(r#"base_url = "not a url""#).expect_err("bad url");
        assert!(err.to_string().contains("base_url"));
    }

    #[test]
    fn test_parse_config_rejects_numeric_values_with_trailing_tokens() {
        let err = parse_config_str("settle_ms = 4 trailing").expect_err("trailing token");
        assert!(err.to_string().contains("settle_ms"));
    }

    #[test]
    fn test_parse_config_rejects_missing_equals() {
        let err = parse_config_str("base_url").expect_err("syntax error");
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_settle_strategy_from_file() {
        let cfg = parse_config_str(
            r#"
settle = "poll"
settle_ms = 800
poll_interval_ms = 10
"#,
        )
        .unwrap();
        assert_eq!(
            cfg.settle_strategy(),
            Some(SettleStrategy::Poll {
                interval: Duration::from_millis(10),
                timeout: Duration::from_millis(800),
            })
        );

        let cfg = parse_config_str(r#"settle = "fixed""#).unwrap();
        assert_eq!(
            cfg.settle_strategy(),
            Some(SettleStrategy::Fixed(Duration::from_millis(500)))
        );

        let err = parse_config_str(r#"settle = "sometimes""#).expect_err("bad mode");
        assert!(err.to_string().contains("settle"));
        assert_eq!(SettleMode::Immediate.as_str(), "immediate");
    }

    #[test]
    fn test_load_file_config_missing_explicit_path_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(load_file_config(Some(&missing)).is_err());
    }

    #[test]
    fn test_load_file_config_reads_explicit_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "hint_file = \"/tmp/hint\"\n").unwrap();
        let cfg = load_file_config(Some(&path)).unwrap();
        assert_eq!(cfg.hint_file, Some(PathBuf::from("/tmp/hint")));
    }
}
