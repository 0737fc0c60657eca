//! Session script parsing and execution.
//!
//! A script is a sequence of commands, one per line. Blank lines and lines
//! starting with `#` are skipped. Every executed command yields one JSON
//! object describing its outcome.

use anyhow::{Context, Result, bail};
use reqwest::Method;
use serde_json::{Value, json};
use tracing::debug;
use xsrf_session::{
    ApiError, ApiResponse, AuthSession, Credentials, GuardDecision, RequestBody,
    RequestEnvelope, RouteMeta, SearchOutcome, SearchService, authorize,
};

/// One script command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Restore the session from the hint.
    Init,
    /// Log in.
    Login { email: String, password: String },
    /// Log out.
    Logout,
    /// Check the current identity.
    Me,
    /// Send an arbitrary request.
    Request {
        method: Method,
        path: String,
        body: Option<Value>,
    },
    /// Run a global search.
    Search { query: String },
    /// Ask the route guard about a route.
    Guard {
        route: String,
        permission: Option<String>,
    },
}

impl Command {
    /// Stable command label used in output.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Login { .. } => "login",
            Self::Logout => "logout",
            Self::Me => "me",
            Self::Request { method, .. } => match *method {
                Method::POST => "post",
                Method::PUT => "put",
                Method::PATCH => "patch",
                Method::DELETE => "delete",
                _ => "get",
            },
            Self::Search { .. } => "search",
            Self::Guard { .. } => "guard",
        }
    }
}

/// Parses one script line. Returns `None` for blank and comment lines.
pub fn parse_line(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let (word, rest) = split_word(line);
    let command = match word.to_ascii_lowercase().as_str() {
        "init" => no_arguments(Command::Init, word, rest)?,
        "me" => no_arguments(Command::Me, word, rest)?,
        "logout" => no_arguments(Command::Logout, word, rest)?,
        "login" => {
            let mut parts = rest.split_whitespace();
            let (Some(email), Some(password), None) = (parts.next(), parts.next(), parts.next())
            else {
                bail!("usage: login <email> <password>");
            };
            Command::Login {
                email: email.to_string(),
                password: password.to_string(),
            }
        }
        "search" => Command::Search {
            query: rest.to_string(),
        },
        "guard" => {
            let mut parts = rest.split_whitespace();
            let Some(route) = parts.next() else {
                bail!("usage: guard <route> [permission]");
            };
            let permission = parts.next().map(str::to_string);
            if parts.next().is_some() {
                bail!("usage: guard <route> [permission]");
            }
            Command::Guard {
                route: route.to_string(),
                permission,
            }
        }
        "get" | "delete" => {
            let (path, extra) = split_word(rest);
            if path.is_empty() || !extra.is_empty() {
                bail!("usage: {word} <path>");
            }
            Command::Request {
                method: if word.eq_ignore_ascii_case("get") {
                    Method::GET
                } else {
                    Method::DELETE
                },
                path: path.to_string(),
                body: None,
            }
        }
        "post" | "put" | "patch" => {
            let (path, raw_body) = split_word(rest);
            if path.is_empty() {
                bail!("usage: {word} <path> [json]");
            }
            let body = if raw_body.is_empty() {
                None
            } else {
                Some(
                    serde_json::from_str(raw_body)
                        .with_context(|| format!("invalid JSON body for {word} {path}"))?,
                )
            };
            let method = match word.to_ascii_lowercase().as_str() {
                "post" => Method::POST,
                "put" => Method::PUT,
                _ => Method::PATCH,
            };
            Command::Request {
                method,
                path: path.to_string(),
                body,
            }
        }
        other => bail!("unknown command '{other}'"),
    };
    Ok(Some(command))
}

fn split_word(input: &str) -> (&str, &str) {
    match input.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (input, ""),
    }
}

fn no_arguments(command: Command, word: &str, rest: &str) -> Result<Command> {
    if !rest.is_empty() {
        bail!("'{word}' takes no arguments");
    }
    Ok(command)
}

/// Outcome of one executed command.
#[derive(Debug, Clone)]
pub struct CommandReport {
    /// Whether the command succeeded.
    pub ok: bool,
    /// JSON description printed to stdout.
    pub output: Value,
}

/// Executes commands against one session.
#[derive(Debug)]
pub struct ScriptRunner {
    session: AuthSession,
    search: SearchService,
}

impl ScriptRunner {
    pub fn new(session: AuthSession, search: SearchService) -> Self {
        Self { session, search }
    }

    /// Executes `command`, never failing: errors become a failed report.
    pub async fn execute(&self, command: &Command) -> CommandReport {
        let label = command.label();
        debug!(command = label, "executing");
        let result = match command {
            Command::Init => {
                let identity = self.session.initialize_auth().await;
                Ok(json!({
                    "authenticated": identity.is_some(),
                    "user": identity,
                }))
            }
            Command::Login { email, password } => self
                .session
                .login(&Credentials::new(email.as_str(), password.as_str()))
                .await
                .map(|outcome| {
                    json!({
                        "user": outcome.identity,
                        "notice": outcome.notice.message,
                        "notice_ttl_ms": duration_millis(outcome.notice.ttl),
                    })
                }),
            Command::Logout => self
                .session
                .logout()
                .await
                .map(|()| json!({ "authenticated": false })),
            Command::Me => self.session.check_auth().await.map(|identity| {
                json!({
                    "authenticated": identity.is_some(),
                    "user": identity,
                })
            }),
            Command::Request { method, path, body } => {
                self.send(method.clone(), path, body.as_ref()).await
            }
            Command::Search { query } => self.search.search(query).await.map(|outcome| match outcome {
                SearchOutcome::Empty => json!({ "total": 0, "results": {} }),
                SearchOutcome::Found(results) => json!({
                    "total": results.total(),
                    "results": results,
                }),
                SearchOutcome::Superseded => json!({ "superseded": true }),
            }),
            Command::Guard { route, permission } => Ok(self.guard(route, permission.as_deref()).await),
        };

        match result {
            Ok(details) => CommandReport {
                ok: true,
                output: merge(json!({ "command": label, "ok": true }), details),
            },
            Err(err) => CommandReport {
                ok: false,
                output: error_output(label, &err),
            },
        }
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let mut envelope = RequestEnvelope::new(method, path);
        if let Some(body) = body {
            let encoded = RequestBody::json(body).map_err(|source| ApiError::Encode {
                url: path.to_string(),
                source,
            })?;
            envelope = envelope.with_body(encoded);
        }
        let response = self.session.client().send(envelope).await?;
        Ok(response_output(&response))
    }

    async fn guard(&self, route: &str, permission: Option<&str>) -> Value {
        let mut meta = if route == "login" {
            RouteMeta::guest_only(route)
        } else {
            RouteMeta::protected(route)
        };
        if let Some(permission) = permission {
            meta = meta.with_permission(permission);
        }
        match authorize(&self.session, &meta).await {
            GuardDecision::Allow => json!({ "route": route, "decision": "allow" }),
            GuardDecision::Redirect(to) => json!({
                "route": route,
                "decision": "redirect",
                "to": to.name(),
            }),
        }
    }
}

fn response_output(response: &ApiResponse) -> Value {
    let body = response
        .json::<Value>()
        .unwrap_or_else(|_| Value::String(response.text()));
    json!({ "status": response.status(), "body": body })
}

fn error_output(label: &str, err: &ApiError) -> Value {
    json!({
        "command": label,
        "ok": false,
        "kind": err.kind().as_str(),
        "status": err.status(),
        "message": err.user_message(),
        "errors": err.field_errors(),
    })
}

fn merge(mut base: Value, extra: Value) -> Value {
    if let (Some(target), Value::Object(fields)) = (base.as_object_mut(), extra) {
        target.extend(fields);
    }
    base
}

fn duration_millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
