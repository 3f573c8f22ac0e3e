use crate::worker::{normalize_status, Worker};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::io;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

/// Hard deadline for roster fetches.
pub const LIST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("sprite CLI not found in PATH; install it from https://sprites.dev")]
    CliMissing,
    #[error("{command}: {message}")]
    Command { command: String, message: String },
    #[error("parse sprites JSON: {0}")]
    Parse(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Provides the worker roster, probe execution and console access.
/// [`SpriteCli`] implements this against the `sprite` command-line tool;
/// tests substitute fakes.
#[async_trait]
pub trait WorkerSource: Send + Sync {
    /// Current roster, bounded by [`LIST_TIMEOUT`].
    async fn list(&self) -> Result<Vec<Worker>, SourceError>;

    /// Runs `script` with `/bin/sh` inside the named worker and returns its
    /// stdout. The caller owns the deadline.
    async fn exec_status(&self, name: &str, script: &str) -> Result<String, SourceError>;

    /// Command that attaches an interactive console to the named worker.
    /// The caller wires up stdio and awaits it.
    fn console_cmd(&self, name: &str) -> Command;
}

/// Wraps the `sprite` command-line tool.
pub struct SpriteCli {
    org: Option<String>,
}

impl SpriteCli {
    pub fn new(org: Option<String>) -> Self {
        Self { org }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("sprite");
        if let Some(org) = &self.org {
            cmd.arg("-o").arg(org);
        }
        cmd.args(args);
        cmd
    }

    fn map_spawn_error(err: io::Error) -> SourceError {
        if err.kind() == io::ErrorKind::NotFound {
            SourceError::CliMissing
        } else {
            SourceError::Io(err)
        }
    }
}

#[async_trait]
impl WorkerSource for SpriteCli {
    async fn list(&self) -> Result<Vec<Worker>, SourceError> {
        let mut cmd = self.command(&["api", "/sprites"]);
        cmd.stdin(Stdio::null()).kill_on_drop(true);

        let output = timeout(LIST_TIMEOUT, cmd.output())
            .await
            .map_err(|_| SourceError::Timeout(LIST_TIMEOUT))?
            .map_err(Self::map_spawn_error)?;

        if !output.status.success() {
            let mut message = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if message.is_empty() {
                message = output.status.to_string();
            }
            return Err(SourceError::Command {
                command: "sprite api /sprites".to_string(),
                message,
            });
        }

        parse_workers_json(&output.stdout)
    }

    async fn exec_status(&self, name: &str, script: &str) -> Result<String, SourceError> {
        let mut cmd = self.command(&["exec", "-s", name, "sh", "-c", script]);
        cmd.stdin(Stdio::null()).kill_on_drop(true);

        let output = cmd.output().await.map_err(Self::map_spawn_error)?;
        if !output.status.success() {
            let mut message = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if message.is_empty() {
                message = output.status.to_string();
            }
            return Err(SourceError::Command {
                command: format!("sprite exec -s {name}"),
                message,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn console_cmd(&self, name: &str) -> Command {
        self.command(&["console", "-s", name])
    }
}

/// Wire shape of one worker in the API response.
#[derive(Debug, Deserialize)]
struct ApiWorker {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    created_at: String,
    #[serde(default)]
    region: String,
}

/// Parses the API response. The tool may emit a bare array or an object
/// wrapping the list under `data` or `sprites`; each shape is tried in that
/// order.
pub fn parse_workers_json(data: &[u8]) -> Result<Vec<Worker>, SourceError> {
    let text = std::str::from_utf8(data)
        .map_err(|err| SourceError::Parse(err.to_string()))?
        .trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|err| SourceError::Parse(err.to_string()))?;

    let raw: Vec<ApiWorker> = if value.is_array() {
        serde_json::from_value(value).map_err(|err| SourceError::Parse(err.to_string()))?
    } else if let serde_json::Value::Object(mut map) = value {
        let nested = ["data", "sprites"]
            .iter()
            .find_map(|key| map.remove(*key))
            .ok_or_else(|| SourceError::Parse("unexpected API response format".to_string()))?;
        serde_json::from_value(nested).map_err(|err| SourceError::Parse(err.to_string()))?
    } else {
        return Err(SourceError::Parse(
            "unexpected API response format".to_string(),
        ));
    };

    Ok(raw.into_iter().map(Worker::from_api).collect())
}

impl Worker {
    fn from_api(raw: ApiWorker) -> Self {
        let created_at = parse_created_at(&raw.created_at);
        Worker {
            id: raw.id,
            name: raw.name,
            status: normalize_status(&raw.status),
            created_at,
            region: raw.region,
        }
    }
}

fn parse_created_at(raw: &str) -> Option<DateTime<Utc>> {
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
