//! Credential sources consumed by [`TokenSource`](super::TokenSource).
//!
//! None of these implement an authentication protocol. They read a token that
//! something else already obtained: a literal, an environment variable, or the
//! JSON output of an external command such as a cloud CLI's
//! `get-access-token`.

use std::process::Command;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;

use super::token::TokenInfo;

/// Default lifetime assumed when a source does not report one.
const DEFAULT_LIFETIME: Duration = Duration::from_secs(3600);

/// Supplies a fresh bearer token on demand.
pub trait CredentialSource: Send + Sync {
    /// Acquire a new token. `now` is the caller's clock reading.
    fn acquire(&self, now: DateTime<Utc>) -> anyhow::Result<TokenInfo>;
}

/// A fixed token with a fixed lifetime.
#[derive(Debug, Clone)]
pub struct StaticCredential {
    token: String,
    lifetime: Duration,
}

impl StaticCredential {
    pub fn new(token: impl Into<String>, lifetime: Duration) -> Self {
        Self {
            token: token.into(),
            lifetime,
        }
    }
}

impl CredentialSource for StaticCredential {
    fn acquire(&self, now: DateTime<Utc>) -> anyhow::Result<TokenInfo> {
        if self.token.is_empty() {
            anyhow::bail!("Static credential is empty");
        }
        Ok(TokenInfo::new(self.token.clone(), now, now + to_chrono(self.lifetime)))
    }
}

/// Reads the token from an environment variable on every acquisition.
#[derive(Debug, Clone)]
pub struct EnvCredential {
    var: String,
    lifetime: Duration,
}

impl EnvCredential {
    pub fn new(var: impl Into<String>, lifetime: Duration) -> Self {
        Self {
            var: var.into(),
            lifetime,
        }
    }

    pub fn var(&self) -> &str {
        &self.var
    }
}

impl CredentialSource for EnvCredential {
    fn acquire(&self, now: DateTime<Utc>) -> anyhow::Result<TokenInfo> {
        let token = std::env::var(&self.var)
            .with_context(|| format!("Environment variable {} is not set", self.var))?;
        let token = token.trim();
        if token.is_empty() {
            anyhow::bail!("Environment variable {} is empty", self.var);
        }
        Ok(TokenInfo::new(token.to_string(), now, now + to_chrono(self.lifetime)))
    }
}

/// Runs an external command that prints an access token as JSON.
///
/// Accepts `{"accessToken": "...", "expiresOn": "2024-05-01 10:00:00.000000"}`
/// (local time) and/or `{"expires_on": 1714557600}` (epoch seconds).
#[derive(Debug, Clone)]
pub struct CommandCredential {
    program: String,
    args: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CommandTokenOutput {
    #[serde(rename = "accessToken", alias = "access_token", alias = "token")]
    access_token: String,
    #[serde(rename = "expiresOn", default)]
    expires_on_local: Option<String>,
    #[serde(rename = "expires_on", default)]
    expires_on_epoch: Option<serde_json::Value>,
}

impl CommandCredential {
    /// Build from a full command line (`["az", "account", ...]`).
    pub fn from_command_line(command: &[String]) -> anyhow::Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| anyhow::anyhow!("Token command is empty"))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    fn parse_output(stdout: &str, now: DateTime<Utc>) -> anyhow::Result<TokenInfo> {
        let output: CommandTokenOutput =
            serde_json::from_str(stdout.trim()).context("Failed to parse token command output")?;
        if output.access_token.is_empty() {
            anyhow::bail!("Token command returned an empty access token");
        }
        let expires_at = parse_epoch(output.expires_on_epoch.as_ref())
            .or_else(|| output.expires_on_local.as_deref().and_then(parse_local))
            .unwrap_or_else(|| now + to_chrono(DEFAULT_LIFETIME));
        Ok(TokenInfo::new(output.access_token, now, expires_at))
    }
}

impl CredentialSource for CommandCredential {
    fn acquire(&self, now: DateTime<Utc>) -> anyhow::Result<TokenInfo> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .output()
            .with_context(|| format!("Failed to invoke token command: {}", self.program))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "Token command {} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            );
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Self::parse_output(&stdout, now)
    }
}

fn parse_epoch(value: Option<&serde_json::Value>) -> Option<DateTime<Utc>> {
    let secs = match value? {
        serde_json::Value::Number(n) => n.as_i64()?,
        serde_json::Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    DateTime::from_timestamp(secs, 0)
}

fn parse_local(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f").ok()?;
    Local
        .from_local_datetime(&naive)
        .single()
        .map(|local| local.with_timezone(&Utc))
}

pub(crate) fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration)
        .unwrap_or_else(|_| chrono::Duration::seconds(i64::from(u32::MAX)))
}
