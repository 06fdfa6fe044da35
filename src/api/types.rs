//! Tipos de dados para os endpoints de conteúdo e de token da OpenSesame.

use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tempfile::TempDir;

/// A page of the content listing.
///
/// Records stay raw JSON so one malformed course is rejected by the mapper on
/// its own instead of failing the whole page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoursePage {
    #[serde(default)]
    pub data: Vec<Value>,
    #[serde(default)]
    pub paging: Paging,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Paging {
    /// URL of the next page, `null` on the last one.
    #[serde(default)]
    pub next: Option<String>,
}

impl Paging {
    pub fn has_next(&self) -> bool {
        self.next.as_deref().is_some_and(|next| !next.is_empty())
    }
}

/// Body returned by the OAuth2 token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    /// Lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// A cached bearer token with its wall-clock validity window.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessToken {
    pub value: String,
    pub issued_at: DateTime<Utc>,
    /// `None` when the endpoint did not report a lifetime; the token is then
    /// reused until a 401 invalidates it.
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn new(value: String, issued_at: DateTime<Utc>, expires_in: Option<i64>) -> Self {
        Self {
            value,
            issued_at,
            expires_at: expires_in.map(|secs| issued_at + Duration::seconds(secs)),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }
}

/// A package downloaded into its own temporary directory. The directory is
/// removed when the value is dropped.
#[derive(Debug)]
pub struct DownloadedPackage {
    path: PathBuf,
    _dir: TempDir,
}

impl DownloadedPackage {
    pub fn new(dir: TempDir, path: PathBuf) -> Self {
        Self { path, _dir: dir }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Turn an untrusted name into a single file name inside a download
/// directory. Path separators and control characters become `_`; names that
/// still are not one normal path component are rejected.
pub fn sanitize_file_name(name: &str) -> Option<String> {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let mut components = Path::new(&cleaned).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Some(cleaned),
        _ => None,
    }
}

/// Accepts `true`/`false`, `0`/`1` and their string forms. The remote API has
/// shipped all of them for the `active` flag.
pub fn flexible_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Bool(flag) => Ok(flag),
        Value::Number(n) => Ok(n.as_f64().is_some_and(|v| v != 0.0)),
        Value::String(s) => Ok(matches!(s.trim(), "1" | "true" | "TRUE" | "True")),
        Value::Null => Ok(false),
        other => Err(serde::de::Error::custom(format!(
            "expected a boolean flag, got {other}"
        ))),
    }
}

/// Reads `null` as an empty string.
pub fn nullable_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
