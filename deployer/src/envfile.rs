//! Rendering the stack's env file from deploy secrets
//!
//! The containers read their settings from an env file written into the
//! checkout at deploy time. Nothing may touch the containers until that file
//! exists, is non-empty, and parses back with every required key.

use regex::Regex;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;
use tracing::{debug, info};

pub const ENVIRONMENT: &str = "ENVIRONMENT";
pub const MONGO_URI: &str = "MONGO_URI";
pub const SECRET_KEY: &str = "SECRET_KEY";
pub const ACCESS_TOKEN_EXPIRE_MINUTES: &str = "ACCESS_TOKEN_EXPIRE_MINUTES";
pub const LOG_LEVEL: &str = "LOG_LEVEL";
pub const API_URL: &str = "API_URL";

/// Keys the backend refuses to start without
pub const REQUIRED_KEYS: [&str; 5] = [
    ENVIRONMENT,
    MONGO_URI,
    SECRET_KEY,
    ACCESS_TOKEN_EXPIRE_MINUTES,
    LOG_LEVEL,
];

pub const DEFAULT_ENVIRONMENT: &str = "production";
pub const DEFAULT_TOKEN_EXPIRE_MINUTES: u32 = 43200;
pub const DEFAULT_LOG_LEVEL: &str = "INFO";

const LOG_LEVELS: [&str; 5] = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"];

static URI_CREDENTIALS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<scheme>[A-Za-z][A-Za-z0-9+.-]*://)[^/@\s]+@").expect("credential pattern compiles")
});

#[derive(Error, Debug)]
pub enum EnvFileError {
    #[error("Required secret {0} is not set")]
    MissingSecret(String),

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("No database URI for environment '{0}'; set MONGO_URI or an environment-scoped override")]
    UnknownEnvironment(String),

    #[error("Env file {path} was not materialized: {reason}")]
    NotMaterialized { path: PathBuf, reason: String },

    #[error("Env file parse error: {0}")]
    Parse(#[from] dotenvy::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type EnvFileResult<T> = Result<T, EnvFileError>;

/// Values written into the env file
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct DeploySecrets {
    pub environment: String,
    #[serde(skip)]
    pub mongo_uri: String,
    #[serde(skip)]
    pub secret_key: String,
    pub access_token_expire_minutes: u32,
    pub log_level: String,
    pub api_url: Option<String>,
}

impl std::fmt::Debug for DeploySecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploySecrets")
            .field("environment", &self.environment)
            .field("mongo_uri", &Redactor::default().redact(&self.mongo_uri))
            .field("secret_key", &"***")
            .field("access_token_expire_minutes", &self.access_token_expire_minutes)
            .field("log_level", &self.log_level)
            .field("api_url", &self.api_url)
            .finish()
    }
}

impl DeploySecrets {
    /// Read secrets from the process environment
    pub fn from_env() -> EnvFileResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read secrets through `lookup`; empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> EnvFileResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let environment = get(ENVIRONMENT)
            .map(|v| v.trim().to_lowercase())
            .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string());

        let mongo_uri = resolve_mongo_uri(&environment, &get)?;

        let secret_key =
            get(SECRET_KEY).ok_or_else(|| EnvFileError::MissingSecret(SECRET_KEY.to_string()))?;

        let access_token_expire_minutes = match get(ACCESS_TOKEN_EXPIRE_MINUTES) {
            Some(raw) => parse_minutes(&raw)?,
            None => DEFAULT_TOKEN_EXPIRE_MINUTES,
        };

        let log_level = match get(LOG_LEVEL) {
            Some(raw) => parse_log_level(&raw)?,
            None => DEFAULT_LOG_LEVEL.to_string(),
        };

        Ok(Self {
            environment,
            mongo_uri,
            secret_key,
            access_token_expire_minutes,
            log_level,
            api_url: get(API_URL),
        })
    }

    /// Fill `api_url` when the environment did not provide one
    pub fn with_default_api_url(mut self, api_url: Option<String>) -> Self {
        if self.api_url.is_none() {
            self.api_url = api_url;
        }
        self
    }

    /// Values that must never appear in logs or reports
    pub fn sensitive_values(&self) -> Vec<&str> {
        vec![self.secret_key.as_str(), self.mongo_uri.as_str()]
    }
}

/// `MONGO_URI_<ENV>`, then `MONGO_URI`, then the built-in URI for known environments
pub fn resolve_mongo_uri<F>(environment: &str, get: &F) -> EnvFileResult<String>
where
    F: Fn(&str) -> Option<String>,
{
    let scoped = format!("{}_{}", MONGO_URI, environment.to_uppercase());
    if let Some(uri) = get(&scoped).or_else(|| get(MONGO_URI)) {
        return Ok(uri);
    }

    match environment {
        "development" => Ok("mongodb://localhost:27017/fifa_rivalry".to_string()),
        "production" => Ok("mongodb://mongodb:27017/fifa_rivalry".to_string()),
        other => Err(EnvFileError::UnknownEnvironment(other.to_string())),
    }
}

fn parse_minutes(raw: &str) -> EnvFileResult<u32> {
    match raw.trim().parse::<u32>() {
        Ok(0) => Err(EnvFileError::InvalidValue {
            key: ACCESS_TOKEN_EXPIRE_MINUTES.to_string(),
            reason: "must be greater than 0".to_string(),
        }),
        Ok(minutes) => Ok(minutes),
        Err(e) => Err(EnvFileError::InvalidValue {
            key: ACCESS_TOKEN_EXPIRE_MINUTES.to_string(),
            reason: e.to_string(),
        }),
    }
}

fn parse_log_level(raw: &str) -> EnvFileResult<String> {
    let level = raw.trim().to_uppercase();
    if LOG_LEVELS.contains(&level.as_str()) {
        Ok(level)
    } else {
        Err(EnvFileError::InvalidValue {
            key: LOG_LEVEL.to_string(),
            reason: format!("expected one of {}", LOG_LEVELS.join(", ")),
        })
    }
}

/// Ordered `KEY=value` entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvFile {
    entries: Vec<(String, String)>,
}

impl EnvFile {
    pub fn from_secrets(secrets: &DeploySecrets) -> Self {
        let mut entries = vec![
            (ENVIRONMENT.to_string(), secrets.environment.clone()),
            (MONGO_URI.to_string(), secrets.mongo_uri.clone()),
            (SECRET_KEY.to_string(), secrets.secret_key.clone()),
            (
                ACCESS_TOKEN_EXPIRE_MINUTES.to_string(),
                secrets.access_token_expire_minutes.to_string(),
            ),
            (LOG_LEVEL.to_string(), secrets.log_level.clone()),
        ];
        if let Some(api_url) = &secrets.api_url {
            entries.push((API_URL.to_string(), api_url.clone()));
        }
        Self { entries }
    }

    pub fn render(&self) -> EnvFileResult<String> {
        let mut out = String::new();
        for (key, value) in &self.entries {
            if value.contains(['\n', '\r']) {
                return Err(EnvFileError::InvalidValue {
                    key: key.clone(),
                    reason: "values cannot span lines".to_string(),
                });
            }
            out.push_str(key);
            out.push('=');
            out.push_str(&quote(value));
            out.push('\n');
        }
        Ok(out)
    }

    /// Write via a temp file and rename, then verify the result
    pub fn write(&self, path: &Path) -> EnvFileResult<usize> {
        let rendered = self.render()?;
        let tmp = path.with_extension("tmp");

        let written = write_private(&tmp, rendered.as_bytes()).and_then(|()| fs::rename(&tmp, path));
        if let Err(e) = written {
            // the temp file holds the secrets
            if let Err(cleanup) = fs::remove_file(&tmp) {
                debug!("Could not remove {}: {}", tmp.display(), cleanup);
            }
            return Err(e.into());
        }

        let count = verify_env_file(path, &REQUIRED_KEYS)?;
        info!("Wrote {} entries to {}", count, path.display());
        Ok(count)
    }
}

fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

fn quote(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '#' | '"' | '\'' | '$' | '\\' | '`'));
    if !needs_quotes {
        value.to_string()
    } else if !value.contains('\'') {
        format!("'{}'", value)
    } else {
        let escaped = value
            .replace('\\', "\\\\")
            .replace('"', "\\\"")
            .replace('$', "\\$");
        format!("\"{}\"", escaped)
    }
}

/// Check the file exists, is non-empty and defines every key in `required`
pub fn verify_env_file(path: &Path, required: &[&str]) -> EnvFileResult<usize> {
    let not_materialized = |reason: String| EnvFileError::NotMaterialized {
        path: path.to_path_buf(),
        reason,
    };

    let metadata = fs::metadata(path).map_err(|e| not_materialized(e.to_string()))?;
    if !metadata.is_file() {
        return Err(not_materialized("not a regular file".to_string()));
    }
    if metadata.len() == 0 {
        return Err(not_materialized("file is empty".to_string()));
    }

    let mut keys = Vec::new();
    for item in dotenvy::from_path_iter(path)? {
        let (key, value) = item?;
        if !value.is_empty() {
            keys.push(key);
        }
    }
    debug!("{} defines {:?}", path.display(), keys);

    if let Some(missing) = required.iter().find(|k| !keys.iter().any(|key| key == *k)) {
        return Err(not_materialized(format!("missing {}", missing)));
    }

    Ok(keys.len())
}

/// Masks secret values and URI credentials before text reaches logs or reports
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    secrets: Vec<String>,
}

impl Redactor {
    pub fn new<'a>(secrets: impl IntoIterator<Item = &'a str>) -> Self {
        let mut secrets: Vec<String> = secrets
            .into_iter()
            .filter(|s| s.len() >= 4)
            .map(str::to_string)
            .collect();
        // longest first so a secret containing another is masked whole
        secrets.sort_by_key(|s| std::cmp::Reverse(s.len()));
        Self { secrets }
    }

    pub fn redact(&self, text: &str) -> String {
        let mut out = text.to_string();
        for secret in &self.secrets {
            out = out.replace(secret.as_str(), "***");
        }
        URI_CREDENTIALS.replace_all(&out, "${scheme}***@").into_owned()
    }
}
