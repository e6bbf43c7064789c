//! Configuration manager for meetup.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::FromRef;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::AppState;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const DEFAULT_PORT: u16 = 8888;
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Errors raised while loading `config.yaml`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("URL is invalid: {0}")]
    Url(#[from] url::ParseError),
    #[error("failed to deserialize `config.yaml`: {0}")]
    Deserialize(#[from] serde_yaml::Error),
    #[error("missing `{0}` entry on `config.yaml` file")]
    Missing(&'static str),
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Instance name.
    #[serde(default)]
    pub name: String,
    /// Public URL of current instance.
    #[serde(default)]
    pub url: String,
    /// HTTP listening port.
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    version: String,
    #[serde(skip)]
    path: PathBuf,
    /// Related to PostgreSQL configuration.
    #[serde(skip_serializing)]
    pub postgres: Option<Postgres>,
    /// Related to JsonWebToken configuration.
    #[serde(skip_serializing)]
    pub token: Option<Token>,
    /// Related to Argon2 configuration.
    #[serde(skip_serializing)]
    pub argon2: Option<Argon2>,
    /// Related to outgoing mails.
    #[serde(skip_serializing)]
    pub mail: Option<Mail>,
    /// Related to event reminders.
    #[serde(default, skip_serializing)]
    pub reminder: Reminder,
    /// Related to OTLP exporters.
    #[serde(default, skip_serializing)]
    pub telemetry: Telemetry,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// PostgreSQL configuration.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Postgres {
    /// Hostname:(?port) for PostgreSQL instance.
    pub address: String,
    /// Database name.
    pub database: Option<String>,
    /// Username credential to connect.
    pub username: Option<String>,
    /// Password credential to connect.
    pub password: Option<String>,
    /// Maximum pool connections.
    pub pool_size: Option<u32>,
    /// Full connection string, takes precedence over other fields.
    #[serde(skip)]
    pub url: Option<String>,
}

/// Argon2 configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Argon2 {
    /// Memory used while hashing, in KiB.
    pub memory_cost: u32,
    /// Iterations of hash.
    pub iterations: u32,
    /// Parallelism degree.
    pub parallelism: u32,
    /// Output hash length.
    pub hash_length: usize,
}

impl Default for Argon2 {
    fn default() -> Self {
        Self {
            memory_cost: 1024 * 64, // 64 MiB.
            iterations: 4,
            parallelism: 4,
            hash_length: 32,
        }
    }
}

/// Json Web Token configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Token {
    /// HMAC secret used to sign tokens.
    pub secret: String,
    /// Default is instance `name`.
    pub issuer: Option<String>,
    /// Default is instance `name`.
    pub audience: Option<String>,
}

/// SMTP configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mail {
    /// SMTP relay hostname.
    pub host: String,
    /// SMTP relay port.
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Sender address.
    pub from: String,
    /// Upgrade connection with STARTTLS.
    #[serde(default)]
    pub starttls: bool,
    /// Maximum queued mails before new ones are dropped.
    pub queue_size: Option<usize>,
    /// Maximum concurrent SMTP sends.
    pub workers: Option<usize>,
}

impl Default for Mail {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1025,
            username: None,
            password: None,
            from: "noreply@meetup.local".into(),
            starttls: false,
            queue_size: None,
            workers: None,
        }
    }
}

/// Reminder sweep configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    /// Seconds between two sweeps.
    pub interval_secs: u64,
}

impl Default for Reminder {
    fn default() -> Self {
        Self { interval_secs: 300 }
    }
}

/// OpenTelemetry configuration.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    /// gRPC endpoint of an OTLP collector.
    pub otlp_endpoint: Option<String>,
}

impl FromRef<AppState> for Arc<Configuration> {
    fn from_ref(state: &AppState) -> Arc<Configuration> {
        Arc::clone(&state.config)
    }
}

impl Configuration {
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Token issuer, falls back on instance name.
    pub fn issuer(&self) -> &str {
        self.token
            .as_ref()
            .and_then(|t| t.issuer.as_deref())
            .unwrap_or(&self.name)
    }

    /// Token audience, falls back on instance name.
    pub fn audience(&self) -> &str {
        self.token
            .as_ref()
            .and_then(|t| t.audience.as_deref())
            .unwrap_or(&self.name)
    }

    /// Normalizes a URL string by ensuring it starts with a valid scheme
    /// (`http` or `https`).
    fn normalize_url(&self, url: &str) -> Result<String, url::ParseError> {
        let url_with_scheme =
            if url.starts_with("http://") || url.starts_with("https://") {
                url.to_string()
            } else {
                format!("https://{url}")
            };

        let parsed_url = Url::parse(&url_with_scheme)?;
        Ok(parsed_url.to_string())
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location, then applies environment overrides.
    pub fn read(self) -> Result<Arc<Self>, ConfigError> {
        let file_path = if self.path.is_file() {
            &self.path
        } else {
            &Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
        };

        let mut config = match File::open(file_path) {
            Ok(file) => {
                let mut config: Configuration = serde_yaml::from_reader(file)?;
                if !config.url.is_empty() {
                    config.url = self.normalize_url(&config.url)?;
                }
                config
            },
            Err(err) => {
                tracing::warn!(error = %err, path = ?file_path, "`config.yaml` file not found");
                Self::default()
            },
        };

        config.version = VERSION.to_owned();
        if config.name.is_empty() {
            config.name = env!("CARGO_PKG_NAME").to_owned();
        }
        if config.port == 0 {
            config.port = DEFAULT_PORT;
        }
        config.apply_env(|key| std::env::var(key).ok());

        Ok(Arc::new(config))
    }

    /// Override entries with `DATABASE_URL`, `JWT_SECRET` and `PORT`.
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var("DATABASE_URL") {
            let postgres = self.postgres.get_or_insert_with(Postgres::default);
            postgres.url = Some(url);
        }

        if let Some(secret) = var("JWT_SECRET") {
            match self.token.as_mut() {
                Some(token) => token.secret = secret,
                None => {
                    self.token = Some(Token {
                        secret,
                        issuer: None,
                        audience: None,
                    })
                },
            }
        }

        if let Some(port) = var("PORT").and_then(|p| p.parse().ok()) {
            self.port = port;
        }
    }

    /// Ensure mandatory sections are present.
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.postgres.is_none() {
            return Err(ConfigError::Missing("postgres"));
        }
        match &self.token {
            Some(token) if !token.secret.is_empty() => Ok(()),
            _ => Err(ConfigError::Missing("token.secret")),
        }
    }
}
