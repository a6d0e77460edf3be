//! Configuration module for environment variable parsing.
//!
//! Every value is read once at startup. A missing required variable or a value
//! that does not parse is fatal: the relay never starts in a half-configured state.

use std::env;
use std::fmt;

use thiserror::Error;
use url::Url;

/// Default Cloud Tasks REST endpoint.
pub const CLOUD_TASKS_ENDPOINT: &str = "https://cloudtasks.googleapis.com";

/// Default Pub/Sub REST endpoint.
pub const PUBSUB_ENDPOINT: &str = "https://pubsub.googleapis.com";

/// Errors produced while reading configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),

    #[error("environment variable {var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Application configuration loaded from environment variables.
#[derive(Clone)]
pub struct Config {
    /// Shared secret expected in `Authorization: Bearer <token>`
    pub token: String,

    /// Port for the web server to listen on
    pub port: u16,

    /// Drop notifications that carry no user message (status updates etc.)
    pub ignore_status: bool,

    /// Where accepted payloads are enqueued
    pub backend: BackendConfig,
}

/// Destination queue, one variant per supported backend.
#[derive(Clone, PartialEq, Eq)]
pub enum BackendConfig {
    /// Google Cloud Pub/Sub topic.
    PubSub {
        project_id: String,
        topic_id: String,
        /// REST base URL, either the public API or the emulator
        endpoint: String,
        /// The emulator accepts unauthenticated requests
        emulator: bool,
        access_token: Option<String>,
    },

    /// Google Cloud Tasks queue dispatching HTTP tasks to a fixed target.
    Tasks {
        project_id: String,
        location_id: String,
        queue_id: String,
        target_url: Url,
        target_token: String,
        endpoint: String,
        access_token: Option<String>,
    },

    /// RabbitMQ durable queue.
    Amqp { url: String, queue: String },
}

impl BackendConfig {
    /// Short backend name, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            BackendConfig::PubSub { .. } => "pubsub",
            BackendConfig::Tasks { .. } => "tasks",
            BackendConfig::Amqp { .. } => "amqp",
        }
    }
}

const REDACTED: &str = "<redacted>";

/// Credentials never appear in debug output; AMQP URLs lose their password.
impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secret = |value: &Option<String>| value.as_ref().map(|_| REDACTED);

        match self {
            BackendConfig::PubSub {
                project_id,
                topic_id,
                endpoint,
                emulator,
                access_token,
            } => f
                .debug_struct("PubSub")
                .field("project_id", project_id)
                .field("topic_id", topic_id)
                .field("endpoint", endpoint)
                .field("emulator", emulator)
                .field("access_token", &secret(access_token))
                .finish(),
            BackendConfig::Tasks {
                project_id,
                location_id,
                queue_id,
                target_url,
                endpoint,
                access_token,
                ..
            } => f
                .debug_struct("Tasks")
                .field("project_id", project_id)
                .field("location_id", location_id)
                .field("queue_id", queue_id)
                .field("target_url", &target_url.as_str())
                .field("target_token", &REDACTED)
                .field("endpoint", endpoint)
                .field("access_token", &secret(access_token))
                .finish(),
            BackendConfig::Amqp { url, queue } => f
                .debug_struct("Amqp")
                .field("url", &redact_url(url))
                .field("queue", queue)
                .finish(),
        }
    }
}

/// Strip the password from a broker URL; unparseable URLs are hidden entirely.
fn redact_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some(REDACTED));
            }
            url.to_string()
        }
        Err(_) => REDACTED.to_string(),
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("token", &REDACTED)
            .field("port", &self.port)
            .field("ignore_status", &self.ignore_status)
            .field("backend", &self.backend)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = required(&lookup, "TOKEN")?;

        let port = match optional(&lookup, "PORT") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|e| ConfigError::Invalid {
                var: "PORT",
                reason: e.to_string(),
            })?,
            None => 8080,
        };

        let ignore_status = match optional(&lookup, "IGNORE_STATUS") {
            Some(raw) => parse_bool(&raw).ok_or_else(|| ConfigError::Invalid {
                var: "IGNORE_STATUS",
                reason: format!("{raw:?} is not a boolean"),
            })?,
            None => true,
        };

        let backend = match optional(&lookup, "QUEUE_BACKEND").as_deref().map(str::trim) {
            None | Some("pubsub") => pubsub_backend(&lookup)?,
            Some("tasks") => tasks_backend(&lookup)?,
            Some("amqp") => BackendConfig::Amqp {
                url: required(&lookup, "AMQP_URL")?,
                queue: required(&lookup, "AMQP_QUEUE")?,
            },
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "QUEUE_BACKEND",
                    reason: format!("unknown backend {other:?}, expected pubsub, tasks or amqp"),
                })
            }
        };

        Ok(Config {
            token,
            port,
            ignore_status,
            backend,
        })
    }
}

fn pubsub_backend<F>(lookup: &F) -> Result<BackendConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let emulator_host = optional(lookup, "PUBSUB_EMULATOR_HOST");

    Ok(BackendConfig::PubSub {
        project_id: required(lookup, "PROJECT_ID")?,
        topic_id: required(lookup, "TOPIC_ID")?,
        endpoint: emulator_host
            .as_ref()
            .map(|host| format!("http://{host}"))
            .unwrap_or_else(|| PUBSUB_ENDPOINT.to_string()),
        emulator: emulator_host.is_some(),
        access_token: optional(lookup, "GOOGLE_ACCESS_TOKEN"),
    })
}

fn tasks_backend<F>(lookup: &F) -> Result<BackendConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let raw_target = required(lookup, "TARGET_URL")?;
    let target_url = Url::parse(&raw_target).map_err(|e| ConfigError::Invalid {
        var: "TARGET_URL",
        reason: e.to_string(),
    })?;
    if !matches!(target_url.scheme(), "http" | "https") {
        return Err(ConfigError::Invalid {
            var: "TARGET_URL",
            reason: format!("scheme {:?} is not http or https", target_url.scheme()),
        });
    }

    Ok(BackendConfig::Tasks {
        project_id: required(lookup, "PROJECT_ID")?,
        location_id: required(lookup, "LOCATION_ID")?,
        queue_id: required(lookup, "QUEUE_ID")?,
        target_url,
        target_token: required(lookup, "TARGET_TOKEN")?,
        endpoint: optional(lookup, "CLOUD_TASKS_ENDPOINT")
            .map(|e| e.trim_end_matches('/').to_string())
            .unwrap_or_else(|| CLOUD_TASKS_ENDPOINT.to_string()),
        access_token: optional(lookup, "GOOGLE_ACCESS_TOKEN"),
    })
}

/// Read a variable that must be present and non-empty.
fn required<F>(lookup: &F, name: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    optional(lookup, name).ok_or(ConfigError::Missing(name))
}

/// Read a variable, treating an empty value as unset.
fn optional<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).filter(|v| !v.trim().is_empty())
}

/// Parse a boolean the way Go's `strconv.ParseBool` does.
fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}
