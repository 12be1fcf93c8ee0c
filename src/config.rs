//! Server configuration, read from `OPSBRIDGE_*` environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::channels::whatsapp::DEFAULT_GRAPH_BASE;
use crate::crm::vtiger::DEFAULT_CRM_TIMEOUT;
use crate::error::ConfigError;
use crate::pipeline::context::DEFAULT_HISTORY_WINDOW;
use crate::publish::DEFAULT_AUTOMATION_TIMEOUT;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DB_PATH: &str = "./data/opsbridge.db";
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Path the automation system calls back on.
pub const CALLBACK_PATH: &str = "/automation/callback";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub db_path: PathBuf,
    /// Externally reachable base URL, used to build the callback URL.
    pub public_base_url: String,
    /// Fallback automation endpoint for tenants without their own.
    pub automation_webhook_url: Option<String>,
    pub callback_secret: Option<String>,
    pub history_window: usize,
    pub crm_timeout: Duration,
    pub automation_timeout: Duration,
    /// Bound on outbound messaging API calls.
    pub send_timeout: Duration,
    pub graph_api_base: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            public_base_url: format!("http://localhost:{DEFAULT_PORT}"),
            automation_webhook_url: None,
            callback_secret: None,
            history_window: DEFAULT_HISTORY_WINDOW,
            crm_timeout: DEFAULT_CRM_TIMEOUT,
            automation_timeout: DEFAULT_AUTOMATION_TIMEOUT,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            graph_api_base: DEFAULT_GRAPH_BASE.to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let port = parse_or(&get, "OPSBRIDGE_PORT", defaults.port)?;
        let history_window = parse_or(&get, "OPSBRIDGE_HISTORY_WINDOW", defaults.history_window)?;
        if history_window == 0 {
            return Err(ConfigError::InvalidValue {
                key: "OPSBRIDGE_HISTORY_WINDOW".into(),
                message: "must be at least 1".into(),
            });
        }

        let public_base_url = get("OPSBRIDGE_PUBLIC_BASE_URL")
            .unwrap_or_else(|| format!("http://localhost:{port}"))
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            port,
            db_path: get("OPSBRIDGE_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            public_base_url,
            automation_webhook_url: get("OPSBRIDGE_AUTOMATION_WEBHOOK_URL"),
            callback_secret: get("OPSBRIDGE_CALLBACK_SECRET"),
            history_window,
            crm_timeout: secs_or(&get, "OPSBRIDGE_CRM_TIMEOUT_SECS", defaults.crm_timeout)?,
            automation_timeout: secs_or(
                &get,
                "OPSBRIDGE_AUTOMATION_TIMEOUT_SECS",
                defaults.automation_timeout,
            )?,
            send_timeout: secs_or(&get, "OPSBRIDGE_SEND_TIMEOUT_SECS", defaults.send_timeout)?,
            graph_api_base: get("OPSBRIDGE_GRAPH_API_BASE")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.graph_api_base),
        })
    }

    /// Absolute URL handed to the automation system for callbacks.
    pub fn callback_url(&self) -> String {
        format!("{}{CALLBACK_PATH}", self.public_base_url)
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("could not parse {raw:?}"),
        }),
        None => Ok(default),
    }
}

fn secs_or<G>(get: &G, key: &str, default: Duration) -> Result<Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let secs: Option<u64> = match get(key) {
        Some(raw) => Some(raw.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected whole seconds, got {raw:?}"),
        })?),
        None => None,
    };
    match secs {
        Some(0) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "timeout must be greater than zero".into(),
        }),
        Some(s) => Ok(Duration::from_secs(s)),
        None => Ok(default),
    }
}
