//! Runtime configuration, read once at startup.
//!
//! Values come from the process environment (optionally seeded from a `.env`
//! file) with the `CAPTURE_RELAY_` prefix. There is no hot reload.
//!
//! Data lives in the platform-appropriate data directory:
//!   macOS:   ~/Library/Application Support/capture-relay/
//!   Linux:   ~/.local/share/capture-relay/
//!   Windows: %APPDATA%/capture-relay/

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const ENV_PREFIX: &str = "CAPTURE_RELAY_";
const KEYRING_SERVICE: &str = "capture-relay";
const KEYRING_USER: &str = "upload-token";

#[derive(Debug, Clone)]
pub struct Config {
    pub capture_interval_ms: u64,
    pub retention_limit: usize,
    pub upload_endpoint: String,
    pub auth_token: Option<String>,
    pub auto_start: bool,
    /// JPEG quality, 1-100.
    pub jpeg_quality: u8,
    pub upload_timeout_ms: u64,
    /// Spawn the out-of-process background capturer on startup.
    pub background_capture: bool,
    pub data_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capture_interval_ms: 120_000,
            retention_limit: 10,
            upload_endpoint: "https://httpbin.org/post".to_string(),
            auth_token: None,
            auto_start: true,
            jpeg_quality: 70,
            upload_timeout_ms: 20_000,
            background_capture: false,
            data_dir: default_data_dir(),
        }
    }
}

impl Config {
    /// Load from `.env` + process environment, falling back to defaults.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            log::info!("[CONFIG] Loaded {}", path.display());
        }
        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        Ok(config.with_keyring_token())
    }

    /// Build a config from an arbitrary variable lookup (full variable names).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(&format!("{}{}", ENV_PREFIX, name)).filter(|v| !v.trim().is_empty())
        };
        let defaults = Self::default();

        let capture_interval_ms = parse_or(&var, "CAPTURE_INTERVAL_MS", defaults.capture_interval_ms)?;
        if capture_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "CAPTURE_INTERVAL_MS",
                reason: "must be greater than zero".to_string(),
            });
        }

        let retention_limit = parse_or(&var, "RETENTION_LIMIT", defaults.retention_limit)?;
        if retention_limit == 0 {
            return Err(ConfigError::Invalid {
                key: "RETENTION_LIMIT",
                reason: "must be greater than zero".to_string(),
            });
        }

        let jpeg_quality = parse_or(&var, "JPEG_QUALITY", defaults.jpeg_quality)?;
        if !(1..=100).contains(&jpeg_quality) {
            return Err(ConfigError::Invalid {
                key: "JPEG_QUALITY",
                reason: format!("{} is outside 1-100", jpeg_quality),
            });
        }

        Ok(Self {
            capture_interval_ms,
            retention_limit,
            upload_endpoint: var("UPLOAD_ENDPOINT").unwrap_or(defaults.upload_endpoint),
            auth_token: var("UPLOAD_AUTH_TOKEN"),
            auto_start: parse_bool_or(&var, "AUTO_START", defaults.auto_start)?,
            jpeg_quality,
            upload_timeout_ms: parse_or(&var, "UPLOAD_TIMEOUT_MS", defaults.upload_timeout_ms)?,
            background_capture: parse_bool_or(&var, "BACKGROUND_CAPTURE", defaults.background_capture)?,
            data_dir: var("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
        })
    }

    /// Fill a missing auth token from the OS keyring, if one is stored there.
    fn with_keyring_token(mut self) -> Self {
        if self.auth_token.is_some() {
            return self;
        }
        match keyring::Entry::new(KEYRING_SERVICE, KEYRING_USER).and_then(|e| e.get_password()) {
            Ok(token) if !token.is_empty() => {
                log::info!("[CONFIG] Upload token loaded from keyring ({} chars)", token.len());
                self.auth_token = Some(token);
            }
            Ok(_) | Err(keyring::Error::NoEntry) => {}
            Err(e) => log::debug!("[CONFIG] Keyring unavailable: {}", e),
        }
        self
    }

    pub fn capture_interval(&self) -> Duration {
        Duration::from_millis(self.capture_interval_ms)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_millis(self.upload_timeout_ms)
    }

    /// Directory captured JPEGs are written to.
    pub fn capture_dir(&self) -> PathBuf {
        self.data_dir.join("captures")
    }

    /// Directory backing the persisted key-value slots.
    pub fn store_dir(&self) -> PathBuf {
        self.data_dir.join("store")
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("capture-relay")
}

fn parse_or<T, F>(var: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: format!("{:?}: {}", raw, e),
        }),
        None => Ok(default),
    }
}

fn parse_bool_or<F>(var: &F, key: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match var(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid {
                key,
                reason: format!("{:?} is not a boolean", v),
            }),
        },
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for CAPTURE_RELAY_{key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}
