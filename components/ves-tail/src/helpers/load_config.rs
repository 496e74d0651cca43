// External crates
use config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::instrument;

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8080";
pub const ENV_PREFIX: &str = "VES_TAIL";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
/// Fixed delay between two tail polls.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    pub backend: BackendConfig,
    pub tail: TailConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct BackendConfig {
    pub endpoint: String,
    #[serde(default)]
    pub auth_token: Option<String>,
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub page_size: Option<u32>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TailConfig {
    pub poll_interval_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct OutputConfig {
    /// Follow mode prints bare messages instead of the pretty form.
    pub raw: bool,
    /// One-shot queries print the pretty form instead of bare messages.
    pub pretty: bool,
    /// Indent JSON messages across lines.
    pub expand: bool,
    pub color: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub directory: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl Config {
    /// Load configuration from defaults, then the TOML file, then `VES_TAIL__*`
    /// environment variables, later layers winning.
    ///
    /// An explicit `path` must exist. Without one, `$HOME/.config/ves/tail.toml`
    /// is read if present.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let environment = Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true);
        Self::load_with_env(path, environment)
    }

    #[instrument(
        name = "config_loader",
        target = "helpers::load_config",
        level = "trace",
        skip_all
    )]
    pub fn load_with_env(path: Option<&Path>, environment: Environment) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("backend.endpoint", DEFAULT_ENDPOINT)?
            .set_default("backend.request_timeout_ms", DEFAULT_REQUEST_TIMEOUT_MS)?
            .set_default("tail.poll_interval_ms", DEFAULT_POLL_INTERVAL_MS)?
            .set_default("output.raw", false)?
            .set_default("output.pretty", false)?
            .set_default("output.expand", false)?
            .set_default("output.color", true)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "text")?
            .set_default(
                "logging.directory",
                default_log_directory().to_string_lossy().into_owned(),
            )?;

        match path {
            Some(path) => {
                tracing::trace!(configuration_file_path = %path.display(), "Loading VES tail configuration file");
                builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
            }
            None => {
                if let Some(path) = default_config_path() {
                    builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
                }
            }
        }

        let config: Config = match builder.add_source(environment).build() {
            Ok(layered) => layered.try_deserialize()?,
            Err(e) => {
                tracing::error!(error = %e, "Failed to build layered configuration");
                return Err(e.into());
            }
        };

        config.validate()?;
        tracing::trace!("VES tail configuration loaded successfully");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.backend.endpoint.starts_with("http://") {
            return Err(ConfigError::Invalid(format!(
                "backend.endpoint must be an http:// URL, got '{}'",
                self.backend.endpoint
            )));
        }
        if self.backend.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "backend.request_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.backend.page_size == Some(0) {
            return Err(ConfigError::Invalid(
                "backend.page_size must be greater than zero".into(),
            ));
        }
        if self.tail.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "tail.poll_interval_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Copy safe to print: the auth token is masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.backend.auth_token.is_some() {
            copy.backend.auth_token = Some("***".into());
        }
        copy
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

fn default_config_path() -> Option<PathBuf> {
    home_dir().map(|home| home.join(".config/ves/tail.toml"))
}

fn default_log_directory() -> PathBuf {
    home_dir()
        .map(|home| home.join(".local/state/ves/tail"))
        .unwrap_or_else(|| std::env::temp_dir().join("ves-tail"))
}
