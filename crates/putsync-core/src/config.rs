//! Configuration module for putsync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for putsync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub remote: RemoteConfig,
    pub auth: AuthConfig,
    pub state: StateConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// Synchronization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Local directory mirrored to the remote folder.
    pub local_root: PathBuf,
    /// Name of the remote folder (directly under the account root) to mirror.
    pub remote_folder_name: String,
    /// Seconds between passes; `0` runs a single pass and exits.
    pub repeat_interval: u64,
    /// Quiet period in milliseconds after a change before a pass starts.
    pub debounce_delay_ms: u64,
    /// Upper bound in seconds for every individual remote API call.
    pub request_timeout: u64,
    /// Seconds without transferred bytes before a transfer is abandoned.
    pub transfer_stall_timeout: u64,
    /// Log the planned jobs without executing them.
    pub dry_run: bool,
}

/// Remote service endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub api_base_url: String,
    pub upload_url: String,
    pub websocket_url: String,
    /// OAuth client used for the username/password exchange.
    pub client_id: String,
    pub client_secret: String,
}

/// Account credentials.
///
/// Either `token`, or both `username` and `password`, must be set. A password
/// of the form `token/<value>` is treated as a token.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
}

/// Persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// SQLite database holding per-path sync state.
    pub database_path: PathBuf,
}

/// Optional status HTTP endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on, e.g. `127.0.0.1:7766`. Disabled when `None`.
    pub listen_address: Option<String>,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load from `path`, returning defaults only when the file does not exist.
    ///
    /// Parse errors and other I/O errors are still reported.
    pub fn load_if_exists(path: &Path) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(serde_yaml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/putsync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("putsync")
            .join("config.yaml")
    }
}

impl SyncConfig {
    /// Pause between passes, or `None` for single-pass mode.
    pub fn repeat(&self) -> Option<Duration> {
        (self.repeat_interval > 0).then(|| Duration::from_secs(self.repeat_interval))
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_stall_timeout)
    }
}

impl AuthConfig {
    /// Token to use directly, skipping the password exchange.
    pub fn direct_token(&self) -> Option<&str> {
        if let Some(token) = self.token.as_deref().filter(|t| !t.is_empty()) {
            return Some(token);
        }
        self.password
            .as_deref()
            .and_then(|p| p.strip_prefix("token/"))
            .filter(|t| !t.is_empty())
    }

    /// Username and password to exchange for a token.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(u), Some(p)) if !u.is_empty() && !p.is_empty() => Some((u, p)),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            local_root: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("~"))
                .join("putio-sync"),
            remote_folder_name: "putio-sync".to_string(),
            repeat_interval: 0,
            debounce_delay_ms: 1000,
            request_timeout: 10,
            transfer_stall_timeout: 10,
            dry_run: false,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.put.io/v2".to_string(),
            upload_url: "https://upload.put.io/files/".to_string(),
            websocket_url: "wss://socket.put.io/socket/sockjs/websocket".to_string(),
            client_id: "4785".to_string(),
            client_secret: String::new(),
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            database_path: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("putsync")
                .join("state.db"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.request_timeout"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut push = |field: &str, message: String| {
            errors.push(ValidationError {
                field: field.into(),
                message,
            })
        };

        // --- auth ---
        if self.auth.direct_token().is_none() && self.auth.credentials().is_none() {
            push(
                "auth",
                "either a token or both username and password are required".into(),
            );
        }

        // --- sync ---
        if self.sync.remote_folder_name.is_empty() || self.sync.remote_folder_name.contains('/') {
            push(
                "sync.remote_folder_name",
                "must be a single non-empty folder name".into(),
            );
        }
        if self.sync.debounce_delay_ms == 0 {
            push("sync.debounce_delay_ms", "must be greater than 0".into());
        }
        if self.sync.request_timeout == 0 {
            push("sync.request_timeout", "must be greater than 0".into());
        }
        if self.sync.transfer_stall_timeout == 0 {
            push("sync.transfer_stall_timeout", "must be greater than 0".into());
        }

        // --- remote ---
        for (field, value) in [
            ("remote.api_base_url", &self.remote.api_base_url),
            ("remote.upload_url", &self.remote.upload_url),
        ] {
            if !(value.starts_with("http://") || value.starts_with("https://")) {
                push(field, format!("not an http(s) URL: '{value}'"));
            }
        }
        let ws = &self.remote.websocket_url;
        if !(ws.starts_with("ws://") || ws.starts_with("wss://")) {
            push(
                "remote.websocket_url",
                format!("not a ws(s) URL: '{ws}'"),
            );
        }

        // --- server ---
        if let Some(addr) = &self.server.listen_address {
            if addr.parse::<SocketAddr>().is_err() {
                push(
                    "server.listen_address",
                    format!("invalid socket address '{addr}'"),
                );
            }
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            push(
                "logging.level",
                format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            );
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use putsync_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .local_root(PathBuf::from("/home/user/putio-sync"))
///     .token("secret")
///     .repeat_interval(60)
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- sync ---

    pub fn local_root(mut self, root: PathBuf) -> Self {
        self.config.sync.local_root = root;
        self
    }

    pub fn remote_folder_name(mut self, name: impl Into<String>) -> Self {
        self.config.sync.remote_folder_name = name.into();
        self
    }

    pub fn repeat_interval(mut self, seconds: u64) -> Self {
        self.config.sync.repeat_interval = seconds;
        self
    }

    pub fn debounce_delay_ms(mut self, millis: u64) -> Self {
        self.config.sync.debounce_delay_ms = millis;
        self
    }

    pub fn request_timeout(mut self, seconds: u64) -> Self {
        self.config.sync.request_timeout = seconds;
        self
    }

    pub fn transfer_stall_timeout(mut self, seconds: u64) -> Self {
        self.config.sync.transfer_stall_timeout = seconds;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.config.sync.dry_run = dry_run;
        self
    }

    // --- remote ---

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.remote.api_base_url = url.into();
        self
    }

    pub fn upload_url(mut self, url: impl Into<String>) -> Self {
        self.config.remote.upload_url = url.into();
        self
    }

    pub fn websocket_url(mut self, url: impl Into<String>) -> Self {
        self.config.remote.websocket_url = url.into();
        self
    }

    // --- auth ---

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.config.auth.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.auth.password = Some(password.into());
        self
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.config.auth.token = Some(token.into());
        self
    }

    // --- state / server / logging ---

    pub fn database_path(mut self, path: PathBuf) -> Self {
        self.config.state.database_path = path;
        self
    }

    pub fn listen_address(mut self, addr: impl Into<String>) -> Self {
        self.config.server.listen_address = Some(addr.into());
        self
    }

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
