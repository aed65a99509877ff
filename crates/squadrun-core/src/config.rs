//! Configuration types for squadrun.
//!
//! Every key is optional; an empty file (or no file at all) yields the same
//! behaviour as the built-in constants: the public squad API, squad `DAKI`,
//! one second between calls and a fifteen minute cooldown between passes.

use serde::{Deserialize, Serialize};
use squadrun_proto::EntityId;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SquadConfig {
    /// Remote API settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Squad identity and claim parameters.
    #[serde(default)]
    pub squad: SquadSettings,

    /// Pass scheduling and loop bounds.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Suppress all warnings (for unattended hosts).
    #[serde(default, rename = "_suppress_warnings")]
    pub suppress_warnings: bool,
}

impl Default for SquadConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            squad: SquadSettings::default(),
            scheduler: SchedulerConfig::default(),
            suppress_warnings: false,
        }
    }
}

/// Remote API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL every request path is appended to.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Delay before every call, in milliseconds.
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,

    /// Per-call timeout in seconds. Zero disables the timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://squad-api.gomble.io/".to_string()
}

fn default_pacing_ms() -> u64 {
    1000
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            pacing_ms: default_pacing_ms(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl ApiConfig {
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}

/// Squad identity and claim parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SquadSettings {
    /// Squad every squad-scoped call is made against.
    #[serde(default = "default_squad_name")]
    pub name: String,

    /// Grade sent with the daily claim.
    #[serde(default = "default_daily_grade")]
    pub daily_grade: u32,

    /// Step count sent with squad mission claims.
    #[serde(default = "default_target_steps")]
    pub mission_target_steps: u64,

    /// Squad missions claimed once per session pass, after the mission sweep.
    #[serde(default)]
    pub squad_missions: Vec<EntityId>,
}

fn default_squad_name() -> String {
    "DAKI".to_string()
}

fn default_daily_grade() -> u32 {
    1
}

fn default_target_steps() -> u64 {
    10_000
}

impl Default for SquadSettings {
    fn default() -> Self {
        Self {
            name: default_squad_name(),
            daily_grade: default_daily_grade(),
            mission_target_steps: default_target_steps(),
            squad_missions: Vec::new(),
        }
    }
}

/// Pass scheduling and loop bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Newline-delimited session file.
    #[serde(default = "default_sessions_file")]
    pub sessions_file: PathBuf,

    /// Wait between passes, in seconds.
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,

    /// Requests with less than this many seconds left are treated as expired.
    #[serde(default = "default_expiry_margin")]
    pub assistance_expiry_margin_secs: u64,

    /// Fetch rounds a convergence sweep may run before giving up.
    #[serde(default = "default_max_sweep_rounds")]
    pub max_sweep_rounds: u32,

    /// Boost/claim rounds per session before giving up on draining fuel.
    #[serde(default = "default_max_boost_rounds")]
    pub max_boost_rounds: u32,
}

fn default_sessions_file() -> PathBuf {
    PathBuf::from("query.txt")
}

fn default_cooldown() -> u64 {
    900 // 15 minutes
}

fn default_expiry_margin() -> u64 {
    3600 // 1 hour
}

fn default_max_sweep_rounds() -> u32 {
    50
}

fn default_max_boost_rounds() -> u32 {
    100
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sessions_file: default_sessions_file(),
            cooldown_secs: default_cooldown(),
            assistance_expiry_margin_secs: default_expiry_margin(),
            max_sweep_rounds: default_max_sweep_rounds(),
            max_boost_rounds: default_max_boost_rounds(),
        }
    }
}

impl SchedulerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn expiry_margin(&self) -> Duration {
        Duration::from_secs(self.assistance_expiry_margin_secs)
    }
}

impl SquadConfig {
    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        debug!(path = %path_ref.display(), "Loading configuration from file");
        let content = std::fs::read_to_string(path_ref)?;
        let config = Self::parse_yaml(&content)?;
        debug!(
            base_url = %config.api.base_url,
            squad = %config.squad.name,
            sessions_file = %config.scheduler.sessions_file.display(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Parses configuration from a YAML string. Empty input yields defaults.
    pub fn parse_yaml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Validates the configuration and returns warnings.
    ///
    /// Hard errors (an unusable base URL, an empty squad name) are returned
    /// as `Err`; degenerate but workable values come back as warnings.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, ConfigError> {
        let url = reqwest::Url::parse(&self.api.base_url).map_err(|e| {
            ConfigError::InvalidBaseUrl {
                url: self.api.base_url.clone(),
                reason: e.to_string(),
            }
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidBaseUrl {
                url: self.api.base_url.clone(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }

        if self.squad.name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "squad.name".to_string(),
                message: "squad name must not be empty".to_string(),
            });
        }

        let mut warnings = Vec::new();
        if self.suppress_warnings {
            return Ok(warnings);
        }

        if self.api.pacing_ms == 0 {
            warnings.push(ConfigWarning::InvalidValue {
                field: "api.pacing_ms".to_string(),
                message: "No delay between API calls; the server may rate-limit".to_string(),
            });
        }

        if self.api.request_timeout_secs == 0 {
            warnings.push(ConfigWarning::InvalidValue {
                field: "api.request_timeout_secs".to_string(),
                message: "Per-call timeout disabled; a stalled call blocks the pass".to_string(),
            });
        }

        if self.scheduler.cooldown_secs == 0 {
            warnings.push(ConfigWarning::InvalidValue {
                field: "scheduler.cooldown_secs".to_string(),
                message: "Passes will run back to back".to_string(),
            });
        }

        if self.scheduler.max_sweep_rounds == 0 {
            warnings.push(ConfigWarning::InvalidValue {
                field: "scheduler.max_sweep_rounds".to_string(),
                message: "Mission and assistance sweeps are disabled".to_string(),
            });
        }

        if self.scheduler.max_boost_rounds == 0 {
            warnings.push(ConfigWarning::InvalidValue {
                field: "scheduler.max_boost_rounds".to_string(),
                message: "Repeated boost/claim rounds are disabled".to_string(),
            });
        }

        Ok(warnings)
    }
}

/// Configuration warnings emitted during validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// Field has a value that works but is probably unintended.
    InvalidValue { field: String, message: String },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::InvalidValue { field, message } => {
                write!(f, "Warning [{}]: {}", field, message)
            }
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
