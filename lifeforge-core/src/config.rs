//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/lifeforge/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/lifeforge/` (~/.config/lifeforge/)
//! - Data: `$XDG_DATA_HOME/lifeforge/` (~/.local/share/lifeforge/)
//! - State/Logs: `$XDG_STATE_HOME/lifeforge/` (~/.local/state/lifeforge/)

use crate::error::{Error, Result};
use crate::merge::DEFAULT_RECENT_LIMIT;
use serde::Deserialize;
use std::path::PathBuf;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// LLM configuration (required for chat)
    #[serde(default)]
    pub llm: Option<LlmConfig>,

    /// Google Calendar configuration
    #[serde(default)]
    pub calendar: CalendarConfig,

    /// Chat orchestration settings
    #[serde(default)]
    pub chat: ChatConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// LLM provider configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// Provider type
    pub provider: LlmProvider,
    /// Model to use
    pub model: String,
    /// API endpoint (optional, uses default for provider)
    pub endpoint: Option<String>,
    /// API key (can also use env var)
    pub api_key: Option<String>,
    /// Round-trip timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    /// OAuth scope (GigaChat only)
    #[serde(default = "default_gigachat_scope")]
    pub scope: String,
    /// Skip TLS certificate verification (GigaChat serves a national CA)
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

/// Supported LLM providers
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Ollama,
    Claude,
    OpenAI,
    GigaChat,
}

impl LlmProvider {
    /// Returns the default endpoint for this provider
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            LlmProvider::Ollama => "http://localhost:11434",
            LlmProvider::Claude => "https://api.anthropic.com",
            LlmProvider::OpenAI => "https://api.openai.com",
            LlmProvider::GigaChat => "https://gigachat.devices.sberbank.ru/api",
        }
    }

    /// Environment variable consulted when `api_key` is not set
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            LlmProvider::Ollama => None,
            LlmProvider::Claude => Some("ANTHROPIC_API_KEY"),
            LlmProvider::OpenAI => Some("OPENAI_API_KEY"),
            LlmProvider::GigaChat => Some("GIGACHAT_AUTH_KEY"),
        }
    }
}

fn default_llm_timeout() -> u64 {
    60
}

fn default_gigachat_scope() -> String {
    "GIGACHAT_API_PERS".to_string()
}

/// Google Calendar configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CalendarConfig {
    /// Enable/disable calendar integration
    #[serde(default)]
    pub enabled: bool,

    /// OAuth access token (can also use `GOOGLE_CALENDAR_TOKEN`)
    pub access_token: Option<String>,

    /// Token file written by an external OAuth flow
    pub token_path: Option<PathBuf>,

    /// Calendar to read and write
    #[serde(default = "default_calendar_id")]
    pub calendar_id: String,

    /// IANA time zone attached to created events
    #[serde(default = "default_time_zone")]
    pub time_zone: String,

    /// Days of upcoming events fed into prompts
    #[serde(default = "default_preview_days")]
    pub preview_days: u32,

    /// HTTP request timeout in seconds
    #[serde(default = "default_calendar_timeout")]
    pub timeout_secs: u64,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            access_token: None,
            token_path: None,
            calendar_id: default_calendar_id(),
            time_zone: default_time_zone(),
            preview_days: default_preview_days(),
            timeout_secs: default_calendar_timeout(),
        }
    }
}

impl CalendarConfig {
    /// Resolve the access token from config, env var, or token file.
    pub fn resolve_access_token(&self) -> Result<String> {
        if let Some(token) = &self.access_token {
            return Ok(token.clone());
        }
        if let Ok(token) = std::env::var("GOOGLE_CALENDAR_TOKEN") {
            return Ok(token);
        }
        let path = self.token_path.as_ref().ok_or_else(|| {
            Error::Config(
                "calendar.access_token or calendar.token_path is required when calendar is enabled"
                    .to_string(),
            )
        })?;
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read token file {:?}: {}", path, e))
        })?;
        let token: StoredToken = serde_json::from_str(&content)?;
        Ok(token.token)
    }
}

/// Token file shape; both `token` and `access_token` are accepted.
#[derive(Debug, Deserialize)]
struct StoredToken {
    #[serde(alias = "access_token")]
    token: String,
}

fn default_calendar_id() -> String {
    "primary".to_string()
}

fn default_time_zone() -> String {
    "Europe/Moscow".to_string()
}

fn default_preview_days() -> u32 {
    5
}

fn default_calendar_timeout() -> u64 {
    30
}

/// Which extractors a chat turn runs
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    /// Context updates only
    Context,
    /// Calendar events only
    #[default]
    Calendar,
    /// Calendar events, then context updates
    Both,
}

impl ChatMode {
    pub fn uses_context(&self) -> bool {
        matches!(self, ChatMode::Context | ChatMode::Both)
    }

    pub fn uses_calendar(&self) -> bool {
        matches!(self, ChatMode::Calendar | ChatMode::Both)
    }
}

impl std::str::FromStr for ChatMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "context" => Ok(ChatMode::Context),
            "calendar" => Ok(ChatMode::Calendar),
            "both" => Ok(ChatMode::Both),
            _ => Err(format!("unknown chat mode: {}", s)),
        }
    }
}

/// Chat orchestration settings
#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    /// Which extractors run on each reply
    #[serde(default)]
    pub mode: ChatMode,

    /// Context record used by this single-user deployment
    #[serde(default = "default_context_id")]
    pub context_id: i64,

    /// Bound on the recent-actions log (0 disables the bound)
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            mode: ChatMode::default(),
            context_id: default_context_id(),
            recent_limit: default_recent_limit(),
        }
    }
}

fn default_context_id() -> i64 {
    1
}

fn default_recent_limit() -> usize {
    DEFAULT_RECENT_LIMIT
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/lifeforge/config.toml` (~/.config/lifeforge/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("lifeforge").join("config.toml")
    }

    /// Returns the data directory path (for SQLite database)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("lifeforge")
    }

    /// Returns the state directory path (for logs)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("lifeforge")
    }

    /// Returns the database file path
    ///
    /// `$XDG_DATA_HOME/lifeforge/data.db` (~/.local/share/lifeforge/data.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("data.db")
    }

    /// Returns the log file path
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("lifeforge.log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.llm.is_none());
        assert!(!config.calendar.enabled);
        assert_eq!(config.calendar.preview_days, 5);
        assert_eq!(config.calendar.time_zone, "Europe/Moscow");
        assert_eq!(config.chat.mode, ChatMode::Calendar);
        assert_eq!(config.chat.context_id, 1);
        assert_eq!(config.chat.recent_limit, 5);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[llm]
provider = "gigachat"
model = "GigaChat-Pro"

[calendar]
enabled = true
access_token = "ya29.test"
calendar_id = "work"

[chat]
mode = "both"
context_id = 7

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        let llm = config.llm.unwrap();
        assert_eq!(llm.provider, LlmProvider::GigaChat);
        assert_eq!(llm.model, "GigaChat-Pro");
        assert_eq!(llm.timeout_secs, 60);
        assert_eq!(llm.scope, "GIGACHAT_API_PERS");
        assert!(config.calendar.enabled);
        assert_eq!(config.calendar.calendar_id, "work");
        assert_eq!(
            config.calendar.resolve_access_token().unwrap(),
            "ya29.test"
        );
        assert_eq!(config.chat.mode, ChatMode::Both);
        assert_eq!(config.chat.context_id, 7);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_llm_provider_endpoints() {
        assert_eq!(
            LlmProvider::Ollama.default_endpoint(),
            "http://localhost:11434"
        );
        assert_eq!(LlmProvider::GigaChat.api_key_env(), Some("GIGACHAT_AUTH_KEY"));
        assert_eq!(LlmProvider::Ollama.api_key_env(), None);
    }

    #[test]
    fn test_chat_mode_flags() {
        assert!(ChatMode::Both.uses_context() && ChatMode::Both.uses_calendar());
        assert!(!ChatMode::Context.uses_calendar());
        assert!(!ChatMode::Calendar.uses_context());
        assert_eq!("both".parse::<ChatMode>(), Ok(ChatMode::Both));
        assert!("weekly".parse::<ChatMode>().is_err());
    }

    #[test]
    fn test_token_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, r#"{"access_token": "from-file", "refresh_token": "r"}"#).unwrap();

        let config = CalendarConfig {
            token_path: Some(path),
            ..Default::default()
        };
        // Env var would take precedence; only assert when it is unset.
        if std::env::var("GOOGLE_CALENDAR_TOKEN").is_err() {
            assert_eq!(config.resolve_access_token().unwrap(), "from-file");
        }
    }
}
