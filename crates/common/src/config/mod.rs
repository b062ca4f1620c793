//! Configuration management for Versegate services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Default values

use crate::resources::{ResourceKind, ResourcePreferences};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Upstream resource providers
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Streaming chat backend
    #[serde(default)]
    pub chat: ChatConfig,

    /// Default resource preferences
    #[serde(default)]
    pub preferences: PreferencesConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Largest request body accepted
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProvidersConfig {
    /// Base URL of the resource service
    #[serde(default = "default_provider_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,

    /// User agent sent with every provider request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_scripture_endpoint")]
    pub scripture_endpoint: String,

    #[serde(default = "default_notes_endpoint")]
    pub notes_endpoint: String,

    #[serde(default = "default_questions_endpoint")]
    pub questions_endpoint: String,

    #[serde(default = "default_words_endpoint")]
    pub words_endpoint: String,

    #[serde(default = "default_articles_endpoint")]
    pub articles_endpoint: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatConfig {
    /// Streaming chat endpoint of the conversational backend
    #[serde(default = "default_chat_url")]
    pub url: String,

    /// Connect timeout in seconds; the body itself is read without a deadline
    #[serde(default = "default_chat_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Conversations idle this long are forgotten
    #[serde(default = "default_session_idle")]
    pub session_idle_secs: u64,

    /// Upper bound on conversations held in memory
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Longest stream frame accepted before the turn errors
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PreferencesConfig {
    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default = "default_organization")]
    pub organization: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name reported in logs
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second (global)
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 30 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_max_body_bytes() -> usize { 256 * 1024 }
fn default_provider_base_url() -> String { "http://localhost:8787".to_string() }
fn default_provider_timeout() -> u64 { 15 }
fn default_user_agent() -> String { format!("versegate/{}", crate::VERSION) }
fn default_scripture_endpoint() -> String { "/api/fetch-scripture".to_string() }
fn default_notes_endpoint() -> String { "/api/translation-notes".to_string() }
fn default_questions_endpoint() -> String { "/api/translation-questions".to_string() }
fn default_words_endpoint() -> String { "/api/translation-words".to_string() }
fn default_articles_endpoint() -> String { "/api/translation-academy".to_string() }
fn default_chat_url() -> String { "http://localhost:8787/api/chat-stream".to_string() }
fn default_chat_connect_timeout() -> u64 { 10 }
fn default_session_idle() -> u64 { 30 * 60 }
fn default_max_sessions() -> usize { 10_000 }
fn default_max_line_bytes() -> usize { crate::stream::DEFAULT_MAX_LINE_BYTES }
fn default_language() -> String { "en".to_string() }
fn default_organization() -> String { "unfoldingWord".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "versegate".to_string() }
fn default_rate_limit() -> u32 { 50 }
fn default_burst() -> u32 { 100 }
fn default_enabled() -> bool { true }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // e.g., APP__PROVIDERS__BASE_URL=https://resources.example.org
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    /// Preferences applied when a request does not carry its own
    pub fn default_preferences(&self) -> ResourcePreferences {
        ResourcePreferences {
            language: self.preferences.language.clone(),
            organization: self.preferences.organization.clone(),
            resource: None,
        }
    }
}

impl ChatConfig {
    pub fn session_idle(&self) -> Duration {
        Duration::from_secs(self.session_idle_secs)
    }
}

impl ProvidersConfig {
    /// Endpoint path for a resource kind
    pub fn endpoint(&self, kind: ResourceKind) -> &str {
        match kind {
            ResourceKind::Scripture => &self.scripture_endpoint,
            ResourceKind::Notes => &self.notes_endpoint,
            ResourceKind::Questions => &self.questions_endpoint,
            ResourceKind::Words => &self.words_endpoint,
            ResourceKind::Articles => &self.articles_endpoint,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            base_url: default_provider_base_url(),
            timeout_secs: default_provider_timeout(),
            user_agent: default_user_agent(),
            scripture_endpoint: default_scripture_endpoint(),
            notes_endpoint: default_notes_endpoint(),
            questions_endpoint: default_questions_endpoint(),
            words_endpoint: default_words_endpoint(),
            articles_endpoint: default_articles_endpoint(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            url: default_chat_url(),
            connect_timeout_secs: default_chat_connect_timeout(),
            session_idle_secs: default_session_idle(),
            max_sessions: default_max_sessions(),
            max_line_bytes: default_max_line_bytes(),
        }
    }
}

impl Default for PreferencesConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
            organization: default_organization(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            providers: ProvidersConfig::default(),
            chat: ChatConfig::default(),
            preferences: PreferencesConfig::default(),
            observability: ObservabilityConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}
