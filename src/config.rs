use anyhow::{Context, Result};
use concierge_core::calendar::CalendarDirectory;
use concierge_core::contact::{DEFAULT_SUMMARY_CHARS, DEFAULT_SUMMARY_TURNS};
use concierge_core::patterns::RuleSpec;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Minimum semantic confidence for a vector match to be accepted.
///
/// Tunable per deployment via `routing.confidence_threshold`.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.75;

/// Longest appointment accepted for `scheduling.duration_minutes`.
pub const MAX_DURATION_MINUTES: i64 = 24 * 60;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub calendars: CalendarDirectory,
    #[serde(default)]
    pub scheduling: SchedulingConfig,
    #[serde(default)]
    pub sessions: SessionConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RoutingConfig {
    #[serde(default = "default_threshold")]
    pub confidence_threshold: f32,
    #[serde(default)]
    pub index_dir: Option<PathBuf>,
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
    /// Replaces the built-in pattern table when non-empty.
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            index_dir: None,
            query_timeout_secs: default_query_timeout_secs(),
            rules: Vec::new(),
        }
    }
}

fn default_threshold() -> f32 {
    DEFAULT_CONFIDENCE_THRESHOLD
}
fn default_query_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            batch_size: 64,
            max_retries: 1,
            timeout_secs: 10,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    1
}
fn default_embedding_timeout_secs() -> u64 {
    10
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    /// Scheduling service base URL. Absent means offline mode.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_gateway_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_schedule_timeout_secs")]
    pub schedule_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: default_gateway_timeout_secs(),
            schedule_timeout_secs: default_schedule_timeout_secs(),
        }
    }
}

fn default_gateway_timeout_secs() -> u64 {
    10
}
fn default_schedule_timeout_secs() -> u64 {
    30
}

impl GatewayConfig {
    /// The configured URL, ignoring blank values.
    pub fn endpoint(&self) -> Option<&str> {
        self.url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulingConfig {
    #[serde(default = "default_hour")]
    pub default_hour: u32,
    #[serde(default = "default_duration_minutes")]
    pub duration_minutes: i64,
    #[serde(default = "default_summary_turns")]
    pub summary_turns: usize,
    #[serde(default = "default_summary_chars")]
    pub summary_chars: usize,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            default_hour: default_hour(),
            duration_minutes: default_duration_minutes(),
            summary_turns: default_summary_turns(),
            summary_chars: default_summary_chars(),
        }
    }
}

fn default_hour() -> u32 {
    14
}
fn default_duration_minutes() -> i64 {
    30
}
fn default_summary_turns() -> usize {
    DEFAULT_SUMMARY_TURNS
}
fn default_summary_chars() -> usize {
    DEFAULT_SUMMARY_CHARS
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    #[serde(default = "default_idle_ttl_secs")]
    pub idle_ttl_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            max_sessions: default_max_sessions(),
            idle_ttl_secs: default_idle_ttl_secs(),
        }
    }
}

fn default_max_turns() -> usize {
    50
}
fn default_max_sessions() -> usize {
    1000
}
fn default_idle_ttl_secs() -> u64 {
    60 * 60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate routing
    if !(0.0..=1.0).contains(&config.routing.confidence_threshold) {
        anyhow::bail!("routing.confidence_threshold must be in [0.0, 1.0]");
    }
    if config.routing.query_timeout_secs == 0 {
        anyhow::bail!("routing.query_timeout_secs must be > 0");
    }

    // Validate embedding
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    // Validate gateway
    if config.gateway.timeout_secs == 0 || config.gateway.schedule_timeout_secs == 0 {
        anyhow::bail!("gateway timeouts must be > 0");
    }
    if let Some(url) = config.gateway.endpoint() {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            anyhow::bail!("gateway.url must start with http:// or https://, got '{}'", url);
        }
    }

    // Validate scheduling
    if config.scheduling.default_hour > 23 {
        anyhow::bail!("scheduling.default_hour must be in 0..=23");
    }
    if !(1..=MAX_DURATION_MINUTES).contains(&config.scheduling.duration_minutes) {
        anyhow::bail!(
            "scheduling.duration_minutes must be in 1..={}",
            MAX_DURATION_MINUTES
        );
    }

    if config.sessions.max_turns == 0 {
        anyhow::bail!("sessions.max_turns must be > 0");
    }
    if config.sessions.max_sessions == 0 || config.sessions.idle_ttl_secs == 0 {
        anyhow::bail!("sessions.max_sessions and sessions.idle_ttl_secs must be > 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(
            config.routing.confidence_threshold,
            DEFAULT_CONFIDENCE_THRESHOLD
        );
        assert!(config.gateway.endpoint().is_none());
        assert_eq!(config.gateway.schedule_timeout_secs, 30);
        assert_eq!(config.scheduling.default_hour, 14);
        assert_eq!(config.logging.format, LogFormat::Compact);
        assert!(!config.embedding.is_enabled());
    }

    #[test]
    fn test_full_config() {
        let config = parse_config(
            r#"
[routing]
confidence_threshold = 0.8
index_dir = "./indexes"

[[routing.rules]]
keywords = ["ring"]
category = "products"
url = "https://example.com/rings"

[embedding]
provider = "openai"
model = "text-embedding-3-small"
dims = 1536

[gateway]
url = "http://localhost:8000"
schedule_timeout_secs = 20

[calendars]
appraisal = "cal-appraisal"

[logging]
level = "debug"
format = "json"
"#,
        )
        .unwrap();
        assert_eq!(config.routing.rules.len(), 1);
        assert_eq!(config.gateway.endpoint(), Some("http://localhost:8000"));
        assert_eq!(config.calendars.appraisal, "cal-appraisal");
        assert_eq!(config.calendars.demo, CalendarDirectory::default().demo);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_blank_gateway_url_is_offline() {
        let config = parse_config("[gateway]\nurl = \"  \"\n").unwrap();
        assert!(config.gateway.endpoint().is_none());
    }

    #[test]
    fn test_validation_errors() {
        assert!(parse_config("[routing]\nconfidence_threshold = 1.5\n").is_err());
        assert!(parse_config("[embedding]\nprovider = \"openai\"\n").is_err());
        assert!(parse_config("[embedding]\nprovider = \"magic\"\n").is_err());
        assert!(parse_config("[gateway]\nurl = \"localhost:8000\"\n").is_err());
        assert!(parse_config("[scheduling]\ndefault_hour = 24\n").is_err());
        assert!(parse_config("[scheduling]\nduration_minutes = 0\n").is_err());
        assert!(parse_config("[scheduling]\nduration_minutes = 200000000000\n").is_err());
        assert!(parse_config("[scheduling]\nduration_minutes = 1440\n").is_ok());
        assert!(parse_config("[sessions]\nmax_sessions = 0\n").is_err());
    }
}
