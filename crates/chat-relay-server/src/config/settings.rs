use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub history: HistoryConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LlmConfig {
    /// Full chat-completions endpoint URL.
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_seconds: u64,
    pub max_tokens: usize,
    pub temperature: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HistoryConfig {
    /// Zero or negative disables trimming.
    pub max_exchanges: i64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    Redis,
    Memory,
    None,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CacheConfig {
    pub backend: CacheBackendKind,
    pub redis_url: String,
    pub pool_max: usize,
    pub ttl_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    /// When set, logs also go to a daily-rolling file in this directory.
    #[serde(default)]
    pub directory: Option<String>,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let legacy: HashMap<String, String> = std::env::vars().collect();
        Self::from_sources(app_environment(), &legacy)
    }

    /// Build settings from defaults, the optional settings file, an
    /// `APP_*` environment source and the flat legacy variables.
    pub fn from_sources(
        environment: Environment,
        legacy: &HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8000)?
            .set_default(
                "llm.base_url",
                "https://api.groq.com/openai/v1/chat/completions",
            )?
            .set_default("llm.api_key", "")?
            .set_default("llm.model", "llama-3.1-8b-instant")?
            .set_default("llm.timeout_seconds", 60)?
            .set_default("llm.max_tokens", 1024)?
            .set_default("llm.temperature", 0.7)?
            .set_default("history.max_exchanges", 20)?
            .set_default("cache.backend", "redis")?
            .set_default("cache.redis_url", "redis://localhost:6379")?
            .set_default("cache.pool_max", 8)?
            .set_default("cache.ttl_seconds", 24 * 60 * 60)?
            .set_default("logging.level", "info,chat_relay_server=debug")?
            .set_default("logging.format", "json")?
            .add_source(File::with_name("config/settings").required(false))
            .add_source(environment);

        builder = apply_legacy_overrides(builder, legacy)?;

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.llm.api_key.trim().is_empty() {
            return Err(ConfigError::Message(
                "llm.api_key is required (set GROQ_API_KEY or APP_LLM__API_KEY)".to_string(),
            ));
        }
        if self.llm.timeout_seconds == 0 {
            return Err(ConfigError::Message(
                "llm.timeout_seconds must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// `APP_` prefix, `__` between nested keys: `APP_LLM__MODEL` -> `llm.model`.
pub fn app_environment() -> Environment {
    Environment::with_prefix("APP")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

type Builder = config::ConfigBuilder<config::builder::DefaultState>;

/// Flat variable names understood for compatibility with older deployments.
const LEGACY_KEYS: &[(&str, &str)] = &[
    ("PORT", "server.port"),
    ("GROQ_API_KEY", "llm.api_key"),
    ("GROQ_BASE_URL", "llm.base_url"),
    ("MODEL", "llm.model"),
    ("MAX_TOKENS", "llm.max_tokens"),
    ("MAX_EXCHANGES", "history.max_exchanges"),
];

fn apply_legacy_overrides(
    mut builder: Builder,
    vars: &HashMap<String, String>,
) -> Result<Builder, ConfigError> {
    let lookup = |name: &str| vars.get(name).filter(|v| !v.is_empty()).cloned();

    for (var, key) in LEGACY_KEYS {
        builder = builder.set_override_option(*key, lookup(*var))?;
    }

    if let Some(addr) = lookup("REDIS_ADDR") {
        let url = match lookup("REDIS_PASSWORD") {
            Some(password) => format!("redis://:{}@{}", password, addr),
            None => format!("redis://{}", addr),
        };
        builder = builder.set_override("cache.redis_url", url)?;
    }

    Ok(builder)
}
