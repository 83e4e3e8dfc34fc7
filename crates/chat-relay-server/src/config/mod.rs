pub mod settings;

pub use settings::{
    CacheBackendKind, CacheConfig, HistoryConfig, LlmConfig, LogFormat, LoggingConfig,
    ServerConfig, Settings,
};
