//! Application configuration

mod app_config;

pub use app_config::{
    AppConfig, CatalogConfig, ChatConfig, EngineConfig, LlmConfig, LlmProviderKind, LogFormat,
    LoggingConfig, ServerConfig, StoreBackend, StoreConfig,
};
