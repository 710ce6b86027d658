// Configuration management module
// TOML settings for the model server, chunking, retrieval, sessions and HTTP

pub mod settings;

pub use settings::{
    Config, ConfigError, OllamaConfig, PromptConfig, RetrievalConfig, ServerConfig,
    SessionConfig,
};
