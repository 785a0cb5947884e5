pub mod config;
pub mod error;

pub use config::{Config, LlmConfig, ToolServerConfig};
pub use error::ConfigError;
