//! 基础设施层 - 配置加载

pub mod config;

pub use config::{EngineConfig, LoggingConfig};
