//! 配置管理模块
//!
//! 提供 YAML 配置文件支持，缺省字段使用默认值。

mod types;
mod yaml;

pub use types::{
    AuthConfig, Config, DatabaseConfig, LoggingConfig, ServerConfig, StreamingConfig, TokenEntry,
};
pub use yaml::{default_config_path, load_config, parse_config, save_config, ConfigError, CONFIG_ENV};
