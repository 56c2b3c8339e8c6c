//! YAML 配置文件读写

use super::types::Config;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 配置文件路径环境变量
pub const CONFIG_ENV: &str = "APPCRAFT_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("无法读取配置文件 {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("无法写入配置文件 {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("配置文件格式错误: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("无效配置: {0}")]
    Invalid(String),
}

/// 默认配置文件路径：`$APPCRAFT_CONFIG`，否则 `~/.appcraft/config.yaml`
pub fn default_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    dirs::home_dir().map(|home| home.join(".appcraft").join("config.yaml"))
}

/// 加载配置，文件不存在时返回默认配置
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        tracing::info!("[Config] 配置文件不存在，使用默认配置: {:?}", path);
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_config(&content)?;
    tracing::info!("[Config] 已加载配置: {:?}", path);
    Ok(config)
}

/// 解析 YAML 配置并校验
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = if content.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml::from_str(content)?
    };
    validate(&config)?;
    Ok(config)
}

/// 保存配置到 YAML 文件
pub fn save_config(config: &Config, path: &Path) -> Result<(), ConfigError> {
    validate(config)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let content = serde_yaml::to_string(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.streaming.chunk_chars == 0 {
        return Err(ConfigError::Invalid(
            "streaming.chunkChars must be greater than 0".to_string(),
        ));
    }
    if config.server.max_connections == 0 {
        return Err(ConfigError::Invalid(
            "server.maxConnections must be greater than 0".to_string(),
        ));
    }
    for entry in &config.auth.tokens {
        if entry.token.is_empty() || entry.user_id.is_empty() {
            return Err(ConfigError::Invalid(
                "auth.tokens entries need both token and userId".to_string(),
            ));
        }
    }
    Ok(())
}
