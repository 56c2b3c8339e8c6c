//! 应用文件存储类型定义

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::path_guard::PathError;

/// 文件记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    /// 所属应用 ID
    pub app_id: String,
    /// 规范路径（前导 `/`，正斜杠）
    pub path: String,
    /// 文件内容
    pub content: String,
    /// 内容字节数
    pub size: u64,
    /// 更新时间（Unix 时间戳，毫秒）
    pub updated_at: i64,
}

/// 文件元数据（用于列表显示）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMeta {
    pub path: String,
    pub size: u64,
    pub updated_at: i64,
}

/// 写入结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteOutcome {
    pub meta: FileMeta,
    /// 是否为新建文件
    pub created: bool,
}

/// 应用文件统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppFileStats {
    pub file_count: u32,
    pub total_size: u64,
}

/// 存储错误
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Path(#[from] PathError),
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("app not found: {0}")]
    AppNotFound(String),
    #[error("destination already exists: {0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("database lock poisoned")]
    LockPoisoned,
}
