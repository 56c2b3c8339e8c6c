//! SQLite 持久化
//!
//! 应用、应用文件和聊天会话都保存在同一个数据库中。

pub mod dao;
pub mod schema;

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub type DbConnection = Arc<Mutex<Connection>>;

/// 打开（或创建）数据库文件并初始化表结构
pub fn init_database(path: &Path) -> Result<DbConnection, rusqlite::Error> {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!("[DB] 创建数据库目录失败: {:?}: {}", parent, e);
        }
    }
    let conn = Connection::open(path)?;
    schema::create_tables(&conn)?;
    tracing::info!("[DB] 数据库已初始化: {:?}", path);
    Ok(Arc::new(Mutex::new(conn)))
}

/// 内存数据库，用于测试和临时运行
pub fn open_in_memory() -> Result<DbConnection, rusqlite::Error> {
    let conn = Connection::open_in_memory()?;
    schema::create_tables(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}
