//! 应用文件存储服务
//!
//! 以 (应用 ID, 规范路径) 为键的内容存储。每个操作都在单个 SQLite 事务中完成，
//! 重命名和导入要么整体生效，要么不留任何痕迹。

use std::collections::BTreeMap;

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Transaction};

use super::path_guard;
use super::types::{AppFileStats, FileMeta, FileRecord, StoreError, WriteOutcome};
use crate::database::DbConnection;

/// 应用文件的沙箱根目录
const APP_ROOT: &str = "/";

/// 将调用方给出的文件路径规范化
///
/// 单个前导 `/` 表示应用根目录，其余部分按相对路径在根目录下解析。
/// 解析结果为根目录本身时视为无效（文件路径必须指向文件）。
pub fn canonical_file_path(path: &str) -> Result<String, StoreError> {
    if path.trim().is_empty() {
        return Err(StoreError::Validation("path is required".to_string()));
    }
    let relative = path.strip_prefix('/').unwrap_or(path);
    let resolved = path_guard::resolve(APP_ROOT, &[relative])?;
    if resolved == APP_ROOT {
        return Err(StoreError::Validation(format!(
            "path does not name a file: {}",
            path
        )));
    }
    Ok(resolved)
}

/// 应用文件存储服务
pub struct AppFileStore {
    db: DbConnection,
}

impl AppFileStore {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    fn with_tx<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut conn = self.db.lock().map_err(|_| StoreError::LockPoisoned)?;
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    // ========================================================================
    // 文件操作
    // ========================================================================

    /// 创建或覆盖文件
    ///
    /// 内容相同时仍然视为一次写入，会刷新更新时间。
    pub fn write(&self, app_id: &str, path: &str, content: &str) -> Result<WriteOutcome, StoreError> {
        let path = canonical_file_path(path)?;
        let now = Utc::now().timestamp_millis();
        let size = content.len() as u64;

        let created = self.with_tx(|tx| {
            ensure_app(tx, app_id)?;
            let existed = file_exists(tx, app_id, &path)?;
            tx.execute(
                "INSERT INTO app_files (app_id, path, content, size, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(app_id, path) DO UPDATE SET
                    content = excluded.content,
                    size = excluded.size,
                    updated_at = excluded.updated_at",
                params![app_id, path, content, size as i64, now],
            )?;
            Ok(!existed)
        })?;

        tracing::debug!(
            "[AppFileStore] 写入文件: app={} path={} size={} created={}",
            app_id,
            path,
            size,
            created
        );

        Ok(WriteOutcome {
            meta: FileMeta {
                path,
                size,
                updated_at: now,
            },
            created,
        })
    }

    /// 读取文件内容
    pub fn read(&self, app_id: &str, path: &str) -> Result<String, StoreError> {
        self.get(app_id, path).map(|record| record.content)
    }

    /// 读取完整的文件记录
    pub fn get(&self, app_id: &str, path: &str) -> Result<FileRecord, StoreError> {
        let path = canonical_file_path(path)?;
        let conn = self.db.lock().map_err(|_| StoreError::LockPoisoned)?;
        let record = conn
            .query_row(
                "SELECT content, size, updated_at FROM app_files WHERE app_id = ?1 AND path = ?2",
                params![app_id, path],
                |row| {
                    Ok(FileRecord {
                        app_id: app_id.to_string(),
                        path: path.clone(),
                        content: row.get(0)?,
                        size: row.get::<_, i64>(1)? as u64,
                        updated_at: row.get(2)?,
                    })
                },
            )
            .optional()?;
        record.ok_or(StoreError::NotFound(path))
    }

    /// 删除文件
    pub fn delete(&self, app_id: &str, path: &str) -> Result<(), StoreError> {
        let path = canonical_file_path(path)?;
        self.with_tx(|tx| {
            let affected = tx.execute(
                "DELETE FROM app_files WHERE app_id = ?1 AND path = ?2",
                params![app_id, path],
            )?;
            if affected == 0 {
                return Err(StoreError::NotFound(path.clone()));
            }
            Ok(())
        })?;
        tracing::debug!("[AppFileStore] 删除文件: app={} path={}", app_id, path);
        Ok(())
    }

    /// 重命名文件
    ///
    /// 目标路径已存在时返回 `Conflict`（包括目标与源相同），不会覆盖。
    /// 只有路径发生变化，内容、大小和更新时间保持不变。
    pub fn rename(&self, app_id: &str, from: &str, to: &str) -> Result<FileMeta, StoreError> {
        let from = canonical_file_path(from)?;
        let to = canonical_file_path(to)?;

        let meta = self.with_tx(|tx| {
            let source: Option<(i64, i64)> = tx
                .query_row(
                    "SELECT size, updated_at FROM app_files WHERE app_id = ?1 AND path = ?2",
                    params![app_id, from],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let Some((size, updated_at)) = source else {
                return Err(StoreError::NotFound(from.clone()));
            };
            if file_exists(tx, app_id, &to)? {
                return Err(StoreError::Conflict(to.clone()));
            }
            tx.execute(
                "UPDATE app_files SET path = ?3 WHERE app_id = ?1 AND path = ?2",
                params![app_id, from, to],
            )?;
            Ok(FileMeta {
                path: to.clone(),
                size: size as u64,
                updated_at,
            })
        })?;

        tracing::info!(
            "[AppFileStore] 重命名文件: app={} {} -> {}",
            app_id,
            from,
            to
        );
        Ok(meta)
    }

    /// 列出应用中的所有文件（按路径排序）
    pub fn list(&self, app_id: &str) -> Result<Vec<FileMeta>, StoreError> {
        let conn = self.db.lock().map_err(|_| StoreError::LockPoisoned)?;
        let mut stmt = conn.prepare(
            "SELECT path, size, updated_at FROM app_files WHERE app_id = ?1 ORDER BY path ASC",
        )?;
        let files = stmt
            .query_map(params![app_id], |row| {
                Ok(FileMeta {
                    path: row.get(0)?,
                    size: row.get::<_, i64>(1)? as u64,
                    updated_at: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(files)
    }

    /// 导出应用的完整文件集（路径 -> 内容）
    pub fn export(&self, app_id: &str) -> Result<BTreeMap<String, String>, StoreError> {
        let conn = self.db.lock().map_err(|_| StoreError::LockPoisoned)?;
        let mut stmt =
            conn.prepare("SELECT path, content FROM app_files WHERE app_id = ?1 ORDER BY path")?;
        let files = stmt
            .query_map(params![app_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<BTreeMap<String, String>, _>>()?;
        Ok(files)
    }

    /// 用 `files` 整体替换应用的文件集
    ///
    /// 所有路径先校验再写入；删除与插入在同一事务中完成，
    /// 任一步失败都会回滚，原有文件集保持不变。
    pub fn import(
        &self,
        app_id: &str,
        files: &BTreeMap<String, String>,
    ) -> Result<Vec<FileMeta>, StoreError> {
        let mut canonical: BTreeMap<String, &str> = BTreeMap::new();
        for (path, content) in files {
            let resolved = canonical_file_path(path)?;
            if canonical.insert(resolved.clone(), content.as_str()).is_some() {
                return Err(StoreError::Validation(format!(
                    "duplicate path after normalization: {}",
                    resolved
                )));
            }
        }

        let now = Utc::now().timestamp_millis();
        let imported = self.with_tx(|tx| {
            ensure_app(tx, app_id)?;
            tx.execute("DELETE FROM app_files WHERE app_id = ?1", params![app_id])?;

            let mut stmt = tx.prepare(
                "INSERT INTO app_files (app_id, path, content, size, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            let mut metas = Vec::with_capacity(canonical.len());
            for (path, content) in &canonical {
                let size = content.len() as u64;
                stmt.execute(params![app_id, path, content, size as i64, now])?;
                metas.push(FileMeta {
                    path: path.clone(),
                    size,
                    updated_at: now,
                });
            }
            Ok(metas)
        })?;

        tracing::info!(
            "[AppFileStore] 导入文件集: app={} files={}",
            app_id,
            imported.len()
        );
        Ok(imported)
    }

    /// 文件数量与总大小
    pub fn stats(&self, app_id: &str) -> Result<AppFileStats, StoreError> {
        let conn = self.db.lock().map_err(|_| StoreError::LockPoisoned)?;
        let (count, total): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(size), 0) FROM app_files WHERE app_id = ?1",
            params![app_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(AppFileStats {
            file_count: count as u32,
            total_size: total as u64,
        })
    }
}

// ============================================================================
// 辅助函数
// ============================================================================

fn ensure_app(tx: &Transaction<'_>, app_id: &str) -> Result<(), StoreError> {
    let found: Option<i64> = tx
        .query_row("SELECT 1 FROM apps WHERE id = ?1", params![app_id], |row| {
            row.get(0)
        })
        .optional()?;
    match found {
        Some(_) => Ok(()),
        None => Err(StoreError::AppNotFound(app_id.to_string())),
    }
}

fn file_exists(tx: &Transaction<'_>, app_id: &str, path: &str) -> Result<bool, StoreError> {
    let found: Option<i64> = tx
        .query_row(
            "SELECT 1 FROM app_files WHERE app_id = ?1 AND path = ?2",
            params![app_id, path],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}
