use crate::models::App;
use rusqlite::{params, Connection, OptionalExtension, Row};

pub struct AppDao;

impl AppDao {
    pub fn insert(conn: &Connection, app: &App) -> Result<(), rusqlite::Error> {
        conn.execute(
            "INSERT INTO apps (id, name, owner_user_id, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![app.id, app.name, app.owner_user_id, app.created_at],
        )?;
        Ok(())
    }

    pub fn get(conn: &Connection, id: &str) -> Result<Option<App>, rusqlite::Error> {
        conn.query_row(
            "SELECT id, name, owner_user_id, created_at FROM apps WHERE id = ?1",
            params![id],
            Self::map_row,
        )
        .optional()
    }

    pub fn list_by_owner(conn: &Connection, owner_user_id: &str) -> Result<Vec<App>, rusqlite::Error> {
        let mut stmt = conn.prepare(
            "SELECT id, name, owner_user_id, created_at FROM apps
             WHERE owner_user_id = ?1 ORDER BY created_at DESC",
        )?;
        let apps = stmt
            .query_map(params![owner_user_id], Self::map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(apps)
    }

    /// 删除应用，文件和聊天会话通过外键级联删除
    pub fn delete(conn: &Connection, id: &str) -> Result<bool, rusqlite::Error> {
        let affected = conn.execute("DELETE FROM apps WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }

    fn map_row(row: &Row<'_>) -> Result<App, rusqlite::Error> {
        Ok(App {
            id: row.get(0)?,
            name: row.get(1)?,
            owner_user_id: row.get(2)?,
            created_at: row.get(3)?,
        })
    }
}
