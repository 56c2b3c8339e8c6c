use crate::models::ChatSession;
use rusqlite::{params, Connection, OptionalExtension, Row};

pub struct ChatSessionDao;

impl ChatSessionDao {
    pub fn insert(conn: &Connection, session: &ChatSession) -> Result<(), rusqlite::Error> {
        conn.execute(
            "INSERT INTO chat_sessions (id, app_id, owner_user_id, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                session.id,
                session.app_id,
                session.owner_user_id,
                session.created_at
            ],
        )?;
        Ok(())
    }

    pub fn get(conn: &Connection, id: &str) -> Result<Option<ChatSession>, rusqlite::Error> {
        conn.query_row(
            "SELECT id, app_id, owner_user_id, created_at FROM chat_sessions WHERE id = ?1",
            params![id],
            Self::map_row,
        )
        .optional()
    }

    pub fn list_by_app(conn: &Connection, app_id: &str) -> Result<Vec<ChatSession>, rusqlite::Error> {
        let mut stmt = conn.prepare(
            "SELECT id, app_id, owner_user_id, created_at FROM chat_sessions
             WHERE app_id = ?1 ORDER BY created_at ASC",
        )?;
        let sessions = stmt
            .query_map(params![app_id], Self::map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    fn map_row(row: &Row<'_>) -> Result<ChatSession, rusqlite::Error> {
        Ok(ChatSession {
            id: row.get(0)?,
            app_id: row.get(1)?,
            owner_user_id: row.get(2)?,
            created_at: row.get(3)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::dao::AppDao;
    use crate::database::schema::create_tables;
    use crate::models::App;

    #[test]
    fn test_session_belongs_to_app() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        let app = App::new("blog", "user-1");
        AppDao::insert(&conn, &app).unwrap();

        let session = ChatSession::new(&app.id, "user-1");
        ChatSessionDao::insert(&conn, &session).unwrap();

        let loaded = ChatSessionDao::get(&conn, &session.id).unwrap().unwrap();
        assert!(loaded.is_owned_by("user-1"));
        assert!(!loaded.is_owned_by("user-2"));
        assert_eq!(ChatSessionDao::list_by_app(&conn, &app.id).unwrap().len(), 1);

        AppDao::delete(&conn, &app.id).unwrap();
        assert!(ChatSessionDao::get(&conn, &session.id).unwrap().is_none());
    }

    #[test]
    fn test_insert_requires_existing_app() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        let session = ChatSession::new("missing-app", "user-1");
        assert!(ChatSessionDao::insert(&conn, &session).is_err());
    }
}
