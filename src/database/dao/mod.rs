pub mod apps;
pub mod chat_sessions;

pub use apps::AppDao;
pub use chat_sessions::ChatSessionDao;
