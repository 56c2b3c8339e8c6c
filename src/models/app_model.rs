use serde::{Deserialize, Serialize};

/// 应用（文件与聊天会话的容器）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct App {
    pub id: String,
    pub name: String,
    pub owner_user_id: String,
    pub created_at: i64,
}

impl App {
    pub fn new(name: impl Into<String>, owner_user_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            owner_user_id: owner_user_id.into(),
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// 聊天会话，绑定到一个应用和一个所属用户
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: String,
    pub app_id: String,
    pub owner_user_id: String,
    pub created_at: i64,
}

impl ChatSession {
    pub fn new(app_id: impl Into<String>, owner_user_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            app_id: app_id.into(),
            owner_user_id: owner_user_id.into(),
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.owner_user_id == user_id
    }
}
