//! 生成服务接口
//!
//! 模型如何产生文本不在本服务职责内。流式会话只要求在切分前拿到完整结果：
//! 聊天回复是一段文本，代码生成是代码文本加上派生出的文件清单。

mod manifest;
mod template;

pub use manifest::{derive_file_manifest, detect_language, GeneratedFile};
pub use template::TemplateGenerator;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 生成上下文
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationContext {
    pub user_id: String,
    pub chat_id: Option<String>,
    pub app_id: Option<String>,
    /// 客户端附带的额外上下文（原样透传）
    #[serde(default)]
    pub extra: serde_json::Value,
}

/// 代码生成结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedCode {
    pub code: String,
    pub files: Vec<GeneratedFile>,
}

impl GeneratedCode {
    /// 由代码文本构造结果，文件清单从文本中派生
    pub fn from_code(code: impl Into<String>) -> Self {
        let code = code.into();
        let files = derive_file_manifest(&code);
        Self { code, files }
    }
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("prompt is empty")]
    EmptyPrompt,
    #[error("generation backend failed: {0}")]
    Backend(String),
}

/// 生成服务
#[async_trait]
pub trait Generator: Send + Sync {
    /// 生成聊天回复
    async fn chat(&self, prompt: &str, ctx: &GenerationContext) -> Result<String, GenerationError>;

    /// 生成代码及文件清单
    async fn code(
        &self,
        prompt: &str,
        ctx: &GenerationContext,
    ) -> Result<GeneratedCode, GenerationError>;
}
