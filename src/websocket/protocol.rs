//! WebSocket 消息协议
//!
//! 所有帧都是 `{"type": ..., "data": ...}` 形式的 JSON 对象。

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::generation::GeneratedFile;

/// 协议错误，`Display` 文本会原样发给客户端
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Invalid message format")]
    InvalidFormat,
    #[error("Unknown message type: {0}")]
    UnknownType(String),
    #[error("Invalid {frame_type} payload")]
    InvalidPayload { frame_type: String },
}

/// 尚未区分类型的原始帧
#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    frame_type: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// `chat_message` 负载
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageData {
    #[serde(alias = "message")]
    pub content: String,
    #[serde(default)]
    pub context: serde_json::Value,
}

/// `stream_request` 负载
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamRequestData {
    #[serde(alias = "content")]
    pub prompt: String,
    #[serde(default)]
    pub context: serde_json::Value,
}

/// 客户端发来的帧
///
/// 生成类请求只在这里确定类型，负载留到会话作用域检查通过后再解码。
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Ping,
    ChatMessage(serde_json::Value),
    StreamRequest(serde_json::Value),
}

impl InboundFrame {
    pub const PING: &'static str = "ping";
    pub const CHAT_MESSAGE: &'static str = "chat_message";
    pub const STREAM_REQUEST: &'static str = "stream_request";

    /// 解析一条文本帧
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let raw: RawFrame = serde_json::from_str(text).map_err(|_| ProtocolError::InvalidFormat)?;
        match raw.frame_type.as_str() {
            Self::PING => Ok(Self::Ping),
            Self::CHAT_MESSAGE => Ok(Self::ChatMessage(raw.data)),
            Self::STREAM_REQUEST => Ok(Self::StreamRequest(raw.data)),
            other => Err(ProtocolError::UnknownType(other.to_string())),
        }
    }
}

impl ChatMessageData {
    pub fn decode(data: serde_json::Value) -> Result<Self, ProtocolError> {
        decode_payload(InboundFrame::CHAT_MESSAGE, data)
    }
}

impl StreamRequestData {
    pub fn decode(data: serde_json::Value) -> Result<Self, ProtocolError> {
        decode_payload(InboundFrame::STREAM_REQUEST, data)
    }
}

fn decode_payload<T: serde::de::DeserializeOwned>(
    frame_type: &str,
    data: serde_json::Value,
) -> Result<T, ProtocolError> {
    serde_json::from_value(data).map_err(|_| ProtocolError::InvalidPayload {
        frame_type: frame_type.to_string(),
    })
}

/// `connected` 负载
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedData {
    pub connection_id: String,
    pub user_id: String,
    pub chat_id: Option<String>,
    pub timestamp: i64,
}

/// 流式分块负载（`stream_chunk` / `code_stream`）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkData {
    pub message_id: String,
    pub content: String,
    pub done: bool,
}

/// `stream_complete` 负载，`content` 为全部分块按序拼接的完整文本
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamCompleteData {
    pub message_id: String,
    pub content: String,
    pub done: bool,
}

/// `code_complete` 负载
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeCompleteData {
    pub message_id: String,
    pub code: String,
    pub files: Vec<GeneratedFile>,
    pub done: bool,
}

/// 服务端发出的帧
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum OutboundFrame {
    Connected(ConnectedData),
    Pong { timestamp: i64 },
    Error { message: String },
    StreamChunk(ChunkData),
    StreamComplete(StreamCompleteData),
    CodeStream(ChunkData),
    CodeComplete(CodeCompleteData),
}

impl OutboundFrame {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn pong() -> Self {
        Self::Pong {
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn to_json(&self) -> String {
        // 所有字段都是可序列化的普通数据
        serde_json::to_string(self).unwrap_or_default()
    }

    /// 终止帧（`stream_complete` / `code_complete`）所属的消息 ID
    pub fn terminal_message_id(&self) -> Option<&str> {
        match self {
            Self::StreamComplete(data) => Some(&data.message_id),
            Self::CodeComplete(data) => Some(&data.message_id),
            _ => None,
        }
    }
}
