//! 单个已认证连接的内存状态
//!
//! 握手成功时创建，连接关闭时销毁。每个连接同一时间最多只有一个活动的流式会话。

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::protocol::OutboundFrame;
use crate::models::ChatSession;

/// 出站帧的接收端
pub trait FrameSink: Send + Sync {
    /// 发送一帧，连接已关闭时返回 false
    fn send_frame(&self, frame: OutboundFrame) -> bool;
}

impl FrameSink for mpsc::UnboundedSender<OutboundFrame> {
    fn send_frame(&self, frame: OutboundFrame) -> bool {
        self.send(frame).is_ok()
    }
}

struct ActiveStream {
    message_id: String,
    cancel: CancellationToken,
}

pub struct ConnectionState {
    pub conn_id: String,
    pub user_id: String,
    pub chat: Option<ChatSession>,
    pub connected_at: i64,
    tx: mpsc::UnboundedSender<OutboundFrame>,
    active_stream: Mutex<Option<ActiveStream>>,
}

impl ConnectionState {
    pub fn new(
        conn_id: impl Into<String>,
        user_id: impl Into<String>,
        chat: Option<ChatSession>,
        tx: mpsc::UnboundedSender<OutboundFrame>,
    ) -> Self {
        Self {
            conn_id: conn_id.into(),
            user_id: user_id.into(),
            chat,
            connected_at: chrono::Utc::now().timestamp_millis(),
            tx,
            active_stream: Mutex::new(None),
        }
    }

    pub fn chat_id(&self) -> Option<&str> {
        self.chat.as_ref().map(|c| c.id.as_str())
    }

    pub fn app_id(&self) -> Option<&str> {
        self.chat.as_ref().map(|c| c.app_id.as_str())
    }

    /// 日志中使用的短 ID
    pub fn short_id(&self) -> &str {
        &self.conn_id[..self.conn_id.len().min(8)]
    }

    pub fn has_active_stream(&self) -> bool {
        self.active_stream.lock().is_some()
    }

    /// 占用流式槽位，已有活动会话时返回 false
    pub fn begin_stream(&self, message_id: &str, cancel: CancellationToken) -> bool {
        let mut slot = self.active_stream.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(ActiveStream {
            message_id: message_id.to_string(),
            cancel,
        });
        true
    }

    /// 释放流式槽位（只释放属于 `message_id` 的会话）
    pub fn finish_stream(&self, message_id: &str) {
        let mut slot = self.active_stream.lock();
        if slot
            .as_ref()
            .map(|active| active.message_id == message_id)
            .unwrap_or(false)
        {
            *slot = None;
        }
    }

    /// 取消活动会话，返回是否确实取消了一个会话
    pub fn cancel_active_stream(&self) -> bool {
        match self.active_stream.lock().take() {
            Some(active) => {
                active.cancel.cancel();
                tracing::debug!(
                    "[WS] 取消连接 {} 的流式会话 {}",
                    self.short_id(),
                    active.message_id
                );
                true
            }
            None => false,
        }
    }
}

impl FrameSink for ConnectionState {
    /// 终止帧发出前先释放流式槽位，客户端收到完成帧后即可发起下一次请求
    fn send_frame(&self, frame: OutboundFrame) -> bool {
        if let Some(message_id) = frame.terminal_message_id() {
            self.finish_stream(message_id);
        }
        self.tx.send(frame).is_ok()
    }
}
