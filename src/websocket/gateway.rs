//! 连接网关
//!
//! 负责 WebSocket 握手认证、绑定聊天会话以及连接的完整生命周期：
//!
//! ```text
//! Connecting ──认证成功──▶ Authenticated ──▶ Closed
//!      │
//!      └──认证失败──▶ Rejected（只发送关闭帧）
//! ```

use std::borrow::Cow;
use std::fmt::Display;
use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message};
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::mpsc;

use super::connection::{ConnectionState, FrameSink};
use super::protocol::{ConnectedData, OutboundFrame};
use super::registry::ConnectionRegistry;
use super::router::MessageRouter;
use crate::auth::TokenVerifier;
use crate::database::dao::ChatSessionDao;
use crate::database::DbConnection;
use crate::models::ChatSession;

/// 策略违规（认证失败、越权）
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;
/// 服务端内部错误
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;
/// 服务繁忙，稍后重试
pub const CLOSE_TRY_AGAIN_LATER: u16 = 1013;

/// 握手查询参数
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HandshakeParams {
    pub token: Option<String>,
    #[serde(rename = "chatId", alias = "chat_id")]
    pub chat_id: Option<String>,
}

/// 握手成功的结果
#[derive(Debug, Clone)]
pub struct Handshake {
    pub user_id: String,
    pub chat: Option<ChatSession>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeRejection {
    #[error("Authentication required")]
    AuthRequired,
    #[error("Authentication failed")]
    AuthFailed,
    #[error("Access denied")]
    AccessDenied,
    #[error("Server busy")]
    Overloaded,
    #[error("Internal error")]
    Internal,
}

impl HandshakeRejection {
    pub fn close_code(&self) -> u16 {
        match self {
            Self::AuthRequired | Self::AuthFailed | Self::AccessDenied => CLOSE_POLICY_VIOLATION,
            Self::Overloaded => CLOSE_TRY_AGAIN_LATER,
            Self::Internal => CLOSE_INTERNAL_ERROR,
        }
    }

    pub fn close_message(&self) -> Message {
        close_message(self.close_code(), &self.to_string())
    }
}

/// 关闭帧原因的字节上限（控制帧负载 125 字节减去 2 字节关闭码）
const MAX_CLOSE_REASON_BYTES: usize = 123;

fn close_message(code: u16, reason: &str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: Cow::Owned(truncate_utf8(reason, MAX_CLOSE_REASON_BYTES).to_string()),
    }))
}

/// 按字节截断，不切开多字节字符
fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

pub struct Gateway {
    verifier: Arc<dyn TokenVerifier>,
    db: DbConnection,
    registry: Arc<ConnectionRegistry>,
    router: Arc<MessageRouter>,
}

impl Gateway {
    pub fn new(
        verifier: Arc<dyn TokenVerifier>,
        db: DbConnection,
        registry: Arc<ConnectionRegistry>,
        router: Arc<MessageRouter>,
    ) -> Self {
        Self {
            verifier,
            db,
            registry,
            router,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// 校验凭证并解析要绑定的聊天会话
    ///
    /// 查询参数中的令牌优先，其次是 `Authorization: Bearer` 请求头。
    pub async fn authenticate(
        &self,
        params: &HandshakeParams,
        header_token: Option<&str>,
    ) -> Result<Handshake, HandshakeRejection> {
        let token = non_empty(params.token.as_deref())
            .or_else(|| non_empty(header_token))
            .ok_or(HandshakeRejection::AuthRequired)?;

        let user_id = self
            .verifier
            .verify(token)
            .await
            .ok_or(HandshakeRejection::AuthFailed)?;

        let chat = match non_empty(params.chat_id.as_deref()) {
            None => None,
            Some(chat_id) => {
                let session = {
                    let conn = self.db.lock().map_err(|_| {
                        tracing::error!("[Gateway] 数据库锁已中毒");
                        HandshakeRejection::Internal
                    })?;
                    ChatSessionDao::get(&conn, chat_id)
                }
                .map_err(|e| {
                    tracing::error!("[Gateway] 查询聊天会话 {} 失败: {}", chat_id, e);
                    HandshakeRejection::Internal
                })?;
                match session {
                    Some(session) if session.is_owned_by(&user_id) => Some(session),
                    _ => {
                        tracing::info!(
                            "[Gateway] 用户 {} 无权访问聊天会话 {}",
                            user_id,
                            chat_id
                        );
                        return Err(HandshakeRejection::AccessDenied);
                    }
                }
            }
        };

        Ok(Handshake { user_id, chat })
    }

    /// 接管一条已升级的连接直到其关闭
    ///
    /// 认证完成前不读取任何入站帧。
    pub async fn serve<W, R, E>(
        &self,
        mut sink: W,
        mut stream: R,
        params: HandshakeParams,
        header_token: Option<String>,
    ) where
        W: Sink<Message> + Unpin + Send + 'static,
        R: Stream<Item = Result<Message, E>> + Unpin,
        E: Display,
    {
        let handshake = match self.authenticate(&params, header_token.as_deref()).await {
            Ok(handshake) => handshake,
            Err(rejection) => {
                self.registry.stats().on_rejected();
                tracing::info!(
                    "[Gateway] 握手被拒绝: {} ({})",
                    rejection,
                    rejection.close_code()
                );
                let _ = sink.send(rejection.close_message()).await;
                let _ = sink.close().await;
                return;
            }
        };

        let (tx, mut rx) = mpsc::unbounded_channel::<OutboundFrame>();
        let conn = Arc::new(ConnectionState::new(
            uuid::Uuid::new_v4().to_string(),
            handshake.user_id,
            handshake.chat,
            tx,
        ));

        if let Err(e) = self.registry.register(conn.clone()) {
            self.registry.stats().on_rejected();
            tracing::warn!("[Gateway] 注册连接失败: {}", e);
            let rejection = HandshakeRejection::Overloaded;
            let _ = sink.send(rejection.close_message()).await;
            let _ = sink.close().await;
            return;
        }

        let writer = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if sink.send(Message::Text(frame.to_json())).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        tracing::info!(
            "[WS] 新连接: {} (user: {}, chat: {:?})",
            conn.short_id(),
            conn.user_id,
            conn.chat_id()
        );

        conn.send_frame(OutboundFrame::Connected(ConnectedData {
            connection_id: conn.conn_id.clone(),
            user_id: conn.user_id.clone(),
            chat_id: conn.chat_id().map(str::to_string),
            timestamp: conn.connected_at,
        }));

        while let Some(msg) = stream.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    self.registry.stats().on_message();
                    self.router.dispatch(&conn, &text);
                }
                Ok(Message::Binary(_)) => {
                    self.registry.stats().on_error();
                    conn.send_frame(OutboundFrame::error("Binary messages not supported"));
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                    // 底层协议栈自动回复 pong
                }
                Ok(Message::Close(_)) => break,
                Err(e) => {
                    self.registry.stats().on_error();
                    tracing::warn!("[WS] 连接 {} 出错: {}", conn.short_id(), e);
                    break;
                }
            }
        }

        // 清理连接
        conn.cancel_active_stream();
        self.registry.unregister(&conn.conn_id);
        tracing::info!("[WS] 连接已关闭: {}", conn.short_id());
        drop(conn);
        let _ = writer.await;
    }
}
